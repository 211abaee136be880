use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;

use super::EmitEvent;
use crate::ConcernType;
use crate::Result;
use crate::SubjectId;
use crate::DISPATCH_TOTAL;

/// Freshness gate consulted before each dispatch.
#[cfg_attr(test, automock)]
pub trait FreshGate: Send + Sync + 'static {
    /// True if `id` has not been refreshed within the fresh-mark window.
    /// With `set_ttl` the window is (re)opened.
    fn fresh_check(
        &self,
        id: &SubjectId,
        set_ttl: bool,
    ) -> Result<bool>;
}

/// Caller supplied handler doing the actual refresh work for one category
/// of one subject. Platform failures are reported as [`crate::Error::fresher`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Fresher: Send + Sync + 'static {
    async fn fresh(
        &self,
        ctype: ConcernType,
        id: &SubjectId,
    ) -> Result<()>;
}

/// Consumes released events until the channel closes.
///
/// Events whose subject was refreshed recently are skipped. A failing
/// handler is logged and never stops the loop.
pub async fn run_dispatch_loop<G, F>(
    name: &str,
    mut rx: mpsc::Receiver<EmitEvent>,
    gate: &G,
    fresher: &F,
) where
    G: FreshGate + ?Sized,
    F: Fresher + ?Sized,
{
    info!(%name, "dispatch loop started");
    while let Some(event) = rx.recv().await {
        let EmitEvent { id, ctype } = event;
        match gate.fresh_check(&id, true) {
            Ok(true) => {}
            Ok(false) => {
                trace!(%name, %id, %ctype, "recently refreshed, skip");
                DISPATCH_TOTAL.with_label_values(&[name, "stale"]).inc();
                continue;
            }
            Err(e) => {
                error!(%name, %id, %ctype, "fresh check failed: {:?}", e);
                DISPATCH_TOTAL.with_label_values(&[name, "error"]).inc();
                continue;
            }
        }

        debug!(%name, %id, %ctype, "dispatch");
        match fresher.fresh(ctype, &id).await {
            Ok(()) => {
                DISPATCH_TOTAL.with_label_values(&[name, "fresh"]).inc();
            }
            Err(e) => {
                error!(%name, %id, %ctype, "fresher failed: {:?}", e);
                DISPATCH_TOTAL.with_label_values(&[name, "error"]).inc();
            }
        }
    }
    info!(%name, "dispatch channel closed, loop exits");
}
