use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::EmitEvent;
use crate::EmitConfig;
use crate::OverflowPolicy;
use crate::EMIT_DROPPED_TOTAL;
use crate::EMIT_ENQUEUED_TOTAL;
use crate::EMIT_RELEASED_TOTAL;

#[derive(Debug)]
struct Scheduled {
    event: EmitEvent,
    at: Instant,
}

/// Soft delay queue.
///
/// Events become eligible at their scheduled instant and are released by a
/// ticker every `interval`; release order among due events is unspecified
/// and nothing is released early.
#[derive(Debug)]
pub struct EmitQueue {
    pending: Mutex<VecDeque<Scheduled>>,
    /// Taken by `run`; dropping it closes the dispatch channel
    sender: Mutex<Option<mpsc::Sender<EmitEvent>>>,
    config: EmitConfig,
}

impl EmitQueue {
    pub fn new(config: EmitConfig) -> (Self, mpsc::Receiver<EmitEvent>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let queue = Self {
            pending: Mutex::new(VecDeque::new()),
            sender: Mutex::new(Some(tx)),
            config,
        };
        (queue, rx)
    }

    /// Schedules `event` for delivery at or after `at`; `None` means as
    /// soon as possible.
    pub fn add(
        &self,
        event: EmitEvent,
        at: Option<Instant>,
    ) {
        let at = at.unwrap_or_else(Instant::now);
        let mut pending = self.pending.lock();
        if pending.len() >= self.config.max_pending {
            if let Some(oldest) = pending.pop_front() {
                warn!(
                    id = %oldest.event.id,
                    ctype = %oldest.event.ctype,
                    max_pending = self.config.max_pending,
                    "emit queue full, dropping oldest pending event"
                );
                EMIT_DROPPED_TOTAL.with_label_values(&["queue_full"]).inc();
            }
        }
        trace!(id = %event.id, ctype = %event.ctype, "emit queue add");
        pending.push_back(Scheduled { event, at });
        EMIT_ENQUEUED_TOTAL.inc();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ticker loop. Returns once `shutdown_signal` fires (or its sender is
    /// dropped) or the dispatcher side of the channel is gone.
    ///
    /// On shutdown, events already due get one last release; events not due
    /// yet are discarded. The channel closes when this returns.
    pub async fn run(
        &self,
        mut shutdown_signal: watch::Receiver<()>,
    ) {
        let Some(sender) = self.sender.lock().take() else {
            warn!("emit queue is already running");
            return;
        };

        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.config.interval_ms, "emit queue started");

        loop {
            tokio::select! {
                _ = shutdown_signal.changed() => {
                    info!("[EmitQueue] shutdown signal received.");
                    self.release_due(&sender).await;
                    let discarded = {
                        let mut pending = self.pending.lock();
                        let n = pending.len();
                        pending.clear();
                        n
                    };
                    if discarded > 0 {
                        warn!(discarded, "discarding emit events not yet due");
                        EMIT_DROPPED_TOTAL.with_label_values(&["shutdown"]).inc_by(discarded as u64);
                    }
                    break;
                }
                _ = ticker.tick() => {
                    if !self.release_due(&sender).await {
                        info!("dispatch channel closed, emit queue stops");
                        break;
                    }
                }
            }
        }
    }

    /// Moves every due event to the channel. Returns false once the
    /// receiver is gone.
    ///
    /// An event leaves `pending` only when it is handed to the channel, so
    /// events waiting on a full channel still count against `max_pending`.
    async fn release_due(
        &self,
        sender: &mpsc::Sender<EmitEvent>,
    ) -> bool {
        let now = Instant::now();
        let mut released = 0usize;
        loop {
            match self.config.overflow {
                OverflowPolicy::Block => {
                    if !self.has_due(now) {
                        break;
                    }
                    let Ok(permit) = sender.reserve().await else {
                        self.drop_pending_on_close(0);
                        return false;
                    };
                    // add() may have evicted the due event while we waited
                    let Some(event) = self.take_due(now) else {
                        break;
                    };
                    permit.send(event);
                }
                OverflowPolicy::DropNewest => {
                    let Some(event) = self.take_due(now) else {
                        break;
                    };
                    match sender.try_send(event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(event)) => {
                            warn!(id = %event.id, ctype = %event.ctype, "dispatch channel full, dropping event");
                            EMIT_DROPPED_TOTAL.with_label_values(&["channel_full"]).inc();
                            continue;
                        }
                        Err(TrySendError::Closed(_)) => {
                            self.drop_pending_on_close(1);
                            return false;
                        }
                    }
                }
            }
            released += 1;
            EMIT_RELEASED_TOTAL.inc();
        }
        if released > 0 {
            debug!(released, "released due emit events");
        }
        true
    }

    fn has_due(
        &self,
        now: Instant,
    ) -> bool {
        self.pending.lock().iter().any(|s| s.at <= now)
    }

    fn take_due(
        &self,
        now: Instant,
    ) -> Option<EmitEvent> {
        let mut pending = self.pending.lock();
        let idx = pending.iter().position(|s| s.at <= now)?;
        pending.remove(idx).map(|s| s.event)
    }

    /// `in_flight` counts events already taken out of `pending`.
    fn drop_pending_on_close(
        &self,
        in_flight: usize,
    ) {
        let dropped = {
            let mut pending = self.pending.lock();
            let n = pending.len();
            pending.clear();
            n + in_flight
        };
        if dropped > 0 {
            warn!(dropped, "dispatch channel closed, dropping pending emit events");
            EMIT_DROPPED_TOTAL.with_label_values(&["closed"]).inc_by(dropped as u64);
        }
    }
}
