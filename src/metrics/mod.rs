use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;


lazy_static! {
    pub static ref EMIT_ENQUEUED_TOTAL: IntCounter = IntCounter::new(
        "concern_emit_enqueued_total",
        "Events added to the emit queue"
    )
    .expect("metric can not be created");

    pub static ref EMIT_RELEASED_TOTAL: IntCounter = IntCounter::new(
        "concern_emit_released_total",
        "Events handed from the emit queue to the dispatcher"
    )
    .expect("metric can not be created");

    pub static ref EMIT_DROPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("concern_emit_dropped_total", "Events dropped before dispatch"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref DISPATCH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("concern_dispatch_total", "Dispatched events by outcome"),
        &["name", "result"]
    )
    .expect("metric can not be created");
}

/// Registers the engine's collectors with `registry`.
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(EMIT_ENQUEUED_TOTAL.clone()))?;
    registry.register(Box::new(EMIT_RELEASED_TOTAL.clone()))?;
    registry.register(Box::new(EMIT_DROPPED_TOTAL.clone()))?;
    registry.register(Box::new(DISPATCH_TOTAL.clone()))?;
    Ok(())
}
