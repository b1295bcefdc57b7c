//! Prometheus counters exposed at `/metrics` (§6), registered the same way
//! `ph_operator::metrics` does: `lazy_static` definitions plus a single
//! registry-construction function called once at startup.

use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use prometheus::{opts, register_int_counter, IntCounter, Registry};

lazy_static! {
    /// Alerts accepted through `POST /api/alerts`, counted per alert (not per
    /// batch).
    pub static ref ALERTS_RECEIVED_TOTAL: IntCounter = register_int_counter!(opts!(
        "openfero_alerts_received_total",
        "Total number of alerts accepted from webhook payloads."
    ))
    .unwrap();

    pub static ref JOBS_CREATED_TOTAL: IntCounter = register_int_counter!(opts!(
        "openfero_jobs_created_total",
        "Total number of remediation jobs created."
    ))
    .unwrap();

    pub static ref JOBS_SUCCEEDED_TOTAL: IntCounter = register_int_counter!(opts!(
        "openfero_jobs_succeeded_total",
        "Total number of remediation jobs observed to succeed."
    ))
    .unwrap();

    pub static ref JOBS_FAILED_TOTAL: IntCounter = register_int_counter!(opts!(
        "openfero_jobs_failed_total",
        "Total number of remediation jobs observed to fail."
    ))
    .unwrap();

    pub static ref DISPATCHER_ERRORS_TOTAL: IntCounter = register_int_counter!(opts!(
        "openfero_dispatcher_errors_total",
        "Total number of non-fatal dispatch errors (precondition, transient API, status-patch conflict)."
    ))
    .unwrap();

    pub static ref BROKER_DROPPED_EVENTS_TOTAL: IntCounter = register_int_counter!(opts!(
        "openfero_broker_dropped_events_total",
        "Total number of events dropped for slow event-broker subscribers."
    ))
    .unwrap();
}

/// `EventBroker::dropped_count()` is the source of truth; this tracks the
/// value last folded into `BROKER_DROPPED_EVENTS_TOTAL` so each scrape only
/// applies the delta, keeping the counter monotonic without the broker
/// itself depending on `prometheus`.
static BROKER_DROPPED_SYNCED: AtomicU64 = AtomicU64::new(0);

/// Folds the broker's cumulative drop count into `BROKER_DROPPED_EVENTS_TOTAL`.
/// Called on every `/metrics` scrape.
pub fn sync_broker_dropped(current: u64) {
    let previous = BROKER_DROPPED_SYNCED.swap(current, Ordering::SeqCst);
    let delta = current.saturating_sub(previous);
    if delta > 0 {
        BROKER_DROPPED_EVENTS_TOTAL.inc_by(delta);
    }
}

/// Creates a new registry and registers every counter above. Called once at
/// startup; the registry is then shared with the `/metrics` handler.
pub fn create_and_register_metrics() -> Result<Registry, prometheus::Error> {
    let r = Registry::new();
    r.register(Box::new(ALERTS_RECEIVED_TOTAL.clone()))?;
    r.register(Box::new(JOBS_CREATED_TOTAL.clone()))?;
    r.register(Box::new(JOBS_SUCCEEDED_TOTAL.clone()))?;
    r.register(Box::new(JOBS_FAILED_TOTAL.clone()))?;
    r.register(Box::new(DISPATCHER_ERRORS_TOTAL.clone()))?;
    r.register(Box::new(BROKER_DROPPED_EVENTS_TOTAL.clone()))?;
    Ok(r)
}
