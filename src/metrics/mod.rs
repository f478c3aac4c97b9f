//! Prometheus metrics for the gateway and feedback clients.
//!
//! Counters cover the delivery lifecycle: frames written, rejections by
//! status, replays after a rejection, reconnects, and failure reports the
//! consumer was too slow to take. The host application scrapes them through
//! its own registry endpoint; [`gather`] renders the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics.
const METRIC_PREFIX: &str = "apns";

lazy_static! {
    /// Notification frames successfully written to the gateway.
    pub static ref NOTIFICATIONS_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_sent_total", METRIC_PREFIX),
        "Notification frames successfully written to the gateway"
    )
    .unwrap();

    /// Notifications replayed after the gateway rejected an earlier one.
    pub static ref NOTIFICATIONS_REPLAYED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_replayed_total", METRIC_PREFIX),
        "Notifications resubmitted after a gateway rejection"
    )
    .unwrap();

    /// Per-notification failures by error kind.
    pub static ref NOTIFICATIONS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_failed_total", METRIC_PREFIX),
        "Notifications that permanently failed or were rejected",
        &["reason"]
    )
    .unwrap();

    /// Failure reports dropped because no consumer was ready.
    pub static ref FAILURE_REPORTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_failure_reports_dropped_total", METRIC_PREFIX),
        "Failure reports dropped because the consumer was absent or slow"
    )
    .unwrap();

    /// Reconnection episodes (concurrent triggers collapse into one).
    pub static ref RECONNECTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_reconnects_total", METRIC_PREFIX),
        "Gateway reconnection episodes"
    )
    .unwrap();

    /// Current number of notifications held in the sent window.
    pub static ref SENT_WINDOW_SIZE: IntGauge = register_int_gauge!(
        format!("{}_sent_window_size", METRIC_PREFIX),
        "Notifications currently held in the sent window"
    )
    .unwrap();

    /// Records drained from the feedback service.
    pub static ref FEEDBACK_RECORDS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_feedback_records_total", METRIC_PREFIX),
        "Records drained from the feedback service"
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
