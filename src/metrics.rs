//! Prometheus metrics for mailbox traffic
//!
//! Counters are process-wide and shared by every [`Postmaster`](crate::mail::Postmaster).

use crate::mail::Status;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

lazy_static! {
    /// Counter: messages created
    pub static ref MESSAGES_CREATED: IntCounter = register_int_counter!(
        "msgpass_messages_created_total",
        "Total messages created"
    )
    .expect("Failed to create messages_created metric");

    /// Counter: messages deleted, including bulk teardown
    pub static ref MESSAGES_DELETED: IntCounter = register_int_counter!(
        "msgpass_messages_deleted_total",
        "Total messages deleted"
    )
    .expect("Failed to create messages_deleted metric");

    /// Gauge: messages currently registered
    pub static ref LIVE_MESSAGES: IntGauge = register_int_gauge!(
        "msgpass_live_messages",
        "Messages created and not yet deleted"
    )
    .expect("Failed to create live_messages metric");

    /// Counter: pending entries removed because their message was deleted
    pub static ref PURGED_ENTRIES: IntCounter = register_int_counter!(
        "msgpass_purged_entries_total",
        "Mailbox entries removed by message deletion"
    )
    .expect("Failed to create purged_entries metric");

    /// Counter: send calls by status
    pub static ref SENDS: CounterVec = register_counter_vec!(
        "msgpass_sends_total",
        "Send calls by status",
        &["status"]
    )
    .expect("Failed to create sends metric");

    /// Counter: recv calls by status
    pub static ref RECVS: CounterVec = register_counter_vec!(
        "msgpass_recvs_total",
        "Recv calls by status",
        &["status"]
    )
    .expect("Failed to create recvs metric");
}

/// Record a created message
pub fn record_created() {
    MESSAGES_CREATED.inc();
    LIVE_MESSAGES.inc();
}

/// Record a deleted message and the entries its deletion purged
pub fn record_deleted(purged: usize) {
    MESSAGES_DELETED.inc();
    LIVE_MESSAGES.dec();
    PURGED_ENTRIES.inc_by(purged as u64);
}

/// Record a bulk teardown
pub fn record_cleared(deleted: usize, purged: usize) {
    MESSAGES_DELETED.inc_by(deleted as u64);
    LIVE_MESSAGES.sub(deleted as i64);
    PURGED_ENTRIES.inc_by(purged as u64);
}

/// Record the outcome of a send
pub fn record_send(status: Status) {
    SENDS.with_label_values(&[status.as_str()]).inc();
}

/// Record the outcome of a recv
pub fn record_recv(status: Status) {
    RECVS.with_label_values(&[status.as_str()]).inc();
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::MsgPassError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::MsgPassError::Other(format!("Metrics are not UTF-8: {}", e)))
}
