//! Prometheus metrics for the lock-and-mint relayer
//!
//! Exposes metrics on /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, register_int_counter_vec,
    register_int_gauge, CounterVec, Gauge, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // Loop metrics
    pub static ref ITERATIONS: CounterVec = register_counter_vec!(
        "relayer_iterations_total",
        "Relay loop iterations by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref LAST_PROCESSED_BLOCK: IntGauge = register_int_gauge!(
        "relayer_last_processed_block",
        "Last source block fully scanned and relayed"
    ).unwrap();

    pub static ref CHAIN_HEAD: IntGauge = register_int_gauge!(
        "relayer_source_chain_head",
        "Latest source chain head seen"
    ).unwrap();

    pub static ref SAFE_HEAD: IntGauge = register_int_gauge!(
        "relayer_source_safe_head",
        "Source chain head minus the reorg safety margin"
    ).unwrap();

    // Scanner metrics
    pub static ref EVENTS_SCANNED: IntCounter = register_int_counter!(
        "relayer_lock_events_scanned_total",
        "TokensLocked events decoded from the source chain"
    ).unwrap();

    pub static ref CHUNK_QUERIES: IntCounter = register_int_counter!(
        "relayer_log_queries_total",
        "eth_getLogs sub-range queries issued"
    ).unwrap();

    pub static ref RANGE_SPLITS: IntCounter = register_int_counter!(
        "relayer_range_splits_total",
        "Sub-ranges split after the provider reported the range as too large"
    ).unwrap();

    // Relay metrics
    pub static ref ACTIONS_RELAYED: IntCounterVec = register_int_counter_vec!(
        "relayer_actions_relayed_total",
        "Relay actions confirmed by the sink",
        &["result"]
    ).unwrap();

    pub static ref DUPLICATES_SKIPPED: IntCounter = register_int_counter!(
        "relayer_duplicate_nonces_skipped_total",
        "Events skipped because their nonce was already relayed"
    ).unwrap();

    pub static ref PROCESSED_NONCES: IntGauge = register_int_gauge!(
        "relayer_processed_nonces",
        "Size of the processed nonce set"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: IntCounterVec = register_int_counter_vec!(
        "relayer_errors_total",
        "Total number of errors",
        &["type"]
    ).unwrap();

    pub static ref CONSECUTIVE_FAILURES: IntGauge = register_int_gauge!(
        "relayer_consecutive_failures",
        "Number of consecutive failed iterations"
    ).unwrap();

    pub static ref STUCK_NONCE_FAILURES: IntGauge = register_int_gauge!(
        "relayer_stuck_nonce_failures",
        "Consecutive send failures of the nonce at the head of the batch"
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: Gauge = register_gauge!(
        "relayer_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll"
    ).unwrap();
}

pub fn record_iteration(outcome: &str) {
    ITERATIONS.with_label_values(&[outcome]).inc();
}

pub fn record_heads(head: u64, safe_head: u64) {
    CHAIN_HEAD.set(head as i64);
    SAFE_HEAD.set(safe_head as i64);
}

pub fn record_state(last_processed_block: u64, processed_nonces: usize) {
    LAST_PROCESSED_BLOCK.set(last_processed_block as i64);
    PROCESSED_NONCES.set(processed_nonces as i64);
}

pub fn record_events_scanned(count: usize) {
    EVENTS_SCANNED.inc_by(count as u64);
}

pub fn record_chunk_query() {
    CHUNK_QUERIES.inc();
}

pub fn record_range_split() {
    RANGE_SPLITS.inc();
}

pub fn record_relay(already_relayed: bool) {
    let result = if already_relayed {
        "already_relayed"
    } else {
        "relayed"
    };
    ACTIONS_RELAYED.with_label_values(&[result]).inc();
}

pub fn record_duplicate_skipped() {
    DUPLICATES_SKIPPED.inc();
}

pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}

pub fn set_consecutive_failures(count: u32) {
    CONSECUTIVE_FAILURES.set(count as i64);
}

pub fn set_stuck_nonce_failures(count: u32) {
    STUCK_NONCE_FAILURES.set(count as i64);
}

/// Record last successful poll
pub fn record_successful_poll() {
    LAST_SUCCESSFUL_POLL.set(chrono::Utc::now().timestamp() as f64);
}
