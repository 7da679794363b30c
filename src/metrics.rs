//! Prometheus metrics for guardian recovery
//!
//! Exposed on the /metrics endpoint for Prometheus scraping.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};

lazy_static! {
    // Watcher metrics
    pub static ref WATCH_CYCLES: CounterVec = register_counter_vec!(
        "guardian_recovery_watch_cycles_total",
        "Total number of watch cycles by outcome",
        &["contract", "status"]
    ).unwrap();

    pub static ref EVENTS_CONFIRMED: CounterVec = register_counter_vec!(
        "guardian_recovery_events_confirmed_total",
        "Total number of confirmed contract events",
        &["contract"]
    ).unwrap();

    pub static ref EVENTS_DROPPED: CounterVec = register_counter_vec!(
        "guardian_recovery_events_dropped_total",
        "Total number of events dropped because their block left the main chain",
        &["contract"]
    ).unwrap();

    pub static ref EVENT_INDEX: GaugeVec = register_gauge_vec!(
        "guardian_recovery_event_index",
        "Next event index to process",
        &["contract"]
    ).unwrap();

    // Recovery metrics
    pub static ref BACKFILL_ATTEMPTS: CounterVec = register_counter_vec!(
        "guardian_recovery_backfill_attempts_total",
        "Peer backfill requests by outcome",
        &["chain", "outcome"]
    ).unwrap();

    pub static ref RECONSTRUCTIONS: CounterVec = register_counter_vec!(
        "guardian_recovery_reconstructions_total",
        "Undone-transfer reconstructions by outcome",
        &["chain", "outcome"]
    ).unwrap();

    pub static ref VAAS_INGESTED: CounterVec = register_counter_vec!(
        "guardian_recovery_vaas_ingested_total",
        "Signed VAAs processed by the ingest worker by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref GOVERNANCE_VAAS: CounterVec = register_counter_vec!(
        "guardian_recovery_governance_vaas_total",
        "Governance VAAs constructed and submitted",
        &["kind"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "guardian_recovery_up",
        "Whether the service is up and running"
    ).unwrap();
}

pub fn record_watch_cycle(contract: &str, status: &str) {
    WATCH_CYCLES.with_label_values(&[contract, status]).inc();
}

pub fn record_events_confirmed(contract: &str, count: u64) {
    EVENTS_CONFIRMED
        .with_label_values(&[contract])
        .inc_by(count as f64);
}

pub fn record_events_dropped(contract: &str, count: u64) {
    EVENTS_DROPPED
        .with_label_values(&[contract])
        .inc_by(count as f64);
}

pub fn set_event_index(contract: &str, index: u64) {
    EVENT_INDEX.with_label_values(&[contract]).set(index as f64);
}

/// Record a single peer request: found, not_found, error or protocol_error
pub fn record_backfill_attempt(chain: u16, outcome: &str) {
    BACKFILL_ATTEMPTS
        .with_label_values(&[&chain.to_string(), outcome])
        .inc();
}

pub fn record_reconstruction(chain: u16, outcome: &str) {
    RECONSTRUCTIONS
        .with_label_values(&[&chain.to_string(), outcome])
        .inc();
}

pub fn record_vaa_ingested(outcome: &str) {
    VAAS_INGESTED.with_label_values(&[outcome]).inc();
}

pub fn record_governance_vaa(kind: &str) {
    GOVERNANCE_VAAS.with_label_values(&[kind]).inc();
}

pub fn set_up(up: bool) {
    UP.set(if up { 1.0 } else { 0.0 });
}
