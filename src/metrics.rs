//! Instrumentation points only — no dashboard, no alerting. An external
//! collaborator scrapes these off the Prometheus exporter this module
//! installs.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::kill_switch::KillSwitchLevel;
use crate::producers::base::ProducerHealth;

/// Installs the global Prometheus recorder. Call once at startup; the
/// returned handle renders the current scrape text on demand.
pub fn install() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn record_cycle_run(symbol: &str) {
    metrics::counter!("cycles_run_total", "symbol" => symbol.to_string()).increment(1);
}

pub fn record_producer_run(producer: &str, health: ProducerHealth) {
    metrics::counter!(
        "producer_runs_total",
        "producer" => producer.to_string(),
        "health" => format!("{health:?}"),
    )
    .increment(1);
}

pub fn record_kill_switch_level(level: KillSwitchLevel) {
    metrics::gauge!("kill_switch_level").set(level as u8 as f64);
}

pub fn record_intent_emitted(symbol: &str) {
    metrics::counter!("intents_emitted_total", "symbol" => symbol.to_string()).increment(1);
}
