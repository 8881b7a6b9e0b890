//! The sovereign decision engine daemon: runs every registered producer
//! on its own schedule, runs the brain cycle on its own schedule, and
//! routes any trade intent it emits through the execution layer.
//!
//! Single-process cooperative scheduling: every task shares the same
//! `Journal` handle, itself a single re-entrant-locked writer, so there
//! is one logical writer no matter how many tasks are in flight.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use sovereign_engine::brain::BrainOrchestrator;
use sovereign_engine::config::Config;
use sovereign_engine::events::EventType;
use sovereign_engine::execution::{self, Oms, PaperBroker, Preflight};
use sovereign_engine::identity;
use sovereign_engine::journal::Journal;
use sovereign_engine::kill_switch::KillSwitch;
use sovereign_engine::learning;
use sovereign_engine::producers::{build_registry, ProducerHealth, ProducerRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;
    let _metrics_handle = sovereign_engine::metrics::install().ok();

    let journal = Journal::open(Path::new(&config.journal_path))?;
    let identity = identity::ensure_identity(Path::new(&config.identity_key_path))?;
    info!(node_id = %identity.node_id, "node identity loaded");

    let registry = Arc::new(build_registry(config.kill_switch.producer_quarantine_after_failures));
    let journal = Arc::new(journal);
    let config = Arc::new(config);

    let mut handles = Vec::new();

    for (name, schedule_seconds) in registry.schedules() {
        let registry = registry.clone();
        let journal = journal.clone();
        handles.push(tokio::spawn(async move {
            producer_loop(registry, journal, name, schedule_seconds).await;
        }));
    }

    handles.push(tokio::spawn(brain_loop(journal.clone(), config.clone(), identity.node_id.clone())));
    handles.push(tokio::spawn(learning_loop(journal.clone(), config.clone())));

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn producer_loop(registry: Arc<ProducerRegistry>, journal: Arc<Journal>, name: String, schedule_seconds: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(schedule_seconds.max(1)));
    loop {
        interval.tick().await;
        if let Some(result) = registry.run_named(&name, &journal).await {
            sovereign_engine::metrics::record_producer_run(&result.producer, result.health);
            if result.health == ProducerHealth::Error {
                warn!(producer = %result.producer, message = ?result.message, "producer run failed");
            }
        }
    }
}

async fn brain_loop(journal: Arc<Journal>, config: Arc<Config>, node_id: String) {
    let orchestrator = BrainOrchestrator::default().with_node_id(node_id);
    let sizer = execution::default_sizer_from_risk(config.risk.max_position_pct_of_equity);
    let preflight = Preflight::new(config.risk.clone(), None);
    let paper = PaperBroker::default();
    let oms = Oms::new(preflight, sizer, paper);

    let mut interval = tokio::time::interval(Duration::from_secs(config.brain.cycle_interval_seconds.max(1)));
    loop {
        interval.tick().await;
        for symbol in &config.universe.assets {
            if let Err(err) = run_one_cycle(&journal, &config, &orchestrator, &oms, symbol) {
                error!(symbol = %symbol, error = %err, "brain cycle failed");
            }
        }
    }
}

/// One symbol's brain cycle plus, if it produced a trade intent, routing
/// that intent through the execution layer. Synchronous: every step is a
/// SQLite round trip, not a network call, so there's no reason to hold
/// this across an await point.
fn run_one_cycle(
    journal: &Journal,
    config: &Config,
    orchestrator: &BrainOrchestrator,
    oms: &Oms,
    symbol: &str,
) -> anyhow::Result<()> {
    let outcome = orchestrator.run_cycle(journal, config, symbol)?;
    sovereign_engine::metrics::record_cycle_run(symbol);

    let kill_switch = KillSwitch::restore(config.kill_switch.clone(), journal);
    sovereign_engine::metrics::record_kill_switch_level(kill_switch.level());

    let domain_scores_at_entry = serde_json::to_value(&outcome.domain_scores).unwrap_or(serde_json::json!({}));

    let Some(intent) = outcome.trade_intent else {
        return Ok(());
    };
    sovereign_engine::metrics::record_intent_emitted(symbol);

    // Equity and mark price are external-world reads this daemon doesn't
    // yet source from a real balance/price feed; the latest technical
    // signal for the symbol stands in for a mark price until that
    // adapter exists.
    let equity_usd = 100_000.0;
    let Some(mid_price) = last_mark_price(journal, symbol)? else {
        warn!(symbol = %symbol, "no mark price available yet, skipping execution this cycle");
        return Ok(());
    };

    let status = oms.submit(
        journal,
        config,
        &intent,
        mid_price,
        equity_usd,
        0.0,
        kill_switch.level(),
        0.0,
        0.0,
        &domain_scores_at_entry,
        None,
    )?;

    match status {
        execution::OmsStatus::Filled { position_id, notional_usd, .. } => {
            info!(symbol = %symbol, position_id = %position_id, notional_usd, "intent filled");
        }
        execution::OmsStatus::Rejected { reasons } => {
            info!(symbol = %symbol, ?reasons, "intent rejected by preflight or sizing");
        }
    }

    Ok(())
}

fn last_mark_price(journal: &Journal, symbol: &str) -> anyhow::Result<Option<f64>> {
    let events = journal.replay_all()?;
    let price = events
        .iter()
        .rev()
        .find(|e| e.event_type == EventType::SignalTaV1 && e.payload.get("symbol").and_then(|v| v.as_str()) == Some(symbol))
        .and_then(|e| e.payload.get("price").and_then(|v| v.as_f64()));
    Ok(price)
}

async fn learning_loop(journal: Arc<Journal>, config: Arc<Config>) {
    let overlay_path = std::env::var("ENGINE_LEARNED_WEIGHTS_PATH").unwrap_or_else(|_| "./data/learned_weights.yaml".to_string());
    let mut interval = tokio::time::interval(Duration::from_secs(24 * 3600));
    loop {
        interval.tick().await;
        match learning::run_adjustment_cycle(&journal, &config, "daily", Path::new(&overlay_path)) {
            Ok(report) => info!(reason = ?report.reason, observations = report.observations, "learning cycle ran"),
            Err(err) => error!(error = %err, "learning cycle failed"),
        }
    }
}
