//! Orchestrates one full brain cycle: rebuild projections from the
//! journal, run the data quality gate, synthesize the domain vector,
//! detect the regime, score conviction, consult the kill switch, and
//! apply the decision policy — emitting the events each stage contracts
//! to produce.

use serde_json::json;

use std::collections::HashMap;

use crate::brain::conviction::ConvictionEngine;
use crate::brain::data_quality::DataQualityMonitor;
use crate::brain::decision::{DecisionPolicy, TradeIntent};
use crate::brain::regime::RegimeDetector;
use crate::brain::synthesis::VectorSynthesizer;
use crate::config::Config;
use crate::events::EventType;
use crate::journal::{AppendRequest, Journal, JournalError};
use crate::kill_switch::{KillSwitch, KillSwitchInputs};
use crate::projections::{ProjectionManager, Regime};
use crate::time::utc_now;

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub regime: Regime,
    pub regime_changed: bool,
    pub pcs: f64,
    pub cts: f64,
    pub final_conviction: f64,
    pub trade_intent: Option<TradeIntent>,
    /// The per-domain scores this cycle synthesized, so a fill can carry
    /// its entry-time evidence forward for the learning loop to attribute
    /// outcomes back against.
    pub domain_scores: HashMap<String, f64>,
    pub domains_used: Vec<String>,
}

#[derive(Default)]
pub struct BrainOrchestrator {
    quality_monitor: DataQualityMonitor,
    node_id: String,
}

impl BrainOrchestrator {
    pub fn with_node_id(mut self, node_id: String) -> Self {
        self.node_id = node_id;
        self
    }

    /// Runs one cycle for a single symbol. The kill switch is rehydrated
    /// fresh from the journal on every call rather than cached across
    /// cycles — a cheap read next to one SQLite round trip per brain
    /// cycle, and it guarantees this cycle never acts on a stale level.
    pub fn run_cycle(&self, journal: &Journal, config: &Config, symbol: &str) -> Result<CycleOutcome, JournalError> {
        let events = journal.replay_all()?;
        let manager = ProjectionManager::rebuild(&events);
        let mut kill_switch = KillSwitch::restore(config.kill_switch.clone(), journal);

        let quality = self.quality_monitor.evaluate(&manager.signals);
        let synthesis = VectorSynthesizer::synthesize(&manager.signals, &config.domain_weights, &quality);
        let regime = RegimeDetector::detect(&synthesis);
        let previous_regime = manager.regime.current();
        let regime_changed = previous_regime != Some(regime);

        if regime == Regime::Crisis {
            kill_switch.evaluate(
                journal,
                KillSwitchInputs {
                    crisis_conditions: Some(config.kill_switch.l3_crisis_threshold),
                    reason: Some("regime_crisis".to_string()),
                    ..Default::default()
                },
            )?;
        }

        let conviction = ConvictionEngine::evaluate(&synthesis, regime);
        let trade_intent = DecisionPolicy::decide(
            symbol,
            &conviction,
            regime,
            kill_switch.level(),
            &config.brain,
            &config.risk,
        );

        let now = utc_now();

        journal.append(AppendRequest::new(
            EventType::BrainSynthesisV1,
            json!({
                "domain_vector": synthesis.domain_vector.scores.clone(),
                "features": synthesis.features,
                "composite_score": synthesis.composite_score,
                "domains_used": synthesis.domains_used.clone(),
                "ts": now.to_rfc3339(),
            }),
        ))?;

        if regime_changed {
            journal.append(AppendRequest::new(
                EventType::BrainRegimeChangeV1,
                json!({
                    "regime": regime_label(regime),
                    "previous_regime": previous_regime.map(regime_label),
                    "ts": now.to_rfc3339(),
                }),
            ))?;
        }

        let conviction_event = journal.append(AppendRequest::new(
            EventType::BrainConvictionV1,
            json!({
                "symbol": symbol,
                "pcs": conviction.pcs,
                "cts": conviction.cts,
                "final_conviction": conviction.final_conviction,
                "direction": conviction.direction,
                "magnitude": conviction.magnitude,
                "timeframe": conviction.timeframe.clone(),
                "confidence": conviction.confidence,
                "domains_used": conviction.domains_used.clone(),
                "commitment_hash": conviction.commitment_hash.clone(),
                "regime": regime_label(regime),
                "ts": now.to_rfc3339(),
            }),
        ))?;

        // Mirrors the conviction into its own side table, keyed by the
        // journal event's id, so learning (or an operator) can join back
        // to the exact domains/score behind a commitment hash without
        // folding the whole chain.
        self.persist_conviction_score(journal, &conviction_event.id, symbol, regime, &conviction, now)?;

        if let Some(intent) = &trade_intent {
            journal.append(
                AppendRequest::new(EventType::ExecutionTradeIntentV1, serde_json::to_value(intent)?)
                    .with_source("brain.orchestrator"),
            )?;
        }

        journal.append(AppendRequest::new(
            EventType::BrainCycleV1,
            json!({
                "symbol": symbol,
                "regime": regime_label(regime),
                "regime_changed": regime_changed,
                "pcs": conviction.pcs,
                "cts": conviction.cts,
                "final_conviction": conviction.final_conviction,
                "trade_intent_emitted": trade_intent.is_some(),
                "kill_switch_level": kill_switch.level() as u8,
                "ts": now.to_rfc3339(),
            }),
        ))?;

        Ok(CycleOutcome {
            regime,
            regime_changed,
            pcs: conviction.pcs,
            cts: conviction.cts,
            final_conviction: conviction.final_conviction,
            trade_intent,
            domain_scores: synthesis.domain_vector.scores,
            domains_used: synthesis.domains_used,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn persist_conviction_score(
        &self,
        journal: &Journal,
        cycle_id: &str,
        symbol: &str,
        regime: Regime,
        conviction: &crate::brain::conviction::ConvictionResult,
        ts: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), JournalError> {
        let domains_used_json = serde_json::to_string(&conviction.domains_used)?;
        journal.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO conviction_scores (
                    cycle_id, node_id, symbol, direction, magnitude, timeframe, ts,
                    commitment_hash, pcs_score, cts_score, regime, domains_used, confidence
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    cycle_id,
                    self.node_id,
                    symbol,
                    conviction.direction,
                    conviction.magnitude,
                    conviction.timeframe,
                    ts.to_rfc3339(),
                    conviction.commitment_hash,
                    conviction.pcs,
                    conviction.cts,
                    regime_label(regime),
                    domains_used_json,
                    conviction.confidence,
                ],
            )
            .map_err(JournalError::Sqlite)
        })?;
        Ok(())
    }
}

fn regime_label(regime: Regime) -> &'static str {
    match regime {
        Regime::Bull => "BULL",
        Regime::Bear => "BEAR",
        Regime::Crisis => "CRISIS",
        Regime::Transition => "TRANSITION",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn runs_a_cycle_against_an_empty_journal_without_error() {
        let journal = Journal::open_in_memory().unwrap();
        let config = Config::from_repo_defaults();
        let outcome = BrainOrchestrator::default().run_cycle(&journal, &config, "BTC").unwrap();
        assert_eq!(outcome.regime, Regime::Transition);
        assert!(outcome.trade_intent.is_none());
    }
}
