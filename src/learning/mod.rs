//! The compound learning loop: attributes realized outcomes back to the
//! conviction that produced them, nudges domain weights toward the
//! domains that have actually been predictive, and reverts itself if
//! those nudges start making things worse.
//!
//! Gated hard by cold-start: there is no "trust me" path to skip waiting
//! for real trading history before the weights are allowed to move.

use std::path::Path;

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use statrs::statistics::Statistics;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, DomainWeights};
use crate::events::EventType;
use crate::journal::{AppendRequest, Journal, JournalError};
use crate::time::{parse_dt, utc_now};

const MIN_OBSERVATIONS: usize = 20;
const MIN_DOMAIN_SAMPLES: usize = 10; // max(5, MIN_OBSERVATIONS / 2)
const MAX_WEIGHT_DELTA: f64 = 0.02;
const WARM_WEIGHT_DELTA: f64 = 0.01;
const MIN_DOMAIN_WEIGHT: f64 = 0.05;
const MAX_DOMAIN_WEIGHT: f64 = 0.40;
const REVERSION_THRESHOLD: usize = 3;
const BASELINE_DAYS: i64 = 30;
const WARM_DAYS: i64 = 90;
const ATTRIBUTION_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("position {0} not found or not closed")]
    PositionNotClosed(String),
    #[error("failed to write learned weights overlay: {0}")]
    Overlay(#[from] std::io::Error),
    #[error("failed to serialize learned weights: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColdStartGate {
    NoHistory,
    Baseline,
    Warm,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeAttribution {
    pub position_id: String,
    pub conviction_id: Option<String>,
    pub symbol: String,
    pub realized_pnl_usd: f64,
    pub direction_correct: bool,
    pub time_held_hours: f64,
    pub regime_at_entry: Option<String>,
    pub domain_scores_at_entry: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningReport {
    pub cycle_id: String,
    pub mode: String,
    pub reason: Option<String>,
    pub observations: usize,
    pub deltas: std::collections::HashMap<String, f64>,
    pub weights: Option<DomainWeights>,
    pub reverted: bool,
}

/// Determines how far the learning loop is allowed to move weights right
/// now, based on how long real (non-paper-min-days) trading history has
/// existed. Gated on the first closed position ever recorded, not on
/// wall-clock since startup.
pub fn cold_start_gate(journal: &Journal) -> Result<ColdStartGate, LearningError> {
    let first_closed_at: Option<String> = journal.with_conn(|conn| {
        conn.query_row(
            "SELECT MIN(closed_at) FROM positions WHERE status = 'closed'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map(|v| v.flatten())
        .map_err(JournalError::Sqlite)
    })?;

    let Some(first_closed_at) = first_closed_at else {
        return Ok(ColdStartGate::NoHistory);
    };
    let Some(first_closed_at) = parse_dt(&first_closed_at) else {
        return Ok(ColdStartGate::NoHistory);
    };

    let age_days = (utc_now() - first_closed_at).num_days();
    if age_days < BASELINE_DAYS {
        Ok(ColdStartGate::Baseline)
    } else if age_days < WARM_DAYS {
        Ok(ColdStartGate::Warm)
    } else {
        Ok(ColdStartGate::Full)
    }
}

/// Attributes a single closed position's realized outcome back to the
/// conviction that opened it, and appends the `learning.outcome.v1`
/// audit event. `domain_scores_at_entry` is read straight off the
/// `positions` row (captured there at fill time) rather than joined
/// from a separate conviction log, since this crate denormalizes it
/// onto the position instead of keeping a conviction side-table.
pub fn attribute_outcome(journal: &Journal, position_id: &str) -> Result<OutcomeAttribution, LearningError> {
    let row: Option<(String, String, f64, String, String, Option<f64>, String, Option<String>)> =
        journal.with_conn(|conn| {
            conn.query_row(
                "SELECT symbol, status, size_usd, opened_at, domain_scores_at_entry, realized_pnl, conviction_id, closed_at
                 FROM positions WHERE position_id = ?1",
                params![position_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<f64>>(5)?,
                        row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(JournalError::Sqlite)
        })?;

    let Some((symbol, status, _size_usd, opened_at, domain_scores_raw, realized_pnl, conviction_id, closed_at)) = row else {
        return Err(LearningError::PositionNotClosed(position_id.to_string()));
    };
    if status != "closed" {
        return Err(LearningError::PositionNotClosed(position_id.to_string()));
    }
    let realized_pnl_usd = realized_pnl.unwrap_or(0.0);

    let time_held_hours = match (parse_dt(&opened_at), closed_at.as_deref().and_then(parse_dt)) {
        (Some(open), Some(close)) => (close - open).num_seconds() as f64 / 3600.0,
        _ => 0.0,
    };

    let conviction_id = if conviction_id.is_empty() { None } else { Some(conviction_id) };
    let regime_at_entry = conviction_id
        .as_ref()
        .and_then(|id| find_conviction_event(journal, id).ok().flatten())
        .and_then(|payload| payload.get("regime").and_then(|v| v.as_str()).map(str::to_string));

    let domain_scores_at_entry: serde_json::Value =
        serde_json::from_str(&domain_scores_raw).unwrap_or_else(|_| json!({}));

    let attribution = OutcomeAttribution {
        position_id: position_id.to_string(),
        conviction_id,
        symbol,
        realized_pnl_usd,
        direction_correct: realized_pnl_usd > 0.0,
        time_held_hours,
        regime_at_entry,
        domain_scores_at_entry,
    };

    journal.append(
        AppendRequest::new(EventType::LearningOutcomeV1, serde_json::to_value(&attribution)?)
            .with_source("learning.attribution")
            .with_dedupe_key(format!("learning.outcome:{position_id}")),
    )?;

    Ok(attribution)
}

fn find_conviction_event(journal: &Journal, conviction_id: &str) -> Result<Option<serde_json::Value>, LearningError> {
    let events = journal.replay_all()?;
    Ok(events
        .iter()
        .find(|e| e.id == conviction_id && e.event_type == EventType::BrainConvictionV1)
        .map(|e| e.payload.clone()))
}

struct ClosedSample {
    realized_pnl_usd: f64,
    domain_scores_at_entry: serde_json::Value,
}

fn closed_samples_within(journal: &Journal, window_days: i64) -> Result<Vec<ClosedSample>, LearningError> {
    let cutoff = (utc_now() - chrono::Duration::days(window_days)).to_rfc3339();
    journal.with_conn(|conn| {
        let mut stmt = conn
            .prepare(
                "SELECT realized_pnl, domain_scores_at_entry FROM positions
                 WHERE status = 'closed' AND closed_at >= ?1",
            )
            .map_err(JournalError::Sqlite)?;
        let rows = stmt
            .query_map(params![cutoff], |row| {
                Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(JournalError::Sqlite)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(JournalError::Sqlite)
            .map(|rows| {
                rows.into_iter()
                    .map(|(pnl, scores)| ClosedSample {
                        realized_pnl_usd: pnl.unwrap_or(0.0),
                        domain_scores_at_entry: serde_json::from_str(&scores).unwrap_or_else(|_| json!({})),
                    })
                    .collect()
            })
    })
}

fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    if xs.len() < 2 || xs.len() != ys.len() {
        return 0.0;
    }
    let mean_x = xs.to_vec().mean();
    let mean_y = ys.to_vec().mean();
    let std_x = xs.to_vec().std_dev();
    let std_y = ys.to_vec().std_dev();
    if std_x == 0.0 || std_y == 0.0 {
        return 0.0;
    }
    let covariance: f64 = xs.iter().zip(ys.iter()).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum::<f64>() / xs.len() as f64;
    (covariance / (std_x * std_y)).clamp(-1.0, 1.0)
}

fn blocked_report(mode: &str, reason: &str, observations: usize) -> LearningReport {
    LearningReport {
        cycle_id: Uuid::new_v4().to_string(),
        mode: mode.to_string(),
        reason: Some(reason.to_string()),
        observations,
        deltas: std::collections::HashMap::new(),
        weights: None,
        reverted: false,
    }
}

fn recent_history(journal: &Journal, limit: usize) -> Result<Vec<(f64, bool)>, LearningError> {
    journal.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT avg_realized_pnl_usd, reverted FROM learning_weight_history ORDER BY applied_at DESC LIMIT ?1")
            .map_err(JournalError::Sqlite)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)? != 0)))
            .map_err(JournalError::Sqlite)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(JournalError::Sqlite)
    })
}

/// Each of the last `REVERSION_THRESHOLD` adjustment cycles degraded
/// relative to the cycle before it — i.e. average realized P&L has been
/// monotonically getting worse, three cycles running.
fn should_revert(journal: &Journal) -> Result<bool, LearningError> {
    let history = recent_history(journal, REVERSION_THRESHOLD + 1)?;
    if history.len() < REVERSION_THRESHOLD + 1 {
        return Ok(false);
    }
    Ok(history.windows(2).take(REVERSION_THRESHOLD).all(|w| w[0].0 < w[1].0))
}

/// Runs one weight-adjustment cycle (`daily`, `weekly`, or `monthly`).
/// Always appends a `learning.report.v1` event, whether or not the cycle
/// actually moved any weights — the blocked reason is itself the
/// auditable fact.
pub fn run_adjustment_cycle(journal: &Journal, config: &Config, mode: &str, overlay_path: &Path) -> Result<LearningReport, LearningError> {
    let gate = cold_start_gate(journal)?;
    let max_delta = match gate {
        ColdStartGate::NoHistory => return persist_report(journal, blocked_report(mode, "cold_start_no_history", 0)),
        ColdStartGate::Baseline => return persist_report(journal, blocked_report(mode, "cold_start_baseline", 0)),
        ColdStartGate::Warm => WARM_WEIGHT_DELTA,
        ColdStartGate::Full => MAX_WEIGHT_DELTA,
    };

    let samples = closed_samples_within(journal, ATTRIBUTION_WINDOW_DAYS)?;
    if samples.len() < MIN_OBSERVATIONS {
        return persist_report(journal, blocked_report(mode, "insufficient_data", samples.len()));
    }

    if should_revert(journal)? {
        let weights = DomainWeights::default();
        let avg_pnl = average_pnl(&samples);
        let report = LearningReport {
            cycle_id: Uuid::new_v4().to_string(),
            mode: mode.to_string(),
            reason: Some("reverted".to_string()),
            observations: samples.len(),
            deltas: std::collections::HashMap::new(),
            weights: Some(weights.clone()),
            reverted: true,
        };
        persist_weights(journal, &report, avg_pnl)?;
        write_overlay(&weights, overlay_path)?;
        return persist_report(journal, report);
    }

    let mut deltas = std::collections::HashMap::new();
    for domain in config.domain_weights.as_map().keys() {
        let mut scores = Vec::new();
        let mut signs = Vec::new();
        for sample in &samples {
            if let Some(score) = sample.domain_scores_at_entry.get(domain).and_then(|v| v.as_f64()) {
                scores.push(score);
                signs.push(if sample.realized_pnl_usd > 0.0 { 1.0 } else { -1.0 });
            }
        }
        let delta = if scores.len() < MIN_DOMAIN_SAMPLES {
            0.0
        } else {
            (pearson_correlation(&scores, &signs) * max_delta).clamp(-max_delta, max_delta)
        };
        deltas.insert((*domain).to_string(), delta);
    }

    let mut weights = config.domain_weights.clone();
    weights.apply_deltas(&deltas, MIN_DOMAIN_WEIGHT, MAX_DOMAIN_WEIGHT);

    let report = LearningReport {
        cycle_id: Uuid::new_v4().to_string(),
        mode: mode.to_string(),
        reason: None,
        observations: samples.len(),
        deltas,
        weights: Some(weights.clone()),
        reverted: false,
    };
    persist_weights(journal, &report, average_pnl(&samples))?;
    write_overlay(&weights, overlay_path)?;
    persist_report(journal, report)
}

fn average_pnl(samples: &[ClosedSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.realized_pnl_usd).sum::<f64>() / samples.len() as f64
}

fn persist_weights(journal: &Journal, report: &LearningReport, avg_pnl: f64) -> Result<(), LearningError> {
    let weights_json = serde_json::to_string(&report.weights)?;
    let deltas_json = serde_json::to_string(&report.deltas)?;
    let now = utc_now().to_rfc3339();
    journal.with_conn(|conn| {
        conn.execute(
            "INSERT INTO learning_weight_history (cycle_id, applied_at, weights_json, deltas_json, mode, avg_realized_pnl_usd, reverted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![report.cycle_id, now, weights_json, deltas_json, report.mode, avg_pnl, report.reverted as i64],
        )
        .map_err(JournalError::Sqlite)
    })?;
    Ok(())
}

fn write_overlay(weights: &DomainWeights, path: &Path) -> Result<(), LearningError> {
    let yaml = serde_yaml::to_string(weights)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

fn persist_report(journal: &Journal, report: LearningReport) -> Result<LearningReport, LearningError> {
    journal.append(AppendRequest::new(EventType::LearningReportV1, serde_json::to_value(&report)?))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::paper::PaperBroker;
    use crate::execution::pnl::PnlTracker;

    fn open_and_close(journal: &Journal, pnl_direction: f64, domain_scores: serde_json::Value) -> String {
        let fill = PaperBroker::default()
            .execute_market(journal, "BTC", "long", 1_000.0, 1.0, 50_000.0, &domain_scores, None, &Uuid::new_v4().to_string())
            .unwrap();
        let exit = if pnl_direction > 0.0 { 55_000.0 } else { 45_000.0 };
        PnlTracker.close_position(journal, &fill.position_id, exit).unwrap();
        fill.position_id
    }

    #[test]
    fn no_closed_positions_means_no_history() {
        let journal = Journal::open_in_memory().unwrap();
        assert_eq!(cold_start_gate(&journal).unwrap(), ColdStartGate::NoHistory);
    }

    #[test]
    fn a_fresh_close_is_inside_the_baseline_window() {
        let journal = Journal::open_in_memory().unwrap();
        open_and_close(&journal, 1.0, json!({}));
        assert_eq!(cold_start_gate(&journal).unwrap(), ColdStartGate::Baseline);
    }

    #[test]
    fn cold_start_blocks_weight_adjustment_with_no_history() {
        let journal = Journal::open_in_memory().unwrap();
        let config = Config::from_repo_defaults();
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("learned_weights.yaml");
        let report = run_adjustment_cycle(&journal, &config, "daily", &overlay).unwrap();
        assert_eq!(report.reason.as_deref(), Some("cold_start_no_history"));
    }

    #[test]
    fn attribution_records_direction_correctness() {
        let journal = Journal::open_in_memory().unwrap();
        let position_id = open_and_close(&journal, 1.0, json!({"technical": 0.8}));
        let attribution = attribute_outcome(&journal, &position_id).unwrap();
        assert!(attribution.direction_correct);
    }

    #[test]
    fn insufficient_observations_blocks_full_history_adjustment() {
        let journal = Journal::open_in_memory().unwrap();
        // Only a handful of closes -- nowhere near MIN_OBSERVATIONS, and all
        // inside the baseline window besides, so this should block on the
        // cold-start baseline reason regardless.
        for _ in 0..3 {
            open_and_close(&journal, 1.0, json!({"technical": 0.5}));
        }
        let config = Config::from_repo_defaults();
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("learned_weights.yaml");
        let report = run_adjustment_cycle(&journal, &config, "daily", &overlay).unwrap();
        assert_eq!(report.reason.as_deref(), Some("cold_start_baseline"));
    }
}
