//! Contributor/producer scoring: a single composite `[0, 100]` score
//! blending hit rate, volume, consistency, conviction accuracy, and
//! recency, with hard gates that collapse the score to zero for
//! contributors without enough history or with too low an acceptance
//! rate to trust.

use rusqlite::params;

use crate::journal::{Journal, JournalError};
use crate::time::{parse_dt, utc_now};

const MIN_RESOLVED_FOR_HIT_RATE: i64 = 5;
const MIN_SUBMISSIONS_FOR_ACCEPTANCE_GATE: i64 = 10;
const MIN_ACCEPTANCE_RATE: f64 = 0.10;

#[derive(Debug, Clone, Copy)]
pub struct ContributorScore {
    pub hit_rate: f64,
    pub volume_score: f64,
    pub consistency_score: f64,
    pub conviction_accuracy: f64,
    pub recency_score: f64,
    pub composite: f64,
}

struct ResolvedSignal {
    submitted_at: chrono::DateTime<chrono::Utc>,
    accepted: bool,
    resolved: bool,
    hit: Option<bool>,
    conviction_at_submission: Option<f64>,
}

pub struct ContributorScorer;

impl ContributorScorer {
    pub fn score(&self, journal: &Journal, contributor_id: &str) -> Result<ContributorScore, JournalError> {
        let signals = self.load_signals(journal, contributor_id)?;

        let submitted = signals.len() as i64;
        let accepted = signals.iter().filter(|s| s.accepted).count() as i64;
        if submitted >= MIN_SUBMISSIONS_FOR_ACCEPTANCE_GATE {
            let acceptance_rate = accepted as f64 / submitted as f64;
            if acceptance_rate < MIN_ACCEPTANCE_RATE {
                return Ok(ContributorScore {
                    hit_rate: 0.0,
                    volume_score: 0.0,
                    consistency_score: 0.0,
                    conviction_accuracy: 0.0,
                    recency_score: 0.0,
                    composite: 0.0,
                });
            }
        }

        let resolved: Vec<&ResolvedSignal> = signals.iter().filter(|s| s.resolved).collect();
        let hit_rate = if resolved.len() as i64 >= MIN_RESOLVED_FOR_HIT_RATE {
            resolved.iter().filter(|s| s.hit == Some(true)).count() as f64 / resolved.len() as f64
        } else {
            0.0
        };

        let volume_score = (1.0 + accepted as f64).ln() / (1.0 + 100.0_f64).ln();
        let consistency_score = streak_consistency(&signals);
        let conviction_accuracy = conviction_accuracy(&resolved);
        let recency_score = recency_score(&signals);

        let composite = (0.30 * hit_rate
            + 0.25 * volume_score.clamp(0.0, 1.0)
            + 0.20 * consistency_score
            + 0.15 * conviction_accuracy
            + 0.10 * recency_score)
            * 100.0;

        Ok(ContributorScore {
            hit_rate,
            volume_score: volume_score.clamp(0.0, 1.0),
            consistency_score,
            conviction_accuracy,
            recency_score,
            composite: composite.clamp(0.0, 100.0),
        })
    }

    fn load_signals(&self, journal: &Journal, contributor_id: &str) -> Result<Vec<ResolvedSignal>, JournalError> {
        journal.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT submitted_at, accepted, resolved, hit, conviction_at_submission
                     FROM contributor_signals WHERE contributor_id = ?1 ORDER BY submitted_at ASC",
                )
                .map_err(JournalError::Sqlite)?;
            let rows = stmt
                .query_map(params![contributor_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? != 0,
                        row.get::<_, i64>(2)? != 0,
                        row.get::<_, Option<i64>>(3)?.map(|v| v != 0),
                        row.get::<_, Option<f64>>(4)?,
                    ))
                })
                .map_err(JournalError::Sqlite)?;
            let mut out = Vec::new();
            for row in rows {
                let (submitted_at, accepted, resolved, hit, conviction_at_submission) = row.map_err(JournalError::Sqlite)?;
                let Some(submitted_at) = parse_dt(&submitted_at) else { continue };
                out.push(ResolvedSignal { submitted_at, accepted, resolved, hit, conviction_at_submission });
            }
            Ok(out)
        })
    }
}

/// Longest run of consecutive calendar days carrying at least one
/// *accepted* signal, normalized against a 30-day horizon.
fn streak_consistency(signals: &[ResolvedSignal]) -> f64 {
    let mut days: Vec<chrono::NaiveDate> = signals
        .iter()
        .filter(|s| s.accepted)
        .map(|s| s.submitted_at.date_naive())
        .collect();
    days.sort();
    days.dedup();

    let mut best_streak = 0i64;
    let mut current_streak = 0i64;
    let mut prev: Option<chrono::NaiveDate> = None;
    for day in days {
        match prev {
            Some(p) if (day - p).num_days() == 1 => current_streak += 1,
            _ => current_streak = 1,
        }
        best_streak = best_streak.max(current_streak);
        prev = Some(day);
    }

    (best_streak as f64 / 30.0).clamp(0.0, 1.0)
}

fn conviction_accuracy(resolved: &[&ResolvedSignal]) -> f64 {
    let scored: Vec<(f64, bool)> = resolved
        .iter()
        .filter_map(|s| s.conviction_at_submission.map(|c| (c, s.hit == Some(true))))
        .collect();
    if scored.is_empty() {
        return 0.0;
    }
    let weighted_hits: f64 = scored.iter().map(|(c, hit)| if *hit { *c } else { 1.0 - c }).sum();
    (weighted_hits / scored.len() as f64).clamp(0.0, 1.0)
}

fn recency_score(signals: &[ResolvedSignal]) -> f64 {
    let Some(latest) = signals.iter().map(|s| s.submitted_at).max() else {
        return 0.0;
    };
    let days_since = (utc_now() - latest).num_days().max(0) as f64;
    (1.0 - days_since / 30.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn insert_signal(journal: &Journal, contributor: &str, days_ago: i64, accepted: bool, resolved: bool, hit: Option<bool>, conviction: Option<f64>) {
        let submitted_at = (utc_now() - chrono::Duration::days(days_ago)).to_rfc3339();
        journal
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO contributor_signals (signal_id, contributor_id, asset, direction, submitted_at, accepted, resolved, hit, conviction_at_submission)
                     VALUES (?1, ?2, 'BTC', 'long', ?3, ?4, ?5, ?6, ?7)",
                    params![Uuid::new_v4().to_string(), contributor, submitted_at, accepted as i64, resolved as i64, hit.map(|h| h as i64), conviction],
                )
                .map_err(JournalError::Sqlite)
            })
            .unwrap();
    }

    #[test]
    fn below_acceptance_gate_collapses_to_zero() {
        let journal = Journal::open_in_memory().unwrap();
        for i in 0..10 {
            insert_signal(&journal, "bob", i, false, false, None, None);
        }
        insert_signal(&journal, "bob", 0, true, true, Some(true), Some(0.8));
        let score = ContributorScorer.score(&journal, "bob").unwrap();
        assert_eq!(score.composite, 0.0);
    }

    #[test]
    fn below_resolution_threshold_gives_zero_hit_rate() {
        let journal = Journal::open_in_memory().unwrap();
        insert_signal(&journal, "carol", 0, true, true, Some(true), Some(0.9));
        let score = ContributorScorer.score(&journal, "carol").unwrap();
        assert_eq!(score.hit_rate, 0.0);
    }

    #[test]
    fn enough_hits_produces_a_positive_composite() {
        let journal = Journal::open_in_memory().unwrap();
        for i in 0..8 {
            insert_signal(&journal, "dave", i, true, true, Some(true), Some(0.85));
        }
        let score = ContributorScorer.score(&journal, "dave").unwrap();
        assert!(score.composite > 0.0);
        assert!(score.hit_rate > 0.9);
    }
}
