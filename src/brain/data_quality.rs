//! The data quality gate: tracks each domain's expected observation
//! cadence and turns staleness into a continuous `[0, 1]` quality score
//! rather than a binary fresh/stale cutoff. Synthesis uses the per-domain
//! quality to discount that domain's configured weight before the
//! weighted score is computed — a domain that's gone a little stale still
//! contributes, just less.

use std::collections::HashMap;

use crate::config::DomainWeights;
use crate::projections::{SignalRecord, SignalsLatestProjector};
use crate::time::{staleness_ms, utc_now};

pub const DOMAINS: [&str; 6] = ["curator", "onchain", "tradfi", "social", "technical", "events"];

/// Expected observation interval per domain, in milliseconds. Tracks each
/// domain's producer schedule with headroom: `tradfi` runs on the slowest
/// cadence (its sources update a few times a day), `technical` and
/// `onchain` the fastest.
fn expected_interval_ms(domain: &str) -> i64 {
    match domain {
        "technical" => 15 * 60 * 1000,
        "onchain" => 15 * 60 * 1000,
        "tradfi" => 6 * 60 * 60 * 1000,
        "social" => 20 * 60 * 1000,
        "events" => 60 * 60 * 1000,
        "curator" => 20 * 60 * 1000,
        _ => 30 * 60 * 1000,
    }
}

#[derive(Debug, Clone)]
pub struct DataQualityReport {
    pub per_domain_quality: HashMap<String, f64>,
    pub per_domain_staleness_ms: HashMap<String, Option<i64>>,
    pub missing_domains: Vec<String>,
}

impl DataQualityReport {
    pub fn overall_quality(&self) -> f64 {
        if self.per_domain_quality.is_empty() {
            return 0.0;
        }
        self.per_domain_quality.values().sum::<f64>() / self.per_domain_quality.len() as f64
    }

    pub fn usable_domains(&self) -> Vec<&str> {
        self.per_domain_quality
            .iter()
            .filter(|(_, q)| **q > 0.0)
            .map(|(d, _)| d.as_str())
            .collect()
    }

    /// Multiplies each base weight by that domain's quality and
    /// renormalizes so the adjusted weights sum to 1. Falls back to the
    /// base weights unchanged when every domain scored zero quality —
    /// otherwise a fully-stale cycle would divide by zero.
    pub fn adjusted_weights(&self, base: &DomainWeights) -> HashMap<String, f64> {
        let base_map: HashMap<String, f64> = base.as_map().into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let mut adjusted: HashMap<String, f64> = HashMap::new();
        for (domain, weight) in &base_map {
            let quality = self.per_domain_quality.get(domain).copied().unwrap_or(0.0);
            adjusted.insert(domain.clone(), weight * quality);
        }
        let sum: f64 = adjusted.values().sum();
        if sum <= 0.0 {
            return base_map;
        }
        for v in adjusted.values_mut() {
            *v /= sum;
        }
        adjusted
    }
}

pub struct DataQualityMonitor;

impl Default for DataQualityMonitor {
    fn default() -> Self {
        DataQualityMonitor
    }
}

impl DataQualityMonitor {
    pub fn evaluate(&self, signals: &SignalsLatestProjector) -> DataQualityReport {
        let mut per_domain_quality = HashMap::new();
        let mut per_domain_staleness_ms = HashMap::new();
        let mut missing_domains = Vec::new();
        let now = utc_now();

        for domain in DOMAINS {
            let records: Vec<&SignalRecord> = signals.latest_for_domain(domain);
            let latest = records.iter().max_by_key(|r| r.ts);
            match latest {
                None => {
                    per_domain_quality.insert(domain.to_string(), 0.0);
                    per_domain_staleness_ms.insert(domain.to_string(), None);
                    missing_domains.push(domain.to_string());
                }
                Some(record) => {
                    let staleness = staleness_ms(record.ts, Some(now));
                    let expected = expected_interval_ms(domain);
                    let quality = if staleness <= expected {
                        1.0
                    } else {
                        let decay_window = 3 * expected;
                        (1.0 - (staleness - expected) as f64 / decay_window as f64).clamp(0.0, 1.0)
                    };
                    per_domain_quality.insert(domain.to_string(), quality);
                    per_domain_staleness_ms.insert(domain.to_string(), Some(staleness));
                }
            }
        }

        DataQualityReport {
            per_domain_quality,
            per_domain_staleness_ms,
            missing_domains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventType};
    use serde_json::json;

    fn signal_event(domain_ts: chrono::DateTime<chrono::Utc>) -> Event {
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: EventType::SignalTaV1,
            ts: domain_ts,
            observed_at: None,
            source: None,
            trace_id: None,
            schema_version: "1".to_string(),
            dedupe_key: None,
            payload: json!({"rsi_14": 50.0}),
            prev_hash: None,
            hash: "x".to_string(),
        }
    }

    #[test]
    fn missing_domain_has_zero_quality() {
        let signals = SignalsLatestProjector::default();
        let report = DataQualityMonitor::default().evaluate(&signals);
        assert_eq!(report.per_domain_quality.get("onchain"), Some(&0.0));
        assert!(report.missing_domains.contains(&"onchain".to_string()));
    }

    #[test]
    fn fresh_signal_scores_full_quality() {
        let mut signals = SignalsLatestProjector::default();
        signals.apply(&signal_event(utc_now()));
        let report = DataQualityMonitor::default().evaluate(&signals);
        assert_eq!(report.per_domain_quality.get("technical"), Some(&1.0));
    }

    #[test]
    fn staleness_decays_quality_linearly_then_floors_at_zero() {
        let mut signals = SignalsLatestProjector::default();
        // technical's expected interval is 15 minutes; 45 minutes stale is
        // exactly at the end of the 3x decay window.
        signals.apply(&signal_event(utc_now() - chrono::Duration::minutes(45)));
        let report = DataQualityMonitor::default().evaluate(&signals);
        let q = *report.per_domain_quality.get("technical").unwrap();
        assert!(q <= 0.01);

        let mut very_stale = SignalsLatestProjector::default();
        very_stale.apply(&signal_event(utc_now() - chrono::Duration::hours(5)));
        let report2 = DataQualityMonitor::default().evaluate(&very_stale);
        assert_eq!(report2.per_domain_quality.get("technical"), Some(&0.0));
    }

    #[test]
    fn adjusted_weights_falls_back_to_base_when_everything_is_stale() {
        let signals = SignalsLatestProjector::default();
        let report = DataQualityMonitor::default().evaluate(&signals);
        let base = DomainWeights::default();
        let adjusted = report.adjusted_weights(&base);
        let expected: HashMap<String, f64> = base.as_map().into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        assert_eq!(adjusted, expected);
    }
}
