//! Vector synthesis: extracts a small table of numeric features from each
//! domain's latest signal, folds those into a per-domain score in
//! `[0, 1]`, discounts each domain's configured weight by its freshness
//! quality, and dot-products the result into one composite score.

use std::collections::HashMap;

use crate::brain::data_quality::DataQualityReport;
use crate::config::DomainWeights;
use crate::projections::SignalsLatestProjector;

#[derive(Debug, Clone, Default)]
pub struct DomainVector {
    pub scores: HashMap<String, f64>,
}

impl DomainVector {
    pub fn get(&self, domain: &str) -> f64 {
        self.scores.get(domain).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub domain_vector: DomainVector,
    /// Raw, unweighted indicator values pulled straight off the latest
    /// signals (`rsi_14`, `funding_annualized`, `fear_greed`, ...). The
    /// regime detector and the conviction engine's structured penalties
    /// read from here rather than from the per-domain `[0, 1]` scores.
    pub features: HashMap<String, f64>,
    pub composite_score: f64,
    pub domains_used: Vec<String>,
}

impl SynthesisResult {
    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }
}

pub struct VectorSynthesizer;

impl VectorSynthesizer {
    pub fn synthesize(
        signals: &SignalsLatestProjector,
        weights: &DomainWeights,
        quality: &DataQualityReport,
    ) -> SynthesisResult {
        let mut features: HashMap<String, f64> = HashMap::new();
        let mut scores: HashMap<String, f64> = HashMap::new();
        let usable: Vec<String> = quality.usable_domains().into_iter().map(String::from).collect();

        for domain in &usable {
            let payload = signals
                .latest_for_domain(domain)
                .into_iter()
                .max_by_key(|r| r.ts)
                .map(|r| r.payload.clone());
            let Some(payload) = payload else { continue };

            for name in domain_feature_names(domain) {
                if let Some(v) = payload.get(name).and_then(|v| v.as_f64()) {
                    features.insert(name.to_string(), v);
                }
            }

            scores.insert(domain.clone(), score_domain(domain, &payload));
        }

        let adjusted_weights = quality.adjusted_weights(weights);
        let composite_score = scores
            .iter()
            .map(|(d, s)| adjusted_weights.get(d).copied().unwrap_or(0.0) * s)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        let mut domains_used: Vec<String> = scores.keys().cloned().collect();
        domains_used.sort();

        SynthesisResult {
            domain_vector: DomainVector { scores },
            features,
            composite_score,
            domains_used,
        }
    }
}

fn domain_feature_names(domain: &str) -> &'static [&'static str] {
    match domain {
        "technical" => &["rsi_14", "trend_strength", "volume_ratio"],
        "tradfi" => &["funding_annualized", "basis_annualized"],
        "onchain" => &["whale_netflow", "exchange_flow", "price_momentum_24h"],
        "social" => &["fear_greed", "mention_volume"],
        "events" => &["upcoming_count"],
        "curator" => &["submission_count"],
        _ => &[],
    }
}

/// Per-domain score formulas, `[0, 1]`. Missing features are skipped
/// rather than treated as zero, so a domain with one stale field still
/// scores off whatever else it has.
fn score_domain(domain: &str, payload: &serde_json::Value) -> f64 {
    match domain {
        "technical" => {
            let mut parts = Vec::new();
            if let Some(rsi) = payload.get("rsi_14").and_then(|v| v.as_f64()) {
                parts.push(((70.0 - rsi) / 40.0).clamp(0.0, 1.0));
            }
            if let Some(trend) = payload.get("trend_strength").and_then(|v| v.as_f64()) {
                parts.push(trend.clamp(0.0, 1.0));
            }
            if let Some(volume_ratio) = payload.get("volume_ratio").and_then(|v| v.as_f64()) {
                parts.push(((volume_ratio - 0.5) / 2.0).clamp(0.0, 1.0));
            }
            average(&parts)
        }
        "tradfi" => {
            // Funding and basis are carry signals quoted in annualized
            // percentage points. The closer to their "normal" level (10%
            // funding, 5% basis) the more neutral; large deviations in
            // either direction penalize.
            let mut parts = Vec::new();
            if let Some(funding) = payload.get("funding_annualized").and_then(|v| v.as_f64()) {
                parts.push((1.0 - (funding - 10.0).abs() / 30.0).clamp(0.0, 1.0));
            }
            if let Some(basis) = payload.get("basis_annualized").and_then(|v| v.as_f64()) {
                parts.push((1.0 - (basis - 5.0).abs() / 8.0).clamp(0.0, 1.0));
            }
            average(&parts)
        }
        "onchain" => {
            let mut parts = Vec::new();
            if let Some(flow) = payload.get("whale_netflow").and_then(|v| v.as_f64()) {
                parts.push((0.5 + flow / 200.0).clamp(0.0, 1.0));
            }
            if let Some(exch) = payload.get("exchange_flow").and_then(|v| v.as_f64()) {
                // Positive exchange inflow is bearish, hence the minus.
                parts.push((0.5 - exch / 200.0).clamp(0.0, 1.0));
            }
            if let Some(mom) = payload.get("price_momentum_24h").and_then(|v| v.as_f64()) {
                parts.push((0.5 + mom / 20.0).clamp(0.0, 1.0));
            }
            average(&parts)
        }
        "social" => {
            let mut parts = Vec::new();
            if let Some(fg) = payload.get("fear_greed").and_then(|v| v.as_f64()) {
                // Low fear/greed is contrarian bullish.
                parts.push(((50.0 - fg) / 50.0).clamp(0.0, 1.0));
            }
            average(&parts)
        }
        _ => payload
            .get("value")
            .and_then(|v| v.as_f64())
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(0.5),
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.5
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::data_quality::{DataQualityMonitor, DOMAINS};
    use crate::events::{Event, EventType};
    use serde_json::json;

    fn report_with_all_fresh() -> DataQualityReport {
        let monitor = DataQualityMonitor::default();
        let mut signals = SignalsLatestProjector::default();
        for domain in DOMAINS {
            signals.apply(&technical_like_event(domain));
        }
        monitor.evaluate(&signals)
    }

    fn technical_like_event(domain: &str) -> Event {
        let (event_type, payload) = match domain {
            "technical" => (EventType::SignalTaV1, json!({"rsi_14": 30.0, "trend_strength": 0.5, "volume_ratio": 1.2})),
            "onchain" => (EventType::SignalOnchainV1, json!({"whale_netflow": 0.0, "price_momentum_24h": 0.1})),
            "tradfi" => (EventType::SignalTradfiV1, json!({"funding_annualized": 10.0, "basis_annualized": 5.0})),
            "social" => (EventType::SignalSocialV1, json!({"fear_greed": 80.0})),
            "events" => (EventType::SignalEventsV1, json!({"upcoming_count": 0})),
            _ => (EventType::SignalCuratorV1, json!({"submission_count": 0})),
        };
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            ts: crate::time::utc_now(),
            observed_at: None,
            source: None,
            trace_id: None,
            schema_version: "1".to_string(),
            dedupe_key: None,
            payload,
            prev_hash: None,
            hash: "x".to_string(),
        }
    }

    #[test]
    fn technical_rsi_below_thirty_scores_above_half() {
        let mut signals = SignalsLatestProjector::default();
        signals.apply(&technical_like_event("technical"));
        let quality = DataQualityMonitor::default().evaluate(&signals);
        let weights = DomainWeights::default();
        let result = VectorSynthesizer::synthesize(&signals, &weights, &quality);
        assert!(result.domain_vector.get("technical") > 0.5);
        assert_eq!(result.feature("rsi_14"), Some(30.0));
    }

    #[test]
    fn neutral_tradfi_carry_scores_near_one() {
        let mut signals = SignalsLatestProjector::default();
        signals.apply(&technical_like_event("tradfi"));
        let quality = DataQualityMonitor::default().evaluate(&signals);
        let weights = DomainWeights::default();
        let result = VectorSynthesizer::synthesize(&signals, &weights, &quality);
        assert!((result.domain_vector.get("tradfi") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn composite_score_uses_all_fresh_domains() {
        let report = report_with_all_fresh();
        let mut signals = SignalsLatestProjector::default();
        for domain in DOMAINS {
            signals.apply(&technical_like_event(domain));
        }
        let weights = DomainWeights::default();
        let result = VectorSynthesizer::synthesize(&signals, &weights, &report);
        assert_eq!(result.domains_used.len(), 6);
        assert!(result.composite_score > 0.0 && result.composite_score <= 1.0);
    }
}
