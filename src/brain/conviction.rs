//! The conviction engine: turns a synthesis result into a Position
//! Conviction Score (PCS, `[0, 100]`) and a Counter-Thesis Score (CTS,
//! `[0, 100]`), then commits both — along with the domain vector that
//! produced them — to a hash so the decision that follows can be proven
//! to have come from this exact evidence.

use serde_json::json;

use crate::brain::synthesis::SynthesisResult;
use crate::canonical_json::canonical_json;
use crate::projections::Regime;

/// Conviction carries its own direction, magnitude, and the domain set it
/// was built from, so learning can join an outcome back to the exact
/// evidence this cycle committed to, not just a bare score.
#[derive(Debug, Clone)]
pub struct ConvictionResult {
    pub pcs: f64,
    pub cts: f64,
    pub final_conviction: f64,
    pub direction: &'static str,
    pub magnitude: f64,
    pub timeframe: String,
    pub confidence: f64,
    pub domains_used: Vec<String>,
    pub commitment_hash: String,
}

pub struct ConvictionEngine;

impl ConvictionEngine {
    pub fn evaluate(synthesis: &SynthesisResult, regime: Regime) -> ConvictionResult {
        Self::evaluate_with_timeframe(synthesis, regime, "4h")
    }

    pub fn evaluate_with_timeframe(synthesis: &SynthesisResult, regime: Regime, timeframe: &str) -> ConvictionResult {
        let pcs = (synthesis.composite_score * 100.0).clamp(0.0, 100.0);
        let cts = if pcs > 75.0 {
            counter_thesis_penalty(synthesis, regime, pcs)
        } else {
            0.0
        };
        let final_conviction = (pcs * (1.0 - cts / 200.0)).clamp(0.0, 100.0);

        let direction = if final_conviction >= 55.0 {
            "long"
        } else if final_conviction <= 45.0 {
            "short"
        } else {
            "neutral"
        };
        let magnitude = ((final_conviction - 50.0).abs() / 5.0).clamp(0.0, 10.0);
        let confidence = (synthesis.features.len() as f64 / 6.0).clamp(0.0, 1.0);

        let mut domains_used = synthesis.domains_used.clone();
        domains_used.sort();

        let payload = json!({
            "direction": direction,
            "magnitude": magnitude,
            "timeframe": timeframe,
            "pcs_score": pcs,
            "cts_score": cts,
            "regime": regime_label(regime),
            "domains_used": domains_used,
        });
        let commitment_hash = sha256_hex(canonical_json(&payload).as_bytes());

        ConvictionResult {
            pcs,
            cts,
            final_conviction,
            direction,
            magnitude,
            timeframe: timeframe.to_string(),
            confidence,
            domains_used,
            commitment_hash,
        }
    }
}

/// Structured, conservative counter-evidence: overheated RSI, blown-out
/// funding or basis, or a CRISIS regime each add a fixed penalty. If PCS
/// is already high and any penalty fired, the counter-thesis ramps a
/// little harder.
fn counter_thesis_penalty(synthesis: &SynthesisResult, regime: Regime, pcs: f64) -> f64 {
    let mut penalties = Vec::new();

    if let Some(rsi) = synthesis.feature("rsi_14") {
        if rsi >= 70.0 {
            penalties.push(25.0);
        }
    }
    if let Some(funding) = synthesis.feature("funding_annualized") {
        if funding >= 30.0 {
            penalties.push(25.0);
        }
    }
    if let Some(basis) = synthesis.feature("basis_annualized") {
        if basis >= 8.0 {
            penalties.push(20.0);
        }
    }
    if regime == Regime::Crisis {
        penalties.push(30.0);
    }

    let mut base: f64 = penalties.iter().sum();
    if pcs > 75.0 && base > 0.0 {
        base += 10.0;
    }
    base.clamp(0.0, 100.0)
}

fn regime_label(regime: Regime) -> &'static str {
    match regime {
        Regime::Bull => "BULL",
        Regime::Bear => "BEAR",
        Regime::Crisis => "CRISIS",
        Regime::Transition => "TRANSITION",
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::synthesis::DomainVector;
    use std::collections::HashMap;

    fn synthesis_with(composite: f64, features: &[(&str, f64)]) -> SynthesisResult {
        let mut feature_map = HashMap::new();
        for (k, v) in features {
            feature_map.insert(k.to_string(), *v);
        }
        SynthesisResult {
            domain_vector: DomainVector::default(),
            features: feature_map,
            composite_score: composite,
            domains_used: vec!["technical".to_string()],
        }
    }

    #[test]
    fn cts_stays_zero_below_the_seventy_five_pcs_gate() {
        let synthesis = synthesis_with(0.70, &[("rsi_14", 90.0)]);
        let result = ConvictionEngine::evaluate(&synthesis, Regime::Bull);
        assert_eq!(result.cts, 0.0);
    }

    #[test]
    fn overbought_rsi_adds_a_penalty_above_the_gate() {
        let synthesis = synthesis_with(0.80, &[("rsi_14", 75.0)]);
        let result = ConvictionEngine::evaluate(&synthesis, Regime::Bull);
        assert!(result.cts >= 25.0);
    }

    #[test]
    fn crisis_regime_adds_its_own_penalty() {
        let synthesis = synthesis_with(0.90, &[]);
        let crisis = ConvictionEngine::evaluate(&synthesis, Regime::Crisis);
        assert!(crisis.cts >= 30.0);
        assert!(crisis.final_conviction < crisis.pcs);
    }

    #[test]
    fn commitment_hash_is_deterministic() {
        let synthesis = synthesis_with(0.50, &[]);
        let a = ConvictionEngine::evaluate(&synthesis, Regime::Bull);
        let b = ConvictionEngine::evaluate(&synthesis, Regime::Bull);
        assert_eq!(a.commitment_hash, b.commitment_hash);
    }
}
