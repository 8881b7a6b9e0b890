//! Market regime detection: a deterministic rule counter over a handful
//! of BTC-derived indicators (`rsi_14`, `funding_annualized`,
//! `basis_annualized`, `fear_greed`). Each indicator casts votes for
//! BULL/BEAR/CRISIS; CRISIS takes precedence once two rules agree, then
//! BULL and BEAR each need three.

use crate::brain::synthesis::SynthesisResult;
use crate::projections::Regime;

pub struct RegimeDetector;

impl RegimeDetector {
    pub fn detect(synthesis: &SynthesisResult) -> Regime {
        let rsi = synthesis.feature("rsi_14");
        let funding = synthesis.feature("funding_annualized");
        let basis = synthesis.feature("basis_annualized");
        let fng = synthesis.feature("fear_greed");

        let mut bull = 0;
        let mut bear = 0;
        let mut crisis = 0;

        if let Some(funding) = funding {
            if funding > 5.0 && funding < 30.0 {
                bull += 1;
            }
            if funding < 0.0 {
                bear += 1;
            }
            if funding < -10.0 {
                crisis += 1;
            }
        }
        if let Some(basis) = basis {
            if basis > 3.0 && basis < 8.0 {
                bull += 1;
            }
            if basis < 2.0 {
                bear += 1;
            }
            if basis > 8.0 || basis < 1.0 {
                crisis += 1;
            }
        }
        if let Some(rsi) = rsi {
            if rsi > 50.0 {
                bull += 1;
            }
            if rsi < 30.0 {
                bear += 1;
            }
        }
        if let Some(fng) = fng {
            if fng > 40.0 {
                bull += 1;
            }
            if fng < 25.0 {
                bear += 1;
            }
            if fng < 15.0 {
                crisis += 1;
            }
        }

        if crisis >= 2 {
            Regime::Crisis
        } else if bull >= 3 {
            Regime::Bull
        } else if bear >= 3 {
            Regime::Bear
        } else {
            Regime::Transition
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::synthesis::DomainVector;
    use std::collections::HashMap;

    fn synthesis_with(features: &[(&str, f64)]) -> SynthesisResult {
        let mut feature_map = HashMap::new();
        for (k, v) in features {
            feature_map.insert(k.to_string(), *v);
        }
        SynthesisResult {
            domain_vector: DomainVector::default(),
            features: feature_map,
            composite_score: 0.0,
            domains_used: vec![],
        }
    }

    #[test]
    fn three_bullish_indicators_win_bull() {
        let synthesis = synthesis_with(&[("funding_annualized", 10.0), ("basis_annualized", 5.0), ("rsi_14", 60.0)]);
        assert_eq!(RegimeDetector::detect(&synthesis), Regime::Bull);
    }

    #[test]
    fn three_bearish_indicators_win_bear() {
        let synthesis = synthesis_with(&[("funding_annualized", -1.0), ("basis_annualized", 1.5), ("rsi_14", 20.0)]);
        assert_eq!(RegimeDetector::detect(&synthesis), Regime::Bear);
    }

    #[test]
    fn two_crisis_votes_take_precedence_over_bull() {
        let synthesis = synthesis_with(&[
            ("funding_annualized", -15.0),
            ("basis_annualized", 9.0),
            ("rsi_14", 60.0),
            ("fear_greed", 50.0),
        ]);
        assert_eq!(RegimeDetector::detect(&synthesis), Regime::Crisis);
    }

    #[test]
    fn no_features_is_transition() {
        let synthesis = synthesis_with(&[]);
        assert_eq!(RegimeDetector::detect(&synthesis), Regime::Transition);
    }
}
