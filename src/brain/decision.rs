//! The decision policy: a pure `(symbol, pcs, regime, kill_level) -> trade
//! intent?` function. Sizing math beyond the tier (Kelly scaling, equity
//! lookups) lives in `engine::execution::sizer` — this module only picks
//! the tier and applies the hard blocks.

use serde::Serialize;

use crate::brain::conviction::ConvictionResult;
use crate::config::{BrainConfig, RiskConfig};
use crate::kill_switch::KillSwitchLevel;
use crate::projections::Regime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub direction: &'static str,
    pub size_pct: f64,
    pub leverage: f64,
    pub conviction_score: f64,
    pub regime: &'static str,
    pub rationale: String,
    pub requires_approval: bool,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

pub struct DecisionPolicy;

impl DecisionPolicy {
    /// Returns `None` when the kill switch is at DEFENSIVE or above, the
    /// regime is CRISIS, or PCS doesn't clear the smallest tier.
    pub fn decide(
        symbol: &str,
        conviction: &ConvictionResult,
        regime: Regime,
        kill_level: KillSwitchLevel,
        brain: &BrainConfig,
        risk: &RiskConfig,
    ) -> Option<TradeIntent> {
        if kill_level >= KillSwitchLevel::Defensive {
            return None;
        }
        if regime == Regime::Crisis {
            return None;
        }

        let pcs = conviction.pcs;
        let direction = if pcs >= 55.0 { Direction::Long } else { Direction::Short };

        let (size_pct, leverage, rationale, requires_approval) = if pcs >= brain.pcs_tier_large {
            (0.10, 2.0_f64.min(risk.max_leverage), "approval_required: high conviction over consensus", true)
        } else if pcs >= brain.pcs_tier_medium {
            (0.05, 2.0_f64.min(risk.max_leverage), "enter: strong conviction", false)
        } else if pcs >= brain.pcs_tier_small {
            (0.02, 1.0, "enter: moderate conviction", false)
        } else {
            return None;
        };

        let size_pct = size_pct.min(risk.max_position_pct_of_equity);

        Some(TradeIntent {
            symbol: symbol.to_string(),
            direction: direction.as_str(),
            size_pct,
            leverage,
            conviction_score: pcs,
            regime: regime_label(regime),
            rationale: rationale.to_string(),
            requires_approval,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
        })
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
    use crate::brain::conviction::ConvictionResult;

    fn conviction(pcs: f64) -> ConvictionResult {
        ConvictionResult {
            pcs,
            cts: 0.0,
            final_conviction: pcs,
            direction: "long",
            magnitude: 0.0,
            timeframe: "4h".to_string(),
            confidence: 0.0,
            domains_used: vec!["technical".to_string()],
            commitment_hash: "h".to_string(),
        }
    }

    #[test]
    fn below_smallest_tier_is_rejected() {
        let intent = DecisionPolicy::decide(
            "BTC",
            &conviction(40.0),
            Regime::Bull,
            KillSwitchLevel::Safe,
            &BrainConfig::default(),
            &RiskConfig::default(),
        );
        assert!(intent.is_none());
    }

    #[test]
    fn crisis_regime_blocks_even_high_pcs() {
        let intent = DecisionPolicy::decide(
            "BTC",
            &conviction(95.0),
            Regime::Crisis,
            KillSwitchLevel::Safe,
            &BrainConfig::default(),
            &RiskConfig::default(),
        );
        assert!(intent.is_none());
    }

    #[test]
    fn defensive_kill_switch_blocks_new_positions() {
        let intent = DecisionPolicy::decide(
            "BTC",
            &conviction(95.0),
            Regime::Bull,
            KillSwitchLevel::Defensive,
            &BrainConfig::default(),
            &RiskConfig::default(),
        );
        assert!(intent.is_none());
    }

    #[test]
    fn high_pcs_sizes_large_and_requires_approval() {
        let intent = DecisionPolicy::decide(
            "BTC",
            &conviction(92.0),
            Regime::Bull,
            KillSwitchLevel::Safe,
            &BrainConfig::default(),
            &RiskConfig::default(),
        )
        .unwrap();
        assert!((intent.size_pct - 0.10).abs() < 1e-9);
        assert!(intent.requires_approval);
    }

    #[test]
    fn moderate_pcs_sizes_small_one_x() {
        let intent = DecisionPolicy::decide(
            "BTC",
            &conviction(65.0),
            Regime::Bull,
            KillSwitchLevel::Safe,
            &BrainConfig::default(),
            &RiskConfig::default(),
        )
        .unwrap();
        assert!((intent.size_pct - 0.02).abs() < 1e-9);
        assert!((intent.leverage - 1.0).abs() < 1e-9);
    }
}
