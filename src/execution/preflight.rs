//! Risk preflight: the hard gate every trade intent passes through before
//! the OMS sizes and fills it. Deterministic and side-effect free so it's
//! easy to exercise in isolation.
//!
//! Checks, in order: kill switch level, daily loss limit, position size
//! and leverage caps, then — only in live mode — gas balance.

use crate::brain::decision::TradeIntent;
use crate::config::RiskConfig;
use crate::kill_switch::KillSwitchLevel;

#[derive(Debug, Clone, Default)]
pub struct PreflightResult {
    pub approved: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct GasRequirement {
    pub min_amount: f64,
}

pub struct Preflight {
    risk: RiskConfig,
    gas_requirement: Option<GasRequirement>,
}

impl Preflight {
    pub fn new(risk: RiskConfig, gas_requirement: Option<GasRequirement>) -> Self {
        Preflight { risk, gas_requirement }
    }

    pub fn check(
        &self,
        intent: &TradeIntent,
        mode: &str,
        equity_usd: f64,
        kill_switch_level: KillSwitchLevel,
        daily_loss_pct: f64,
        gas_balance: Option<f64>,
    ) -> PreflightResult {
        let mut reasons = Vec::new();

        if kill_switch_level >= KillSwitchLevel::Defensive {
            reasons.push("kill_switch_blocks_new_positions".to_string());
        }

        if daily_loss_pct >= self.risk.max_daily_loss_pct {
            reasons.push("daily_loss_limit_exceeded".to_string());
        }

        if intent.size_pct > self.risk.max_position_pct_of_equity + 1e-9 {
            reasons.push("position_size_exceeds_cap".to_string());
        }
        if intent.leverage > self.risk.max_leverage + 1e-9 {
            reasons.push("leverage_exceeds_cap".to_string());
        }
        if equity_usd <= 0.0 {
            reasons.push("no_equity".to_string());
        }

        if mode == "live" {
            if let Some(req) = self.gas_requirement {
                let have = gas_balance.unwrap_or(0.0);
                if have + 1e-12 < req.min_amount {
                    reasons.push("insufficient_gas".to_string());
                }
            }
        }

        PreflightResult {
            approved: reasons.is_empty(),
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(size_pct: f64, leverage: f64) -> TradeIntent {
        TradeIntent {
            symbol: "BTC".to_string(),
            direction: "long",
            size_pct,
            leverage,
            conviction_score: 80.0,
            regime: "BULL",
            rationale: "test".to_string(),
            requires_approval: false,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
        }
    }

    #[test]
    fn approves_an_intent_within_every_cap() {
        let pf = Preflight::new(RiskConfig::default(), None);
        let result = pf.check(&intent(0.02, 1.0), "paper", 100_000.0, KillSwitchLevel::Safe, 0.0, None);
        assert!(result.approved);
    }

    #[test]
    fn rejects_when_kill_switch_is_defensive_or_above() {
        let pf = Preflight::new(RiskConfig::default(), None);
        let result = pf.check(&intent(0.02, 1.0), "paper", 100_000.0, KillSwitchLevel::Defensive, 0.0, None);
        assert!(!result.approved);
        assert!(result.reasons.contains(&"kill_switch_blocks_new_positions".to_string()));
    }

    #[test]
    fn rejects_when_daily_loss_limit_is_hit() {
        let risk = RiskConfig {
            max_daily_loss_pct: 0.05,
            ..RiskConfig::default()
        };
        let pf = Preflight::new(risk, None);
        let result = pf.check(&intent(0.02, 1.0), "paper", 100_000.0, KillSwitchLevel::Safe, 0.06, None);
        assert!(!result.approved);
        assert!(result.reasons.contains(&"daily_loss_limit_exceeded".to_string()));
    }

    #[test]
    fn live_mode_requires_sufficient_gas() {
        let pf = Preflight::new(RiskConfig::default(), Some(GasRequirement { min_amount: 1.0 }));
        let result = pf.check(&intent(0.02, 1.0), "live", 100_000.0, KillSwitchLevel::Safe, 0.0, Some(0.1));
        assert!(!result.approved);
        assert!(result.reasons.contains(&"insufficient_gas".to_string()));
    }
}
