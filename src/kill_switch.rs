//! One kill switch. Six levels. Auto-escalates, never auto-de-escalates.
//!
//! Rehydrates from the latest `system.kill_switch.v1` journal event on
//! construction so a process restart never silently drops back to SAFE.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::config::KillSwitchConfig;
use crate::events::EventType;
use crate::journal::{AppendRequest, Journal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum KillSwitchLevel {
    Safe = 0,
    Caution = 1,
    Defensive = 2,
    Lockdown = 3,
    Emergency = 4,
    Shutdown = 5,
}

impl KillSwitchLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => KillSwitchLevel::Safe,
            1 => KillSwitchLevel::Caution,
            2 => KillSwitchLevel::Defensive,
            3 => KillSwitchLevel::Lockdown,
            4 => KillSwitchLevel::Emergency,
            _ => KillSwitchLevel::Shutdown,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            KillSwitchLevel::Safe => "Normal operation.",
            KillSwitchLevel::Caution => "Caution. Reduce size. Tighten stops.",
            KillSwitchLevel::Defensive => "Defensive. No new positions.",
            KillSwitchLevel::Lockdown => "Lockdown. Close non-core. Halt new.",
            KillSwitchLevel::Emergency => "Emergency. Close everything.",
            KillSwitchLevel::Shutdown => "Shutdown. Trading halted entirely.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KillSwitchDecision {
    pub level: KillSwitchLevel,
    pub previous_level: KillSwitchLevel,
    pub reason: String,
    pub auto: bool,
}

/// Inputs for one evaluation pass. All fields are optional: a producer
/// feeding only `daily_loss_pct` still gets evaluated against L1 alone.
#[derive(Debug, Clone, Default)]
pub struct KillSwitchInputs {
    pub daily_loss_pct: Option<f64>,
    pub portfolio_heat_pct: Option<f64>,
    pub crisis_conditions: Option<u32>,
    pub max_drawdown_pct: Option<f64>,
    pub manual_level: Option<KillSwitchLevel>,
    pub reason: Option<String>,
}

pub struct KillSwitch {
    config: KillSwitchConfig,
    level: KillSwitchLevel,
}

impl KillSwitch {
    /// Builds a kill switch and restores its level from the latest
    /// `system.kill_switch.v1` event. Fails open to SAFE on a read error —
    /// matching the reference's existing behavior rather than refusing to
    /// start.
    pub fn restore(config: KillSwitchConfig, journal: &Journal) -> Self {
        let level = match journal.latest_by_type(EventType::SystemKillSwitchV1) {
            Ok(Some(event)) => event
                .payload
                .get("level")
                .and_then(|v| v.as_u64())
                .map(|v| KillSwitchLevel::from_u8(v as u8))
                .unwrap_or(KillSwitchLevel::Safe),
            Ok(None) => KillSwitchLevel::Safe,
            Err(err) => {
                warn!(error = %err, "failed to restore kill switch level from journal, defaulting to SAFE");
                KillSwitchLevel::Safe
            }
        };
        KillSwitch { config, level }
    }

    pub fn level(&self) -> KillSwitchLevel {
        self.level
    }

    pub fn can_open_new_positions(&self) -> bool {
        self.level < KillSwitchLevel::Defensive
    }

    pub fn can_trade(&self) -> bool {
        self.level < KillSwitchLevel::Shutdown
    }

    /// Evaluates the auto-escalation rules in ascending severity and, if
    /// the target level strictly exceeds the current one, escalates and
    /// appends `system.kill_switch.v1`. Returns `None` when nothing
    /// escalates — this is the common case, so no event is written.
    pub fn evaluate(
        &mut self,
        journal: &Journal,
        inputs: KillSwitchInputs,
    ) -> Result<Option<KillSwitchDecision>, crate::journal::JournalError> {
        let prev = self.level;
        let mut target = prev;
        let mut auto = true;
        let mut why = inputs.reason.clone().unwrap_or_default();

        if let Some(manual) = inputs.manual_level {
            target = target.max(manual);
            auto = false;
            if why.is_empty() {
                why = format!("manual:{}", manual as u8);
            }
        }

        if let Some(daily_loss_pct) = inputs.daily_loss_pct {
            if daily_loss_pct >= self.config.l1_daily_loss_pct {
                target = target.max(KillSwitchLevel::Caution);
                if why.is_empty() {
                    why = format!("daily_loss_pct={:.3}", daily_loss_pct);
                }
            }
        }

        if let Some(portfolio_heat_pct) = inputs.portfolio_heat_pct {
            if portfolio_heat_pct >= self.config.l2_portfolio_heat_pct {
                target = target.max(KillSwitchLevel::Defensive);
                if why.is_empty() {
                    why = format!("portfolio_heat_pct={:.3}", portfolio_heat_pct);
                }
            }
        }

        if let Some(crisis_conditions) = inputs.crisis_conditions {
            if crisis_conditions >= self.config.l3_crisis_threshold {
                target = target.max(KillSwitchLevel::Lockdown);
                if why.is_empty() {
                    why = format!("crisis_conditions={}", crisis_conditions);
                }
            }
        }

        if let Some(max_drawdown_pct) = inputs.max_drawdown_pct {
            if max_drawdown_pct >= self.config.l4_max_drawdown_pct {
                target = target.max(KillSwitchLevel::Emergency);
                if why.is_empty() {
                    why = format!("max_drawdown_pct={:.3}", max_drawdown_pct);
                }
            }
        }

        if target <= prev {
            return Ok(None);
        }

        self.level = target;
        let reason = if why.is_empty() {
            target.message().to_string()
        } else {
            why
        };

        journal.append(
            AppendRequest::new(
                EventType::SystemKillSwitchV1,
                json!({
                    "level": target as u8,
                    "previous_level": prev as u8,
                    "reason": reason.clone(),
                    "auto": auto,
                    "actor": if auto { "system" } else { "operator" },
                }),
            )
            .with_source("brain.kill_switch"),
        )?;

        Ok(Some(KillSwitchDecision {
            level: target,
            previous_level: prev,
            reason,
            auto,
        }))
    }

    /// Manual reset against current in-memory state only. Deliberately
    /// does not append an event: a restart always re-derives the last
    /// escalation from the journal, never this override. Operators calling
    /// this should know the reset does not survive a restart.
    pub fn reset(&mut self, level: KillSwitchLevel) {
        self.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn cfg() -> KillSwitchConfig {
        Config::from_repo_defaults().kill_switch
    }

    #[test]
    fn starts_safe_on_an_empty_journal() {
        let journal = Journal::open_in_memory().unwrap();
        let ks = KillSwitch::restore(cfg(), &journal);
        assert_eq!(ks.level(), KillSwitchLevel::Safe);
        assert!(ks.can_open_new_positions());
        assert!(ks.can_trade());
    }

    #[test]
    fn escalates_on_daily_loss_and_persists_the_event() {
        let journal = Journal::open_in_memory().unwrap();
        let mut ks = KillSwitch::restore(cfg(), &journal);
        let decision = ks
            .evaluate(
                &journal,
                KillSwitchInputs {
                    daily_loss_pct: Some(0.09),
                    ..Default::default()
                },
            )
            .unwrap()
            .expect("should escalate");
        assert_eq!(decision.level, KillSwitchLevel::Caution);
        assert_eq!(ks.level(), KillSwitchLevel::Caution);

        let restored = KillSwitch::restore(cfg(), &journal);
        assert_eq!(restored.level(), KillSwitchLevel::Caution);
    }

    #[test]
    fn never_de_escalates_on_a_lower_severity_signal() {
        let journal = Journal::open_in_memory().unwrap();
        let mut ks = KillSwitch::restore(cfg(), &journal);
        ks.evaluate(
            &journal,
            KillSwitchInputs {
                max_drawdown_pct: Some(0.30),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ks.level(), KillSwitchLevel::Emergency);

        let result = ks
            .evaluate(
                &journal,
                KillSwitchInputs {
                    daily_loss_pct: Some(0.09),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.is_none());
        assert_eq!(ks.level(), KillSwitchLevel::Emergency);
    }

    #[test]
    fn reset_does_not_emit_an_event() {
        let journal = Journal::open_in_memory().unwrap();
        let mut ks = KillSwitch::restore(cfg(), &journal);
        ks.evaluate(
            &journal,
            KillSwitchInputs {
                daily_loss_pct: Some(0.09),
                ..Default::default()
            },
        )
        .unwrap();
        ks.reset(KillSwitchLevel::Safe);
        assert_eq!(ks.level(), KillSwitchLevel::Safe);

        let restored = KillSwitch::restore(cfg(), &journal);
        assert_eq!(restored.level(), KillSwitchLevel::Caution);
    }

    #[test]
    fn gates_flip_at_defensive_and_shutdown() {
        let journal = Journal::open_in_memory().unwrap();
        let mut ks = KillSwitch::restore(cfg(), &journal);
        ks.evaluate(
            &journal,
            KillSwitchInputs {
                portfolio_heat_pct: Some(0.99),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ks.level(), KillSwitchLevel::Defensive);
        assert!(!ks.can_open_new_positions());
        assert!(ks.can_trade());
    }
}
