//! The order management system: accepts a `TradeIntent`, runs it through
//! preflight, sizes it, routes it to the paper broker, and persists the
//! resulting order/position events. Live execution is an adapter
//! boundary only — not implemented here.

use serde_json::json;
use uuid::Uuid;

use crate::brain::decision::TradeIntent;
use crate::config::Config;
use crate::events::EventType;
use crate::execution::paper::{fill_event_payload, PaperBroker};
use crate::execution::preflight::Preflight;
use crate::execution::sizer::CorrelationAwareSizer;
use crate::journal::{AppendRequest, Journal, JournalError};
use crate::kill_switch::KillSwitchLevel;

#[derive(Debug, Clone)]
pub enum OmsStatus {
    Filled { order_id: String, position_id: String, notional_usd: f64 },
    Rejected { reasons: Vec<String> },
}

pub struct Oms {
    preflight: Preflight,
    sizer: CorrelationAwareSizer,
    paper: PaperBroker,
}

impl Oms {
    pub fn new(preflight: Preflight, sizer: CorrelationAwareSizer, paper: PaperBroker) -> Self {
        Oms { preflight, sizer, paper }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &self,
        journal: &Journal,
        config: &Config,
        intent: &TradeIntent,
        mid_price: f64,
        equity_usd: f64,
        daily_loss_pct: f64,
        kill_switch_level: KillSwitchLevel,
        portfolio_heat_pct: f64,
        corr_to_portfolio: f64,
        domain_scores_at_entry: &serde_json::Value,
        conviction_id: Option<&str>,
    ) -> Result<OmsStatus, JournalError> {
        let mode = config.execution_mode();
        let idempotency_key = Uuid::new_v4().to_string();

        journal.append(
            AppendRequest::new(EventType::ExecutionTradeIntentV1, serde_json::to_value(intent)?)
                .with_source("execution.oms")
                .with_dedupe_key(format!("execution.trade_intent:{idempotency_key}")),
        )?;

        let result = self.preflight.check(
            intent,
            &mode,
            equity_usd,
            kill_switch_level,
            daily_loss_pct,
            None,
        );
        if !result.approved {
            return Ok(OmsStatus::Rejected { reasons: result.reasons });
        }

        let notional = self.sizer.size_usd(
            equity_usd,
            (intent.conviction_score / 100.0).clamp(0.0, 1.0),
            corr_to_portfolio,
            portfolio_heat_pct,
            Some(config.risk.max_position_pct_of_equity),
        );
        if notional <= 0.0 {
            return Ok(OmsStatus::Rejected { reasons: vec!["size_zero".to_string()] });
        }

        if mode != "paper" {
            return Ok(OmsStatus::Rejected { reasons: vec![format!("unsupported_mode:{mode}")] });
        }

        let fill = self.paper.execute_market(
            journal,
            &intent.symbol,
            intent.direction,
            notional,
            intent.leverage,
            mid_price,
            domain_scores_at_entry,
            conviction_id,
            &idempotency_key,
        )?;

        journal.append(AppendRequest::new(
            EventType::ExecutionOrderSubmittedV1,
            json!({
                "order_id": fill.order_id,
                "position_id": fill.position_id,
                "venue": "paper",
                "order_type": "market",
                "side": fill.side,
                "symbol": fill.symbol,
                "idempotency_key": idempotency_key,
            }),
        ))?;
        journal.append(AppendRequest::new(EventType::ExecutionOrderFilledV1, fill_event_payload(&fill)))?;
        journal.append(AppendRequest::new(
            EventType::ExecutionPositionOpenedV1,
            json!({
                "position_id": fill.position_id,
                "asset": fill.symbol,
                "direction": intent.direction,
                "entry_price": fill.fill_price,
                "size_notional": fill.notional_usd,
                "leverage": intent.leverage,
                "domain_scores_at_entry": domain_scores_at_entry,
            }),
        ))?;

        Ok(OmsStatus::Filled {
            order_id: fill.order_id,
            position_id: fill.position_id,
            notional_usd: notional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::sizer::default_sizer_from_risk;
    use serde_json::json;

    fn test_intent() -> TradeIntent {
        TradeIntent {
            symbol: "BTC".to_string(),
            direction: "long",
            size_pct: 0.02,
            leverage: 1.0,
            conviction_score: 80.0,
            regime: "BULL",
            rationale: "test".to_string(),
            requires_approval: false,
            stop_loss_pct: 0.05,
            take_profit_pct: 0.10,
        }
    }

    #[test]
    fn a_clean_intent_fills_in_paper_mode() {
        let journal = Journal::open_in_memory().unwrap();
        let config = Config::from_repo_defaults();
        let oms = Oms::new(
            Preflight::new(config.risk.clone(), None),
            default_sizer_from_risk(config.risk.max_position_pct_of_equity),
            PaperBroker::default(),
        );
        let status = oms
            .submit(
                &journal,
                &config,
                &test_intent(),
                50_000.0,
                100_000.0,
                0.0,
                KillSwitchLevel::Safe,
                0.0,
                0.0,
                &json!({}),
                None,
            )
            .unwrap();
        assert!(matches!(status, OmsStatus::Filled { .. }));
    }

    #[test]
    fn defensive_kill_switch_rejects_before_sizing() {
        let journal = Journal::open_in_memory().unwrap();
        let config = Config::from_repo_defaults();
        let oms = Oms::new(
            Preflight::new(config.risk.clone(), None),
            default_sizer_from_risk(config.risk.max_position_pct_of_equity),
            PaperBroker::default(),
        );
        let status = oms
            .submit(
                &journal,
                &config,
                &test_intent(),
                50_000.0,
                100_000.0,
                0.0,
                KillSwitchLevel::Defensive,
                0.0,
                0.0,
                &json!({}),
                None,
            )
            .unwrap();
        assert!(matches!(status, OmsStatus::Rejected { .. }));
    }
}
