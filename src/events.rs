//! The closed event-type enum and the `Event` envelope.
//!
//! Every event type in this file is a fixed `{category}.{domain}.{version}`
//! string. The set is closed deliberately: unknown event types are not
//! something the rest of the system is ever asked to handle gracefully.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(rename = "signal.ta.v1")]
    SignalTaV1,
    #[serde(rename = "signal.onchain.v1")]
    SignalOnchainV1,
    #[serde(rename = "signal.tradfi.v1")]
    SignalTradfiV1,
    #[serde(rename = "signal.social.v1")]
    SignalSocialV1,
    #[serde(rename = "signal.sentiment.v1")]
    SignalSentimentV1,
    #[serde(rename = "signal.events.v1")]
    SignalEventsV1,
    #[serde(rename = "signal.etf.v1")]
    SignalEtfV1,
    #[serde(rename = "signal.stablecoin.v1")]
    SignalStablecoinV1,
    #[serde(rename = "signal.whale.v1")]
    SignalWhaleV1,
    #[serde(rename = "signal.orderbook.v1")]
    SignalOrderbookV1,
    #[serde(rename = "signal.curator.v1")]
    SignalCuratorV1,
    #[serde(rename = "signal.aci.v1")]
    SignalAciV1,
    #[serde(rename = "signal.price_alert.v1")]
    SignalPriceAlertV1,
    #[serde(rename = "signal.price_ws.v1")]
    SignalPriceWsV1,

    #[serde(rename = "brain.cycle.v1")]
    BrainCycleV1,
    #[serde(rename = "brain.conviction.v1")]
    BrainConvictionV1,
    #[serde(rename = "brain.synthesis.v1")]
    BrainSynthesisV1,
    #[serde(rename = "brain.regime_change.v1")]
    BrainRegimeChangeV1,
    #[serde(rename = "brain.feature_snapshot.v1")]
    BrainFeatureSnapshotV1,

    #[serde(rename = "execution.trade_intent.v1")]
    ExecutionTradeIntentV1,
    #[serde(rename = "execution.order_submitted.v1")]
    ExecutionOrderSubmittedV1,
    #[serde(rename = "execution.order_filled.v1")]
    ExecutionOrderFilledV1,
    #[serde(rename = "execution.order_canceled.v1")]
    ExecutionOrderCanceledV1,
    #[serde(rename = "execution.order_failed.v1")]
    ExecutionOrderFailedV1,
    #[serde(rename = "execution.position_opened.v1")]
    ExecutionPositionOpenedV1,
    #[serde(rename = "execution.position_closed.v1")]
    ExecutionPositionClosedV1,
    #[serde(rename = "execution.position_updated.v1")]
    ExecutionPositionUpdatedV1,

    #[serde(rename = "system.kill_switch.v1")]
    SystemKillSwitchV1,
    #[serde(rename = "system.balance_updated.v1")]
    SystemBalanceUpdatedV1,
    #[serde(rename = "system.audit.v1")]
    SystemAuditV1,

    #[serde(rename = "karma.intent.v1")]
    KarmaIntentV1,
    #[serde(rename = "karma.settlement.v1")]
    KarmaSettlementV1,
    #[serde(rename = "karma.receipt.v1")]
    KarmaReceiptV1,
    #[serde(rename = "karma.wallet_migration.v1")]
    KarmaWalletMigrationV1,

    #[serde(rename = "learning.outcome.v1")]
    LearningOutcomeV1,
    #[serde(rename = "learning.weight_adjustment.v1")]
    LearningWeightAdjustmentV1,
    #[serde(rename = "learning.report.v1")]
    LearningReportV1,
}

impl EventType {
    /// The exact wire string, also used as the `type` component of the hash
    /// preimage — this must match the `serde(rename = ...)` above exactly.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SignalTaV1 => "signal.ta.v1",
            EventType::SignalOnchainV1 => "signal.onchain.v1",
            EventType::SignalTradfiV1 => "signal.tradfi.v1",
            EventType::SignalSocialV1 => "signal.social.v1",
            EventType::SignalSentimentV1 => "signal.sentiment.v1",
            EventType::SignalEventsV1 => "signal.events.v1",
            EventType::SignalEtfV1 => "signal.etf.v1",
            EventType::SignalStablecoinV1 => "signal.stablecoin.v1",
            EventType::SignalWhaleV1 => "signal.whale.v1",
            EventType::SignalOrderbookV1 => "signal.orderbook.v1",
            EventType::SignalCuratorV1 => "signal.curator.v1",
            EventType::SignalAciV1 => "signal.aci.v1",
            EventType::SignalPriceAlertV1 => "signal.price_alert.v1",
            EventType::SignalPriceWsV1 => "signal.price_ws.v1",
            EventType::BrainCycleV1 => "brain.cycle.v1",
            EventType::BrainConvictionV1 => "brain.conviction.v1",
            EventType::BrainSynthesisV1 => "brain.synthesis.v1",
            EventType::BrainRegimeChangeV1 => "brain.regime_change.v1",
            EventType::BrainFeatureSnapshotV1 => "brain.feature_snapshot.v1",
            EventType::ExecutionTradeIntentV1 => "execution.trade_intent.v1",
            EventType::ExecutionOrderSubmittedV1 => "execution.order_submitted.v1",
            EventType::ExecutionOrderFilledV1 => "execution.order_filled.v1",
            EventType::ExecutionOrderCanceledV1 => "execution.order_canceled.v1",
            EventType::ExecutionOrderFailedV1 => "execution.order_failed.v1",
            EventType::ExecutionPositionOpenedV1 => "execution.position_opened.v1",
            EventType::ExecutionPositionClosedV1 => "execution.position_closed.v1",
            EventType::ExecutionPositionUpdatedV1 => "execution.position_updated.v1",
            EventType::SystemKillSwitchV1 => "system.kill_switch.v1",
            EventType::SystemBalanceUpdatedV1 => "system.balance_updated.v1",
            EventType::SystemAuditV1 => "system.audit.v1",
            EventType::KarmaIntentV1 => "karma.intent.v1",
            EventType::KarmaSettlementV1 => "karma.settlement.v1",
            EventType::KarmaReceiptV1 => "karma.receipt.v1",
            EventType::KarmaWalletMigrationV1 => "karma.wallet_migration.v1",
            EventType::LearningOutcomeV1 => "learning.outcome.v1",
            EventType::LearningWeightAdjustmentV1 => "learning.weight_adjustment.v1",
            EventType::LearningReportV1 => "learning.report.v1",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        // Small closed set — linear scan is fine and keeps this in lockstep
        // with `as_str` without a second source of truth.
        const ALL: &[EventType] = &[
            EventType::SignalTaV1,
            EventType::SignalOnchainV1,
            EventType::SignalTradfiV1,
            EventType::SignalSocialV1,
            EventType::SignalSentimentV1,
            EventType::SignalEventsV1,
            EventType::SignalEtfV1,
            EventType::SignalStablecoinV1,
            EventType::SignalWhaleV1,
            EventType::SignalOrderbookV1,
            EventType::SignalCuratorV1,
            EventType::SignalAciV1,
            EventType::SignalPriceAlertV1,
            EventType::SignalPriceWsV1,
            EventType::BrainCycleV1,
            EventType::BrainConvictionV1,
            EventType::BrainSynthesisV1,
            EventType::BrainRegimeChangeV1,
            EventType::BrainFeatureSnapshotV1,
            EventType::ExecutionTradeIntentV1,
            EventType::ExecutionOrderSubmittedV1,
            EventType::ExecutionOrderFilledV1,
            EventType::ExecutionOrderCanceledV1,
            EventType::ExecutionOrderFailedV1,
            EventType::ExecutionPositionOpenedV1,
            EventType::ExecutionPositionClosedV1,
            EventType::ExecutionPositionUpdatedV1,
            EventType::SystemKillSwitchV1,
            EventType::SystemBalanceUpdatedV1,
            EventType::SystemAuditV1,
            EventType::KarmaIntentV1,
            EventType::KarmaSettlementV1,
            EventType::KarmaReceiptV1,
            EventType::KarmaWalletMigrationV1,
            EventType::LearningOutcomeV1,
            EventType::LearningWeightAdjustmentV1,
            EventType::LearningReportV1,
        ];
        ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

/// An immutable, committed record in the journal. Once inserted this is
/// never mutated — corrections are new events, not edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub observed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub source: Option<String>,
    pub trace_id: Option<String>,
    pub schema_version: String,
    pub dedupe_key: Option<String>,
    pub payload: Value,
    pub prev_hash: Option<String>,
    pub hash: String,
}

/// The event chain's genesis convention: the empty string, never
/// `"0"` * 64. See DESIGN.md Open Question (c).
pub const GENESIS_PREV_HASH: &str = "";

/// `hash = SHA256(prev_hash_or_empty + "|" + type + "|" + canonical_json(payload))`
///
/// This is the one formula every event hash in the system must agree on —
/// producers, the journal, and the chain verifier all call this, never a
/// local reimplementation.
pub fn compute_event_hash(prev_hash: Option<&str>, event_type: EventType, payload: &Value) -> String {
    use sha2::{Digest, Sha256};
    let preimage = format!(
        "{}|{}|{}",
        prev_hash.unwrap_or(GENESIS_PREV_HASH),
        event_type.as_str(),
        crate::canonical_json::canonical_json(payload)
    );
    let digest = Sha256::digest(preimage.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_round_trips_through_as_str() {
        for t in [EventType::SignalTaV1, EventType::KarmaWalletMigrationV1, EventType::LearningReportV1] {
            assert_eq!(EventType::from_str_opt(t.as_str()), Some(t));
        }
    }

    #[test]
    fn hash_is_deterministic_and_order_independent_on_payload_keys() {
        let p1 = json!({"a": 1, "b": 2});
        let p2 = json!({"b": 2, "a": 1});
        let h1 = compute_event_hash(None, EventType::SignalTaV1, &p1);
        let h2 = compute_event_hash(None, EventType::SignalTaV1, &p2);
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_changes_if_payload_changes() {
        let p1 = json!({"a": 1});
        let p2 = json!({"a": 2});
        assert_ne!(
            compute_event_hash(Some("x"), EventType::SignalTaV1, &p1),
            compute_event_hash(Some("x"), EventType::SignalTaV1, &p2)
        );
    }
}
