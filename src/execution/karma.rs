//! Karma: a default-on, operator-controlled mechanism that sets aside a
//! slice of realized profit for the commons that produced it. Realized
//! profit only, never losses. Two-phase: an automatic, signed *intent*
//! recorded on every profitable close, and an explicit operator-driven
//! *settlement* that actually pays out.
//!
//! Both `record_intent` and `settle` are fail-open by contract: karma
//! bookkeeping must never be the reason a trade or a shutdown fails.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rusqlite::params;
use serde_json::json;
use uuid::Uuid;

use crate::canonical_json::canonical_json;
use crate::config::{Config, KarmaSettlementMode};
use crate::events::EventType;
use crate::identity::NodeIdentity;
use crate::journal::{AppendRequest, Journal, JournalError};
use crate::time::utc_now;

#[derive(Debug, Clone)]
pub struct KarmaIntent {
    pub id: String,
    pub position_id: String,
    pub amount_usd: f64,
    pub destination_wallet: String,
    pub signature_b64: String,
    pub node_id: String,
}

#[derive(Debug, Clone)]
pub struct KarmaReceipt {
    pub id: String,
    pub intent_id: String,
    pub amount_usd: f64,
    pub destination_wallet: String,
}

pub struct KarmaEngine<'a> {
    config: &'a Config,
    identity: &'a NodeIdentity,
}

impl<'a> KarmaEngine<'a> {
    pub fn new(config: &'a Config, identity: &'a NodeIdentity) -> Self {
        KarmaEngine { config, identity }
    }

    pub fn enabled(&self) -> bool {
        self.config.karma.enabled && self.config.karma.percentage > 0.0
    }

    /// Records a signed intent for a profitable close. Returns `None`
    /// (never an error) on anything that would keep this from recording:
    /// karma disabled, no treasury configured, or a non-positive PnL.
    pub fn record_intent(&self, journal: &Journal, position_id: &str, realized_pnl_usd: f64) -> Option<KarmaIntent> {
        self.try_record_intent(journal, position_id, realized_pnl_usd).unwrap_or(None)
    }

    fn try_record_intent(
        &self,
        journal: &Journal,
        position_id: &str,
        realized_pnl_usd: f64,
    ) -> Result<Option<KarmaIntent>, JournalError> {
        if !self.enabled() {
            return Ok(None);
        }
        let Some(destination) = self.config.karma.treasury_address.clone() else {
            return Ok(None);
        };
        if realized_pnl_usd <= 0.0 {
            return Ok(None);
        }

        let amount = realized_pnl_usd * self.config.karma.percentage;
        let intent_id = Uuid::new_v4().to_string();
        let created_at = utc_now().to_rfc3339();

        let payload = json!({
            "id": intent_id,
            "position_id": position_id,
            "realized_pnl_usd": realized_pnl_usd,
            "karma_percentage": self.config.karma.percentage,
            "karma_amount_usd": amount,
            "node_id": self.identity.node_id,
            "created_at": created_at,
        });
        let signature = self.identity.sign(canonical_json(&payload).as_bytes());
        let signature_b64 = BASE64.encode(signature);

        journal.with_conn(|conn| {
            conn.execute(
                "INSERT INTO karma_intents (intent_id, position_id, amount_usd, destination_wallet, signature, signer_node_id, created_at, settled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                params![intent_id, position_id, amount, destination, signature_b64, self.identity.node_id, created_at],
            )
            .map_err(JournalError::Sqlite)
        })?;

        journal.append(
            AppendRequest::new(EventType::KarmaIntentV1, payload)
                .with_source("execution.karma")
                .with_dedupe_key(format!("karma.intent:{intent_id}")),
        )?;

        Ok(Some(KarmaIntent {
            id: intent_id,
            position_id: position_id.to_string(),
            amount_usd: amount,
            destination_wallet: destination,
            signature_b64,
            node_id: self.identity.node_id.clone(),
        }))
    }

    pub fn pending_intents(&self, journal: &Journal) -> Result<Vec<KarmaIntent>, JournalError> {
        journal.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT intent_id, position_id, amount_usd, destination_wallet, signature, signer_node_id
                     FROM karma_intents WHERE settled = 0 ORDER BY created_at ASC",
                )
                .map_err(JournalError::Sqlite)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(KarmaIntent {
                        id: row.get(0)?,
                        position_id: row.get(1)?,
                        amount_usd: row.get(2)?,
                        destination_wallet: row.get(3)?,
                        signature_b64: row.get(4)?,
                        node_id: row.get(5)?,
                    })
                })
                .map_err(JournalError::Sqlite)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(JournalError::Sqlite)
        })
    }

    /// Settles one pending intent. Only settles in live mode: paper P&L
    /// must never trigger a real payout.
    pub fn settle(&self, journal: &Journal, intent: &KarmaIntent) -> Option<KarmaReceipt> {
        self.try_settle(journal, intent).unwrap_or(None)
    }

    fn try_settle(&self, journal: &Journal, intent: &KarmaIntent) -> Result<Option<KarmaReceipt>, JournalError> {
        if !self.enabled() || self.config.execution_mode() != "live" {
            return Ok(None);
        }

        let receipt_id = Uuid::new_v4().to_string();
        let now = utc_now().to_rfc3339();

        journal.with_conn(|conn| {
            conn.execute(
                "INSERT INTO karma_settlements (settlement_id, intent_id, destination_wallet, amount_usd, settled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![receipt_id, intent.id, intent.destination_wallet, intent.amount_usd, now],
            )
            .map_err(JournalError::Sqlite)?;
            conn.execute(
                "UPDATE karma_intents SET settled = 1 WHERE intent_id = ?1",
                params![intent.id],
            )
            .map_err(JournalError::Sqlite)
        })?;

        journal.append(AppendRequest::new(
            EventType::KarmaSettlementV1,
            json!({
                "receipt_id": receipt_id,
                "intent_id": intent.id,
                "amount_usd": intent.amount_usd,
                "destination_wallet": intent.destination_wallet,
            }),
        ))?;
        journal.append(AppendRequest::new(
            EventType::KarmaReceiptV1,
            json!({
                "receipt_id": receipt_id,
                "intent_id": intent.id,
                "amount_usd": intent.amount_usd,
                "destination_wallet": intent.destination_wallet,
            }),
        ))?;

        Ok(Some(KarmaReceipt {
            id: receipt_id,
            intent_id: intent.id.clone(),
            amount_usd: intent.amount_usd,
            destination_wallet: intent.destination_wallet.clone(),
        }))
    }

    pub fn settlement_mode(&self) -> KarmaSettlementMode {
        self.config.karma.settlement_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_karma() -> Config {
        let mut cfg = Config::from_repo_defaults();
        cfg.karma.enabled = true;
        cfg.karma.treasury_address = Some("0xtreasury".to_string());
        cfg
    }

    #[test]
    fn records_an_intent_for_a_profitable_close() {
        let journal = Journal::open_in_memory().unwrap();
        let config = config_with_karma();
        let identity = NodeIdentity::generate(None).unwrap();
        let engine = KarmaEngine::new(&config, &identity);
        let intent = engine.record_intent(&journal, "pos-1", 1_000.0).unwrap();
        assert!((intent.amount_usd - 100.0).abs() < 1e-9);
    }

    #[test]
    fn never_records_against_a_loss() {
        let journal = Journal::open_in_memory().unwrap();
        let config = config_with_karma();
        let identity = NodeIdentity::generate(None).unwrap();
        let engine = KarmaEngine::new(&config, &identity);
        assert!(engine.record_intent(&journal, "pos-1", -50.0).is_none());
    }

    #[test]
    fn disabled_karma_never_records() {
        let journal = Journal::open_in_memory().unwrap();
        let config = Config::from_repo_defaults();
        let identity = NodeIdentity::generate(None).unwrap();
        let engine = KarmaEngine::new(&config, &identity);
        assert!(engine.record_intent(&journal, "pos-1", 1_000.0).is_none());
    }

    #[test]
    fn paper_mode_never_settles() {
        let journal = Journal::open_in_memory().unwrap();
        let config = config_with_karma();
        let identity = NodeIdentity::generate(None).unwrap();
        let engine = KarmaEngine::new(&config, &identity);
        let intent = engine.record_intent(&journal, "pos-1", 1_000.0).unwrap();
        assert!(engine.settle(&journal, &intent).is_none());
    }
}
