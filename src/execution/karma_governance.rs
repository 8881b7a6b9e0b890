//! Governance guardrails around karma settlement: once a node has
//! settled at least once, its treasury address is locked and can only
//! move via an explicit, audited wallet migration event. Prevents a
//! compromised or careless config change from quietly redirecting
//! payouts.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::events::EventType;
use crate::journal::{AppendRequest, Journal, JournalError};
use crate::time::utc_now;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceCheckResult {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl GovernanceCheckResult {
    fn ok() -> Self {
        GovernanceCheckResult { allowed: true, reason: None }
    }

    fn denied(reason: impl Into<String>) -> Self {
        GovernanceCheckResult { allowed: false, reason: Some(reason.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedKarmaConfig {
    pub treasury_address: String,
    pub locked_since: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementAuditEntry {
    pub settlement_id: String,
    pub intent_id: String,
    pub destination_wallet: String,
    pub amount_usd: f64,
    pub settled_at: String,
}

pub struct KarmaGovernance;

impl KarmaGovernance {
    pub fn has_prior_settlement(&self, journal: &Journal) -> Result<bool, JournalError> {
        journal.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM karma_settlements", [], |row| row.get(0))
                .map_err(JournalError::Sqlite)?;
            Ok(count > 0)
        })
    }

    /// The treasury address a node first settled to, if any — this is
    /// the locked configuration once settlement history exists.
    pub fn locked_config(&self, journal: &Journal) -> Result<Option<LockedKarmaConfig>, JournalError> {
        journal.with_conn(|conn| {
            conn.query_row(
                "SELECT destination_wallet, settled_at FROM karma_settlements ORDER BY settled_at ASC LIMIT 1",
                [],
                |row| {
                    Ok(LockedKarmaConfig {
                        treasury_address: row.get(0)?,
                        locked_since: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(JournalError::Sqlite)
        })
    }

    /// Checks whether a settlement to `treasury_address` for `percentage`
    /// of realized profit is allowed. Once a treasury is locked, any
    /// other destination is denied unless a `karma.wallet_migration.v1`
    /// event has since authorized the move.
    pub fn check_settlement_allowed(
        &self,
        journal: &Journal,
        percentage: f64,
        treasury_address: &str,
    ) -> Result<GovernanceCheckResult, JournalError> {
        if !(0.0..=1.0).contains(&percentage) {
            return Ok(GovernanceCheckResult::denied("percentage_out_of_range"));
        }

        let Some(locked) = self.locked_config(journal)? else {
            return Ok(GovernanceCheckResult::ok());
        };
        if locked.treasury_address == treasury_address {
            return Ok(GovernanceCheckResult::ok());
        }

        let migrated = self.latest_authorized_destination(journal)?;
        match migrated {
            Some(destination) if destination == treasury_address => Ok(GovernanceCheckResult::ok()),
            _ => Ok(GovernanceCheckResult::denied("treasury_address_is_locked")),
        }
    }

    fn latest_authorized_destination(&self, journal: &Journal) -> Result<Option<String>, JournalError> {
        let events = journal.replay_all()?;
        let destination = events
            .iter()
            .filter(|e| e.event_type == EventType::KarmaWalletMigrationV1)
            .filter_map(|e| e.payload.get("new_wallet").and_then(|v| v.as_str()).map(str::to_string))
            .last();
        Ok(destination)
    }

    /// Records an operator-authorized move of the karma treasury to a
    /// new wallet. This is the only path that can unlock a settled
    /// treasury address.
    pub fn record_wallet_migration(
        &self,
        journal: &Journal,
        old_wallet: &str,
        new_wallet: &str,
        reason: &str,
        authorized_by: &str,
    ) -> Result<(), JournalError> {
        journal
            .append(AppendRequest::new(
                EventType::KarmaWalletMigrationV1,
                json!({
                    "old_wallet": old_wallet,
                    "new_wallet": new_wallet,
                    "reason": reason,
                    "authorized_by": authorized_by,
                    "migrated_at": utc_now().to_rfc3339(),
                }),
            ))
            .map(|_| ())
    }

    pub fn settlement_audit_log(&self, journal: &Journal, limit: usize) -> Result<Vec<SettlementAuditEntry>, JournalError> {
        journal.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT settlement_id, intent_id, destination_wallet, amount_usd, settled_at
                     FROM karma_settlements ORDER BY settled_at DESC LIMIT ?1",
                )
                .map_err(JournalError::Sqlite)?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(SettlementAuditEntry {
                        settlement_id: row.get(0)?,
                        intent_id: row.get(1)?,
                        destination_wallet: row.get(2)?,
                        amount_usd: row.get(3)?,
                        settled_at: row.get(4)?,
                    })
                })
                .map_err(JournalError::Sqlite)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(JournalError::Sqlite)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params as rparams;

    fn seed_settlement(journal: &Journal, wallet: &str) {
        journal
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO karma_settlements (settlement_id, intent_id, destination_wallet, amount_usd, settled_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rparams!["settle-1", "intent-1", wallet, 10.0, "2026-01-01T00:00:00Z"],
                )
                .map_err(JournalError::Sqlite)
            })
            .unwrap();
    }

    #[test]
    fn no_prior_settlement_allows_any_destination() {
        let journal = Journal::open_in_memory().unwrap();
        let gov = KarmaGovernance;
        let result = gov.check_settlement_allowed(&journal, 0.1, "0xabc").unwrap();
        assert!(result.allowed);
    }

    #[test]
    fn settled_treasury_locks_out_other_destinations() {
        let journal = Journal::open_in_memory().unwrap();
        seed_settlement(&journal, "0xabc");
        let gov = KarmaGovernance;
        let result = gov.check_settlement_allowed(&journal, 0.1, "0xdef").unwrap();
        assert!(!result.allowed);
        assert_eq!(result.reason.as_deref(), Some("treasury_address_is_locked"));
    }

    #[test]
    fn a_recorded_migration_unlocks_the_new_destination() {
        let journal = Journal::open_in_memory().unwrap();
        seed_settlement(&journal, "0xabc");
        let gov = KarmaGovernance;
        gov.record_wallet_migration(&journal, "0xabc", "0xdef", "compromised key", "operator").unwrap();
        let result = gov.check_settlement_allowed(&journal, 0.1, "0xdef").unwrap();
        assert!(result.allowed);
    }
}
