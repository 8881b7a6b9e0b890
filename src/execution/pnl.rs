//! P&L tracking against the `positions` side table: realized P&L on
//! close, unrealized P&L while a position stays open.

use rusqlite::{params, OptionalExtension};
use thiserror::Error;

use crate::journal::{Journal, JournalError};
use crate::time::utc_now;

#[derive(Debug, Error)]
pub enum PnlError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("position {0} not found")]
    NotFound(String),
    #[error("position {0} is not open")]
    NotOpen(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PnlSnapshot {
    pub realized_usd: f64,
    pub unrealized_usd: f64,
    pub total_usd: f64,
}

pub struct PnlTracker;

impl PnlTracker {
    pub fn unrealized_usd(&self, journal: &Journal, position_id: &str, mark_price: f64) -> Result<f64, PnlError> {
        let position = journal.with_conn(|conn| {
            conn.query_row(
                "SELECT side, entry_price, size_usd, status FROM positions WHERE position_id = ?1",
                params![position_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(JournalError::Sqlite)
        })?;

        let Some((side, entry_price, size_usd, status)) = position else {
            return Ok(0.0);
        };
        if status != "open" {
            return Ok(0.0);
        }

        let qty = if entry_price > 0.0 { size_usd / entry_price } else { 0.0 };
        Ok(unrealized_for(&side, entry_price, mark_price, qty))
    }

    /// Marks a position closed and stores its realized P&L. Refuses a
    /// second close on the same position — the side table, not the
    /// caller, is the source of truth for "already closed".
    pub fn close_position(&self, journal: &Journal, position_id: &str, exit_price: f64) -> Result<f64, PnlError> {
        journal.with_conn(|conn| {
            let position: Option<(String, f64, f64, String)> = conn
                .query_row(
                    "SELECT side, entry_price, size_usd, status FROM positions WHERE position_id = ?1",
                    params![position_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, f64>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(JournalError::Sqlite)?;

            let Some((side, entry_price, size_usd, status)) = position else {
                return Err(JournalError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
            };
            if status != "open" {
                return Err(JournalError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
            }

            let qty = if entry_price > 0.0 { size_usd / entry_price } else { 0.0 };
            let realized = unrealized_for(&side, entry_price, exit_price, qty);
            let now = utc_now().to_rfc3339();

            conn.execute(
                "UPDATE positions SET status = 'closed', closed_at = ?1, exit_price = ?2, realized_pnl = ?3 WHERE position_id = ?4",
                params![now, exit_price, realized, position_id],
            )
            .map_err(JournalError::Sqlite)?;

            Ok(realized)
        })
        .map_err(|err| match err {
            JournalError::Sqlite(rusqlite::Error::QueryReturnedNoRows) => PnlError::NotFound(position_id.to_string()),
            other => PnlError::Journal(other),
        })
    }

    pub fn snapshot(&self, journal: &Journal, mark_prices: &std::collections::HashMap<String, f64>) -> Result<PnlSnapshot, PnlError> {
        journal.with_conn(|conn| {
            let mut unrealized = 0.0;
            let mut stmt = conn
                .prepare("SELECT position_id, symbol, side, entry_price, size_usd FROM positions WHERE status = 'open'")
                .map_err(JournalError::Sqlite)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                })
                .map_err(JournalError::Sqlite)?;
            for row in rows {
                let (_, symbol, side, entry_price, size_usd) = row.map_err(JournalError::Sqlite)?;
                if let Some(mark) = mark_prices.get(&symbol.to_uppercase()) {
                    let qty = if entry_price > 0.0 { size_usd / entry_price } else { 0.0 };
                    unrealized += unrealized_for(&side, entry_price, *mark, qty);
                }
            }
            drop(stmt);

            let realized: f64 = conn
                .query_row(
                    "SELECT COALESCE(SUM(realized_pnl), 0.0) FROM positions WHERE status = 'closed'",
                    [],
                    |row| row.get(0),
                )
                .map_err(JournalError::Sqlite)?;

            Ok(PnlSnapshot {
                realized_usd: realized,
                unrealized_usd: unrealized,
                total_usd: realized + unrealized,
            })
        })
        .map_err(PnlError::Journal)
    }
}

fn unrealized_for(side: &str, entry: f64, mark: f64, qty: f64) -> f64 {
    if side == "long" {
        (mark - entry) * qty
    } else {
        (entry - mark) * qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::paper::PaperBroker;
    use serde_json::json;

    #[test]
    fn closes_a_long_position_at_a_profit() {
        let journal = Journal::open_in_memory().unwrap();
        let fill = PaperBroker::default()
            .execute_market(&journal, "BTC", "long", 1_000.0, 1.0, 50_000.0, &json!({}), None, "idem-pnl-1")
            .unwrap();
        let tracker = PnlTracker;
        let realized = tracker.close_position(&journal, &fill.position_id, 55_000.0).unwrap();
        assert!(realized > 0.0);
    }

    #[test]
    fn double_close_is_rejected() {
        let journal = Journal::open_in_memory().unwrap();
        let fill = PaperBroker::default()
            .execute_market(&journal, "BTC", "long", 1_000.0, 1.0, 50_000.0, &json!({}), None, "idem-pnl-2")
            .unwrap();
        let tracker = PnlTracker;
        tracker.close_position(&journal, &fill.position_id, 55_000.0).unwrap();
        assert!(tracker.close_position(&journal, &fill.position_id, 60_000.0).is_err());
    }
}
