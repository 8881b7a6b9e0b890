//! Paper trading adapter: fills immediately at the supplied mid price
//! with configurable slippage and a flat fee, then persists the order and
//! the resulting position into the side tables.

use rusqlite::{params, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::journal::{Journal, JournalError};
use crate::time::utc_now;

#[derive(Debug, Clone, Copy)]
pub struct PaperConfig {
    pub slippage_bps: f64,
    pub fee_rate: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        PaperConfig {
            slippage_bps: 5.0,
            fee_rate: 0.0006,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaperFill {
    pub order_id: String,
    pub position_id: String,
    pub symbol: String,
    pub side: String,
    pub fill_price: f64,
    pub fill_size: f64,
    pub notional_usd: f64,
    pub fee_usd: f64,
}

pub struct PaperBroker {
    config: PaperConfig,
}

impl Default for PaperBroker {
    fn default() -> Self {
        PaperBroker {
            config: PaperConfig::default(),
        }
    }
}

impl PaperBroker {
    pub fn new(config: PaperConfig) -> Self {
        PaperBroker { config }
    }

    fn fill_price(&self, mid: f64, side: &str) -> f64 {
        let slip = self.config.slippage_bps / 10_000.0;
        if side == "buy" {
            mid * (1.0 + slip)
        } else {
            mid * (1.0 - slip)
        }
    }

    /// Opens a new paper position. `idempotency_key` dedupes at the
    /// `orders` table level: a repeated key returns the original fill
    /// rather than opening a second position.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_market(
        &self,
        journal: &Journal,
        symbol: &str,
        direction: &str,
        notional_usd: f64,
        leverage: f64,
        mid_price: f64,
        domain_scores_at_entry: &serde_json::Value,
        conviction_id: Option<&str>,
        idempotency_key: &str,
    ) -> Result<PaperFill, JournalError> {
        let side = if direction == "long" { "buy" } else { "sell" };
        let fill_price = self.fill_price(mid_price, side);
        let qty = notional_usd / fill_price;
        let fee_usd = notional_usd.abs() * self.config.fee_rate;
        let now = utc_now().to_rfc3339();

        journal.with_conn(|conn| {
            if let Some((order_id, position_id, existing_price, existing_size)) = conn
                .query_row(
                    "SELECT order_id, position_id, fill_price, size_usd FROM orders WHERE idempotency_key = ?1",
                    params![idempotency_key],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, f64>(3)?,
                        ))
                    },
                )
                .optional()
                .map_err(JournalError::Sqlite)?
            {
                return Ok(PaperFill {
                    order_id,
                    position_id,
                    symbol: symbol.to_string(),
                    side: side.to_string(),
                    fill_price: existing_price,
                    fill_size: existing_size / existing_price,
                    notional_usd: existing_size,
                    fee_usd,
                });
            }

            let order_id = Uuid::new_v4().to_string();
            let position_id = Uuid::new_v4().to_string();

            conn.execute(
                "INSERT INTO positions (position_id, symbol, side, status, entry_price, size_usd, leverage, opened_at, domain_scores_at_entry, conviction_id)
                 VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    position_id,
                    symbol,
                    direction,
                    fill_price,
                    notional_usd,
                    leverage,
                    now,
                    domain_scores_at_entry.to_string(),
                    conviction_id,
                ],
            ).map_err(JournalError::Sqlite)?;

            conn.execute(
                "INSERT INTO orders (order_id, position_id, symbol, side, size_usd, fill_price, fee_usd, idempotency_key, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![order_id, position_id, symbol, side, notional_usd, fill_price, fee_usd, idempotency_key, now],
            ).map_err(JournalError::Sqlite)?;

            Ok(PaperFill {
                order_id,
                position_id,
                symbol: symbol.to_string(),
                side: side.to_string(),
                fill_price,
                fill_size: qty,
                notional_usd,
                fee_usd,
            })
        })
    }
}

pub fn fill_event_payload(fill: &PaperFill) -> serde_json::Value {
    json!({
        "order_id": fill.order_id,
        "position_id": fill.position_id,
        "symbol": fill.symbol,
        "side": fill.side,
        "fill_price": fill.fill_price,
        "fill_size": fill.fill_size,
        "fee_usd": fill.fee_usd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn opens_a_position_and_records_an_order() {
        let journal = Journal::open_in_memory().unwrap();
        let broker = PaperBroker::default();
        let fill = broker
            .execute_market(&journal, "BTC", "long", 1_000.0, 1.0, 50_000.0, &json!({}), None, "idem-1")
            .unwrap();
        assert!(fill.fill_price > 50_000.0); // buy side pays slippage up
        assert!(fill.fee_usd > 0.0);
    }

    #[test]
    fn repeated_idempotency_key_returns_the_original_fill() {
        let journal = Journal::open_in_memory().unwrap();
        let broker = PaperBroker::default();
        let first = broker
            .execute_market(&journal, "BTC", "long", 1_000.0, 1.0, 50_000.0, &json!({}), None, "idem-2")
            .unwrap();
        let second = broker
            .execute_market(&journal, "BTC", "long", 1_000.0, 1.0, 51_000.0, &json!({}), None, "idem-2")
            .unwrap();
        assert_eq!(first.position_id, second.position_id);
        assert_eq!(first.fill_price, second.fill_price);
    }
}
