//! Bookkeeping side-tables that live in the same SQLite file as the event
//! journal but are not part of the hash chain: positions, orders, karma
//! intents/settlements, conviction snapshots, producer health, contributor
//! scoring inputs, and the learning loop's weight history. Every one of
//! these is in principle reconstructable by replaying the journal; they
//! exist so execution, learning, and scoring can query "give me the open
//! position for symbol X" without folding the whole log on every call.
//!
//! All access goes through `Journal::with_conn`, so side-table writes are
//! serialized behind the same single-writer mutex as event appends.

use rusqlite::Connection;

pub fn init_side_tables(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS positions (
            position_id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            status TEXT NOT NULL,
            entry_price REAL NOT NULL,
            size_usd REAL NOT NULL,
            leverage REAL NOT NULL,
            opened_at TEXT NOT NULL,
            closed_at TEXT,
            exit_price REAL,
            realized_pnl REAL,
            domain_scores_at_entry TEXT NOT NULL,
            conviction_id TEXT
        );

        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            position_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            size_usd REAL NOT NULL,
            fill_price REAL NOT NULL,
            fee_usd REAL NOT NULL,
            idempotency_key TEXT NOT NULL UNIQUE,
            submitted_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS karma_intents (
            intent_id TEXT PRIMARY KEY,
            position_id TEXT NOT NULL,
            amount_usd REAL NOT NULL,
            destination_wallet TEXT NOT NULL,
            signature TEXT NOT NULL,
            signer_node_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            settled INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS karma_settlements (
            settlement_id TEXT PRIMARY KEY,
            intent_id TEXT NOT NULL,
            destination_wallet TEXT NOT NULL,
            amount_usd REAL NOT NULL,
            settled_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS producer_health (
            producer TEXT PRIMARY KEY,
            last_health TEXT NOT NULL,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            quarantined INTEGER NOT NULL DEFAULT 0,
            last_run_at TEXT
        );

        CREATE TABLE IF NOT EXISTS learning_weight_history (
            cycle_id TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL,
            weights_json TEXT NOT NULL,
            deltas_json TEXT NOT NULL,
            mode TEXT NOT NULL,
            avg_realized_pnl_usd REAL NOT NULL DEFAULT 0.0,
            reverted INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS conviction_scores (
            cycle_id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            direction TEXT NOT NULL,
            magnitude REAL NOT NULL,
            timeframe TEXT NOT NULL,
            ts TEXT NOT NULL,
            commitment_hash TEXT NOT NULL,
            pcs_score REAL NOT NULL,
            cts_score REAL NOT NULL,
            regime TEXT NOT NULL,
            domains_used TEXT NOT NULL,
            confidence REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS contributor_signals (
            signal_id TEXT PRIMARY KEY,
            contributor_id TEXT NOT NULL,
            asset TEXT NOT NULL,
            direction TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            accepted INTEGER NOT NULL DEFAULT 1,
            resolved INTEGER NOT NULL DEFAULT 0,
            hit INTEGER,
            conviction_at_submission REAL
        );

        CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status);
        CREATE INDEX IF NOT EXISTS idx_orders_position ON orders(position_id);
        CREATE INDEX IF NOT EXISTS idx_karma_intents_settled ON karma_intents(settled);
        CREATE INDEX IF NOT EXISTS idx_contributor_signals_contributor ON contributor_signals(contributor_id);
        CREATE INDEX IF NOT EXISTS idx_conviction_scores_symbol ON conviction_scores(symbol);
        ",
    )
}
