//! Per-contributor signal rate limiting, backed by the `contributor_signals`
//! side table: hourly/daily quotas plus a duplicate-submission gate. Checks
//! only — a successful check does not itself consume quota; the caller
//! records the signal (via `contributor_signals`) only once it actually
//! accepts it.

use rusqlite::{params, OptionalExtension};

use crate::journal::{Journal, JournalError};
use crate::time::{parse_dt, utc_now};

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub max_per_hour: u32,
    pub max_per_day: u32,
    pub duplicate_window_minutes: i64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        RateLimiterConfig {
            max_per_hour: 20,
            max_per_day: 100,
            duplicate_window_minutes: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub reason: Option<String>,
    pub retry_after_seconds: Option<i64>,
}

impl RateLimitResult {
    fn ok() -> Self {
        RateLimitResult { allowed: true, reason: None, retry_after_seconds: None }
    }

    fn denied(reason: impl Into<String>, retry_after_seconds: i64) -> Self {
        RateLimitResult {
            allowed: false,
            reason: Some(reason.into()),
            retry_after_seconds: Some(retry_after_seconds.max(0)),
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        RateLimiter { config }
    }

    pub fn check(&self, journal: &Journal, contributor_id: &str, asset: &str, direction: &str) -> Result<RateLimitResult, JournalError> {
        let now = utc_now();
        let hour_ago = (now - chrono::Duration::hours(1)).to_rfc3339();
        let day_ago = (now - chrono::Duration::days(1)).to_rfc3339();

        let (hour_count, day_count, dup): (i64, i64, Option<String>) = journal.with_conn(|conn| {
            let hour_count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM contributor_signals WHERE contributor_id = ?1 AND submitted_at >= ?2",
                    params![contributor_id, hour_ago],
                    |row| row.get(0),
                )
                .map_err(JournalError::Sqlite)?;
            let day_count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM contributor_signals WHERE contributor_id = ?1 AND submitted_at >= ?2",
                    params![contributor_id, day_ago],
                    |row| row.get(0),
                )
                .map_err(JournalError::Sqlite)?;
            let dup_window_start = (now - chrono::Duration::minutes(self.config.duplicate_window_minutes)).to_rfc3339();
            let dup: Option<String> = conn
                .query_row(
                    "SELECT submitted_at FROM contributor_signals
                     WHERE contributor_id = ?1 AND asset = ?2 AND direction = ?3 AND submitted_at >= ?4
                     ORDER BY submitted_at DESC LIMIT 1",
                    params![contributor_id, asset, direction, dup_window_start],
                    |row| row.get(0),
                )
                .optional()
                .map_err(JournalError::Sqlite)?;
            Ok((hour_count, day_count, dup))
        })?;

        if let Some(submitted_at) = dup {
            if let Some(submitted_at) = parse_dt(&submitted_at) {
                let retry_after = self.config.duplicate_window_minutes * 60
                    - (now - submitted_at).num_seconds();
                return Ok(RateLimitResult::denied("duplicate_signal", retry_after));
            }
        }
        if hour_count >= self.config.max_per_hour as i64 {
            return Ok(RateLimitResult::denied("hourly_quota_exceeded", 3600));
        }
        if day_count >= self.config.max_per_day as i64 {
            return Ok(RateLimitResult::denied("daily_quota_exceeded", 86_400));
        }
        Ok(RateLimitResult::ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(journal: &Journal, contributor: &str, asset: &str, direction: &str) {
        journal
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO contributor_signals (signal_id, contributor_id, asset, direction, submitted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![Uuid::new_v4().to_string(), contributor, asset, direction, utc_now().to_rfc3339()],
                )
                .map_err(JournalError::Sqlite)
            })
            .unwrap();
    }

    #[test]
    fn a_fresh_contributor_is_allowed() {
        let journal = Journal::open_in_memory().unwrap();
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let result = limiter.check(&journal, "alice", "BTC", "long").unwrap();
        assert!(result.allowed);
    }

    #[test]
    fn duplicate_asset_direction_within_window_is_rejected() {
        let journal = Journal::open_in_memory().unwrap();
        record(&journal, "alice", "BTC", "long");
        let limiter = RateLimiter::new(RateLimiterConfig::default());
        let result = limiter.check(&journal, "alice", "BTC", "long").unwrap();
        assert!(!result.allowed);
        assert_eq!(result.reason.as_deref(), Some("duplicate_signal"));
        assert!(result.retry_after_seconds.unwrap() > 0);
    }

    #[test]
    fn hourly_quota_trips_after_the_configured_count() {
        let journal = Journal::open_in_memory().unwrap();
        let limiter = RateLimiter::new(RateLimiterConfig { max_per_hour: 2, max_per_day: 100, duplicate_window_minutes: 0 });
        record(&journal, "alice", "BTC", "long");
        record(&journal, "alice", "ETH", "short");
        let result = limiter.check(&journal, "alice", "SOL", "long").unwrap();
        assert!(!result.allowed);
        assert_eq!(result.reason.as_deref(), Some("hourly_quota_exceeded"));
    }
}
