//! UTC time helpers shared across the journal, brain, and execution layers.
//!
//! Everything in this crate treats time as UTC. `parse_dt` accepts the
//! handful of shapes producers and the database hand back: RFC 3339 with a
//! `Z` suffix, an explicit offset, or (rarely) a naive timestamp assumed UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

pub fn parse_dt(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let z_swapped = value.strip_suffix('Z').map(|v| format!("{v}+00:00"));
    if let Some(v) = z_swapped {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&v) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

pub fn staleness_ms(observed_at: DateTime<Utc>, now: Option<DateTime<Utc>>) -> i64 {
    let now = now.unwrap_or_else(utc_now);
    (now - observed_at).num_milliseconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_z_suffixed_timestamps() {
        let dt = parse_dt("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(dt.timestamp(), 1767225600);
    }

    #[test]
    fn staleness_never_negative() {
        let future = utc_now() + chrono::Duration::seconds(30);
        assert_eq!(staleness_ms(future, None), 0);
    }
}
