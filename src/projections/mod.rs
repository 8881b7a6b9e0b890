//! Deterministic read-model projections folded from the event journal.
//!
//! Projections are pure functions of the event stream: given the same
//! events in the same order, `rebuild` always produces the same state.
//! Nothing here is allowed to consult wall-clock time or any other
//! external input while folding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{Event, EventType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalRecord {
    pub domain: String,
    pub event_type: String,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub payload: Value,
}

/// Latest signal observed per `(domain, event_type)` pair.
#[derive(Debug, Default)]
pub struct SignalsLatestProjector {
    latest: HashMap<(String, String), SignalRecord>,
}

impl SignalsLatestProjector {
    pub fn apply(&mut self, event: &Event) {
        let domain = match domain_for_event_type(event.event_type) {
            Some(d) => d,
            None => return,
        };
        let key = (domain.to_string(), event.event_type.as_str().to_string());
        let record = SignalRecord {
            domain: domain.to_string(),
            event_type: event.event_type.as_str().to_string(),
            ts: event.ts,
            payload: event.payload.clone(),
        };
        self.latest
            .entry(key)
            .and_modify(|existing| {
                if record.ts >= existing.ts {
                    *existing = record.clone();
                }
            })
            .or_insert(record);
    }

    pub fn latest_for_domain(&self, domain: &str) -> Vec<&SignalRecord> {
        self.latest.values().filter(|r| r.domain == domain).collect()
    }
}

fn domain_for_event_type(event_type: EventType) -> Option<&'static str> {
    match event_type {
        EventType::SignalTaV1 => Some("technical"),
        EventType::SignalOnchainV1 | EventType::SignalWhaleV1 => Some("onchain"),
        EventType::SignalTradfiV1 | EventType::SignalEtfV1 => Some("tradfi"),
        EventType::SignalSocialV1 | EventType::SignalSentimentV1 => Some("social"),
        EventType::SignalEventsV1 => Some("events"),
        EventType::SignalCuratorV1 => Some("curator"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub position_id: String,
    pub asset: String,
    pub status: PositionStatus,
    pub opened_at: chrono::DateTime<chrono::Utc>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub realized_pnl: Option<f64>,
}

/// Current open/closed state of every position the engine has opened.
#[derive(Debug, Default)]
pub struct PositionStateProjector {
    positions: HashMap<String, PositionRecord>,
}

impl PositionStateProjector {
    pub fn apply(&mut self, event: &Event) {
        match event.event_type {
            EventType::ExecutionPositionOpenedV1 => {
                let position_id = str_field(&event.payload, "position_id").unwrap_or_default();
                let asset = str_field(&event.payload, "asset").unwrap_or_default();
                self.positions.insert(
                    position_id.clone(),
                    PositionRecord {
                        position_id,
                        asset,
                        status: PositionStatus::Open,
                        opened_at: event.ts,
                        closed_at: None,
                        realized_pnl: None,
                    },
                );
            }
            EventType::ExecutionPositionClosedV1 => {
                let position_id = str_field(&event.payload, "position_id").unwrap_or_default();
                let pnl = f64_field(&event.payload, "realized_pnl");
                if let Some(record) = self.positions.get_mut(&position_id) {
                    record.status = PositionStatus::Closed;
                    record.closed_at = Some(event.ts);
                    record.realized_pnl = pnl;
                }
            }
            _ => {}
        }
    }

    pub fn open_positions(&self) -> Vec<&PositionRecord> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .collect()
    }

    pub fn closed_positions(&self) -> Vec<&PositionRecord> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Closed)
            .collect()
    }

    pub fn get(&self, position_id: &str) -> Option<&PositionRecord> {
        self.positions.get(position_id)
    }
}

/// Per-domain conviction scores captured at the moment a position was
/// opened — the learning loop attributes outcomes back to these.
#[derive(Debug, Default)]
pub struct PositionConvictionProjector {
    domain_scores_at_entry: HashMap<String, HashMap<String, f64>>,
}

impl PositionConvictionProjector {
    pub fn apply(&mut self, event: &Event) {
        if event.event_type != EventType::ExecutionPositionOpenedV1 {
            return;
        }
        let position_id = str_field(&event.payload, "position_id").unwrap_or_default();
        if let Some(Value::Object(scores)) = event.payload.get("domain_scores_at_entry") {
            let mut map = HashMap::new();
            for (domain, value) in scores {
                if let Some(n) = value.as_f64() {
                    map.insert(domain.clone(), n);
                }
            }
            self.domain_scores_at_entry.insert(position_id, map);
        }
    }

    pub fn domain_scores_for(&self, position_id: &str) -> Option<&HashMap<String, f64>> {
        self.domain_scores_at_entry.get(position_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Bull,
    Bear,
    Crisis,
    Transition,
}

#[derive(Debug, Default)]
pub struct RegimeStateProjector {
    current: Option<Regime>,
    changed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RegimeStateProjector {
    pub fn apply(&mut self, event: &Event) {
        if event.event_type != EventType::BrainRegimeChangeV1 {
            return;
        }
        let regime = match str_field(&event.payload, "regime").as_deref() {
            Some("BULL") => Regime::Bull,
            Some("BEAR") => Regime::Bear,
            Some("CRISIS") => Regime::Crisis,
            Some("TRANSITION") => Regime::Transition,
            _ => return,
        };
        self.current = Some(regime);
        self.changed_at = Some(event.ts);
    }

    pub fn current(&self) -> Option<Regime> {
        self.current
    }
}

/// Closed-position outcomes joined with the domain scores at entry —
/// exactly what `engine::learning` needs to compute attribution.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub position_id: String,
    pub realized_pnl: f64,
    pub domain_scores_at_entry: HashMap<String, f64>,
    pub closed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
pub struct OutcomesProjector {
    outcomes: Vec<Outcome>,
}

impl OutcomesProjector {
    pub fn rebuild_from(positions: &PositionStateProjector, convictions: &PositionConvictionProjector) -> Self {
        let mut outcomes = Vec::new();
        for position in positions.closed_positions() {
            if let (Some(pnl), Some(scores)) = (
                position.realized_pnl,
                convictions.domain_scores_for(&position.position_id),
            ) {
                outcomes.push(Outcome {
                    position_id: position.position_id.clone(),
                    realized_pnl: pnl,
                    domain_scores_at_entry: scores.clone(),
                    closed_at: position.closed_at.unwrap_or(position.opened_at),
                });
            }
        }
        OutcomesProjector { outcomes }
    }

    pub fn all(&self) -> &[Outcome] {
        &self.outcomes
    }
}

/// Folds the full event list once and returns every projection, in the
/// ascending order the journal guarantees.
#[derive(Default)]
pub struct ProjectionManager {
    pub signals: SignalsLatestProjector,
    pub positions: PositionStateProjector,
    pub convictions: PositionConvictionProjector,
    pub regime: RegimeStateProjector,
}

impl ProjectionManager {
    pub fn rebuild(events: &[Event]) -> Self {
        let mut manager = ProjectionManager::default();
        for event in events {
            manager.signals.apply(event);
            manager.positions.apply(event);
            manager.convictions.apply(event);
            manager.regime.apply(event);
        }
        manager
    }

    pub fn outcomes(&self) -> OutcomesProjector {
        OutcomesProjector::rebuild_from(&self.positions, &self.convictions)
    }
}

fn str_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn f64_field(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key).and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::compute_event_hash;
    use serde_json::json;

    fn make_event(event_type: EventType, ts: chrono::DateTime<chrono::Utc>, payload: Value) -> Event {
        let hash = compute_event_hash(None, event_type, &payload);
        Event {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            ts,
            observed_at: None,
            source: None,
            trace_id: None,
            schema_version: "1".to_string(),
            dedupe_key: None,
            payload,
            prev_hash: None,
            hash,
        }
    }

    #[test]
    fn position_lifecycle_and_outcome_join() {
        let t0 = crate::time::utc_now();
        let events = vec![
            make_event(
                EventType::ExecutionPositionOpenedV1,
                t0,
                json!({"position_id": "p1", "asset": "BTC", "domain_scores_at_entry": {"technical": 0.7, "onchain": -0.2}}),
            ),
            make_event(
                EventType::ExecutionPositionClosedV1,
                t0 + chrono::Duration::hours(1),
                json!({"position_id": "p1", "realized_pnl": 150.0}),
            ),
        ];
        let manager = ProjectionManager::rebuild(&events);
        let outcomes = manager.outcomes();
        assert_eq!(outcomes.all().len(), 1);
        assert_eq!(outcomes.all()[0].realized_pnl, 150.0);
        assert_eq!(outcomes.all()[0].domain_scores_at_entry.get("technical"), Some(&0.7));
    }

    #[test]
    fn regime_projector_tracks_latest_change() {
        let t0 = crate::time::utc_now();
        let events = vec![
            make_event(EventType::BrainRegimeChangeV1, t0, json!({"regime": "BULL"})),
            make_event(
                EventType::BrainRegimeChangeV1,
                t0 + chrono::Duration::minutes(5),
                json!({"regime": "CRISIS"}),
            ),
        ];
        let manager = ProjectionManager::rebuild(&events);
        assert_eq!(manager.regime.current(), Some(Regime::Crisis));
    }
}
