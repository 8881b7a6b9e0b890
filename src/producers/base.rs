//! The producer template method: `collect() -> normalize() -> publish()`,
//! wrapped by `run()` so that no producer's failure can ever take down the
//! cycle scheduler — everything funnels into a `ProducerResult`.

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::journal::{AppendRequest, Journal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerHealth {
    Ok,
    Degraded,
    Stale,
    Error,
    Quarantined,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProducerResult {
    pub producer: String,
    pub domain: String,
    pub health: ProducerHealth,
    pub event_id: Option<String>,
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Raw, not-yet-validated data a producer pulled from its source. Kept
/// opaque at this layer — `normalize` is what gives it shape.
pub struct RawData(pub Value);

#[async_trait]
pub trait Producer: Send + Sync {
    fn name(&self) -> &str;
    fn domain(&self) -> &str;
    fn event_type(&self) -> crate::events::EventType;

    async fn collect(&self) -> anyhow::Result<RawData>;
    fn normalize(&self, raw: RawData) -> anyhow::Result<Value>;
    fn dedupe_key(&self, normalized: &Value) -> Option<String>;

    /// Runs the full template method, isolating every failure into a
    /// `ProducerResult` rather than letting it escape to the scheduler.
    async fn run(&self, journal: &Journal) -> ProducerResult {
        let started = Instant::now();
        let outcome = async {
            let raw = self.collect().await?;
            let normalized = self.normalize(raw)?;
            let mut req = AppendRequest::new(self.event_type(), normalized.clone()).with_source(self.name());
            if let Some(key) = self.dedupe_key(&normalized) {
                req = req.with_dedupe_key(key);
            }
            let event = journal.append(req)?;
            Ok::<_, anyhow::Error>(event)
        }
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(event) => ProducerResult {
                producer: self.name().to_string(),
                domain: self.domain().to_string(),
                health: ProducerHealth::Ok,
                event_id: Some(event.id),
                message: None,
                duration_ms,
            },
            Err(err) => ProducerResult {
                producer: self.name().to_string(),
                domain: self.domain().to_string(),
                health: ProducerHealth::Error,
                event_id: None,
                message: Some(err.to_string()),
                duration_ms,
            },
        }
    }
}
