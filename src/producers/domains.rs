//! Concrete per-domain producers.
//!
//! These are template producers, not full market-data scrapers — each one
//! demonstrates the collect/normalize/publish shape and emits a plausible,
//! minimal payload for its domain's event type. A production deployment
//! swaps `collect()` for a real data source; the template method around it
//! does not change.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::events::EventType;
use crate::producers::base::{Producer, RawData};
use crate::time::utc_now;

#[derive(Default)]
pub struct TechnicalTemplateProducer;

#[async_trait]
impl Producer for TechnicalTemplateProducer {
    fn name(&self) -> &str {
        "technical_template"
    }
    fn domain(&self) -> &str {
        "technical"
    }
    fn event_type(&self) -> EventType {
        EventType::SignalTaV1
    }

    async fn collect(&self) -> anyhow::Result<RawData> {
        Ok(RawData(json!({"rsi_14": 50.0, "trend_strength": 0.0, "volume_ratio": 1.0})))
    }

    fn normalize(&self, raw: RawData) -> anyhow::Result<Value> {
        Ok(json!({
            "domain": "technical",
            "rsi_14": raw.0.get("rsi_14"),
            "trend_strength": raw.0.get("trend_strength"),
            "volume_ratio": raw.0.get("volume_ratio"),
            "ts": utc_now().to_rfc3339(),
        }))
    }

    fn dedupe_key(&self, normalized: &Value) -> Option<String> {
        Some(format!("signal:technical:{}", normalized.get("ts")?.as_str()?))
    }
}

#[derive(Default)]
pub struct OnchainTemplateProducer;

#[async_trait]
impl Producer for OnchainTemplateProducer {
    fn name(&self) -> &str {
        "onchain_template"
    }
    fn domain(&self) -> &str {
        "onchain"
    }
    fn event_type(&self) -> EventType {
        EventType::SignalOnchainV1
    }

    async fn collect(&self) -> anyhow::Result<RawData> {
        Ok(RawData(json!({"whale_netflow": 0.0, "price_momentum_24h": 0.0})))
    }

    fn normalize(&self, raw: RawData) -> anyhow::Result<Value> {
        Ok(json!({
            "domain": "onchain",
            "whale_netflow": raw.0.get("whale_netflow"),
            "price_momentum_24h": raw.0.get("price_momentum_24h"),
            "ts": utc_now().to_rfc3339(),
        }))
    }

    fn dedupe_key(&self, normalized: &Value) -> Option<String> {
        Some(format!("signal:onchain:{}", normalized.get("ts")?.as_str()?))
    }
}

#[derive(Default)]
pub struct TradfiTemplateProducer;

#[async_trait]
impl Producer for TradfiTemplateProducer {
    fn name(&self) -> &str {
        "tradfi_template"
    }
    fn domain(&self) -> &str {
        "tradfi"
    }
    fn event_type(&self) -> EventType {
        EventType::SignalTradfiV1
    }

    async fn collect(&self) -> anyhow::Result<RawData> {
        Ok(RawData(json!({"funding_annualized": 10.0, "basis_annualized": 5.0})))
    }

    fn normalize(&self, raw: RawData) -> anyhow::Result<Value> {
        Ok(json!({
            "domain": "tradfi",
            "funding_annualized": raw.0.get("funding_annualized"),
            "basis_annualized": raw.0.get("basis_annualized"),
            "ts": utc_now().to_rfc3339(),
        }))
    }

    fn dedupe_key(&self, normalized: &Value) -> Option<String> {
        Some(format!("signal:tradfi:{}", normalized.get("ts")?.as_str()?))
    }
}

#[derive(Default)]
pub struct SocialTemplateProducer;

#[async_trait]
impl Producer for SocialTemplateProducer {
    fn name(&self) -> &str {
        "social_template"
    }
    fn domain(&self) -> &str {
        "social"
    }
    fn event_type(&self) -> EventType {
        EventType::SignalSocialV1
    }

    async fn collect(&self) -> anyhow::Result<RawData> {
        Ok(RawData(json!({"mention_volume": 0, "fear_greed": 50.0})))
    }

    fn normalize(&self, raw: RawData) -> anyhow::Result<Value> {
        Ok(json!({
            "domain": "social",
            "mention_volume": raw.0.get("mention_volume"),
            "fear_greed": raw.0.get("fear_greed"),
            "ts": utc_now().to_rfc3339(),
        }))
    }

    fn dedupe_key(&self, normalized: &Value) -> Option<String> {
        Some(format!("signal:social:{}", normalized.get("ts")?.as_str()?))
    }
}

#[derive(Default)]
pub struct EventsTemplateProducer;

#[async_trait]
impl Producer for EventsTemplateProducer {
    fn name(&self) -> &str {
        "events_template"
    }
    fn domain(&self) -> &str {
        "events"
    }
    fn event_type(&self) -> EventType {
        EventType::SignalEventsV1
    }

    async fn collect(&self) -> anyhow::Result<RawData> {
        Ok(RawData(json!({"upcoming": []})))
    }

    fn normalize(&self, raw: RawData) -> anyhow::Result<Value> {
        Ok(json!({
            "domain": "events",
            "upcoming_count": raw.0.get("upcoming").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0),
            "ts": utc_now().to_rfc3339(),
        }))
    }

    fn dedupe_key(&self, normalized: &Value) -> Option<String> {
        Some(format!("signal:events:{}", normalized.get("ts")?.as_str()?))
    }
}

#[derive(Default)]
pub struct CuratorTemplateProducer;

#[async_trait]
impl Producer for CuratorTemplateProducer {
    fn name(&self) -> &str {
        "curator_template"
    }
    fn domain(&self) -> &str {
        "curator"
    }
    fn event_type(&self) -> EventType {
        EventType::SignalCuratorV1
    }

    async fn collect(&self) -> anyhow::Result<RawData> {
        Ok(RawData(json!({"submissions": []})))
    }

    fn normalize(&self, raw: RawData) -> anyhow::Result<Value> {
        Ok(json!({
            "domain": "curator",
            "submission_count": raw.0.get("submissions").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0),
            "ts": utc_now().to_rfc3339(),
        }))
    }

    fn dedupe_key(&self, normalized: &Value) -> Option<String> {
        Some(format!("signal:curator:{}", normalized.get("ts")?.as_str()?))
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct AlwaysFailingProducer;

#[cfg(test)]
#[async_trait]
impl Producer for AlwaysFailingProducer {
    fn name(&self) -> &str {
        "always_failing"
    }
    fn domain(&self) -> &str {
        "technical"
    }
    fn event_type(&self) -> EventType {
        EventType::SignalTaV1
    }

    async fn collect(&self) -> anyhow::Result<RawData> {
        Err(anyhow::anyhow!("simulated collection failure"))
    }

    fn normalize(&self, _raw: RawData) -> anyhow::Result<Value> {
        unreachable!()
    }

    fn dedupe_key(&self, _normalized: &Value) -> Option<String> {
        None
    }
}
