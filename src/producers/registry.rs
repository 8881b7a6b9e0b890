//! Producer registration and the quarantine policy.
//!
//! The reference implementation discovers producers at runtime by scanning
//! a package for `@register`-decorated classes. Rust has no equivalent
//! reflection story, so registration here is explicit and static: adding a
//! producer means adding one line to [`build_registry`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::journal::Journal;
use crate::producers::base::{Producer, ProducerHealth, ProducerResult};
use crate::producers::domains;

pub struct RegisteredProducer {
    pub producer: Arc<dyn Producer>,
    pub schedule_seconds: u64,
    consecutive_failures: Mutex<u32>,
    quarantined: Mutex<bool>,
}

impl RegisteredProducer {
    fn new(producer: Arc<dyn Producer>, schedule_seconds: u64) -> Self {
        RegisteredProducer {
            producer,
            schedule_seconds,
            consecutive_failures: Mutex::new(0),
            quarantined: Mutex::new(false),
        }
    }

    pub fn is_quarantined(&self) -> bool {
        *self.quarantined.lock()
    }

    fn record(&self, result: &ProducerResult, quarantine_after: u32) {
        let mut failures = self.consecutive_failures.lock();
        if result.health == ProducerHealth::Ok {
            *failures = 0;
        } else {
            *failures += 1;
            if *failures >= quarantine_after {
                *self.quarantined.lock() = true;
            }
        }
    }
}

pub struct ProducerRegistry {
    producers: HashMap<String, RegisteredProducer>,
    quarantine_after_failures: u32,
}

impl ProducerRegistry {
    pub fn new(quarantine_after_failures: u32) -> Self {
        ProducerRegistry {
            producers: HashMap::new(),
            quarantine_after_failures,
        }
    }

    pub fn register(&mut self, producer: Arc<dyn Producer>, schedule_seconds: u64) {
        let name = producer.name().to_string();
        self.producers
            .insert(name, RegisteredProducer::new(producer, schedule_seconds));
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProducer> {
        self.producers.get(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &RegisteredProducer> {
        self.producers.values()
    }

    /// Runs every non-quarantined producer once and reports results.
    /// Quarantined producers are skipped entirely — they require a manual
    /// operator reset via `enginectl`, not an automatic retry.
    pub async fn run_all(&self, journal: &Journal) -> Vec<ProducerResult> {
        let mut results = Vec::with_capacity(self.producers.len());
        for registered in self.producers.values() {
            results.push(self.run_registered(registered, journal).await);
        }
        results
    }

    /// Runs a single named producer once, respecting its quarantine state.
    /// Used by the daemon to drive each producer on its own
    /// `schedule_seconds` interval rather than one shared tick.
    pub async fn run_named(&self, name: &str, journal: &Journal) -> Option<ProducerResult> {
        let registered = self.producers.get(name)?;
        Some(self.run_registered(registered, journal).await)
    }

    /// Producer names paired with their configured schedule, for the
    /// daemon to spawn one ticker per producer.
    pub fn schedules(&self) -> Vec<(String, u64)> {
        self.producers
            .iter()
            .map(|(name, registered)| (name.clone(), registered.schedule_seconds))
            .collect()
    }

    async fn run_registered(&self, registered: &RegisteredProducer, journal: &Journal) -> ProducerResult {
        if registered.is_quarantined() {
            return ProducerResult {
                producer: registered.producer.name().to_string(),
                domain: registered.producer.domain().to_string(),
                health: ProducerHealth::Quarantined,
                event_id: None,
                message: Some("quarantined after repeated failures".to_string()),
                duration_ms: 0,
            };
        }
        let result = registered.producer.run(journal).await;
        registered.record(&result, self.quarantine_after_failures);
        result
    }

    pub fn reset_quarantine(&self, name: &str) -> bool {
        if let Some(registered) = self.producers.get(name) {
            *registered.quarantined.lock() = false;
            *registered.consecutive_failures.lock() = 0;
            true
        } else {
            false
        }
    }
}

/// The one place every concrete producer is wired in. Schedules are in
/// seconds and match the cadence named for each domain in the producer
/// catalog.
pub fn build_registry(quarantine_after_failures: u32) -> ProducerRegistry {
    let mut registry = ProducerRegistry::new(quarantine_after_failures);
    registry.register(Arc::new(domains::TechnicalTemplateProducer::default()), 300);
    registry.register(Arc::new(domains::OnchainTemplateProducer::default()), 300);
    registry.register(Arc::new(domains::TradfiTemplateProducer::default()), 900);
    registry.register(Arc::new(domains::SocialTemplateProducer::default()), 600);
    registry.register(Arc::new(domains::EventsTemplateProducer::default()), 1800);
    registry.register(Arc::new(domains::CuratorTemplateProducer::default()), 600);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_runs_every_registered_producer() {
        let registry = build_registry(5);
        let journal = Journal::open_in_memory().unwrap();
        let results = registry.run_all(&journal).await;
        assert_eq!(results.len(), 6);
    }

    #[tokio::test]
    async fn quarantine_kicks_in_after_threshold_failures() {
        let mut registry = ProducerRegistry::new(2);
        registry.register(Arc::new(domains::AlwaysFailingProducer::default()), 60);
        let journal = Journal::open_in_memory().unwrap();
        registry.run_all(&journal).await;
        let results = registry.run_all(&journal).await;
        assert!(results.iter().any(|r| r.health == ProducerHealth::Error));
        let results = registry.run_all(&journal).await;
        assert!(results.iter().any(|r| r.health == ProducerHealth::Quarantined));
    }
}
