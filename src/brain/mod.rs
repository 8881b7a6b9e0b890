pub mod conviction;
pub mod data_quality;
pub mod decision;
pub mod orchestrator;
pub mod regime;
pub mod synthesis;

pub use orchestrator::{BrainOrchestrator, CycleOutcome};
