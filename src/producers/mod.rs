pub mod base;
pub mod domains;
pub mod registry;

pub use base::{Producer, ProducerHealth, ProducerResult, RawData};
pub use registry::{build_registry, ProducerRegistry, RegisteredProducer};
