pub mod aggregator;
pub mod collector;
pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod validator;

pub use aggregator::{AggregationSummary, Aggregator};
pub use collector::{CategoryPayload, Collector, NodeReport};
pub use config::{Category, CollectorConfig, ValidatorConfig};
pub use discovery::{FileNodeSource, NodeIdentity, NodeSource, StaticNodeSource, seed_store};
pub use error::{FetchError, Result, TopoError};
pub use model::Node;
pub use pipeline::{TopologyReport, TopologyRun};
pub use store::NodeStore;
pub use validator::{ValidationOutcome, Validator};
