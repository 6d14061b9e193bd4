//! Error types for topology collection.

use thiserror::Error;

/// Errors returned by the node store, the aggregator and node discovery.
#[derive(Debug, Error)]
pub enum TopoError {
    /// No node with the given name.
    #[error("value with given key not found: {0}")]
    NotFound(String),

    /// A node with the given name already exists.
    #[error("duplicate key found: {0}")]
    DuplicateKey(String),

    /// The aggregation join gave up before every expected report arrived.
    #[error("incomplete collection: received {received} of {expected} reports")]
    IncompleteCollection { expected: usize, received: usize },

    #[error("invalid node identity: {0}")]
    InvalidNodeIdentity(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TopoError>;

/// Why a single (node, category) fetch produced no payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Request could not be sent or the response could not be read.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Agent answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Body was not the JSON shape expected for the category.
    #[error("decode failure: {0}")]
    Decode(String),
}
