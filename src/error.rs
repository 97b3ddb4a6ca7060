//! Error taxonomy for the reconciliation engine

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Comprehensive error type spanning every engine component
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed input row (unknown action, malformed CIDR/MAC, etc.)
    #[error("validation error: {0}")]
    Validation(String),

    /// Adding the edge would close a cycle in the dependency graph
    #[error("cyclic dependency: adding edge {from} -> {to} would close a cycle")]
    CyclicDependency {
        /// Dependent node id
        from: String,
        /// Dependency node id
        to: String,
    },

    /// Residual cycle discovered during topological sort
    #[error("cyclic dependency: {0} node(s) unreachable by topological sort: {1:?}")]
    ResidualCycle(usize, Vec<String>),

    /// An edge referenced a node id that was never added to the graph
    #[error("missing node: {0} is not present in the graph")]
    MissingNode(String),

    /// A deferred reference marker could not be resolved at dispatch time
    #[error("deferred resolution failed for row {row_id} ({resource_type}): key {deferred_key} has no entry for {deferred_value}")]
    DeferredResolution {
        /// Row id of the operation carrying the unresolved marker
        row_id: String,
        /// Object type of the operation
        resource_type: String,
        /// The deferred marker key, e.g. `_deferred_block_cidr`
        deferred_key: String,
        /// The value the marker referenced (cidr/name/code) and failed to find
        deferred_value: String,
    },

    /// The server reported the resource already exists and conflict lookup found nothing
    #[error("resource already exists and could not be located by natural key: {0}")]
    ResourceAlreadyExists(String),

    /// The server reported the resource does not exist
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The server asked the caller to back off and retry later
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds the server asked the caller to wait before retrying
        retry_after_secs: u64,
    },

    /// Any other server-side failure
    #[error("server error: {0}")]
    Server(String),

    /// Change log / checkpoint store failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Catch-all for invariant violations that should never occur
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Persistence(format!("(de)serialization failure: {e}"))
    }
}
