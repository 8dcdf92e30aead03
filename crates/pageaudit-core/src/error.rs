//! Error taxonomy for the audit pipeline.
//!
//! Each collaborator has its own error type so implementations outside this
//! crate can report failures without depending on [`PipelineError`]. The
//! coordinator converts them with `#[from]` and never retries.

use std::fmt;

/// Pipeline phase a failure, timeout or cancellation is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Gather,
    SaveArtifacts,
    SaveAssets,
    Audit,
    Aggregate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Gather => "gather",
            Phase::SaveArtifacts => "save_artifacts",
            Phase::SaveAssets => "save_assets",
            Phase::Audit => "audit",
            Phase::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a [`Gatherer`](crate::gather::Gatherer).
#[derive(Debug, thiserror::Error)]
pub enum GatherError {
    #[error("unknown gatherer: {0}")]
    UnknownGatherer(String),

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("gathering failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for GatherError {
    fn from(err: reqwest::Error) -> Self {
        GatherError::Request {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}

/// Errors raised by an [`ArtifactStore`](crate::persist::ArtifactStore).
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Errors raised by a single [`Audit`](crate::audit::Audit).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuditError {
    #[error("required artifact missing: {0}")]
    MissingArtifact(String),

    #[error("artifact {name} has unexpected shape: expected {expected}")]
    InvalidArtifact { name: String, expected: String },

    #[error("{0}")]
    Failed(String),
}

/// Errors raised by an [`Aggregator`](crate::aggregate::Aggregator).
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("aggregation {aggregation} references audit {audit} which produced no result")]
    MissingAudit { aggregation: String, audit: String },

    #[error("aggregation failed: {0}")]
    Other(String),
}

/// Top-level error returned by [`Pipeline::run`](crate::pipeline::Pipeline::run)
/// and the configuration helpers.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown audit: {0}")]
    UnknownAudit(String),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("gather error: {0}")]
    Gather(#[from] GatherError),

    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    #[error("audit {name} failed: {source}")]
    Audit {
        name: String,
        #[source]
        source: AuditError,
    },

    #[error("aggregate error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("{phase} phase timed out after {after_ms}ms")]
    Timeout { phase: Phase, after_ms: u64 },

    #[error("{phase} phase cancelled")]
    Cancelled { phase: Phase },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
