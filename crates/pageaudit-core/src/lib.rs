//! pageaudit core library
//!
//! Coordinates a page audit run:
//! - selects the execution mode from configuration (gather + audit,
//!   artifacts + audit, or precomputed results)
//! - sequences gathering, artifact/asset persistence, concurrent audits
//!   and aggregation
//! - assembles the final report
//!
//! Gathering, persistence, aggregation and logging sit behind traits so
//! each can be swapped; [`fakes`] provides in-memory versions for tests.

pub mod aggregate;
pub mod artifacts;
pub mod audit;
pub mod config;
pub mod error;
pub mod events;
pub mod fakes;
pub mod gather;
pub mod persist;
pub mod pipeline;
pub mod target;
pub mod telemetry;

pub use aggregate::{
    AggregationItem, AggregationResult, AggregationSpec, Aggregator, AuditExpectation,
    WeightedAggregator,
};
pub use artifacts::Artifacts;
pub use audit::builtin::BuiltinAudit;
pub use audit::{list_audit_names, Audit, AuditCatalog, AuditResult, FnAudit};
pub use config::{
    AuditFailurePolicy, ConfigFile, ExecutionMode, PassConfig, PipelineConfig, RunFlags,
    RunLimits, RunOptions,
};
pub use error::{
    AggregateError, AuditError, GatherError, PersistError, Phase, PipelineError, Result,
};
pub use events::{NullObserver, PipelineEvent, PipelineObserver, TracingObserver};
pub use gather::{GatherContext, Gatherer, HttpGatherer};
pub use persist::{ArtifactStore, FsArtifactStore, NoopArtifactStore, SaveContext};
pub use pipeline::{Pipeline, Report, RunOutput};
pub use target::{TargetUrl, INSECURE_TARGET_WARNINGS};
pub use telemetry::init_tracing;

pub use tokio_util::sync::CancellationToken;
