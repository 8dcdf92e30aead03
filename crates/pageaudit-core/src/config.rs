//! Run configuration.
//!
//! [`PipelineConfig`] is the typed form the coordinator consumes: the
//! execution mode is a closed enum, so a configuration can never be in two
//! modes at once. [`ConfigFile`] is the loose JSON form; `classify` turns it
//! into a `PipelineConfig` or rejects it before any work starts.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregate::AggregationSpec;
use crate::artifacts::Artifacts;
use crate::audit::{Audit, AuditCatalog, AuditResult};
use crate::error::{PipelineError, Result};

/// One unit of the gathering plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassConfig {
    pub name: String,
    /// Names of the gatherers that contribute artifacts in this pass.
    #[serde(default)]
    pub gatherers: Vec<String>,
}

impl PassConfig {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        gatherers: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.into(),
            gatherers: gatherers.into_iter().map(Into::into).collect(),
        }
    }
}

/// Pipeline shape selected for a run.
#[derive(Clone)]
pub enum ExecutionMode {
    /// Gather artifacts from a live page, then audit them.
    GatherAndAudit {
        passes: Vec<PassConfig>,
        audits: Vec<Arc<dyn Audit>>,
    },
    /// Audit artifacts collected earlier.
    ArtifactsAndAudit {
        artifacts: Arc<Artifacts>,
        audits: Vec<Arc<dyn Audit>>,
    },
    /// Skip gathering and auditing; use results computed earlier.
    ResultsOnly { audit_results: Vec<AuditResult> },
}

impl ExecutionMode {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionMode::GatherAndAudit { .. } => "gather_and_audit",
            ExecutionMode::ArtifactsAndAudit { .. } => "artifacts_and_audit",
            ExecutionMode::ResultsOnly { .. } => "results_only",
        }
    }

    /// Audits the run will execute; empty for [`ExecutionMode::ResultsOnly`].
    pub fn audits(&self) -> &[Arc<dyn Audit>] {
        match self {
            ExecutionMode::GatherAndAudit { audits, .. }
            | ExecutionMode::ArtifactsAndAudit { audits, .. } => audits,
            ExecutionMode::ResultsOnly { .. } => &[],
        }
    }
}

impl fmt::Debug for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let audit_names: Vec<&str> = self.audits().iter().map(|a| a.name()).collect();
        match self {
            ExecutionMode::GatherAndAudit { passes, .. } => f
                .debug_struct("GatherAndAudit")
                .field("passes", passes)
                .field("audits", &audit_names)
                .finish(),
            ExecutionMode::ArtifactsAndAudit { artifacts, .. } => f
                .debug_struct("ArtifactsAndAudit")
                .field("artifacts", &artifacts.names().collect::<Vec<_>>())
                .field("audits", &audit_names)
                .finish(),
            ExecutionMode::ResultsOnly { audit_results } => f
                .debug_struct("ResultsOnly")
                .field("audit_results", &audit_results.len())
                .finish(),
        }
    }
}

/// Typed run configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: ExecutionMode,
    /// When set, results are folded into aggregations and a full report is built.
    pub aggregations: Option<Vec<AggregationSpec>>,
}

impl PipelineConfig {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            aggregations: None,
        }
    }

    pub fn with_aggregations(mut self, specs: Vec<AggregationSpec>) -> Self {
        self.aggregations = Some(specs);
        self
    }
}

/// Configuration as written on disk. Every field is optional; which ones are
/// present decides the execution mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passes: Option<Vec<PassConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audits: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_results: Option<Vec<AuditResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Vec<AggregationSpec>>,
}

impl ConfigFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Select the execution mode, resolving audit names through `catalog`.
    ///
    /// Passes plus audits wins over artifacts plus audits; precomputed
    /// results are used only when neither applies.
    pub fn classify(self, catalog: &AuditCatalog) -> Result<PipelineConfig> {
        let ConfigFile {
            passes,
            audits,
            artifacts,
            audit_results,
            aggregations,
        } = self;

        let mode = match (passes, audits, artifacts, audit_results) {
            (Some(passes), Some(audits), _, _) => ExecutionMode::GatherAndAudit {
                passes,
                audits: catalog.resolve(&audits)?,
            },
            (_, Some(audits), Some(artifacts), _) => ExecutionMode::ArtifactsAndAudit {
                artifacts: Arc::new(artifacts),
                audits: catalog.resolve(&audits)?,
            },
            (_, _, _, Some(audit_results)) => ExecutionMode::ResultsOnly { audit_results },
            _ => {
                return Err(PipelineError::Config(
                    "no execution mode matches: expected passes and audits, artifacts and audits, or auditResults"
                        .to_string(),
                ))
            }
        };

        debug!(mode = mode.name(), "Classified configuration");
        Ok(PipelineConfig { mode, aggregations })
    }
}

/// Side effects requested for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFlags {
    /// Persist the resolved artifacts before auditing.
    #[serde(default)]
    pub save_artifacts: bool,
    /// Persist assets derived from the artifacts before auditing.
    #[serde(default)]
    pub save_assets: bool,
}

/// Per-phase time limits. `None` waits indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    pub gather_timeout: Option<Duration>,
    pub persist_timeout: Option<Duration>,
    /// Applies to each audit individually.
    pub audit_timeout: Option<Duration>,
    pub aggregate_timeout: Option<Duration>,
}

impl RunLimits {
    /// Same limit for every phase.
    pub fn uniform(limit: Duration) -> Self {
        Self {
            gather_timeout: Some(limit),
            persist_timeout: Some(limit),
            audit_timeout: Some(limit),
            aggregate_timeout: Some(limit),
        }
    }
}

/// What to do when an individual audit fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailurePolicy {
    /// The first failing audit fails the whole run.
    #[default]
    FailFast,
    /// A failing audit is recorded as an error result; the others complete.
    Isolate,
}

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// URL exactly as the caller supplied it.
    pub url: String,
    pub flags: RunFlags,
    pub limits: RunLimits,
    pub failure_policy: AuditFailurePolicy,
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            flags: RunFlags::default(),
            limits: RunLimits::default(),
            failure_policy: AuditFailurePolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_failure_policy(mut self, policy: AuditFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
