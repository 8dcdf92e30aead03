//! In-memory collaborators for tests.
//!
//! `StaticGatherer`, `MemoryArtifactStore`, `StaticAggregator` and
//! `RecordingObserver` record every call so tests can assert what the
//! pipeline did without a browser, a filesystem or a real scorer.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::aggregate::{AggregationResult, AggregationSpec, Aggregator};
use crate::artifacts::Artifacts;
use crate::audit::{Audit, AuditResult};
use crate::config::PassConfig;
use crate::error::{AggregateError, AuditError, GatherError, PersistError};
use crate::events::{PipelineEvent, PipelineObserver};
use crate::gather::{GatherContext, Gatherer};
use crate::persist::SaveContext;

// ---------------------------------------------------------------------------
// StaticGatherer
// ---------------------------------------------------------------------------

/// One recorded `gather` call.
#[derive(Debug, Clone, PartialEq)]
pub struct GatherCall {
    pub session: String,
    pub url: String,
    pub passes: Vec<PassConfig>,
}

/// Returns canned artifacts (or a canned failure) for a `String` session.
#[derive(Debug, Default)]
pub struct StaticGatherer {
    artifacts: Artifacts,
    fail_with: Option<String>,
    calls: Mutex<Vec<GatherCall>>,
}

impl StaticGatherer {
    pub fn new(artifacts: Artifacts) -> Self {
        Self {
            artifacts,
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<GatherCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Gatherer for StaticGatherer {
    type Session = String;

    async fn gather(
        &self,
        ctx: GatherContext<'_, String>,
        passes: &[PassConfig],
    ) -> Result<Artifacts, GatherError> {
        self.calls.lock().unwrap().push(GatherCall {
            session: ctx.session.clone(),
            url: ctx.url.as_str().to_string(),
            passes: passes.to_vec(),
        });
        match &self.fail_with {
            Some(message) => Err(GatherError::Other(message.clone())),
            None => Ok(self.artifacts.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// Keeps a copy of everything it is asked to save.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    saved_artifacts: Mutex<Vec<(String, Artifacts)>>,
    saved_assets: Mutex<Vec<(String, Artifacts)>>,
    fail: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose every save fails with an I/O error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn saved_artifacts(&self) -> Vec<Artifacts> {
        self.saved_artifacts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, artifacts)| artifacts.clone())
            .collect()
    }

    /// Canonical url per `save_artifacts` call.
    pub fn saved_artifact_urls(&self) -> Vec<String> {
        self.saved_artifacts
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// `(canonical url, artifacts)` per `save_assets` call.
    pub fn saved_assets(&self) -> Vec<(String, Artifacts)> {
        self.saved_assets.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), PersistError> {
        if self.fail {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "memory store is read-only",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl crate::persist::ArtifactStore for MemoryArtifactStore {
    async fn save_artifacts(
        &self,
        ctx: &SaveContext<'_>,
        artifacts: &Artifacts,
    ) -> Result<(), PersistError> {
        self.check()?;
        self.saved_artifacts
            .lock()
            .unwrap()
            .push((ctx.url.as_str().to_string(), artifacts.clone()));
        Ok(())
    }

    async fn save_assets(
        &self,
        ctx: &SaveContext<'_>,
        artifacts: &Artifacts,
    ) -> Result<(), PersistError> {
        self.check()?;
        self.saved_assets
            .lock()
            .unwrap()
            .push((ctx.url.as_str().to_string(), artifacts.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticAggregator
// ---------------------------------------------------------------------------

/// Returns canned aggregation results and records its inputs.
#[derive(Debug, Default)]
pub struct StaticAggregator {
    output: Vec<AggregationResult>,
    fail_with: Option<String>,
    calls: Mutex<Vec<(Vec<AggregationSpec>, Vec<AuditResult>)>>,
}

impl StaticAggregator {
    pub fn new(output: Vec<AggregationResult>) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(Vec<AggregationSpec>, Vec<AuditResult>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Aggregator for StaticAggregator {
    async fn aggregate(
        &self,
        specs: &[AggregationSpec],
        results: &[AuditResult],
    ) -> Result<Vec<AggregationResult>, AggregateError> {
        self.calls
            .lock()
            .unwrap()
            .push((specs.to_vec(), results.to_vec()));
        match &self.fail_with {
            Some(message) => Err(AggregateError::Other(message.clone())),
            None => Ok(self.output.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Warning { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Audits
// ---------------------------------------------------------------------------

/// Audit that sleeps, then reports which artifacts it saw. With
/// `fail = true` it returns an error instead.
#[derive(Debug, Clone)]
pub struct DelayedAudit {
    pub name: String,
    pub delay: Duration,
    pub fail: bool,
    seen: std::sync::Arc<Mutex<Vec<Artifacts>>>,
}

impl DelayedAudit {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            fail: false,
            seen: Default::default(),
        }
    }

    pub fn failing(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(name, delay)
        }
    }

    /// Artifacts received by every invocation, in call order.
    pub fn seen(&self) -> Vec<Artifacts> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Audit for DelayedAudit {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Delayed test audit"
    }

    async fn audit(&self, artifacts: &Artifacts) -> Result<AuditResult, AuditError> {
        self.seen.lock().unwrap().push(artifacts.clone());
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(AuditError::Failed(format!("{} failed on purpose", self.name)));
        }
        let names: Vec<&str> = artifacts.names().collect();
        Ok(AuditResult::new(&self.name, self.description(), json!(names)))
    }
}
