//! Pipeline coordinator.
//!
//! A run goes through fixed phases, each awaited before the next starts:
//!
//! 1. canonicalize the target URL (warn when it is not HTTPS)
//! 2. resolve artifacts: gather them, or take them from configuration
//! 3. optionally save artifacts, then assets
//! 4. run every configured audit concurrently
//! 5. optionally aggregate and assemble a [`Report`]
//!
//! Results-only configurations skip 2–4. Every collaborator call is bounded
//! by the run's [`RunLimits`](crate::config::RunLimits) and its cancellation
//! token.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::aggregate::{AggregationResult, Aggregator, WeightedAggregator};
use crate::artifacts::Artifacts;
use crate::audit::{Audit, AuditResult};
use crate::config::{AuditFailurePolicy, ExecutionMode, PipelineConfig, RunOptions};
use crate::error::{Phase, PipelineError, Result};
use crate::events::{run_span, PipelineEvent, PipelineObserver, TracingObserver};
use crate::gather::{GatherContext, Gatherer};
use crate::persist::{ArtifactStore, NoopArtifactStore, SaveContext};
use crate::target::{TargetUrl, INSECURE_TARGET_WARNINGS};

/// Final output of a run that requested aggregations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// URL exactly as supplied by the caller.
    pub initial_url: String,
    /// Canonicalized URL the run measured.
    pub url: String,
    /// Audit results keyed by their `name`.
    pub audits: BTreeMap<String, AuditResult>,
    pub aggregations: Vec<AggregationResult>,
}

impl Report {
    /// Key `results` by name. A repeated name keeps the last result.
    pub fn new(
        url: &TargetUrl,
        results: Vec<AuditResult>,
        aggregations: Vec<AggregationResult>,
    ) -> Self {
        let audits = results
            .into_iter()
            .map(|result| (result.name.clone(), result))
            .collect();
        Self {
            initial_url: url.initial().to_string(),
            url: url.as_str().to_string(),
            audits,
            aggregations,
        }
    }
}

/// What a run resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunOutput {
    /// Aggregations were configured.
    Report(Report),
    /// No aggregations: audit results in configured order.
    Results(Vec<AuditResult>),
}

impl RunOutput {
    pub fn report(&self) -> Option<&Report> {
        match self {
            RunOutput::Report(report) => Some(report),
            RunOutput::Results(_) => None,
        }
    }

    pub fn results(&self) -> Option<&[AuditResult]> {
        match self {
            RunOutput::Report(_) => None,
            RunOutput::Results(results) => Some(results),
        }
    }
}

/// Sequences gathering, persistence, audits and aggregation for a run.
///
/// Holds no per-run state; one `Pipeline` can serve concurrent runs.
pub struct Pipeline<G: Gatherer> {
    gatherer: G,
    store: Arc<dyn ArtifactStore>,
    aggregator: Arc<dyn Aggregator>,
    observer: Arc<dyn PipelineObserver>,
}

impl<G: Gatherer> Pipeline<G> {
    /// Pipeline that discards persisted data, aggregates with
    /// [`WeightedAggregator`] and reports through `tracing`.
    pub fn new(gatherer: G) -> Self {
        Self {
            gatherer,
            store: Arc::new(NoopArtifactStore),
            aggregator: Arc::new(WeightedAggregator),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_aggregator(mut self, aggregator: Arc<dyn Aggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn gatherer(&self) -> &G {
        &self.gatherer
    }

    /// Execute one run.
    ///
    /// `session` is forwarded to the gatherer and otherwise untouched. Any
    /// collaborator failure fails the run; under
    /// [`AuditFailurePolicy::Isolate`] individual audit failures are
    /// recorded in the results instead.
    pub async fn run(
        &self,
        session: G::Session,
        config: &PipelineConfig,
        options: &RunOptions,
    ) -> Result<RunOutput> {
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id, config.mode.name());
        self.run_inner(session, config, options)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        session: G::Session,
        config: &PipelineConfig,
        options: &RunOptions,
    ) -> Result<RunOutput> {
        let url = TargetUrl::parse(&options.url)?;
        if url.is_insecure() {
            for message in INSECURE_TARGET_WARNINGS {
                self.emit(PipelineEvent::warning(message));
            }
        }
        info!(url = %url, initial_url = %url.initial(), "Starting run");

        let results = match &config.mode {
            ExecutionMode::GatherAndAudit { passes, audits } => {
                let artifacts = self
                    .phase(Phase::Gather, options.limits.gather_timeout, &options.cancel, async {
                        let ctx = GatherContext {
                            session: &session,
                            url: &url,
                            options,
                        };
                        self.gatherer
                            .gather(ctx, passes)
                            .await
                            .map_err(PipelineError::from)
                    })
                    .await?;
                self.audit_artifacts(&url, Arc::new(artifacts), audits, options)
                    .await?
            }
            ExecutionMode::ArtifactsAndAudit { artifacts, audits } => {
                self.audit_artifacts(&url, Arc::clone(artifacts), audits, options)
                    .await?
            }
            ExecutionMode::ResultsOnly { audit_results } => audit_results.clone(),
        };

        let output = match &config.aggregations {
            Some(specs) => {
                let aggregations = self
                    .phase(
                        Phase::Aggregate,
                        options.limits.aggregate_timeout,
                        &options.cancel,
                        async {
                            self.aggregator
                                .aggregate(specs, &results)
                                .await
                                .map_err(PipelineError::from)
                        },
                    )
                    .await?;
                RunOutput::Report(Report::new(&url, results, aggregations))
            }
            None => RunOutput::Results(results),
        };

        info!(url = %url, "Run finished");
        Ok(output)
    }

    /// Persistence side effects followed by the audit fan-out.
    async fn audit_artifacts(
        &self,
        url: &TargetUrl,
        artifacts: Arc<Artifacts>,
        audits: &[Arc<dyn Audit>],
        options: &RunOptions,
    ) -> Result<Vec<AuditResult>> {
        let limit = options.limits.persist_timeout;
        let ctx = SaveContext::new(url, options);

        if options.flags.save_artifacts {
            self.phase(Phase::SaveArtifacts, limit, &options.cancel, async {
                self.store
                    .save_artifacts(&ctx, &artifacts)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;
        }

        if options.flags.save_assets {
            self.phase(Phase::SaveAssets, limit, &options.cancel, async {
                self.store
                    .save_assets(&ctx, &artifacts)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;
        }

        self.run_audits(artifacts, audits, options).await
    }

    /// Run every audit concurrently on the current task. Results come back
    /// in configured order regardless of completion order.
    async fn run_audits(
        &self,
        artifacts: Arc<Artifacts>,
        audits: &[Arc<dyn Audit>],
        options: &RunOptions,
    ) -> Result<Vec<AuditResult>> {
        self.emit(PipelineEvent::PhaseStarted { phase: Phase::Audit });

        let pending = audits
            .iter()
            .map(|audit| self.run_audit(audit.as_ref(), &artifacts, options));

        let results = match options.failure_policy {
            AuditFailurePolicy::FailFast => try_join_all(pending).await?,
            AuditFailurePolicy::Isolate => join_all(pending)
                .await
                .into_iter()
                .zip(audits)
                .map(|(outcome, audit)| match outcome {
                    Ok(result) => Ok(result),
                    Err(err @ PipelineError::Cancelled { .. }) => Err(err),
                    Err(PipelineError::Audit { source, .. }) => {
                        Ok(AuditResult::from_failure(audit.as_ref(), &source))
                    }
                    Err(other) => Ok(AuditResult::from_failure(audit.as_ref(), &other)),
                })
                .collect::<Result<Vec<_>>>()?,
        };

        self.emit(PipelineEvent::PhaseFinished { phase: Phase::Audit });
        Ok(results)
    }

    async fn run_audit(
        &self,
        audit: &dyn Audit,
        artifacts: &Artifacts,
        options: &RunOptions,
    ) -> Result<AuditResult> {
        self.emit(PipelineEvent::AuditStarted {
            name: audit.name().to_string(),
            description: audit.description().to_string(),
        });

        let outcome = bounded(
            Phase::Audit,
            options.limits.audit_timeout,
            &options.cancel,
            async {
                audit
                    .audit(artifacts)
                    .await
                    .map_err(|source| PipelineError::Audit {
                        name: audit.name().to_string(),
                        source,
                    })
            },
        )
        .await;

        self.emit(PipelineEvent::AuditFinished {
            name: audit.name().to_string(),
            description: audit.description().to_string(),
            ok: outcome.is_ok(),
        });
        outcome
    }

    async fn phase<T, F>(
        &self,
        phase: Phase,
        limit: Option<Duration>,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.emit(PipelineEvent::PhaseStarted { phase });
        let out = bounded(phase, limit, cancel, fut).await?;
        self.emit(PipelineEvent::PhaseFinished { phase });
        Ok(out)
    }

    fn emit(&self, event: PipelineEvent) {
        self.observer.on_event(&event);
    }
}

/// Await `fut` unless `limit` elapses or `cancel` fires first.
async fn bounded<T, F>(
    phase: Phase,
    limit: Option<Duration>,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let limited = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| PipelineError::Timeout {
                    phase,
                    after_ms: limit.as_millis() as u64,
                })?,
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { phase }),
        out = limited => out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_keys_by_name_last_wins() {
        let url = TargetUrl::parse("http://example.com").unwrap();
        let report = Report::new(
            &url,
            vec![
                AuditResult::new("viewport", "first", json!(false)),
                AuditResult::new("is-on-https", "", json!(false)),
                AuditResult::new("viewport", "second", json!(true)),
            ],
            vec![],
        );
        assert_eq!(report.initial_url, "http://example.com");
        assert_eq!(report.url, "http://example.com/");
        assert_eq!(report.audits.len(), 2);
        assert_eq!(report.audits["viewport"].description, "second");
    }

    #[test]
    fn test_run_output_serializes_untagged() {
        let results = RunOutput::Results(vec![AuditResult::new("viewport", "", json!(true))]);
        assert!(serde_json::to_value(&results).unwrap().is_array());

        let url = TargetUrl::parse("https://example.com/").unwrap();
        let report = RunOutput::Report(Report::new(&url, vec![], vec![]));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["initialUrl"], json!("https://example.com/"));
        assert!(value["audits"].is_object());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let cancel = CancellationToken::new();
        let err = bounded::<(), _>(
            Phase::Gather,
            Some(Duration::from_millis(10)),
            &cancel,
            std::future::pending(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Timeout { phase: Phase::Gather, after_ms: 10 }
        ));
    }

    #[tokio::test]
    async fn test_bounded_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = bounded(Phase::Aggregate, None, &cancel, async { Ok(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { phase: Phase::Aggregate }));
    }

    #[tokio::test]
    async fn test_bounded_passes_value_through() {
        let cancel = CancellationToken::new();
        let value = bounded(Phase::Audit, Some(Duration::from_secs(5)), &cancel, async {
            Ok("done")
        })
        .await
        .unwrap();
        assert_eq!(value, "done");
    }
}
