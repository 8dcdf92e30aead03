//! Pipeline lifecycle events and their observers.
//!
//! The coordinator never logs directly; it emits [`PipelineEvent`]s and the
//! configured [`PipelineObserver`] decides how to render them.
//! [`TracingObserver`] is the default and maps events onto `tracing` levels:
//! warnings at `warn!`, audit status at `info!`, phase boundaries at `debug!`.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Phase;

/// Something observable that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Non-fatal advisory.
    Warning { message: String },
    PhaseStarted { phase: Phase },
    PhaseFinished { phase: Phase },
    AuditStarted { name: String, description: String },
    AuditFinished {
        name: String,
        description: String,
        ok: bool,
    },
}

impl PipelineEvent {
    pub fn warning(message: impl Into<String>) -> Self {
        PipelineEvent::Warning {
            message: message.into(),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, PipelineEvent::Warning { .. })
    }
}

/// Receives pipeline events. Called inline from the run, so implementations
/// must not block.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Renders events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Warning { message } => {
                warn!(event = "pipeline.warning", "{}", message);
            }
            PipelineEvent::PhaseStarted { phase } => {
                debug!(event = "phase.started", phase = %phase);
            }
            PipelineEvent::PhaseFinished { phase } => {
                debug!(event = "phase.finished", phase = %phase);
            }
            PipelineEvent::AuditStarted { name, description } => {
                info!(event = "audit.started", audit = %name, "{}", description);
            }
            PipelineEvent::AuditFinished {
                name,
                description,
                ok,
            } => {
                if *ok {
                    info!(event = "audit.finished", audit = %name, "{}", description);
                } else {
                    warn!(event = "audit.failed", audit = %name, "{}", description);
                }
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl PipelineObserver for NullObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Span tagging everything logged during one run with its id and mode.
pub fn run_span(run_id: &str, mode: &str) -> tracing::Span {
    tracing::info_span!("pageaudit.run", run_id = %run_id, mode = %mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_tagged() {
        let event = PipelineEvent::PhaseStarted {
            phase: Phase::SaveArtifacts,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "event": "phase_started", "phase": "save_artifacts" })
        );
    }

    #[test]
    fn test_tracing_observer_accepts_every_event() {
        let observer = TracingObserver;
        observer.on_event(&PipelineEvent::warning("insecure"));
        observer.on_event(&PipelineEvent::AuditFinished {
            name: "viewport".to_string(),
            description: "HTML has a viewport meta tag".to_string(),
            ok: false,
        });
        NullObserver.on_event(&PipelineEvent::PhaseStarted { phase: Phase::Gather });
    }

    #[test]
    fn test_run_span_create() {
        let _entered = run_span("test-run-id", "results_only").entered();
    }
}
