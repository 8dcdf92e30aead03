//! Audit descriptors, results and the catalog that names them.
//!
//! An audit is a pure evaluation over [`Artifacts`]. The pipeline only reads
//! an audit's `name` and `description`; everything else in an
//! [`AuditResult`] is passed through to the report untouched.

pub mod builtin;
pub mod catalog;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifacts::Artifacts;
use crate::error::AuditError;

pub use catalog::{list_audit_names, AuditCatalog, AUDIT_FILE_PATTERN};

/// Outcome of a single audit, keyed in the report by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_string: Option<String>,
    /// Set only when the audit failed and the run isolates audit failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditResult {
    pub fn new(name: impl Into<String>, description: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            value,
            display_value: None,
            debug_string: None,
            error: None,
        }
    }

    /// Result recorded in place of an audit that failed or timed out.
    pub fn from_failure(audit: &dyn Audit, err: &dyn fmt::Display) -> Self {
        Self {
            name: audit.name().to_string(),
            description: audit.description().to_string(),
            value: Value::Null,
            display_value: None,
            debug_string: None,
            error: Some(err.to_string()),
        }
    }

    pub fn with_display_value(mut self, display: impl Into<String>) -> Self {
        self.display_value = Some(display.into());
        self
    }

    pub fn with_debug_string(mut self, debug: impl Into<String>) -> Self {
        self.debug_string = Some(debug.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A named evaluation step over gathered artifacts.
///
/// Implementations that have nothing to await can simply return; see
/// [`FnAudit`] for wrapping a synchronous closure.
#[async_trait]
pub trait Audit: Send + Sync {
    /// Stable identifier; becomes the key in the report's `audits` map.
    fn name(&self) -> &str;

    /// Human-readable description used for status messages.
    fn description(&self) -> &str;

    async fn audit(&self, artifacts: &Artifacts) -> Result<AuditResult, AuditError>;
}

type SyncAuditFn = dyn Fn(&Artifacts) -> Result<AuditResult, AuditError> + Send + Sync;

/// Adapts a synchronous function into an [`Audit`].
pub struct FnAudit {
    name: String,
    description: String,
    func: Box<SyncAuditFn>,
}

impl FnAudit {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Artifacts) -> Result<AuditResult, AuditError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAudit")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Audit for FnAudit {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn audit(&self, artifacts: &Artifacts) -> Result<AuditResult, AuditError> {
        (self.func)(artifacts)
    }
}

/// Read a boolean artifact or fail with the matching [`AuditError`].
pub(crate) fn bool_artifact(artifacts: &Artifacts, name: &str) -> Result<bool, AuditError> {
    artifacts
        .get(name)
        .ok_or_else(|| AuditError::MissingArtifact(name.to_string()))?
        .as_bool()
        .ok_or_else(|| AuditError::InvalidArtifact {
            name: name.to_string(),
            expected: "boolean".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_audit_runs_closure() {
        let audit = FnAudit::new("always-true", "Always passes", |_| {
            Ok(AuditResult::new("always-true", "Always passes", json!(true)))
        });
        let result = audit.audit(&Artifacts::new()).await.unwrap();
        assert_eq!(result.name, "always-true");
        assert_eq!(result.value, json!(true));
    }

    #[test]
    fn test_failure_result_carries_error_message() {
        let audit = FnAudit::new("x", "X audit", |_| Err(AuditError::Failed("boom".into())));
        let result = AuditResult::from_failure(&audit, &AuditError::Failed("boom".into()));
        assert!(result.is_error());
        assert_eq!(result.value, Value::Null);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_audit_result_serializes_camel_case() {
        let result = AuditResult::new("viewport", "Has a viewport", json!(true))
            .with_display_value("present");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["displayValue"], json!("present"));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_bool_artifact_errors() {
        let artifacts = Artifacts::new().with("HTTPS", json!("yes"));
        assert_eq!(
            bool_artifact(&artifacts, "Viewport"),
            Err(AuditError::MissingArtifact("Viewport".to_string()))
        );
        assert!(matches!(
            bool_artifact(&artifacts, "HTTPS"),
            Err(AuditError::InvalidArtifact { .. })
        ));
    }
}
