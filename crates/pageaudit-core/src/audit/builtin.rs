//! Audits bundled with pageaudit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{bool_artifact, Audit, AuditResult};
use crate::artifacts::Artifacts;
use crate::error::AuditError;

/// Builtin audits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinAudit {
    /// Page is served over HTTPS.
    IsOnHttps,

    /// Document has a non-empty `<title>`.
    DocumentTitle,

    /// Main document responded with a non-error status code.
    HttpStatusCode,

    /// Document declares `<meta name="viewport">`.
    Viewport,
}

impl BuiltinAudit {
    pub const ALL: [BuiltinAudit; 4] = [
        BuiltinAudit::IsOnHttps,
        BuiltinAudit::DocumentTitle,
        BuiltinAudit::HttpStatusCode,
        BuiltinAudit::Viewport,
    ];

    /// Get the audit name as a string.
    pub fn id(&self) -> &'static str {
        match self {
            BuiltinAudit::IsOnHttps => "is-on-https",
            BuiltinAudit::DocumentTitle => "document-title",
            BuiltinAudit::HttpStatusCode => "http-status-code",
            BuiltinAudit::Viewport => "viewport",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            BuiltinAudit::IsOnHttps => "Site is on HTTPS",
            BuiltinAudit::DocumentTitle => "Document has a title element",
            BuiltinAudit::HttpStatusCode => "Page has a successful HTTP status code",
            BuiltinAudit::Viewport => "HTML has a viewport meta tag",
        }
    }

    /// Artifact each audit reads.
    pub fn required_artifact(&self) -> &'static str {
        match self {
            BuiltinAudit::IsOnHttps => "HTTPS",
            BuiltinAudit::DocumentTitle => "Title",
            BuiltinAudit::HttpStatusCode => "StatusCode",
            BuiltinAudit::Viewport => "Viewport",
        }
    }

    fn evaluate(&self, artifacts: &Artifacts) -> Result<AuditResult, AuditError> {
        let artifact = self.required_artifact();
        let result = match self {
            BuiltinAudit::IsOnHttps | BuiltinAudit::Viewport => {
                let value = bool_artifact(artifacts, artifact)?;
                AuditResult::new(self.id(), self.summary(), json!(value))
            }
            BuiltinAudit::DocumentTitle => {
                let title = artifacts
                    .get(artifact)
                    .ok_or_else(|| AuditError::MissingArtifact(artifact.to_string()))?;
                match title {
                    serde_json::Value::Null => {
                        AuditResult::new(self.id(), self.summary(), json!(false))
                            .with_debug_string("No <title> element found")
                    }
                    serde_json::Value::String(t) => {
                        let trimmed = t.trim();
                        let result =
                            AuditResult::new(self.id(), self.summary(), json!(!trimmed.is_empty()));
                        if trimmed.is_empty() {
                            result.with_debug_string("<title> element is empty")
                        } else {
                            result.with_display_value(trimmed)
                        }
                    }
                    _ => {
                        return Err(AuditError::InvalidArtifact {
                            name: artifact.to_string(),
                            expected: "string or null".to_string(),
                        })
                    }
                }
            }
            BuiltinAudit::HttpStatusCode => {
                let code = artifacts
                    .get(artifact)
                    .ok_or_else(|| AuditError::MissingArtifact(artifact.to_string()))?
                    .as_u64()
                    .ok_or_else(|| AuditError::InvalidArtifact {
                        name: artifact.to_string(),
                        expected: "unsigned integer".to_string(),
                    })?;
                AuditResult::new(self.id(), self.summary(), json!(code < 400))
                    .with_display_value(code.to_string())
            }
        };
        Ok(result)
    }
}

impl std::str::FromStr for BuiltinAudit {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuiltinAudit::ALL
            .into_iter()
            .find(|a| a.id() == s)
            .ok_or_else(|| AuditError::Failed(format!("no builtin audit named {s}")))
    }
}

#[async_trait]
impl Audit for BuiltinAudit {
    fn name(&self) -> &str {
        self.id()
    }

    fn description(&self) -> &str {
        self.summary()
    }

    async fn audit(&self, artifacts: &Artifacts) -> Result<AuditResult, AuditError> {
        self.evaluate(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_builtin_audit_names() {
        assert_eq!(BuiltinAudit::IsOnHttps.id(), "is-on-https");
        assert_eq!(BuiltinAudit::DocumentTitle.id(), "document-title");
        assert_eq!(BuiltinAudit::HttpStatusCode.id(), "http-status-code");
        assert_eq!(BuiltinAudit::Viewport.id(), "viewport");
    }

    #[test]
    fn test_builtin_audit_from_str() {
        let audit: BuiltinAudit = "viewport".parse().unwrap();
        assert_eq!(audit, BuiltinAudit::Viewport);
        assert!("no-such-audit".parse::<BuiltinAudit>().is_err());
    }

    #[tokio::test]
    async fn test_is_on_https() {
        let artifacts = Artifacts::new().with("HTTPS", json!(false));
        let result = BuiltinAudit::IsOnHttps.audit(&artifacts).await.unwrap();
        assert_eq!(result.name, "is-on-https");
        assert_eq!(result.value, json!(false));
    }

    #[tokio::test]
    async fn test_document_title_variants() {
        let present = Artifacts::new().with("Title", json!("  Example Domain "));
        let result = BuiltinAudit::DocumentTitle.audit(&present).await.unwrap();
        assert_eq!(result.value, json!(true));
        assert_eq!(result.display_value.as_deref(), Some("Example Domain"));

        let empty = Artifacts::new().with("Title", json!(""));
        let result = BuiltinAudit::DocumentTitle.audit(&empty).await.unwrap();
        assert_eq!(result.value, json!(false));

        let missing = Artifacts::new().with("Title", Value::Null);
        let result = BuiltinAudit::DocumentTitle.audit(&missing).await.unwrap();
        assert_eq!(result.value, json!(false));
        assert!(result.debug_string.is_some());
    }

    #[tokio::test]
    async fn test_http_status_code() {
        let ok = Artifacts::new().with("StatusCode", json!(200));
        let result = BuiltinAudit::HttpStatusCode.audit(&ok).await.unwrap();
        assert_eq!(result.value, json!(true));
        assert_eq!(result.display_value.as_deref(), Some("200"));

        let not_found = Artifacts::new().with("StatusCode", json!(404));
        let result = BuiltinAudit::HttpStatusCode.audit(&not_found).await.unwrap();
        assert_eq!(result.value, json!(false));
    }

    #[tokio::test]
    async fn test_missing_artifact_is_an_error() {
        let err = BuiltinAudit::Viewport
            .audit(&Artifacts::new())
            .await
            .unwrap_err();
        assert_eq!(err, AuditError::MissingArtifact("Viewport".to_string()));
    }
}
