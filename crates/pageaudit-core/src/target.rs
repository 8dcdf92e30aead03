//! Target URL normalization.

use url::Url;

use crate::error::{PipelineError, Result};

/// Advisory messages emitted for targets that are not served securely.
pub const INSECURE_TARGET_WARNINGS: [&str; 2] = [
    "The URL provided should be on HTTPS",
    "Performance stats will be skewed redirecting from HTTP to HTTPS.",
];

/// The URL a run was asked to audit, both as supplied and canonicalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    initial: String,
    canonical: Url,
}

impl TargetUrl {
    /// Parse and canonicalize `raw`. `raw` is kept verbatim as the initial URL.
    pub fn parse(raw: &str) -> Result<Self> {
        let canonical = Url::parse(raw).map_err(|e| PipelineError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            initial: raw.to_string(),
            canonical,
        })
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    pub fn canonical(&self) -> &Url {
        &self.canonical
    }

    pub fn as_str(&self) -> &str {
        self.canonical.as_str()
    }

    pub fn host(&self) -> Option<&str> {
        self.canonical.host_str()
    }

    /// Whether measuring this target should come with a warning.
    ///
    /// Non-fatal: the run proceeds either way.
    pub fn is_insecure(&self) -> bool {
        self.canonical.scheme() != "https" || self.host() == Some("http://localhost")
    }
}

impl std::fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_adds_trailing_slash() {
        let target = TargetUrl::parse("http://example.com").unwrap();
        assert_eq!(target.initial(), "http://example.com");
        assert_eq!(target.as_str(), "http://example.com/");
        assert!(target.is_insecure());
    }

    #[test]
    fn test_https_is_not_insecure() {
        let target = TargetUrl::parse("https://example.com/").unwrap();
        assert_eq!(target.as_str(), "https://example.com/");
        assert!(!target.is_insecure());
    }

    #[test]
    fn test_canonical_lowercases_host() {
        let target = TargetUrl::parse("HTTPS://Example.COM/path?q=1").unwrap();
        assert_eq!(target.as_str(), "https://example.com/path?q=1");
        assert_eq!(target.host(), Some("example.com"));
    }

    #[test]
    fn test_invalid_url() {
        let err = TargetUrl::parse("not a url").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl { .. }));
    }
}
