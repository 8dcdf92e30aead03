//! Registry of audits available to a run.
//!
//! The catalog is built once at startup and handed to whatever turns audit
//! names from configuration into descriptors. [`list_audit_names`] covers
//! the on-disk discovery case: audit definition files dropped into a
//! directory are recognised by their suffix.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use super::builtin::BuiltinAudit;
use super::Audit;
use crate::error::{PipelineError, Result};

/// File names recognised as audit definitions. Capture group 1 is the name.
pub const AUDIT_FILE_PATTERN: &str = r"^([A-Za-z0-9][A-Za-z0-9_-]*)\.audit\.json$";

#[derive(Clone, Default)]
pub struct AuditCatalog {
    audits: BTreeMap<String, Arc<dyn Audit>>,
}

impl AuditCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog containing every [`BuiltinAudit`].
    pub fn builtin() -> Self {
        BuiltinAudit::ALL
            .into_iter()
            .fold(Self::new(), |catalog, audit| catalog.with_audit(audit))
    }

    /// Register an audit. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, audit: Arc<dyn Audit>) {
        let name = audit.name().to_string();
        if self.audits.insert(name.clone(), audit).is_some() {
            debug!(audit = %name, "Replaced audit in catalog");
        }
    }

    pub fn with_audit<A: Audit + 'static>(mut self, audit: A) -> Self {
        self.register(Arc::new(audit));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Audit>> {
        self.audits.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.audits.contains_key(name)
    }

    /// Names of every registered audit, sorted.
    pub fn names(&self) -> Vec<String> {
        self.audits.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.audits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audits.is_empty()
    }

    /// Resolve configured audit names into descriptors, preserving order.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Audit>>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name)
                    .ok_or_else(|| PipelineError::UnknownAudit(name.to_string()))
            })
            .collect()
    }
}

impl std::fmt::Debug for AuditCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditCatalog")
            .field("audits", &self.audits.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// List audit names defined by files in `dir`.
///
/// Only entries matching [`AUDIT_FILE_PATTERN`] are returned, sorted by name.
/// An absent or unreadable directory is an error.
pub fn list_audit_names(dir: &Path) -> Result<Vec<String>> {
    let pattern = Regex::new(AUDIT_FILE_PATTERN)
        .map_err(|e| PipelineError::Config(format!("audit file pattern: {e}")))?;

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(caps) = pattern.captures(file_name) {
            names.push(caps[1].to_string());
        }
    }
    names.sort();

    debug!(dir = %dir.display(), count = names.len(), "Listed audit definitions");
    Ok(names)
}
