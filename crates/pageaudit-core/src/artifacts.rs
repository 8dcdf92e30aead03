//! Gathered page data consumed by audits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Artifacts collected from a page, keyed by artifact name.
///
/// Produced by a [`Gatherer`](crate::gather::Gatherer) or supplied directly
/// in configuration. The pipeline shares one instance behind an `Arc` and
/// never mutates it after resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifacts(BTreeMap<String, Value>);

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Artifacts {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Artifacts(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_artifacts_serialize_as_plain_map() {
        let artifacts = Artifacts::new()
            .with("HTTPS", json!(true))
            .with("Title", json!("Example Domain"));

        let value = serde_json::to_value(&artifacts).unwrap();
        assert_eq!(value, json!({ "HTTPS": true, "Title": "Example Domain" }));

        let back: Artifacts = serde_json::from_value(value).unwrap();
        assert_eq!(back, artifacts);
    }

    #[test]
    fn test_artifact_names_are_sorted() {
        let artifacts = Artifacts::new()
            .with("Viewport", json!(false))
            .with("HTML", json!("<html></html>"));
        let names: Vec<&str> = artifacts.names().collect();
        assert_eq!(names, vec!["HTML", "Viewport"]);
    }
}
