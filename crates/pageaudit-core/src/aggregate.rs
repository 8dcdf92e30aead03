//! Folding audit results into scored aggregations.
//!
//! The coordinator treats [`AggregationSpec`] and [`AggregationResult`] as
//! opaque: it hands the specs and the audit results to an [`Aggregator`] and
//! puts whatever comes back into the report unchanged.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditResult;
use crate::error::AggregateError;

/// How one audit contributes to an aggregation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditExpectation {
    pub expected_value: Value,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// A group of audits scored together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub audits: BTreeMap<String, AuditExpectation>,
}

/// Configuration for one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_scored")]
    pub scored: bool,
    #[serde(default)]
    pub items: Vec<AggregationItem>,
}

fn default_scored() -> bool {
    true
}

/// Contribution of one audit to a scored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditScore {
    pub name: String,
    pub value: Value,
    pub expected_value: Value,
    pub weight: f64,
    pub passed: bool,
}

/// Score of a single aggregation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub name: String,
    pub description: String,
    /// Weighted share of passing audits, 0.0–1.0.
    pub overall: f64,
    pub audits: Vec<AuditScore>,
}

/// Output of an [`Aggregator`] for one [`AggregationSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub name: String,
    pub description: String,
    pub scored: bool,
    /// Mean of the item scores, 0.0–1.0.
    pub total: f64,
    pub items: Vec<ItemScore>,
}

/// Summarizes audit results into higher-level groupings.
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Returns one result per spec, in spec order.
    async fn aggregate(
        &self,
        specs: &[AggregationSpec],
        results: &[AuditResult],
    ) -> Result<Vec<AggregationResult>, AggregateError>;
}

/// Scores each item as the weighted share of audits whose value equals the
/// expected value.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedAggregator;

impl WeightedAggregator {
    pub fn new() -> Self {
        Self
    }

    fn score_spec(
        spec: &AggregationSpec,
        by_name: &HashMap<&str, &AuditResult>,
    ) -> Result<AggregationResult, AggregateError> {
        let mut items = Vec::with_capacity(spec.items.len());

        for item in &spec.items {
            let mut audits = Vec::with_capacity(item.audits.len());
            let mut total_weight = 0.0;
            let mut passed_weight = 0.0;

            for (audit_name, expectation) in &item.audits {
                let result = by_name.get(audit_name.as_str()).ok_or_else(|| {
                    AggregateError::MissingAudit {
                        aggregation: spec.name.clone(),
                        audit: audit_name.clone(),
                    }
                })?;

                let passed = !result.is_error() && result.value == expectation.expected_value;
                total_weight += expectation.weight;
                if passed {
                    passed_weight += expectation.weight;
                }

                audits.push(AuditScore {
                    name: audit_name.clone(),
                    value: result.value.clone(),
                    expected_value: expectation.expected_value.clone(),
                    weight: expectation.weight,
                    passed,
                });
            }

            let overall = if total_weight > 0.0 {
                passed_weight / total_weight
            } else {
                0.0
            };

            items.push(ItemScore {
                name: item.name.clone(),
                description: item.description.clone(),
                overall,
                audits,
            });
        }

        let total = if items.is_empty() {
            0.0
        } else {
            items.iter().map(|i| i.overall).sum::<f64>() / items.len() as f64
        };

        Ok(AggregationResult {
            name: spec.name.clone(),
            description: spec.description.clone(),
            scored: spec.scored,
            total,
            items,
        })
    }
}

#[async_trait]
impl Aggregator for WeightedAggregator {
    async fn aggregate(
        &self,
        specs: &[AggregationSpec],
        results: &[AuditResult],
    ) -> Result<Vec<AggregationResult>, AggregateError> {
        let by_name: HashMap<&str, &AuditResult> =
            results.iter().map(|r| (r.name.as_str(), r)).collect();

        specs
            .iter()
            .map(|spec| Self::score_spec(spec, &by_name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> AggregationSpec {
        serde_json::from_value(json!({
            "name": "Best Practices",
            "description": "Basic hygiene",
            "items": [
                {
                    "name": "Secure",
                    "audits": {
                        "is-on-https": { "expectedValue": true, "weight": 3 },
                        "http-status-code": { "expectedValue": true }
                    }
                },
                {
                    "name": "Mobile",
                    "audits": { "viewport": { "expectedValue": true } }
                }
            ]
        }))
        .unwrap()
    }

    fn results(https: bool, status_ok: bool, viewport: bool) -> Vec<AuditResult> {
        vec![
            AuditResult::new("is-on-https", "", json!(https)),
            AuditResult::new("http-status-code", "", json!(status_ok)),
            AuditResult::new("viewport", "", json!(viewport)),
        ]
    }

    #[tokio::test]
    async fn test_weighted_scores() {
        let out = WeightedAggregator
            .aggregate(&[spec()], &results(true, false, true))
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        let agg = &out[0];
        assert!(agg.scored);
        assert_eq!(agg.items[0].overall, 0.75);
        assert_eq!(agg.items[1].overall, 1.0);
        assert_eq!(agg.total, 0.875);
    }

    #[tokio::test]
    async fn test_error_results_never_pass() {
        let mut res = results(true, true, true);
        res[2].error = Some("boom".to_string());
        let out = WeightedAggregator.aggregate(&[spec()], &res).await.unwrap();
        assert_eq!(out[0].items[1].overall, 0.0);
        assert!(!out[0].items[1].audits[0].passed);
    }

    #[tokio::test]
    async fn test_missing_audit_fails() {
        let res = vec![AuditResult::new("is-on-https", "", json!(true))];
        let err = WeightedAggregator
            .aggregate(&[spec()], &res)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::MissingAudit { .. }));
    }

    #[tokio::test]
    async fn test_empty_spec_scores_zero() {
        let empty = AggregationSpec {
            name: "Empty".to_string(),
            description: String::new(),
            scored: false,
            items: vec![],
        };
        let out = WeightedAggregator.aggregate(&[empty], &[]).await.unwrap();
        assert_eq!(out[0].total, 0.0);
        assert!(out[0].items.is_empty());
    }
}
