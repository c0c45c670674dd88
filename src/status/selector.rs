//! Label selector evaluation

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::error::{Error, Result};

/// Match a selector against a label set
///
/// Supports `matchLabels` and `matchExpressions`. An unknown operator, or
/// `In`/`NotIn` without values, is a malformed selector.
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> Result<bool> {
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.as_deref().unwrap_or_default();
        let label = labels.get(&expr.key);
        let matched = match expr.operator.as_str() {
            "In" | "NotIn" if values.is_empty() => {
                return Err(Error::SelectorError(format!(
                    "operator {} on key {:?} requires values",
                    expr.operator, expr.key
                )))
            }
            "In" => label.map(|v| values.contains(v)).unwrap_or(false),
            "NotIn" => !label.map(|v| values.contains(v)).unwrap_or(false),
            "Exists" => label.is_some(),
            "DoesNotExist" => label.is_none(),
            other => {
                return Err(Error::SelectorError(format!(
                    "unknown operator {:?} on key {:?}",
                    other, expr.key
                )))
            }
        };
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Render labels as an equality-based selector string, e.g. `app=sdn,component=network`
pub fn label_selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
