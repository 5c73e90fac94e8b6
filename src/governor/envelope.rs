//! Uniform response envelope returned for every governed call

use crate::error::Error;
use crate::tokens::TokenEstimator;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope wrapping every operation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernedResponse {
    pub tool: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Tokens of the returned payload
    pub tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl GovernedResponse {
    pub fn success(tool: impl Into<String>, result: Value, tokens: usize) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            result: Some(result),
            tokens,
            truncated: None,
            original_count: None,
            truncated_count: None,
            error: None,
            error_type: None,
        }
    }

    pub fn failure(
        tool: impl Into<String>,
        error: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            result: None,
            tokens: 0,
            truncated: None,
            original_count: None,
            truncated_count: None,
            error: Some(error.into()),
            error_type: Some(error_type.into()),
        }
    }

    pub fn from_error(tool: impl Into<String>, err: &Error) -> Self {
        Self::failure(tool, err.to_string(), err.error_type())
    }

    /// Mark the payload as a truncated prefix of `original_count` items
    pub fn with_truncation(mut self, original_count: usize, truncated_count: usize) -> Self {
        self.truncated = Some(true);
        self.original_count = Some(original_count);
        self.truncated_count = Some(truncated_count);
        self
    }

    /// Tokens of the whole envelope in its compact wire form
    pub fn measure(&self, estimator: &dyn TokenEstimator) -> usize {
        serde_json::to_string(self)
            .map(|text| estimator.estimate(&text))
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_omits_absent_fields() {
        let response = GovernedResponse::success("stage_data", json!({"cache_key": "k"}), 4);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"tool": "stage_data", "success": true, "result": {"cache_key": "k"}, "tokens": 4})
        );
    }

    #[test]
    fn test_failure_from_error() {
        let response = GovernedResponse::from_error("dataframe_query", &Error::CacheMiss("k".into()));
        assert!(!response.success);
        assert_eq!(response.error_type.as_deref(), Some("CacheMiss"));
        assert!(response.result.is_none());
    }

    #[test]
    fn test_truncation_fields() {
        let response = GovernedResponse::success("t", json!([1]), 1).with_truncation(10, 1);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["truncated"], json!(true));
        assert_eq!(value["original_count"], json!(10));
        assert_eq!(value["truncated_count"], json!(1));
    }
}
