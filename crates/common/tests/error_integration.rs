//! Integration tests for error module
//!
//! Tests classification of `CommonError` as seen by callers deciding whether
//! to retry a failed backend call.

#![cfg(feature = "foundation")]

use loadstate_common::{CommonError, ErrorClassification, ErrorSeverity};

/// Validates retry decisions across error kinds.
///
/// This test ensures only transient failures are retryable and that
/// configuration mistakes rank above transient failures.
///
/// # Test Steps
/// 1. Build one error of each kind
/// 2. Verify retryability and severity for each
#[test]
fn test_retry_decisions() {
    let transient = CommonError::backend("cache-provider", "connection reset", true);
    let permanent = CommonError::backend("cache-provider", "quota exceeded", false);
    let config = CommonError::config_field("timeout", "must be positive");

    assert!(transient.is_retryable());
    assert!(!permanent.is_retryable());
    assert!(transient.retry_after().is_none());
    assert!(!config.is_retryable());
    assert!(config.severity() > transient.severity());
    assert_eq!(transient.severity(), ErrorSeverity::Warning);
}

/// Validates conversion from serde failures.
///
/// # Test Steps
/// 1. Parse malformed JSON and convert the error with `?`
/// 2. Verify it becomes a serialization error
#[test]
fn test_serde_errors_convert() {
    fn parse(input: &str) -> Result<serde_json::Value, CommonError> {
        Ok(serde_json::from_str(input)?)
    }

    let err = parse("{not json").unwrap_err();
    assert!(matches!(err, CommonError::Serialization { .. }));
    assert!(err.to_string().to_lowercase().contains("serialization"));
}
