//! Classification of policy-engine write results.
//!
//! Every write or delete call site runs its result through
//! [`classify_write_error`] before aggregating it, so a duplicate tuple never
//! shows up as a failure.

use crate::error::{EngineError, WRITE_FAILED_DUE_TO_INVALID_INPUT};

/// Outcome of a single write or delete.
#[derive(Debug, Clone)]
pub enum WriteClassification {
    /// The write was applied.
    Success,
    /// The tuple already existed (or was already absent, for deletes).
    AlreadyExists,
    /// Any other failure.
    Fatal(EngineError),
}

impl WriteClassification {
    /// True for `Success` and `AlreadyExists`.
    pub fn is_ok(&self) -> bool {
        !matches!(self, WriteClassification::Fatal(_))
    }

    /// Label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteClassification::Success => "success",
            WriteClassification::AlreadyExists => "already_exists",
            WriteClassification::Fatal(_) => "error",
        }
    }
}

/// Classifies the result of a write call.
pub fn classify_write_error(result: Result<(), EngineError>) -> WriteClassification {
    match result {
        Ok(()) => WriteClassification::Success,
        Err(err) if err.code() == Some(WRITE_FAILED_DUE_TO_INVALID_INPUT) => {
            WriteClassification::AlreadyExists
        }
        Err(err) => WriteClassification::Fatal(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success() {
        assert!(matches!(
            classify_write_error(Ok(())),
            WriteClassification::Success
        ));
    }

    #[test]
    fn test_duplicate_is_already_exists() {
        let result = classify_write_error(Err(EngineError::duplicate_write("tuple exists")));
        assert!(matches!(result, WriteClassification::AlreadyExists));
        assert!(result.is_ok());
    }

    #[test]
    fn test_other_api_codes_are_fatal() {
        let result = classify_write_error(Err(EngineError::Api {
            status: 400,
            code: "validation_error".to_string(),
            message: "bad relation".to_string(),
        }));
        assert!(matches!(result, WriteClassification::Fatal(_)));
        assert!(!result.is_ok());
    }

    #[test]
    fn test_transport_errors_are_fatal() {
        let result = classify_write_error(Err(EngineError::Transport {
            message: "connection refused".to_string(),
        }));
        assert_eq!(result.as_str(), "error");
    }
}
