//! Error types for filter compilation and report processing.

use crate::models::CpcLevel;

/// A malformed filter specification.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid range for {field}: lower bound is greater than upper bound")]
    InvalidRange { field: &'static str },

    #[error("unknown patent office: {0}")]
    UnknownOffice(String),

    #[error("unknown patent type: {0}")]
    UnknownType(String),

    #[error("keyword list contains a blank keyword")]
    BlankKeyword,

    #[error("invalid keyword pattern {keyword:?}: {reason}")]
    InvalidKeyword { keyword: String, reason: String },

    #[error("invalid {field} location: {reason}")]
    InvalidLocation { field: &'static str, reason: String },

    #[error("unknown CPC {} codes: {}", .level.as_str(), .codes.join(", "))]
    UnknownCpc { level: CpcLevel, codes: Vec<String> },
}

/// Everything that can go wrong while submitting or processing a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("invalid filters: {0}")]
    Validation(#[from] FilterError),

    #[error(
        "Too many patents ({count}) to process please narrow down your search. \
         The maximum number of patents the server will process is {max}."
    )]
    Capacity { count: usize, max: usize },

    #[error("{0}")]
    Compute(String),

    #[error("report {0} not found")]
    NotFound(i64),

    #[error("report {0} has no topic model results yet")]
    TopicsNotReady(i64),

    #[error("invalid topic parameters: {0}")]
    InvalidTopicParams(String),
}

impl ReportError {
    /// Only unexpected compute failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReportError::Compute(_))
    }

    pub fn compute(err: impl std::fmt::Display) -> Self {
        ReportError::Compute(err.to_string())
    }
}

impl From<anyhow::Error> for ReportError {
    fn from(err: anyhow::Error) -> Self {
        ReportError::Compute(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_message_names_both_numbers() {
        let msg = ReportError::Capacity { count: 12, max: 10 }.to_string();
        assert!(msg.starts_with("Too many patents (12)"));
        assert!(msg.ends_with("will process is 10."));
    }

    #[test]
    fn only_compute_errors_are_retryable() {
        assert!(ReportError::Compute("boom".into()).is_retryable());
        assert!(!ReportError::Capacity { count: 2, max: 1 }.is_retryable());
        assert!(!ReportError::NotFound(1).is_retryable());
        assert!(!ReportError::Validation(FilterError::BlankKeyword).is_retryable());
    }
}
