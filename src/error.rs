use serde::Serialize;

/// Failures surfaced by the archive fetcher. A failed fetch never leaves a
/// partial archive behind.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("HTTP {status}: {url}")]
    Status { status: u16, url: String },
    #[error("malformed update pointer: {0}")]
    MalformedPointer(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Status { .. } => "http_status",
            FetchError::MalformedPointer(_) => "malformed_pointer",
            FetchError::Io(_) => "io",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Validation failures on user-supplied query input. Distinct from "no data",
/// which is an empty result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid {field} '{value}': use YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },
    #[error("date range spans {days} days, limit is {limit}")]
    RangeTooLarge { days: i64, limit: i64 },
}

impl QueryError {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::InvalidDate { .. } => "invalid_date",
            QueryError::RangeTooLarge { .. } => "range_too_large",
        }
    }
}

/// Wire shape for any user-visible failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&FetchError> for ErrorBody {
    fn from(err: &FetchError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<&QueryError> for ErrorBody {
    fn from(err: &QueryError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_body_is_tagged() {
        let err = QueryError::InvalidDate {
            field: "start_date",
            value: "2024/01/01".to_string(),
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.kind, "invalid_date");
        assert!(body.message.contains("2024/01/01"));
    }

    #[test]
    fn fetch_error_kinds_are_stable() {
        let status = FetchError::Status {
            status: 404,
            url: "http://x/y".to_string(),
        };
        assert_eq!(status.kind(), "http_status");
        assert_eq!(FetchError::MalformedPointer("".into()).kind(), "malformed_pointer");
        assert_eq!(ErrorBody::from(&status).message, "HTTP 404: http://x/y");
    }
}
