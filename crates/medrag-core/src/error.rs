//! Error Taxonomy
//!
//! Every failure mode in the retrieval engine classifies into one of five
//! kinds. The classification, not the message, is what callers at the tool
//! dispatch boundary and the HTTP boundary act on (§7 of the design).

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, MedRagError>;

/// Top-level error taxonomy.
///
/// `InputError` and `ConfigurationError` are caller mistakes and are never
/// retried. `DependencyUnavailable` is retried by the caller's retry policy
/// and, where a fallback exists (lexical search, demo mode, mock
/// embeddings), downgrades instead of propagating. `DataError` is scoped to
/// a single record and never aborts a batch. `InternalError` is the catch-all
/// for anything unexpected; it still never unwinds past a tool handler.
#[derive(Debug, Error)]
pub enum MedRagError {
    /// Bad or empty query, unknown patient id, malformed tool input.
    #[error("invalid input: {0}")]
    InputError(String),

    /// Missing environment variable, unreadable config file, invalid value.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Embedding service, FHIR server, database, or LLM provider unreachable
    /// after exhausting the retry policy.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Malformed DICOM, vector dimension mismatch, or other single-record
    /// data defect.
    #[error("data error: {0}")]
    DataError(String),

    /// Anything else. Caught at the tool-handler boundary and turned into a
    /// `{status: "fail", error}` observation, never a panic.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl MedRagError {
    /// The taxonomy tag, used by the HTTP layer to pick a status code and by
    /// tool envelopes to report `status`.
    pub fn kind(&self) -> &'static str {
        match self {
            MedRagError::InputError(_) => "input_error",
            MedRagError::ConfigurationError(_) => "configuration_error",
            MedRagError::DependencyUnavailable(_) => "dependency_unavailable",
            MedRagError::DataError(_) => "data_error",
            MedRagError::InternalError(_) => "internal_error",
        }
    }

    /// HTTP status code this error should be mapped to by the Chat HTTP API.
    pub fn http_status(&self) -> u16 {
        match self {
            MedRagError::InputError(_) => 400,
            MedRagError::ConfigurationError(_) => 500,
            MedRagError::DependencyUnavailable(_) => 503,
            MedRagError::DataError(_) => 500,
            MedRagError::InternalError(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for MedRagError {
    fn from(err: rusqlite::Error) -> Self {
        MedRagError::DependencyUnavailable(format!("database: {err}"))
    }
}

impl From<reqwest::Error> for MedRagError {
    fn from(err: reqwest::Error) -> Self {
        MedRagError::DependencyUnavailable(format!("http: {err}"))
    }
}

impl From<std::io::Error> for MedRagError {
    fn from(err: std::io::Error) -> Self {
        MedRagError::InternalError(format!("io: {err}"))
    }
}

impl From<serde_json::Error> for MedRagError {
    fn from(err: serde_json::Error) -> Self {
        MedRagError::DataError(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_status_agree_with_taxonomy() {
        assert_eq!(MedRagError::InputError("x".into()).http_status(), 400);
        assert_eq!(
            MedRagError::DependencyUnavailable("x".into()).http_status(),
            503
        );
        assert_eq!(MedRagError::InternalError("x".into()).http_status(), 500);
        assert_eq!(MedRagError::InputError("x".into()).kind(), "input_error");
    }
}
