use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MdrError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("XML Parsing Error: {0}")]
    Xml(String),

    #[error("Archive Error: {0}")]
    Zip(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid coordinates '{0}': {1}")]
    InvalidCoordinates(String, String),

    #[error("Invalid version '{0}': {1}")]
    InvalidVersion(String, String),

    #[error("'{0}' was not found in repository {1}")]
    NotFoundInRepository(String, String),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    DownloadError(String, String, String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Malformed metadata in {0}: {1}")]
    MalformedMetadata(String, String),

    #[error("Unresolved version conflict: {0}")]
    VersionConflictUnresolved(String),

    #[error("Ambiguous variant: {0}")]
    AmbiguousVariant(String),

    #[error("No matching variant: {0}")]
    NoMatchingVariant(String),

    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("Cache Error: {0}")]
    Cache(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("Resolution was cancelled")]
    Cancelled,

    #[error("Resolution failed: {primary}{}", format_suppressed(.suppressed))]
    ResolutionFailed {
        primary: String,
        suppressed: Vec<String>,
    },

    #[error("Generic Error: {0}")]
    Generic(String),
}

fn format_suppressed(suppressed: &[String]) -> String {
    if suppressed.is_empty() {
        return String::new();
    }
    let mut out = format!(" ({} more)", suppressed.len());
    for message in suppressed {
        out.push_str("\n  suppressed: ");
        out.push_str(message);
    }
    out
}

impl MdrError {
    /// Stable identifier used as the id of diagnostics built from this error.
    pub fn kind(&self) -> &'static str {
        match self {
            MdrError::Io(_) => "Io",
            MdrError::Http(_) => "Http",
            MdrError::Json(_) => "Json",
            MdrError::Xml(_) => "Xml",
            MdrError::Zip(_) => "Zip",
            MdrError::Config(_) => "Config",
            MdrError::InvalidCoordinates(..) => "InvalidCoordinates",
            MdrError::InvalidVersion(..) => "InvalidVersion",
            MdrError::NotFoundInRepository(..) => "NotFoundInRepository",
            MdrError::DownloadError(..) => "DownloadError",
            MdrError::ChecksumMismatch(_) => "ChecksumMismatch",
            MdrError::MalformedMetadata(..) => "MalformedMetadata",
            MdrError::VersionConflictUnresolved(_) => "VersionConflictUnresolved",
            MdrError::AmbiguousVariant(_) => "AmbiguousVariant",
            MdrError::NoMatchingVariant(_) => "NoMatchingVariant",
            MdrError::CyclicDependency(_) => "CyclicDependency",
            MdrError::Cache(_) => "Cache",
            MdrError::ValidationError(_) => "ValidationError",
            MdrError::Cancelled => "Cancelled",
            MdrError::ResolutionFailed { .. } => "ResolutionFailed",
            MdrError::Generic(_) => "Generic",
        }
    }

    /// Transient failures are worth another attempt against the same repository.
    pub fn is_transient(&self) -> bool {
        match self {
            MdrError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            MdrError::DownloadError(_, _, reason) => reason.starts_with("HTTP 5"),
            _ => false,
        }
    }
}

impl From<std::io::Error> for MdrError {
    fn from(err: std::io::Error) -> Self {
        MdrError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for MdrError {
    fn from(err: reqwest::Error) -> Self {
        MdrError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for MdrError {
    fn from(err: serde_json::Error) -> Self {
        MdrError::Json(Arc::new(err))
    }
}

impl From<roxmltree::Error> for MdrError {
    fn from(err: roxmltree::Error) -> Self {
        MdrError::Xml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MdrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_failed_lists_suppressed_errors() {
        let err = MdrError::ResolutionFailed {
            primary: "first".to_string(),
            suppressed: vec!["second".to_string(), "third".to_string()],
        };
        let text = err.to_string();
        assert!(text.starts_with("Resolution failed: first (2 more)"));
        assert!(text.contains("suppressed: second"));
        assert!(text.contains("suppressed: third"));
    }

    #[test]
    fn only_server_side_download_errors_are_transient() {
        let e5 = MdrError::DownloadError("a".into(), "b".into(), "HTTP 503".into());
        let e4 = MdrError::DownloadError("a".into(), "b".into(), "HTTP 403".into());
        assert!(e5.is_transient());
        assert!(!e4.is_transient());
        assert!(!MdrError::Cancelled.is_transient());
    }
}
