// mdr-common/src/dependency/message.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MdrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Warning => f.write_str("WARNING"),
            Severity::Error => f.write_str("ERROR"),
        }
    }
}

/// A diagnostic attached to a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier, e.g. `ChecksumMismatch`.
    pub id: String,
    pub text: String,
    pub severity: Severity,
    /// What the message is about, usually the node's coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Message {
    pub fn new(id: impl Into<String>, text: impl Into<String>, severity: Severity) -> Self {
        Self { id: id.into(), text: text.into(), severity, source: None }
    }

    pub fn info(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, text, Severity::Info)
    }

    pub fn warning(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, text, Severity::Warning)
    }

    pub fn error(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, text, Severity::Error)
    }

    pub fn from_error(err: &MdrError, severity: Severity) -> Self {
        Self::new(err.kind(), err.to_string(), severity)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {} ({})", self.severity, self.text, source),
            None => write!(f, "{}: {}", self.severity, self.text),
        }
    }
}
