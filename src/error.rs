//! Error taxonomy for a load job.
//!
//! Fatal conditions are variants of [`LoadError`]. Per-record write failures
//! never show up here: they are absorbed into
//! [`WriteOutcome`](crate::writer::WriteOutcome) values and only surface in
//! aggregate through [`BatchReport`](crate::collector::BatchReport).

use std::fmt;

/// Fatal errors that terminate a job or prevent it from starting.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The source table does not exist or cannot be parsed.
    SourceUnavailable { path: String, message: String },
    /// A required field is missing, has an incompatible type, or holds a null.
    SchemaMismatch {
        field: String,
        expected: String,
        found: String,
    },
    /// The source table has no rows.
    EmptySource { path: String },
    /// A configuration value is out of range or malformed.
    InvalidConfiguration { setting: String, message: String },
    /// No write path to the store could be established.
    StoreUnreachable { message: String },
    /// The operator interrupted the job.
    Interrupted,
}

impl LoadError {
    pub fn invalid_config(setting: &str, message: impl Into<String>) -> Self {
        LoadError::InvalidConfiguration {
            setting: setting.to_string(),
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        LoadError::StoreUnreachable {
            message: message.into(),
        }
    }

    /// Returns true for errors raised before any store session is opened.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            LoadError::SourceUnavailable { .. }
                | LoadError::SchemaMismatch { .. }
                | LoadError::EmptySource { .. }
                | LoadError::InvalidConfiguration { .. }
        )
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::SourceUnavailable { path, message } => {
                write!(f, "source unavailable: {path}: {message}")
            }
            LoadError::SchemaMismatch {
                field,
                expected,
                found,
            } => {
                write!(f, "schema mismatch: {field}: expected {expected}, found {found}")
            }
            LoadError::EmptySource { path } => {
                write!(f, "source is empty: {path}")
            }
            LoadError::InvalidConfiguration { setting, message } => {
                write!(f, "invalid configuration: {setting}: {message}")
            }
            LoadError::StoreUnreachable { message } => {
                write!(f, "store unreachable: {message}")
            }
            LoadError::Interrupted => write!(f, "interrupted by operator"),
        }
    }
}

impl std::error::Error for LoadError {}

pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_display() {
        let error = LoadError::SchemaMismatch {
            field: "quantity".to_string(),
            expected: "integer".to_string(),
            found: "Utf8".to_string(),
        };
        assert_eq!(
            format!("{error}"),
            "schema mismatch: quantity: expected integer, found Utf8"
        );
    }

    #[test]
    fn test_invalid_config_display() {
        let error = LoadError::invalid_config("batch_size", "must be at least 1");
        assert_eq!(
            format!("{error}"),
            "invalid configuration: batch_size: must be at least 1"
        );
    }

    #[test]
    fn test_preflight_classification() {
        assert!(LoadError::EmptySource {
            path: "x".to_string()
        }
        .is_preflight());
        assert!(!LoadError::unreachable("down").is_preflight());
        assert!(!LoadError::Interrupted.is_preflight());
    }
}
