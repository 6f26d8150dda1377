// src/error.rs
//! Application error types with structured error handling.
//!
//! Error types form the vocabulary for failure modes in the system.
//! Each variant tells the story of what went wrong and where: schema
//! resolution, validation, or the paginated fetch loop.

use thiserror::Error;

/// A single field-level validation problem.
///
/// Validators report *every* problem they find, not just the first;
/// these are aggregated into one message when surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// `load()` was called for a name no factory was registered under.
    ///
    /// This variant is recorded in the cache's error map and never
    /// returned from `load()` itself — missing registrations degrade to a
    /// permissive fallback validator so read paths keep working.
    #[error("No schema registered under name '{name}'")]
    SchemaNotRegistered { name: String },

    #[error("Schema '{schema}' rejected value: {message}")]
    SchemaValidation { schema: String, message: String },

    #[error("Schema factory for '{name}' failed: {cause}")]
    SchemaLoadFailed { name: String, cause: String },

    #[error("Fetch failed after {attempts} attempt(s): {cause}")]
    FetchFailed { attempts: u32, cause: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Internal error: {message}")]
    InternalError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl AppError {
    /// Builds a `SchemaValidation` error aggregating all field-level
    /// problems into one message naming the schema.
    pub fn validation_failed(schema: &str, problems: &[FieldError]) -> Self {
        let message = problems
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        AppError::SchemaValidation {
            schema: schema.to_string(),
            message,
        }
    }
}

// Allow converting from anyhow::Error, preserving the message
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError {
            message: err.to_string(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedResponse(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn validation_error_aggregates_all_field_problems() {
        let problems = vec![
            FieldError::new("title", "required field missing"),
            FieldError::new("count", "expected number, got string"),
        ];
        let err = AppError::validation_failed("task", &problems);
        assert_eq!(
            err.to_string(),
            "Schema 'task' rejected value: title: required field missing; \
             count: expected number, got string"
        );
    }

    #[test]
    fn fetch_failed_names_attempt_count() {
        let err = AppError::FetchFailed {
            attempts: 4,
            cause: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Fetch failed after 4 attempt(s): connection reset"
        );
    }
}
