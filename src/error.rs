//! Error types for the gesture annotator

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for annotator operations
pub type Result<T> = std::result::Result<T, AnnotatorError>;

/// Every failure an annotator operation can report.
///
/// Malformed metadata inside a notes field never shows up here; it is
/// downgraded to plain text by [`crate::state::notes::Notes::parse`].
#[derive(Error, Debug)]
pub enum AnnotatorError {
    /// Missing or malformed input; nothing was mutated
    #[error("Invalid request: {message}")]
    Validation { message: String },

    /// A referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// An optional reference points at a record that does not exist
    #[error("Invalid {field}: {id}")]
    InvalidReference { field: &'static str, id: i64 },

    /// Source image missing or not decodable
    #[error("Failed to decode image {path}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Database constraint or connectivity failure
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem failure while writing or moving artifacts
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding failure for stored values
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Machine-readable error body returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub category: &'static str,
    pub message: String,
}

impl AnnotatorError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            AnnotatorError::Validation { .. } => "validation",
            AnnotatorError::NotFound { .. } => "not_found",
            AnnotatorError::InvalidReference { .. } => "invalid_reference",
            AnnotatorError::ImageDecode { .. } => "image_decode",
            AnnotatorError::Storage(_) => "storage",
            AnnotatorError::Io { .. } => "io",
            AnnotatorError::Serialization(_) => "serialization",
        }
    }

    /// True when the caller sent something wrong, as opposed to a server-side failure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AnnotatorError::Validation { .. }
                | AnnotatorError::NotFound { .. }
                | AnnotatorError::InvalidReference { .. }
        )
    }

    /// HTTP-style status for front ends that speak in status codes
    pub fn status_code(&self) -> u16 {
        match self {
            AnnotatorError::NotFound { .. } => 404,
            _ if self.is_client_error() => 400,
            _ => 500,
        }
    }

    /// Full message including the underlying cause, if any
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            category: self.category(),
            message: self.detailed_message(),
        }
    }
}
