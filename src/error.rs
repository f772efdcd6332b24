//! Error types for Memoapi

use thiserror::Error;

/// Why an upload was rejected before anything was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidInputKind {
    /// Content type is not `application/pdf`
    WrongType,
    /// Declared or actual size exceeds the upload limit
    TooLarge,
    /// Content does not start with the `%PDF` signature
    BadSignature,
    /// Missing form field, unreadable multipart body or unusable name
    Malformed,
}

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rejected input; never retried, nothing durable was written
    #[error("{message}")]
    InvalidInput {
        kind: InvalidInputKind,
        message: String,
    },

    /// Blob store failure (write, read or delete)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record store failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    /// Not found error
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// Record exists but is archived or not public
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials
    #[error("Invalid credentials")]
    Unauthorized,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// API error
    #[error("API error: {0}")]
    Api(String),
}

impl CoreError {
    pub fn invalid(kind: InvalidInputKind, message: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            kind,
            message: message.into(),
        }
    }

    /// Kind of an `InvalidInput` error, if this is one
    pub fn invalid_kind(&self) -> Option<InvalidInputKind> {
        match self {
            CoreError::InvalidInput { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Result type alias for Core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CoreError::NotFound("Memo", "42".to_string());
        assert_eq!(err.to_string(), "Memo not found: 42");
    }

    #[test]
    fn test_invalid_kind() {
        let err = CoreError::invalid(InvalidInputKind::TooLarge, "too big");
        assert_eq!(err.invalid_kind(), Some(InvalidInputKind::TooLarge));
        assert_eq!(err.to_string(), "too big");
        assert_eq!(CoreError::Unauthorized.invalid_kind(), None);
    }
}
