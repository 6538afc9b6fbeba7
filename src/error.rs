//! Error types for fleet and relay operations

use thiserror::Error;

/// Errors raised by constructors, configuration and bookkeeping.
///
/// Protocol handlers never surface these: a message that fails validation
/// is dropped at the boundary and reported through telemetry instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Item already exists: {0}")]
    ItemAlreadyExists(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// A specialized Result type for fleet operations
pub type Result<T> = std::result::Result<T, Error>;
