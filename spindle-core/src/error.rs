use crate::error_code::{self, ErrorCode};
use std::fmt;
use thiserror::Error;

/// An error reported by the storage engine.
///
/// Carries the engine's numeric code and its human-readable description.
/// Whether the error is retryable is decided by the engine through
/// `on_error`, never by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    code: ErrorCode,
    description: String,
}

impl EngineError {
    /// Creates an engine error using the built-in description table.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            description: error_code::describe(code).to_string(),
        }
    }

    /// Creates an engine error with a description supplied by the engine.
    pub fn with_description(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description, self.code)
    }
}

impl std::error::Error for EngineError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Engine(EngineError),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Key outside legal range")]
    KeyOutsideLegalRange,

    #[error("API version not set")]
    ApiVersionUnset,

    #[error("API version already set")]
    ApiVersionAlreadySet,

    #[error("API version {0} not supported")]
    ApiVersionNotSupported(i32),

    #[error("Network not set up")]
    NetworkNotSetup,

    #[error("Network already set up")]
    NetworkAlreadySetup,

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl Error {
    /// Shorthand for an engine error with the built-in description.
    pub fn engine(code: ErrorCode) -> Self {
        Error::Engine(EngineError::new(code))
    }

    /// Returns a stable numeric code for this error.
    ///
    /// Engine errors report the engine's code; locally raised errors use the
    /// fixed codes from [`error_code`].
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Engine(e) => e.code(),
            Error::InvalidOperation(_) => error_code::CLIENT_INVALID_OPERATION,
            Error::KeyOutsideLegalRange => error_code::KEY_OUTSIDE_LEGAL_RANGE,
            Error::ApiVersionUnset => error_code::API_VERSION_UNSET,
            Error::ApiVersionAlreadySet => error_code::API_VERSION_ALREADY_SET,
            Error::ApiVersionNotSupported(_) => error_code::API_VERSION_NOT_SUPPORTED,
            Error::NetworkNotSetup => error_code::NETWORK_NOT_SETUP,
            Error::NetworkAlreadySetup => error_code::NETWORK_ALREADY_SETUP,
            Error::Encoding(_) => error_code::ENCODING_FAILED,
        }
    }

    /// Returns the engine error if this is one.
    ///
    /// Only engine errors are eligible for `on_error` classification.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Error::InvalidOperation(_))
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = Error::engine(error_code::NOT_COMMITTED);
        assert_eq!(
            err.to_string(),
            "Transaction not committed due to conflict with another transaction (1020)"
        );
        assert_eq!(err.code(), 1020);
    }

    #[test]
    fn test_engine_error_custom_description() {
        let err = EngineError::with_description(1007, "too old");
        assert_eq!(err.to_string(), "too old (1007)");
        assert_eq!(err.description(), "too old");
    }

    #[test]
    fn test_local_error_codes_are_stable() {
        assert_eq!(Error::InvalidOperation("x".into()).code(), 2000);
        assert_eq!(Error::KeyOutsideLegalRange.code(), 2004);
        assert_eq!(Error::NetworkNotSetup.code(), 2008);
        assert_eq!(Error::NetworkAlreadySetup.code(), 2009);
        assert_eq!(Error::ApiVersionUnset.code(), 2200);
        assert_eq!(Error::ApiVersionAlreadySet.code(), 2201);
        assert_eq!(Error::ApiVersionNotSupported(7).code(), 2203);
    }

    #[test]
    fn test_only_engine_errors_expose_engine_error() {
        assert!(Error::engine(1020).engine_error().is_some());
        assert!(Error::InvalidOperation("zero handle".into()).engine_error().is_none());
        assert!(Error::Encoding("bad tuple".into()).engine_error().is_none());
    }
}
