//! Error types for the Spindle client

pub use spindle_core::{EngineError, Error, Result};

use spindle_core::{Engine, ErrorCode};

/// Wraps a raw engine code, asking the engine for its description.
pub(crate) fn engine_error(engine: &dyn Engine, code: ErrorCode) -> Error {
    Error::Engine(EngineError::with_description(code, engine.describe_error(code)))
}

/// Errors that [`crate::Database::transact`] can classify.
///
/// The retry loop only needs two things from an error type: a way to wrap
/// the client's own [`Error`] and a way to find the engine error inside it,
/// if there is one. Engine errors are handed to `on_error`; everything else
/// ends the loop untouched.
///
/// Application error types usually implement this by wrapping [`Error`] in
/// one of their variants.
pub trait TransactError: From<Error> {
    fn engine_error(&self) -> Option<&EngineError>;
}

impl TransactError for Error {
    fn engine_error(&self) -> Option<&EngineError> {
        Error::engine_error(self)
    }
}

impl TransactError for anyhow::Error {
    fn engine_error(&self) -> Option<&EngineError> {
        self.downcast_ref::<Error>().and_then(Error::engine_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::error_code;

    #[test]
    fn test_anyhow_exposes_wrapped_engine_error() {
        let err = anyhow::Error::from(Error::engine(error_code::NOT_COMMITTED));
        assert_eq!(
            TransactError::engine_error(&err).map(EngineError::code),
            Some(error_code::NOT_COMMITTED)
        );

        let err = anyhow::anyhow!("application failure");
        assert!(TransactError::engine_error(&err).is_none());
    }

    #[test]
    fn test_local_errors_are_not_engine_errors() {
        let err = Error::InvalidOperation("zero transaction".into());
        assert!(TransactError::engine_error(&err).is_none());
    }
}
