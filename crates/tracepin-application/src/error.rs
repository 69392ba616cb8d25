//! Application layer error types
//!
//! Wraps domain and configuration errors. Probe-level failures stay
//! `tracepin_core::Error`; this type is what the composition root returns.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Domain layer error
    #[error(transparent)]
    Core(#[from] tracepin_core::Error),

    /// Loading or validating configuration failed
    #[error(transparent)]
    Config(#[from] tracepin_config::ConfigError),

    /// The notifier loop needs a tokio runtime to run on
    #[error("No tokio runtime available: {0}")]
    Runtime(String),

    #[error("Dynamic instrumentation has been shut down")]
    ShutDown,
}

impl Error {
    /// True when retrying the same operation later can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Core(e) => e.is_retryable(),
            Error::Config(_) | Error::Runtime(_) | Error::ShutDown => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_core_errors() {
        let err: Error = tracepin_core::Error::TargetNotDefined("A.b".to_string()).into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Target not defined: A.b");

        let err: Error =
            tracepin_config::ConfigError::ValidationError("bad".to_string()).into();
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Validation error: bad");
    }
}
