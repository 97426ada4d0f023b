//! Error taxonomy for the engine: configuration errors (caller's fault,
//! fail fast before starting), and engine errors (exceptional, terminal).
//!
//! User-operation failures are deliberately *not* a variant here — they are
//! absorbed as data (`success = false` on a `StepResult`) and never
//! propagated out of `run`.

use std::time::Duration;

use thiserror::Error;

/// Caller's fault. Returned before any task is spawned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("unsupported worker mode: {0} (expected \"hybrid\" or \"task-spawned\")")]
    UnsupportedMode(String),
}

/// Exceptional, terminal failures of the engine itself rather than of the
/// user operation it is driving.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("drain timed out after {waited:?}, exceeding the {ceiling:?} hard ceiling")]
    DrainTimeoutExceeded { waited: Duration, ceiling: Duration },

    #[error("result collector is unreachable (its task exited or panicked)")]
    CollectorUnreachable,

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Top-level error returned by `run()`.
#[derive(Error, Debug)]
pub enum LoadTestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_name_the_field() {
        let err = ConfigError::InvalidValue {
            field: "concurrency",
            message: "must be positive".into(),
        };
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn load_test_error_wraps_config_error_transparently() {
        let err: LoadTestError = ConfigError::UnsupportedMode("quantum".into()).into();
        assert!(err.to_string().contains("quantum"));
    }

    #[test]
    fn load_test_error_wraps_engine_error_transparently() {
        let err: LoadTestError = EngineError::CollectorUnreachable.into();
        assert!(matches!(err, LoadTestError::Engine(_)));
    }
}
