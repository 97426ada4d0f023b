//! The timing plan: how many items per batch, how often, for how long.
//!
//! `LoadSettings` is the caller-facing knob set; `LoadExecutionPlan` pairs it
//! with the opaque user operation that actually gets exercised. Both are
//! immutable for the lifetime of a single `run()` call.

use std::time::Duration;

use crate::errors::ConfigError;
use crate::user_operation::UserOperation;

/// Policy governing how the stop boundary interacts with in-flight work and
/// mid-batch cut-offs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationMode {
    /// Stop scheduling the instant `now - t0 >= duration`, even mid-batch.
    #[default]
    Duration,
    /// Finish emitting the batch that begins at or before `t0 + duration`,
    /// so every emitted batch is the full `concurrency` wide.
    CompleteCurrentInterval,
    /// Identical to `Duration` for scheduling, but the graceful-stop budget
    /// is forced to zero: anything in flight at the boundary is cancelled.
    StrictDuration,
}

/// The timing plan for one run: concurrency, interval, duration, and the
/// optional iteration cap and termination policy that govern when scheduling
/// stops.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub concurrency: usize,
    pub duration: Duration,
    pub interval: Duration,
    pub max_iterations: Option<usize>,
    pub termination_mode: TerminationMode,
    /// `None` means "compute the default": `clamp(duration * 0.30, 5s, 60s)`.
    pub graceful_stop_timeout: Option<Duration>,
}

impl LoadSettings {
    /// Convenience constructor with all the defaults this module documents:
    /// `Duration` termination mode and an implicit graceful-stop timeout.
    pub fn new(concurrency: usize, interval: Duration, duration: Duration) -> Self {
        Self {
            concurrency,
            duration,
            interval,
            max_iterations: None,
            termination_mode: TerminationMode::default(),
            graceful_stop_timeout: None,
        }
    }

    pub fn with_termination_mode(mut self, mode: TerminationMode) -> Self {
        self.termination_mode = mode;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_graceful_stop_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_stop_timeout = Some(timeout);
        self
    }

    /// The graceful-stop budget actually in effect: the explicit value if
    /// set, `Duration::ZERO` under `StrictDuration` (cancel immediately),
    /// otherwise `clamp(duration * 0.30, 5s, 60s)`.
    pub fn effective_graceful_stop_timeout(&self) -> Duration {
        if self.termination_mode == TerminationMode::StrictDuration {
            return Duration::ZERO;
        }
        if let Some(explicit) = self.graceful_stop_timeout {
            return explicit;
        }
        let scaled = self.duration.mul_f64(0.30);
        scaled.clamp(Duration::from_secs(5), Duration::from_secs(60))
    }

    /// Fail-fast structural validation, run before any task is spawned.
    /// Mirrors the teacher's `Config::from_env` discipline: return on the
    /// first problem found rather than collecting every violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency",
                message: "must be a positive integer".into(),
            });
        }
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "interval",
                message: "must be a positive duration".into(),
            });
        }
        if self.max_iterations == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_iterations",
                message: "must be a positive integer when set".into(),
            });
        }
        Ok(())
    }
}

/// Named settings plus the user operation that gets exercised on every item.
pub struct LoadExecutionPlan {
    pub name: String,
    pub settings: LoadSettings,
    pub operation: UserOperation,
}

impl LoadExecutionPlan {
    pub fn new(name: impl Into<String>, settings: LoadSettings, operation: UserOperation) -> Self {
        Self {
            name: name.into(),
            settings,
            operation,
        }
    }
}
