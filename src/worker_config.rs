//! Executor selection and tuning, independent of the timing plan.

use crate::errors::ConfigError;

/// Which worker pool implementation drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerMode {
    /// Fixed set of long-lived workers draining a shared queue (§4.B).
    #[default]
    Hybrid,
    /// One spawned task per operation (§4.C).
    TaskSpawned,
}

impl std::str::FromStr for WorkerMode {
    type Err = ConfigError;

    /// For callers that assemble `WorkerConfiguration` from a dynamic
    /// source (a config file, an env var) rather than constructing the enum
    /// directly. Any value outside `{"hybrid", "task-spawned"}` fails fast
    /// with `ConfigError::UnsupportedMode` rather than silently defaulting.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hybrid" => Ok(WorkerMode::Hybrid),
            "task-spawned" | "task_spawned" | "taskspawned" => Ok(WorkerMode::TaskSpawned),
            other => Err(ConfigError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Tuning knobs for whichever `WorkerMode` is selected.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfiguration {
    pub mode: WorkerMode,
    /// `None` means "compute it" — see the Hybrid pool's worker-count formula.
    /// Unused by the task-spawned pool.
    pub max_worker_threads: Option<usize>,
    /// `None` means an unbounded queue. Unused by the task-spawned pool.
    pub channel_capacity: Option<usize>,
    /// Opt-in to queue-time and memory sampling.
    pub enable_detailed_metrics: bool,
}

impl WorkerConfiguration {
    pub fn hybrid() -> Self {
        Self {
            mode: WorkerMode::Hybrid,
            ..Default::default()
        }
    }

    pub fn task_spawned() -> Self {
        Self {
            mode: WorkerMode::TaskSpawned,
            ..Default::default()
        }
    }

    pub fn with_max_worker_threads(mut self, n: usize) -> Self {
        self.max_worker_threads = Some(n);
        self
    }

    pub fn with_channel_capacity(mut self, n: usize) -> Self {
        self.channel_capacity = Some(n);
        self
    }

    pub fn with_detailed_metrics(mut self, enabled: bool) -> Self {
        self.enable_detailed_metrics = enabled;
        self
    }

    /// `max_worker_threads = Some(0)` and `channel_capacity = Some(0)` are
    /// both meaningless (a pool with zero workers, or a channel that can
    /// never hold an item) so they are rejected here the same way
    /// `LoadSettings::validate` rejects zero concurrency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_worker_threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_worker_threads",
                message: "must be a positive integer when set".into(),
            });
        }
        if self.channel_capacity == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "channel_capacity",
                message: "must be a positive integer when set".into(),
            });
        }
        Ok(())
    }
}
