//! A programmable load-generation engine: an Orchestrator schedules batches
//! of an opaque, caller-supplied async operation against a pooled executor,
//! while a Result Collector accumulates exact percentile statistics.
//!
//! ```no_run
//! use loadgen_engine::{run, LoadExecutionPlan, LoadSettings, UserOperation, WorkerConfiguration};
//! use std::time::Duration;
//!
//! # async fn demo() {
//! let settings = LoadSettings::new(10, Duration::from_millis(100), Duration::from_secs(1));
//! let operation = UserOperation::new(|| async { true });
//! let plan = LoadExecutionPlan::new("demo", settings, operation);
//!
//! let result = run(plan, WorkerConfiguration::hybrid()).await.unwrap();
//! println!("{} of {} succeeded", result.success, result.total);
//! # }
//! ```

mod collector;
mod errors;
mod memory;
mod orchestrator;
mod pool;
mod pool_hybrid;
mod pool_spawned;
mod settings;
mod user_operation;
mod worker_config;

pub use collector::LoadResult;
pub use errors::{ConfigError, EngineError, LoadTestError};
pub use orchestrator::run;
pub use settings::{LoadExecutionPlan, LoadSettings, TerminationMode};
pub use user_operation::UserOperation;
pub use worker_config::{WorkerConfiguration, WorkerMode};

#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;
