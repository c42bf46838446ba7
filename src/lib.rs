//! rondo — a minimal cooperative job scheduler.
//!
//! Jobs are resumable computations with scheduling metadata: an earliest
//! start time, dependencies on other jobs, a retry budget, and a
//! working-time budget. A single-threaded round-robin loop drives them one
//! step at a time, and a flat queue snapshot carries not-yet-started work
//! across process restarts.

pub mod config;
pub mod core;
pub mod events;
pub mod scheduler;
pub mod shutdown;
pub mod snapshot;
pub mod testing;

pub use self::config::{ConfigError, SchedulerConfig};
pub use self::core::job::{
    DEFAULT_MAX_WORKING_TIME, Job, JobDescriptor, PrematureStart, StepOutcome,
};
pub use self::core::types::JobId;
pub use self::core::workload::{StepHandle, WorkError, Workload, suspend};
pub use self::events::{Event, EventBus, EventHandler};
pub use self::scheduler::{CycleOutcome, Scheduler, SchedulerError, WorkloadRegistry};
pub use self::shutdown::install_stop_handler;
pub use self::snapshot::{DEFAULT_SNAPSHOT_PATH, SnapshotError, SnapshotStore};
