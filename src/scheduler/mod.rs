//! Scheduler engine for cooperative job execution.
//!
//! This module provides the run loop that drains the ready queue one job
//! step at a time, plus the registry used to rebind recovered jobs.

mod engine;
mod registry;
mod types;

pub use engine::Scheduler;
pub use registry::WorkloadRegistry;
pub use types::{CycleOutcome, SchedulerError};
