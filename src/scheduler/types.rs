//! Scheduler type definitions.
//!
//! `CycleOutcome` is the tagged result of one queue cycle. Control signals
//! that the run loop acts on (empty queue, forced abandonment) are ordinary
//! variants here, never errors, so tests can step the scheduler manually and
//! assert exactly what each cycle did.

use thiserror::Error;

use crate::core::types::JobId;
use crate::snapshot::SnapshotError;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Snapshot file error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A recovered descriptor names a workload that is not registered.
    #[error("unknown workload in snapshot: {0}")]
    UnknownWorkload(String),
}

/// What a single queue cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The queue was empty; the run loop terminates.
    QueueEmpty,
    /// A never-started job was diverted to the shutdown list.
    Deferred(JobId),
    /// Dependencies unmet; the job was requeued unchanged.
    Blocked(JobId),
    /// The job's start time has not passed; requeued unchanged.
    NotDue(JobId),
    /// One step ran and the body yielded; requeued.
    Suspended(JobId),
    /// The body finished; the identity joined the completed set.
    Completed(JobId),
    /// The step failed and a retry was consumed; requeued.
    Retried {
        job: JobId,
        retries_remaining: u32,
    },
    /// The step failed with no retries left; the job was dropped.
    Dropped(JobId),
    /// The working-time budget was exhausted; the job was abandoned
    /// without being resumed and without joining the completed set.
    BudgetExceeded(JobId),
}
