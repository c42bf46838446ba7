//! Job definition: a workload plus scheduling metadata.
//!
//! A `Job` owns its workload's resumption handle and the metadata the
//! scheduler's policy operates on: earliest start time, dependencies on other
//! jobs, a retry budget, and a working-time budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::types::JobId;
use super::workload::{StepHandle, WorkError, Workload};

/// Default working-time budget when a job does not specify one.
pub const DEFAULT_MAX_WORKING_TIME: Duration = Duration::from_secs(2);

/// A resumption attempt before the job's scheduled start time.
///
/// Recoverable and expected: the caller requeues the job unchanged and tries
/// again on a later cycle. No job state is mutated on this path.
#[derive(Debug, Error)]
#[error("job resumed before its scheduled start time")]
pub struct PrematureStart;

/// Result of advancing a job by one step.
#[derive(Debug)]
pub enum StepOutcome {
    /// More work remains; the body yielded at a suspend point.
    Suspended,
    /// The body finished normally.
    Completed,
    /// The body raised an unrecoverable condition during the step.
    Failed(WorkError),
}

/// A schedulable, resumable unit of work.
pub struct Job {
    /// Unique identity, referenced by dependents.
    id: JobId,
    /// The resumable computation.
    workload: Arc<dyn Workload>,
    /// In-progress execution state; absent until first resumed.
    step: Option<StepHandle>,
    /// Identities that must be completed before this job may start.
    dependencies: HashSet<JobId>,
    /// Re-attempts left after a failure.
    retries_remaining: u32,
    /// Wall-clock budget measured from first resumption.
    max_working_time: Duration,
    /// Set exactly once, at first resumption.
    started_at: Option<Instant>,
    /// The job must not begin before this time.
    start_at: DateTime<Utc>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("retries_remaining", &self.retries_remaining)
            .field("max_working_time", &self.max_working_time)
            .field("started", &self.started_at.is_some())
            .field("start_at", &self.start_at)
            .finish()
    }
}

impl Job {
    /// Create a new job for the given workload.
    ///
    /// The identity defaults to the workload's name; the start time defaults
    /// to "now"; the working-time budget to [`DEFAULT_MAX_WORKING_TIME`].
    pub fn new(workload: Arc<dyn Workload>) -> Self {
        Self {
            id: JobId::new(workload.name()),
            workload,
            step: None,
            dependencies: HashSet::new(),
            retries_remaining: 0,
            max_working_time: DEFAULT_MAX_WORKING_TIME,
            started_at: None,
            start_at: Utc::now(),
        }
    }

    /// Override the job identity.
    ///
    /// Required when two jobs built from the same workload must coexist in
    /// one queue: identities referenced by dependents must be unique.
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Add a dependency on another job's identity.
    pub fn depends_on(mut self, id: impl Into<JobId>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    /// Add multiple dependencies.
    pub fn with_dependencies<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<JobId>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Set the retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries_remaining = retries;
        self
    }

    /// Set the working-time budget.
    pub fn with_max_working_time(mut self, budget: Duration) -> Self {
        self.max_working_time = budget;
        self
    }

    /// Set the earliest start time.
    pub fn with_start_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.start_at = start_at;
        self
    }

    /// Set the earliest start time relative to now.
    ///
    /// A delay too large to represent clamps to the far future.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self
    }

    /// Get the job identity.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Get the dependency identities.
    pub fn dependencies(&self) -> &HashSet<JobId> {
        &self.dependencies
    }

    /// Get the remaining retry budget.
    pub fn retries_remaining(&self) -> u32 {
        self.retries_remaining
    }

    /// Get the working-time budget.
    pub fn max_working_time(&self) -> Duration {
        self.max_working_time
    }

    /// Get the earliest start time.
    pub fn start_at(&self) -> DateTime<Utc> {
        self.start_at
    }

    /// Whether the job has been resumed at least once.
    pub fn started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Wall-clock time since first resumption, if started.
    pub fn working_time(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Whether every dependency appears in the completed set.
    pub fn dependencies_met(&self, completed: &HashSet<JobId>) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    /// Whether the working-time budget is exhausted.
    ///
    /// Always false for a job that has never been resumed.
    pub fn over_budget(&self) -> bool {
        self.working_time()
            .is_some_and(|elapsed| elapsed > self.max_working_time)
    }

    /// Consume one retry from the budget.
    pub fn consume_retry(&mut self) {
        self.retries_remaining = self.retries_remaining.saturating_sub(1);
    }

    /// Advance the job by exactly one step.
    ///
    /// Fails with [`PrematureStart`] before `start_at`, mutating nothing.
    /// The first successful call records `started_at` and creates the
    /// resumption handle; every call polls the handle exactly once. A step
    /// that fails drops the handle, so a retried job restarts its body from
    /// the beginning while keeping `started_at` from the first attempt.
    pub async fn resume(&mut self) -> Result<StepOutcome, PrematureStart> {
        if Utc::now() < self.start_at {
            return Err(PrematureStart);
        }

        let mut step = match self.step.take() {
            Some(step) => step,
            None => {
                if self.started_at.is_none() {
                    self.started_at = Some(Instant::now());
                }
                self.workload.start()
            }
        };

        let polled = std::future::poll_fn(|cx| Poll::Ready(step.as_mut().poll(cx))).await;

        Ok(match polled {
            Poll::Pending => {
                self.step = Some(step);
                StepOutcome::Suspended
            }
            Poll::Ready(Ok(())) => StepOutcome::Completed,
            Poll::Ready(Err(error)) => StepOutcome::Failed(error),
        })
    }

    /// Serializable projection of this job for the queue snapshot.
    ///
    /// Execution state is never captured: a recovered job restarts its body
    /// from the beginning.
    pub fn descriptor(&self) -> JobDescriptor {
        JobDescriptor {
            id: self.id.clone(),
            workload: self.workload.name().to_string(),
            dependencies: self.dependencies.clone(),
            retries_remaining: self.retries_remaining,
            max_working_time: self.max_working_time,
            start_at: self.start_at,
        }
    }

    /// Rebuild a job from a snapshot descriptor and its rebound workload.
    pub fn from_descriptor(descriptor: JobDescriptor, workload: Arc<dyn Workload>) -> Self {
        Self {
            id: descriptor.id,
            workload,
            step: None,
            dependencies: descriptor.dependencies,
            retries_remaining: descriptor.retries_remaining,
            max_working_time: descriptor.max_working_time,
            started_at: None,
            start_at: descriptor.start_at,
        }
    }
}

/// Snapshot record for one pending job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Job identity.
    pub id: JobId,
    /// Workload name, used to rebind the body on recovery.
    pub workload: String,
    /// Dependency identities.
    #[serde(default)]
    pub dependencies: HashSet<JobId>,
    /// Remaining retry budget, carried across restarts.
    pub retries_remaining: u32,
    /// Working-time budget.
    #[serde(with = "serde_duration")]
    pub max_working_time: Duration,
    /// Earliest start time.
    pub start_at: DateTime<Utc>,
}

/// Serde helper for Duration serialization.
///
/// Serializes Duration as whole seconds, matching the config format.
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workload::suspend;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TwoStep {
        starts: AtomicU32,
    }

    impl TwoStep {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicU32::new(0),
            })
        }
    }

    impl Workload for TwoStep {
        fn name(&self) -> &str {
            "two_step"
        }

        fn start(&self) -> StepHandle {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                suspend().await;
                Ok(())
            })
        }
    }

    struct Broken;

    impl Workload for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn start(&self) -> StepHandle {
            Box::pin(async { Err(WorkError::ExecutionFailed("always".into())) })
        }
    }

    #[tokio::test]
    async fn test_premature_resume_mutates_nothing() {
        let workload = TwoStep::new();
        let mut job =
            Job::new(workload.clone()).with_start_delay(Duration::from_secs(3600));

        let result = job.resume().await;

        assert!(result.is_err());
        assert!(!job.started());
        assert_eq!(workload.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_resume_starts_job_once() {
        let workload = TwoStep::new();
        let mut job = Job::new(workload.clone());

        let outcome = job.resume().await.unwrap();
        assert!(matches!(outcome, StepOutcome::Suspended));
        assert!(job.started());

        let outcome = job.resume().await.unwrap();
        assert!(matches!(outcome, StepOutcome::Completed));

        // One handle for the whole run, created on the first resume.
        assert_eq!(workload.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_started_at_is_recorded_once() {
        let mut job = Job::new(TwoStep::new());

        job.resume().await.unwrap();
        let first = job.working_time();
        assert!(first.is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        job.resume().await.unwrap();

        // Elapsed keeps growing from the original start, not from a reset.
        assert!(job.working_time().unwrap() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_failed_step_reports_cause() {
        let mut job = Job::new(Arc::new(Broken)).with_retries(1);

        match job.resume().await.unwrap() {
            StepOutcome::Failed(WorkError::ExecutionFailed(msg)) => assert_eq!(msg, "always"),
            other => panic!("expected failure, got {:?}", other),
        }

        job.consume_retry();
        assert_eq!(job.retries_remaining(), 0);
    }

    #[tokio::test]
    async fn test_over_budget_requires_a_start() {
        let mut job = Job::new(TwoStep::new()).with_max_working_time(Duration::ZERO);

        assert!(!job.over_budget());

        job.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(job.over_budget());
    }

    #[test]
    fn test_dependencies_met_against_completed_set() {
        let job = Job::new(TwoStep::new())
            .with_dependencies(["make_workspace", "fetch_page"]);

        let mut completed = HashSet::new();
        completed.insert(JobId::new("make_workspace"));
        assert!(!job.dependencies_met(&completed));

        completed.insert(JobId::new("fetch_page"));
        assert!(job.dependencies_met(&completed));
    }

    #[test]
    fn test_descriptor_round_trip_preserves_metadata() {
        let job = Job::new(TwoStep::new())
            .with_id("custom_id")
            .depends_on("upstream")
            .with_retries(3)
            .with_max_working_time(Duration::from_secs(30));

        let descriptor = job.descriptor();
        let json = serde_json::to_string(&descriptor).expect("serialize");
        let back: JobDescriptor = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(back, descriptor);
        assert_eq!(back.id.as_str(), "custom_id");
        assert_eq!(back.workload, "two_step");
        assert_eq!(back.retries_remaining, 3);
        assert_eq!(back.max_working_time, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_recovered_job_restarts_from_scratch() {
        let workload = TwoStep::new();
        let mut job = Job::new(workload.clone()).with_retries(2);

        job.resume().await.unwrap();
        job.consume_retry();

        let recovered = Job::from_descriptor(job.descriptor(), workload);

        assert!(!recovered.started());
        assert_eq!(recovered.retries_remaining(), 1);
    }

    #[test]
    fn test_id_defaults_to_workload_name() {
        let job = Job::new(TwoStep::new());
        assert_eq!(job.id().as_str(), "two_step");

        let job = Job::new(TwoStep::new()).with_id("renamed");
        assert_eq!(job.id().as_str(), "renamed");
    }
}
