//! Scheduler engine implementation.
//!
//! The scheduler owns the ready queue and drives it cooperatively, one job
//! step per cycle:
//! - jobs are popped from the front and requeued at the back, so runnable
//!   jobs interleave round-robin;
//! - never-started jobs are gated on their start time and dependencies;
//! - started jobs are gated on their working-time budget;
//! - failures consume the retry budget before the job is dropped.
//!
//! A stop request lets started jobs drain while diverting never-started jobs
//! into a snapshot for the next process to recover.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::core::job::{Job, StepOutcome};
use crate::core::types::JobId;
use crate::core::workload::Workload;
use crate::events::{Event, EventBus};
use crate::snapshot::SnapshotStore;

use super::registry::WorkloadRegistry;
use super::types::{CycleOutcome, SchedulerError};

/// Cooperative single-threaded job scheduler.
pub struct Scheduler {
    /// Ready queue: pop from the front, requeue at the back.
    queue: VecDeque<Job>,
    /// Identities of jobs that fully finished.
    completed: HashSet<JobId>,
    /// Never-started jobs collected after a stop request.
    deferred: Vec<Job>,
    /// False once a stop has been requested; gates only unstarted jobs.
    accepting: bool,
    /// Known workloads, used to rebind recovered descriptors.
    registry: WorkloadRegistry,
    /// Snapshot persistence.
    snapshot: SnapshotStore,
    /// Event sink for lifecycle transitions.
    event_bus: Arc<EventBus>,
}

impl Scheduler {
    /// Create a scheduler persisting its snapshot through the given store.
    pub fn new(snapshot: SnapshotStore) -> Self {
        Self {
            queue: VecDeque::new(),
            completed: HashSet::new(),
            deferred: Vec::new(),
            accepting: true,
            registry: WorkloadRegistry::new(),
            snapshot,
            event_bus: Arc::new(EventBus::new()),
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Register a workload for snapshot recovery.
    pub fn register_workload(&mut self, workload: Arc<dyn Workload>) {
        self.registry.register(workload);
    }

    /// Get the workload registry.
    pub fn registry(&self) -> &WorkloadRegistry {
        &self.registry
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Submit a job to the back of the ready queue.
    pub fn add_job(&mut self, job: Job) {
        tracing::debug!(job_id = %job.id(), "job enqueued");
        self.queue.push_back(job);
    }

    /// Number of jobs currently queued.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Identities of fully finished jobs.
    pub fn completed(&self) -> &HashSet<JobId> {
        &self.completed
    }

    /// Jobs diverted to the shutdown list so far.
    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }

    /// Recover pending jobs left by a previous process.
    ///
    /// Reads the snapshot file (missing file = fresh start) and enqueues one
    /// job per descriptor, rebound through the registry. Call before
    /// submitting new jobs so recovered work keeps its queue position.
    /// Execution state is never recovered: bodies restart from the
    /// beginning, but descriptors keep their original metadata, including a
    /// partially consumed retry budget.
    pub fn recover(&mut self) -> Result<usize, SchedulerError> {
        let descriptors = self.snapshot.load()?;
        let count = descriptors.len();

        for descriptor in descriptors {
            let workload = self
                .registry
                .get(&descriptor.workload)
                .ok_or_else(|| SchedulerError::UnknownWorkload(descriptor.workload.clone()))?;

            tracing::info!(job_id = %descriptor.id, "recovered pending job from snapshot");
            self.queue.push_back(Job::from_descriptor(descriptor, workload));
        }

        Ok(count)
    }

    /// Run one queue cycle: pop the next job, apply policy, resume at most
    /// one step, and requeue, complete, retry, or drop it.
    pub async fn cycle(&mut self) -> CycleOutcome {
        let Some(mut job) = self.queue.pop_front() else {
            return CycleOutcome::QueueEmpty;
        };

        if !job.started() {
            if !self.accepting {
                let id = job.id().clone();
                tracing::debug!(job_id = %id, "stop requested, deferring never-started job");
                self.event_bus.emit(Event::job_deferred(id.clone())).await;
                self.deferred.push(job);
                return CycleOutcome::Deferred(id);
            }

            if !job.dependencies_met(&self.completed) {
                let id = job.id().clone();
                self.queue.push_back(job);
                return CycleOutcome::Blocked(id);
            }
        }

        if job.over_budget() {
            let id = job.id().clone();
            let elapsed = job.working_time().unwrap_or_default();
            tracing::warn!(
                job_id = %id,
                elapsed = ?elapsed,
                budget = ?job.max_working_time(),
                "working-time budget exceeded, abandoning job"
            );
            self.event_bus
                .emit(Event::job_timed_out(id.clone(), job.max_working_time(), elapsed))
                .await;
            return CycleOutcome::BudgetExceeded(id);
        }

        let first_attempt = !job.started();

        match job.resume().await {
            Err(_premature) => {
                let id = job.id().clone();
                tracing::trace!(job_id = %id, "not due yet, requeued");
                self.queue.push_back(job);
                CycleOutcome::NotDue(id)
            }
            Ok(StepOutcome::Suspended) => {
                let id = job.id().clone();
                if first_attempt {
                    self.announce_start(&id).await;
                }
                self.queue.push_back(job);
                CycleOutcome::Suspended(id)
            }
            Ok(StepOutcome::Completed) => {
                let id = job.id().clone();
                if first_attempt {
                    self.announce_start(&id).await;
                }
                let duration = job.working_time().unwrap_or_default();
                tracing::info!(job_id = %id, duration = ?duration, "job completed");
                self.event_bus
                    .emit(Event::job_completed(id.clone(), duration))
                    .await;
                self.completed.insert(id.clone());
                CycleOutcome::Completed(id)
            }
            Ok(StepOutcome::Failed(error)) => {
                let id = job.id().clone();
                if first_attempt {
                    self.announce_start(&id).await;
                }
                if job.retries_remaining() > 0 {
                    job.consume_retry();
                    let retries_remaining = job.retries_remaining();
                    tracing::warn!(
                        job_id = %id,
                        error = %error,
                        retries_remaining,
                        "job step failed, retrying"
                    );
                    self.event_bus
                        .emit(Event::job_retrying(id.clone(), error.to_string(), retries_remaining))
                        .await;
                    self.queue.push_back(job);
                    CycleOutcome::Retried {
                        job: id,
                        retries_remaining,
                    }
                } else {
                    tracing::error!(job_id = %id, error = %error, "job failed with no retries left, dropping");
                    self.event_bus
                        .emit(Event::job_failed(id.clone(), error.to_string()))
                        .await;
                    CycleOutcome::Dropped(id)
                }
            }
        }
    }

    /// Drain the queue until it is empty.
    ///
    /// On a natural drain (no jobs deferred by a stop request) the on-disk
    /// snapshot is deleted: no unfinished work remains.
    pub async fn run(&mut self) -> Result<(), SchedulerError> {
        loop {
            if let CycleOutcome::QueueEmpty = self.cycle().await {
                return self.finish_drain();
            }
            // Let timers and the signal listener make progress between steps.
            tokio::task::yield_now().await;
        }
    }

    /// Drain the queue, switching to the shutdown path when `stop` fires.
    ///
    /// The signal is only observed at cycle boundaries: an in-progress step
    /// is never preempted.
    pub async fn run_until_stopped(&mut self, stop: &CancellationToken) -> Result<(), SchedulerError> {
        loop {
            if stop.is_cancelled() {
                return self.request_stop().await;
            }
            if let CycleOutcome::QueueEmpty = self.cycle().await {
                return self.finish_drain();
            }
            tokio::task::yield_now().await;
        }
    }

    /// Stop accepting new runs, drain already-started jobs, and snapshot the
    /// rest.
    ///
    /// Re-enters the run loop with `accepting` cleared: started jobs run to
    /// completion, failure, or timeout, while never-started jobs divert to
    /// the deferred list, which is then serialized for the next process.
    pub async fn request_stop(&mut self) -> Result<(), SchedulerError> {
        tracing::info!("stop requested, draining started jobs");
        self.accepting = false;
        self.run().await?;

        if !self.deferred.is_empty() {
            let descriptors: Vec<_> = self.deferred.iter().map(Job::descriptor).collect();
            self.snapshot.save(&descriptors)?;
            tracing::info!(
                count = descriptors.len(),
                path = %self.snapshot.path().display(),
                "pending jobs written to snapshot"
            );
        }

        Ok(())
    }

    fn finish_drain(&mut self) -> Result<(), SchedulerError> {
        if self.deferred.is_empty() {
            self.snapshot.remove()?;
        }
        Ok(())
    }

    async fn announce_start(&self, id: &JobId) {
        tracing::info!(job_id = %id, "job started");
        self.event_bus.emit(Event::job_started(id.clone())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AlwaysFails, FlakyWorkload, StepWorkload};
    use chrono::Utc;
    use std::time::Duration;

    fn scratch_store(dir: &tempfile::TempDir) -> SnapshotStore {
        SnapshotStore::new(dir.path().join("queue.snapshot"))
    }

    #[tokio::test]
    async fn test_empty_queue_terminates_immediately_and_clears_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);
        std::fs::write(store.path(), b"[]").unwrap();

        let mut scheduler = Scheduler::new(store.clone());
        assert!(matches!(scheduler.cycle().await, CycleOutcome::QueueEmpty));

        scheduler.run().await.unwrap();
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_single_job_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));
        scheduler.add_job(Job::new(StepWorkload::new("steady", 2)));

        scheduler.run().await.unwrap();

        assert!(scheduler.completed().contains(&JobId::new("steady")));
        assert_eq!(scheduler.queued(), 0);
    }

    #[tokio::test]
    async fn test_runnable_jobs_interleave_round_robin() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));
        scheduler.add_job(Job::new(StepWorkload::new("a", 2)));
        scheduler.add_job(Job::new(StepWorkload::new("b", 2)));

        let mut order = Vec::new();
        loop {
            match scheduler.cycle().await {
                CycleOutcome::QueueEmpty => break,
                CycleOutcome::Suspended(id) | CycleOutcome::Completed(id) => {
                    order.push(id.as_str().to_string())
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!(order, ["a", "b", "a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn test_dependency_gate_blocks_until_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        // Dependent submitted first: it must cycle to the back until the
        // upstream job lands in the completed set.
        scheduler.add_job(Job::new(StepWorkload::new("downstream", 0)).depends_on("upstream"));
        scheduler.add_job(Job::new(StepWorkload::new("upstream", 0)));

        assert_eq!(
            scheduler.cycle().await,
            CycleOutcome::Blocked(JobId::new("downstream"))
        );
        assert_eq!(
            scheduler.cycle().await,
            CycleOutcome::Completed(JobId::new("upstream"))
        );
        assert_eq!(
            scheduler.cycle().await,
            CycleOutcome::Completed(JobId::new("downstream"))
        );
    }

    #[tokio::test]
    async fn test_dependency_chain_completes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        // Submitted in reverse dependency order: C, B, A.
        scheduler
            .add_job(Job::new(StepWorkload::new("c", 1)).with_dependencies(["a", "b"]));
        scheduler.add_job(Job::new(StepWorkload::new("b", 1)).depends_on("a"));
        scheduler.add_job(Job::new(StepWorkload::new("a", 1)));

        let mut completions = Vec::new();
        loop {
            match scheduler.cycle().await {
                CycleOutcome::QueueEmpty => break,
                CycleOutcome::Completed(id) => completions.push(id.as_str().to_string()),
                _ => {}
            }
        }

        assert_eq!(completions, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_premature_job_is_requeued_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        scheduler.add_job(
            Job::new(StepWorkload::new("later", 0)).with_start_delay(Duration::from_secs(3600)),
        );

        for _ in 0..3 {
            assert_eq!(
                scheduler.cycle().await,
                CycleOutcome::NotDue(JobId::new("later"))
            );
        }
        assert_eq!(scheduler.queued(), 1);
    }

    #[tokio::test]
    async fn test_due_job_completes_after_start_time_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        scheduler.add_job(
            Job::new(StepWorkload::new("soon", 1)).with_start_delay(Duration::from_millis(50)),
        );

        scheduler.run().await.unwrap();
        assert!(scheduler.completed().contains(&JobId::new("soon")));
    }

    #[tokio::test]
    async fn test_failing_job_is_resumed_retries_plus_one_times() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        let workload = AlwaysFails::new("broken");
        scheduler.add_job(Job::new(workload.clone()).with_retries(2));

        scheduler.run().await.unwrap();

        assert_eq!(workload.attempts(), 3);
        assert!(!scheduler.completed().contains(&JobId::new("broken")));
    }

    #[tokio::test]
    async fn test_flaky_job_succeeds_within_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        // Fails twice, succeeds on the third attempt; budget allows three.
        let workload = FlakyWorkload::new("flaky", 2);
        scheduler.add_job(Job::new(workload).with_retries(3));

        scheduler.run().await.unwrap();
        assert!(scheduler.completed().contains(&JobId::new("flaky")));
    }

    #[tokio::test]
    async fn test_over_budget_job_is_abandoned_not_completed() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        scheduler.add_job(
            Job::new(StepWorkload::new("slow", 5)).with_max_working_time(Duration::ZERO),
        );

        assert_eq!(
            scheduler.cycle().await,
            CycleOutcome::Suspended(JobId::new("slow"))
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(
            scheduler.cycle().await,
            CycleOutcome::BudgetExceeded(JobId::new("slow"))
        );

        // Removed from the queue without joining the completed set.
        assert_eq!(scheduler.queued(), 0);
        assert!(!scheduler.completed().contains(&JobId::new("slow")));
    }

    #[tokio::test]
    async fn test_stop_defers_never_started_jobs_and_drains_started_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);
        let mut scheduler = Scheduler::new(store.clone());

        scheduler.add_job(Job::new(StepWorkload::new("running", 3)));
        scheduler.add_job(Job::new(StepWorkload::new("waiting", 1)));

        // Start the first job only.
        assert_eq!(
            scheduler.cycle().await,
            CycleOutcome::Suspended(JobId::new("running"))
        );

        scheduler.request_stop().await.unwrap();

        // The started job drained to completion; the other was snapshotted.
        assert!(scheduler.completed().contains(&JobId::new("running")));
        assert!(!scheduler.completed().contains(&JobId::new("waiting")));

        let pending = store.load().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id.as_str(), "waiting");
    }

    #[tokio::test]
    async fn test_recover_requeues_snapshot_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);

        {
            let mut first = Scheduler::new(store.clone());
            first.add_job(
                Job::new(StepWorkload::new("carry_over", 1))
                    .with_retries(4)
                    .with_start_at(Utc::now()),
            );
            first.request_stop().await.unwrap();
        }

        let mut second = Scheduler::new(store.clone());
        second.register_workload(StepWorkload::new("carry_over", 1));

        let recovered = second.recover().unwrap();
        assert_eq!(recovered, 1);

        second.run().await.unwrap();
        assert!(second.completed().contains(&JobId::new("carry_over")));
        // Natural drain removes the snapshot.
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_recover_with_unknown_workload_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = scratch_store(&dir);

        {
            let mut first = Scheduler::new(store.clone());
            first.add_job(Job::new(StepWorkload::new("mystery", 1)));
            first.request_stop().await.unwrap();
        }

        let mut second = Scheduler::new(store);
        let result = second.recover();
        assert!(matches!(
            result,
            Err(SchedulerError::UnknownWorkload(name)) if name == "mystery"
        ));
    }

    #[tokio::test]
    async fn test_recover_on_fresh_start_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));
        assert_eq!(scheduler.recover().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_dependency_blocks_dependent_forever() {
        let dir = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(scratch_store(&dir));

        scheduler.add_job(Job::new(AlwaysFails::new("upstream")));
        scheduler.add_job(Job::new(StepWorkload::new("downstream", 0)).depends_on("upstream"));

        // upstream fails with no retries and is dropped.
        assert_eq!(
            scheduler.cycle().await,
            CycleOutcome::Dropped(JobId::new("upstream"))
        );

        // downstream can only cycle as Blocked from here on.
        for _ in 0..5 {
            assert_eq!(
                scheduler.cycle().await,
                CycleOutcome::Blocked(JobId::new("downstream"))
            );
        }
    }
}
