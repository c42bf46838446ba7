//! Testing utilities for users of the scheduler.
//!
//! This module provides workloads with controllable shapes:
//!
//! - [`StepWorkload`]: suspends a fixed number of times, then completes
//! - [`FlakyWorkload`]: fails a fixed number of attempts, then succeeds
//! - [`AlwaysFails`]: fails every attempt and counts them
//! - [`RecordingHandler`]: an event handler that captures emitted events

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

use crate::core::workload::{StepHandle, WorkError, Workload, suspend};
use crate::events::{Event, EventHandler};

/// A workload that suspends `steps` times before completing.
pub struct StepWorkload {
    name: String,
    steps: u32,
}

impl StepWorkload {
    /// Create a workload with the given name and suspend count.
    pub fn new(name: &str, steps: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            steps,
        })
    }
}

impl Workload for StepWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> StepHandle {
        let steps = self.steps;
        Box::pin(async move {
            for _ in 0..steps {
                suspend().await;
            }
            Ok(())
        })
    }
}

/// A workload that fails its first `failures` attempts, then succeeds.
pub struct FlakyWorkload {
    name: String,
    failures_left: Arc<AtomicU32>,
}

impl FlakyWorkload {
    /// Create a workload that fails `failures` times before succeeding.
    pub fn new(name: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures_left: Arc::new(AtomicU32::new(failures)),
        })
    }
}

impl Workload for FlakyWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> StepHandle {
        let failures_left = Arc::clone(&self.failures_left);
        let name = self.name.clone();
        Box::pin(async move {
            let failing = failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                Err(WorkError::ExecutionFailed(format!("{name}: not yet")))
            } else {
                suspend().await;
                Ok(())
            }
        })
    }
}

/// A workload that fails on every attempt, counting how often it ran.
pub struct AlwaysFails {
    name: String,
    attempts: AtomicU32,
}

impl AlwaysFails {
    /// Create an always-failing workload.
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            attempts: AtomicU32::new(0),
        })
    }

    /// How many attempts have been made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Workload for AlwaysFails {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> StepHandle {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let name = self.name.clone();
        Box::pin(async move { Err(WorkError::ExecutionFailed(format!("{name} always fails"))) })
    }
}

/// Event handler that records everything it sees.
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    /// Create a new recording handler.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    /// Get a copy of the recorded events.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
