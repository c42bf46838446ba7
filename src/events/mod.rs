//! Lifecycle events and event handling.
//!
//! The scheduler emits one event per meaningful job transition. Handlers are
//! the logging sink: they receive each event and forward it wherever status
//! lines should go.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::JobId;

/// Lifecycle events emitted while the queue is being drained.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job was resumed for the first time.
    JobStarted { job_id: JobId, timestamp: Instant },

    /// A job's body finished normally.
    JobCompleted {
        job_id: JobId,
        duration: Duration,
        timestamp: Instant,
    },

    /// A job's step failed and the job was requeued for another attempt.
    JobRetrying {
        job_id: JobId,
        error: String,
        retries_remaining: u32,
        timestamp: Instant,
    },

    /// A job's step failed with no retries left; the job was dropped.
    JobFailed {
        job_id: JobId,
        error: String,
        timestamp: Instant,
    },

    /// A job exhausted its working-time budget and was abandoned.
    JobTimedOut {
        job_id: JobId,
        budget: Duration,
        elapsed: Duration,
        timestamp: Instant,
    },

    /// A never-started job was diverted to the shutdown snapshot list.
    JobDeferred { job_id: JobId, timestamp: Instant },
}

impl Event {
    /// Get the identity of the job this event concerns.
    pub fn job_id(&self) -> &JobId {
        match self {
            Event::JobStarted { job_id, .. } => job_id,
            Event::JobCompleted { job_id, .. } => job_id,
            Event::JobRetrying { job_id, .. } => job_id,
            Event::JobFailed { job_id, .. } => job_id,
            Event::JobTimedOut { job_id, .. } => job_id,
            Event::JobDeferred { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::JobStarted { timestamp, .. } => *timestamp,
            Event::JobCompleted { timestamp, .. } => *timestamp,
            Event::JobRetrying { timestamp, .. } => *timestamp,
            Event::JobFailed { timestamp, .. } => *timestamp,
            Event::JobTimedOut { timestamp, .. } => *timestamp,
            Event::JobDeferred { timestamp, .. } => *timestamp,
        }
    }

    /// Create a JobStarted event.
    pub fn job_started(job_id: JobId) -> Self {
        Event::JobStarted {
            job_id,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobCompleted event.
    pub fn job_completed(job_id: JobId, duration: Duration) -> Self {
        Event::JobCompleted {
            job_id,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobRetrying event.
    pub fn job_retrying(job_id: JobId, error: String, retries_remaining: u32) -> Self {
        Event::JobRetrying {
            job_id,
            error,
            retries_remaining,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobFailed event.
    pub fn job_failed(job_id: JobId, error: String) -> Self {
        Event::JobFailed {
            job_id,
            error,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobTimedOut event.
    pub fn job_timed_out(job_id: JobId, budget: Duration, elapsed: Duration) -> Self {
        Event::JobTimedOut {
            job_id,
            budget,
            elapsed,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobDeferred event.
    pub fn job_deferred(job_id: JobId) -> Self {
        Event::JobDeferred {
            job_id,
            timestamp: Instant::now(),
        }
    }
}

/// Handler invoked for every emitted event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a single event.
    async fn handle(&self, event: &Event);
}

/// Fan-out bus delivering events to registered handlers in order.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create an empty event bus.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
