//! Common test utilities shared across integration tests.

use rondo::{CycleOutcome, Event, Scheduler};

/// Step the scheduler until the queue empties, collecting every outcome.
pub async fn drain(scheduler: &mut Scheduler) -> Vec<CycleOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let outcome = scheduler.cycle().await;
        let done = outcome == CycleOutcome::QueueEmpty;
        outcomes.push(outcome);
        if done {
            return outcomes;
        }
    }
}

/// Extract the completion order from a recorded event stream.
pub fn completion_order(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::JobCompleted { job_id, .. } => Some(job_id.as_str().to_string()),
            _ => None,
        })
        .collect()
}
