//! Workload trait and step primitives.
//!
//! A `Workload` is the resumable computation inside a job. Calling `start()`
//! creates the in-progress execution state; the scheduler then drives it one
//! step at a time. Bodies mark their step boundaries with [`suspend`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;

/// Opaque in-progress execution state of a workload.
///
/// One poll of the handle corresponds to one step of the body: the body runs
/// until its next [`suspend`] point (pending), until it finishes (ready), or
/// until it fails (ready with an error).
pub type StepHandle = Pin<Box<dyn Future<Output = Result<(), WorkError>> + Send>>;

/// Errors raised from within a workload body during a step.
#[derive(Debug, Error)]
pub enum WorkError {
    /// The body failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// An I/O operation inside the body failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An HTTP request inside the body failed.
    #[error("http error: {0}")]
    Http(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The core trait for defining resumable units of work.
///
/// # Example
///
/// ```ignore
/// use rondo::{StepHandle, WorkError, Workload, suspend};
///
/// struct Greeter;
///
/// impl Workload for Greeter {
///     fn name(&self) -> &str {
///         "greeter"
///     }
///
///     fn start(&self) -> StepHandle {
///         Box::pin(async {
///             tracing::info!("hello");
///             suspend().await;
///             tracing::info!("goodbye");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Workload: Send + Sync {
    /// Returns the name of this workload, the default job identity.
    fn name(&self) -> &str;

    /// Create the resumable computation.
    ///
    /// Called once per execution attempt; the returned handle owns all
    /// in-progress state and is polled one step at a time.
    fn start(&self) -> StepHandle;

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}

/// Yield control back to the scheduler, ending the current step.
///
/// The next resumption of the job continues execution right after the
/// `suspend().await`.
pub async fn suspend() {
    struct Suspend {
        yielded: bool,
    }

    impl Future for Suspend {
        type Output = ();

        fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            let this = self.get_mut();
            if this.yielded {
                Poll::Ready(())
            } else {
                this.yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    Suspend { yielded: false }.await
}
