//! Stop-signal installation.
//!
//! The returned token is the only external control surface of the run loop:
//! the scheduler checks it at cycle boundaries and switches to the drain-and-
//! snapshot path once it is cancelled.

use tokio_util::sync::CancellationToken;

/// Install a handler that cancels the returned token on operator interrupt
/// (Ctrl+C / SIGINT).
pub fn install_stop_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, requesting stop");
                token_clone.cancel();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for interrupt signal");
            }
        }
    });

    token
}
