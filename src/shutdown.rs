use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Returns a token that cancels on SIGTERM or ctrl-c. Worker pools, the
/// heartbeat task, and the API server all watch this token and drain
/// gracefully instead of aborting mid-job.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();

    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        let reason = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = tokio::signal::ctrl_c() => "interrupt",
        };

        tracing::info!(reason, "shutdown signal received");
        signal_token.cancel();
    });

    token
}
