use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Resolves once the registration server is asked to stop, whether by
/// Ctrl+C, SIGTERM or its own cancellation token.
pub(crate) async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Ctrl+C received, stopping registration server"),
        _ = terminate => tracing::warn!("SIGTERM received, stopping registration server"),
        _ = cancel_token.cancelled() => tracing::warn!("Shutdown requested, stopping registration server"),
    }
}
