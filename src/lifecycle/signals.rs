//! OS signal handling.
//!
//! SIGTERM and SIGINT end the process gracefully; SIGHUP asks for a
//! configuration reload and never shuts down.

use tokio::sync::mpsc;

/// Block until a shutdown signal arrives, forwarding every SIGHUP to `reload_tx`.
#[cfg(unix)]
pub async fn wait_for_shutdown(reload_tx: mpsc::UnboundedSender<()>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("SIGINT received, shutting down");
                return Ok(());
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading configuration");
                if reload_tx.send(()).is_err() {
                    tracing::warn!("Reload requested but nobody is listening");
                }
            }
        }
    }
}

/// Block until Ctrl-C. Reloads are only triggered by the file watcher here.
#[cfg(not(unix))]
pub async fn wait_for_shutdown(_reload_tx: mpsc::UnboundedSender<()>) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    Ok(())
}
