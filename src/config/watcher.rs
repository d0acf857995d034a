//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Watches the configuration file and forwards every valid new version.
///
/// Invalid versions are logged and dropped; the running configuration stays.
#[derive(Debug, Clone)]
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Re-read the file now (e.g. on SIGHUP). Returns `true` if a valid
    /// configuration was forwarded.
    pub fn reload(&self) -> bool {
        forward(&self.path, &self.update_tx)
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(&self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?path, "Config file change detected, reloading");
                    forward(&path, &tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

fn forward(path: &Path, tx: &mpsc::UnboundedSender<GatewayConfig>) -> bool {
    match load_config(path) {
        Ok(config) => tx.send(config).is_ok(),
        Err(e) => {
            tracing::error!(
                error = %e,
                "Failed to reload config, keeping current configuration"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_forwards_valid_config_only() {
        let path = std::env::temp_dir().join(format!("qcb-watcher-{}.toml", std::process::id()));
        std::fs::write(&path, "[circuit_breaker]\nerror_threshold_percentage = 42\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        assert!(watcher.reload());
        let config = rx.try_recv().unwrap();
        assert_eq!(config.circuit_breaker.error_threshold_percentage, 42);

        std::fs::write(&path, "[circuit_breaker]\nerror_threshold_percentage = 420\n").unwrap();
        assert!(!watcher.reload());
        assert!(rx.try_recv().is_err());

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
