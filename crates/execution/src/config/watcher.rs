//! Polling config reloader.

use super::{ConfigError, KernelConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// File fingerprint used to detect changes.
type Stamp = (Option<SystemTime>, u64);

/// Watches a config file and publishes each valid revision.
///
/// The kernel scheduler drives [`check_once`](Self::check_once). A revision
/// that fails to parse or validate is logged and dropped; the last
/// known-good config stays current.
pub struct ConfigWatcher {
    path: PathBuf,
    tx: watch::Sender<Arc<KernelConfig>>,
    last_stamp: Mutex<Option<Stamp>>,
}

impl ConfigWatcher {
    /// Creates a watcher seeded with the config already loaded from `path`.
    pub async fn new(path: impl Into<PathBuf>, initial: KernelConfig) -> Self {
        let path = path.into();
        let stamp = Self::stamp(&path).await;
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self {
            path,
            tx,
            last_stamp: Mutex::new(stamp),
        }
    }

    /// Current known-good config.
    pub fn current(&self) -> Arc<KernelConfig> {
        self.tx.borrow().clone()
    }

    async fn stamp(path: &Path) -> Option<Stamp> {
        let meta = tokio::fs::metadata(path).await.ok()?;
        Some((meta.modified().ok(), meta.len()))
    }

    /// Reloads when the file changed since the last look.
    ///
    /// Returns `Ok(true)` when a new config was published.
    ///
    /// # Errors
    /// Returns the parse or validation error of a rejected revision. The
    /// published config is left untouched in that case.
    pub async fn check_once(&self) -> Result<bool, ConfigError> {
        let stamp = Self::stamp(&self.path).await;
        {
            let mut last = self.last_stamp.lock().await;
            if *last == stamp {
                return Ok(false);
            }
            *last = stamp;
        }
        if stamp.is_none() {
            debug!(path = %self.path.display(), "Config file disappeared, keeping current config");
            return Ok(false);
        }

        let path = self.path.clone();
        let reloaded = tokio::task::spawn_blocking(move || {
            let mut config = KernelConfig::from_file(&path)?;
            config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
            config.validate()?;
            Ok::<_, ConfigError>(config)
        })
        .await
        .map_err(|e| ConfigError::Invalid(format!("reload task failed: {e}")))?;

        match reloaded {
            Ok(config) => {
                if *self.current() == config {
                    return Ok(false);
                }
                self.tx.send_replace(Arc::new(config));
                info!(path = %self.path.display(), "Config reloaded");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Config reload rejected, keeping last good config");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reload_publishes_and_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.toml");
        std::fs::write(&path, "maxConcurrentRequests = 4\n").unwrap();
        let initial = KernelConfig::from_file(&path).unwrap();

        let watcher = ConfigWatcher::new(&path, initial).await;
        assert!(!watcher.check_once().await.unwrap());

        std::fs::write(&path, "maxConcurrentRequests = 12\nenabled = false\n").unwrap();
        assert!(watcher.check_once().await.unwrap());
        assert_eq!(watcher.current().max_concurrent_requests, 12);
        assert!(!watcher.current().enabled);

        // Fails validation: last good config stays published.
        std::fs::write(&path, "maxConcurrentRequests = 0\nenabled = false\nrequestTimeout = 5\n").unwrap();
        assert!(watcher.check_once().await.is_err());
        assert_eq!(watcher.current().max_concurrent_requests, 12);

        // Fails parsing.
        std::fs::write(&path, "maxConcurrentRequests = [").unwrap();
        assert!(watcher.check_once().await.is_err());
        assert_eq!(watcher.current().max_concurrent_requests, 12);
    }
}
