//! Strategy file hot reload.
//!
//! Polls the strategy file's modification time. A change is parsed,
//! validated and installed through [`ConfigStore::install`]; a rejected
//! file leaves the active configuration untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use idx_decision::{ConfigStore, StrategyConfig};
use idx_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AppResult;

pub struct ConfigWatcher {
    path: PathBuf,
    store: Arc<ConfigStore>,
    metrics: Arc<Metrics>,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Create a watcher; the current file state counts as already loaded.
    pub fn new(path: impl Into<PathBuf>, store: Arc<ConfigStore>, metrics: Arc<Metrics>) -> Self {
        let path = path.into();
        let last_modified = modified_time(&path);
        Self {
            path,
            store,
            metrics,
            last_modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload if the file changed since the last check.
    ///
    /// Returns the installed version, or `None` when nothing changed.
    pub fn check(&mut self) -> AppResult<Option<u64>> {
        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.last_modified {
            return Ok(None);
        }
        // Recorded before reloading so a bad file is not retried every poll.
        self.last_modified = modified;
        self.reload().map(Some)
    }

    /// Parse, validate and install the file unconditionally.
    pub fn reload(&self) -> AppResult<u64> {
        let result = StrategyConfig::from_file(&self.path).and_then(|config| self.store.install(config));
        match result {
            Ok(version) => {
                self.metrics.config_reload("ok");
                info!(path = %self.path.display(), version, "Strategy reloaded");
                Ok(version)
            }
            Err(e) => {
                self.metrics.config_reload("rejected");
                error!(
                    path = %self.path.display(),
                    active_version = self.store.version(),
                    error = %e,
                    "Strategy reload rejected, keeping active configuration"
                );
                Err(e.into())
            }
        }
    }

    /// Poll every `interval` until `token` is cancelled.
    pub fn spawn(mut self, interval: Duration, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(path = %self.path.display(), ?interval, "Config watcher started");

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.check() {
                            warn!(error = %e, "Config watcher check failed");
                        }
                    }
                }
            }
            debug!("Config watcher stopped");
        })
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        version = 1

        [[long.scenarios]]
        name = "any"
        risk_profile = "standard"

        [risk_profiles.standard]
        stop_distance = 20
        target_distance = 40
    "#;

    const UNKNOWN_PROFILE: &str = r#"
        [[long.scenarios]]
        name = "any"
        risk_profile = "missing"
    "#;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("idx-strategy-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn watcher(path: &Path) -> ConfigWatcher {
        let store = ConfigStore::new(StrategyConfig::from_file(path).unwrap()).unwrap();
        ConfigWatcher::new(path, Arc::new(store), Arc::new(Metrics::new().unwrap()))
    }

    #[test]
    fn test_reload_bumps_version() {
        let path = temp_file(VALID);
        let watcher = watcher(&path);
        assert_eq!(watcher.reload().unwrap(), 2);
        assert_eq!(watcher.store.version(), 2);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_invalid_reload_keeps_active_config() {
        let path = temp_file(VALID);
        let watcher = watcher(&path);
        std::fs::write(&path, UNKNOWN_PROFILE).unwrap();

        assert!(watcher.reload().is_err());
        assert_eq!(watcher.store.version(), 1);
        assert_eq!(watcher.store.current().long.scenarios[0].risk_profile, "standard");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_check_without_change_is_noop() {
        let path = temp_file(VALID);
        let mut watcher = watcher(&path);
        assert_eq!(watcher.check().unwrap(), None);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_spawned_watcher_stops_on_cancel() {
        let path = temp_file(VALID);
        let watcher = watcher(&path);
        let token = CancellationToken::new();
        tokio_test::block_on(async {
            let handle = watcher.spawn(Duration::from_millis(5), token.clone());
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
            handle.await.unwrap();
        });
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_noop() {
        let path = temp_file(VALID);
        let mut watcher = watcher(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(watcher.check().unwrap(), None);
    }
}
