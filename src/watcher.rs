//! Configuration file watcher
//!
//! Uses the `notify` crate to watch the configuration file and swap a
//! freshly parsed snapshot into `SharedConfig` whenever it changes.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by rename-over keep triggering reloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SharedConfig;
use crate::error::ConfigError;

/// Window in which bursts of change events collapse into one reload
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Running configuration watcher
///
/// Dropping it stops both the OS watch and the reload task.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Start watching `path`, reloading into `shared` on change
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(path: &Path, shared: SharedConfig) -> Result<Self, ConfigError> {
        let path = absolute(path);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver gone means the watcher is shutting down
            let _ = tx.send(res);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!("Watching {} for configuration changes", path.display());
        let task = tokio::spawn(reload_loop(path, shared, rx));

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn reload_loop(
    path: PathBuf,
    shared: SharedConfig,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
) {
    while let Some(res) = rx.recv().await {
        if !concerns(&res, &path) {
            continue;
        }

        // Coalesce the rest of the burst
        tokio::time::sleep(DEBOUNCE).await;
        while rx.try_recv().is_ok() {}

        match shared.reload(&path) {
            Ok(config) => info!(
                "Configuration reloaded: {} banned words, message-queue {}",
                config.sensitive.len(),
                config.message_queue
            ),
            Err(e) => warn!("Ignoring configuration update: {}", e),
        }
    }
    debug!("Configuration watcher stopped");
}

/// Does this event touch the configuration file?
fn concerns(res: &notify::Result<Event>, path: &Path) -> bool {
    match res {
        Ok(event) => {
            !matches!(event.kind, EventKind::Access(_))
                && event.paths.iter().any(|p| p.file_name() == path.file_name())
        }
        Err(e) => {
            warn!("Watch error: {}", e);
            false
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
