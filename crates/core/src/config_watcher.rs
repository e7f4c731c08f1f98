use anyhow::Result;
use notify::{Event, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

/// Invokes a callback whenever a file is modified on disk.
///
/// Used for state that is edited out-of-band while the process runs.
pub struct FileWatcher {
    path: PathBuf,
}

impl FileWatcher {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Starts watching on a blocking worker and returns its handle.
    ///
    /// The task ends with an error if the watch cannot be installed.
    pub fn spawn<F>(self, on_change: F) -> JoinHandle<Result<()>>
    where
        F: Fn() + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = notify::recommended_watcher(move |res: Result<Event, _>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            })?;

            watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
            tracing::debug!(path = %self.path.display(), "Watching file for changes");

            for event in notify_rx {
                if event.kind.is_modify() || event.kind.is_create() {
                    tracing::info!(path = %self.path.display(), "File changed, reloading");
                    on_change();
                }
            }

            Ok::<_, anyhow::Error>(())
        })
    }
}
