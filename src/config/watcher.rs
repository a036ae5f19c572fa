//! Single-file watcher for hot reload.
//!
//! Watches the file's parent directory rather than the file itself: editors
//! and the admin API often replace files by rename, which would silently
//! orphan a watch placed on the old inode.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

type Loader<T> = Box<dyn Fn(&Path) -> Result<T, String> + Send>;

/// A watcher that reloads one file whenever it changes.
pub struct FileWatcher<T> {
    path: PathBuf,
    load: Loader<T>,
    update_tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> FileWatcher<T> {
    /// Create a new FileWatcher.
    ///
    /// Returns the watcher and a receiver for freshly loaded values. A load
    /// that fails is logged and nothing is sent.
    pub fn new<F, E>(path: &Path, load: F) -> (Self, mpsc::UnboundedReceiver<T>)
    where
        F: Fn(&Path) -> Result<T, E> + Send + 'static,
        E: Display,
    {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                load: Box::new(move |p: &Path| load(p).map_err(|e| e.to_string())),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Events are handled on notify's background thread;
    /// dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let FileWatcher { path, load, update_tx } = self;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| p.file_name() == file_name.as_deref());
                    if !relevant {
                        return;
                    }
                    tracing::debug!(path = %watched.display(), "File change detected, reloading");
                    match load(&watched) {
                        Ok(value) => {
                            let _ = update_tx.send(value);
                        }
                        Err(e) => {
                            tracing::error!(path = %watched.display(), error = %e, "Failed to reload file, keeping current value");
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "File watcher started");
        Ok(watcher)
    }
}
