//! Hot-reloaded whitelist and blacklist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use notify::RecommendedWatcher;
use tokio::task::JoinHandle;

use crate::config::live_map::LiveMapError;
use crate::config::watcher::FileWatcher;
use crate::security::access_control::{decide, AccessList, Decision};

fn read_list(path: &Path) -> io::Result<AccessList> {
    fs::read_to_string(path).map(|content| AccessList::parse(&content))
}

/// An access list file mirrored in memory.
///
/// Each reload swaps in a whole new list; a file that cannot be read keeps
/// the previous list.
pub struct LiveAccessList {
    path: PathBuf,
    list: Arc<ArcSwap<AccessList>>,
    watch: Mutex<Option<(RecommendedWatcher, JoinHandle<()>)>>,
}

impl LiveAccessList {
    /// Read the list once. A missing file yields an empty list.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let list = match read_list(&path) {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Access list unreadable, starting empty");
                AccessList::default()
            }
        };
        tracing::info!(path = %path.display(), entries = list.len(), "Loaded access list");

        Self {
            path,
            list: Arc::new(ArcSwap::from_pointee(list)),
            watch: Mutex::new(None),
        }
    }

    pub fn start_watch(&self) -> Result<(), LiveMapError> {
        let mut watch = self.watch.lock().expect("access list watch mutex poisoned");
        if watch.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LiveMapError::NoRuntime)?;
        let (watcher, mut updates) = FileWatcher::new(&self.path, read_list);
        let watcher = watcher.run()?;

        let list = Arc::clone(&self.list);
        let path = self.path.clone();
        let task = runtime.spawn(async move {
            while let Some(next) = updates.recv().await {
                tracing::info!(path = %path.display(), entries = next.len(), "Access list reloaded");
                list.store(Arc::new(next));
            }
        });

        *watch = Some((watcher, task));
        Ok(())
    }

    pub fn stop_watch(&self) {
        if let Some((_, task)) = self.watch.lock().expect("access list watch mutex poisoned").take() {
            task.abort();
        }
    }

    /// The current list.
    pub fn current(&self) -> Arc<AccessList> {
        self.list.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LiveAccessList {
    fn drop(&mut self) {
        self.stop_watch();
    }
}

/// Whitelist and blacklist taken together.
#[derive(Default)]
pub struct AccessControl {
    whitelist: Option<LiveAccessList>,
    blacklist: Option<LiveAccessList>,
}

impl AccessControl {
    pub fn new(whitelist: Option<LiveAccessList>, blacklist: Option<LiveAccessList>) -> Self {
        Self { whitelist, blacklist }
    }

    pub fn from_paths(whitelist: Option<&Path>, blacklist: Option<&Path>) -> Self {
        Self::new(whitelist.map(LiveAccessList::open), blacklist.map(LiveAccessList::open))
    }

    pub fn start_watch(&self) -> Result<(), LiveMapError> {
        for list in self.whitelist.iter().chain(self.blacklist.iter()) {
            list.start_watch()?;
        }
        Ok(())
    }

    pub fn stop_watch(&self) {
        for list in self.whitelist.iter().chain(self.blacklist.iter()) {
            list.stop_watch();
        }
    }

    /// Check `address` against the current lists.
    pub fn check(&self, address: &str) -> Decision {
        let whitelist = self.whitelist.as_ref().map(LiveAccessList::current);
        let blacklist = self.blacklist.as_ref().map(LiveAccessList::current);
        decide(address, whitelist.as_deref(), blacklist.as_deref())
    }
}
