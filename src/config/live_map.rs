//! Directory-backed map of JSON records, kept in sync with the filesystem.
//!
//! # Data Flow
//! ```text
//! open():  read_dir → parse each eligible file → initial snapshot
//!
//! start_watch():
//!     notify callback (watcher thread)
//!         → FileEvent over mpsc channel
//!         → apply task (tokio) → parse → copy-on-write snapshot swap
//! ```
//!
//! # Design Decisions
//! - Readers load an `Arc` snapshot through `ArcSwap`; a record is swapped in
//!   only after it parsed completely, so readers never see partial content
//! - A file that fails to parse keeps its previous record
//! - Records are ordered by key so first-match lookups are deterministic
//!   no matter in which order files were created
//! - `apply` is the only mutation path; tests inject events through it

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use notify::event::{AccessKind, AccessMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::observability::metrics;

/// Records keyed by file stem, in key order.
pub type Records<T> = BTreeMap<String, Arc<T>>;

/// Post-processing applied to every parsed record, given its key.
pub type Transform<T> = Box<dyn Fn(T, &str) -> T + Send + Sync>;

#[derive(Debug, Error)]
pub enum LiveMapError {
    #[error("configuration directory {} unavailable: {source}", .path.display())]
    ConfigurationUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("watching requires a running tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Error)]
enum LoadError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
}

/// A filesystem change, as seen by the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// The file was created or written.
    Changed(PathBuf),
    /// The file was deleted or renamed away.
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Changed(p) | FileEvent::Removed(p) => p,
        }
    }

    fn from_notify(event: Event) -> Vec<FileEvent> {
        match event.kind {
            EventKind::Remove(_) => event.paths.into_iter().map(FileEvent::Removed).collect(),
            EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Any => event.paths.into_iter().map(FileEvent::Changed).collect(),
            EventKind::Access(_) | EventKind::Other => Vec::new(),
        }
    }
}

/// Settings applied before the initial scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Log parse failures at `debug` instead of `error`.
    pub quiet_errors: bool,
}

struct Shared<T> {
    dir: PathBuf,
    extension: String,
    records: ArcSwap<Records<T>>,
    transform: Option<Transform<T>>,
    quiet_errors: AtomicBool,
}

impl<T: DeserializeOwned> Shared<T> {
    /// Key for `path`, or `None` when the file is not eligible.
    fn key_for(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        if name.starts_with('_') {
            return None;
        }
        let stem = name.strip_suffix(self.extension.as_str())?.strip_suffix('.')?;
        (!stem.is_empty()).then(|| stem.to_string())
    }

    fn load(&self, path: &Path, key: &str) -> Result<T, LoadError> {
        let content = fs::read_to_string(path)?;
        let record: T = serde_json::from_str(&content)?;
        Ok(match &self.transform {
            Some(transform) => transform(record, key),
            None => record,
        })
    }

    fn report(&self, path: &Path, error: &LoadError) {
        metrics::record_reload("error");
        if self.quiet_errors.load(Ordering::Relaxed) {
            tracing::debug!(path = %path.display(), error = %error, "Failed to load record");
        } else {
            tracing::error!(path = %path.display(), error = %error, "Failed to load record, keeping previous value");
        }
    }

    fn apply(&self, event: FileEvent) {
        let path = event.path();
        let Some(key) = self.key_for(path) else {
            return;
        };

        // The filesystem is the source of truth: a "removed" file that exists
        // again was re-created, a "changed" file that vanished was deleted.
        if !path.exists() {
            self.remove(&key);
            return;
        }

        match self.load(path, &key) {
            Ok(record) => self.upsert(key, record),
            Err(LoadError::Io(e)) if e.kind() == io::ErrorKind::NotFound => self.remove(&key),
            Err(e) => self.report(path, &e),
        }
    }

    fn upsert(&self, key: String, record: T) {
        let record = Arc::new(record);
        let current = self.records.rcu(|records| {
            let mut next = (**records).clone();
            next.insert(key.clone(), Arc::clone(&record));
            next
        });
        let verb = if current.contains_key(&key) { "updated" } else { "added" };
        tracing::debug!(key = %key, dir = %self.dir.display(), "Record {}", verb);
        metrics::record_reload(verb);
        self.publish_size();
    }

    fn remove(&self, key: &str) {
        let previous = self.records.rcu(|records| {
            let mut next = (**records).clone();
            next.remove(key);
            next
        });
        if previous.contains_key(key) {
            tracing::debug!(key = %key, dir = %self.dir.display(), "Record removed");
            metrics::record_reload("removed");
            self.publish_size();
        }
    }

    fn publish_size(&self) {
        metrics::record_map_size(&self.dir.to_string_lossy(), self.records.load().len());
    }
}

struct ActiveWatch {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

/// A keyed collection of JSON records mirrored from one directory.
///
/// Eligible files end in `.{extension}` and do not start with `_`; the key
/// is the file name without the extension.
pub struct LiveMap<T> {
    shared: Arc<Shared<T>>,
    watch: Mutex<Option<ActiveWatch>>,
}

impl<T> LiveMap<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Scan `dir` once and build the map.
    pub fn open(dir: impl Into<PathBuf>, extension: &str) -> Result<Self, LiveMapError> {
        Self::build(dir.into(), extension, None, LoadOptions::default())
    }

    /// Like [`LiveMap::open`], running `transform` over each parsed record.
    pub fn open_with<F>(dir: impl Into<PathBuf>, extension: &str, transform: F) -> Result<Self, LiveMapError>
    where
        F: Fn(T, &str) -> T + Send + Sync + 'static,
    {
        Self::open_with_options(dir, extension, transform, LoadOptions::default())
    }

    /// Like [`LiveMap::open_with`], with `options` in force for the initial
    /// scan as well as later reloads.
    pub fn open_with_options<F>(
        dir: impl Into<PathBuf>,
        extension: &str,
        transform: F,
        options: LoadOptions,
    ) -> Result<Self, LiveMapError>
    where
        F: Fn(T, &str) -> T + Send + Sync + 'static,
    {
        Self::build(dir.into(), extension, Some(Box::new(transform)), options)
    }

    fn build(
        dir: PathBuf,
        extension: &str,
        transform: Option<Transform<T>>,
        options: LoadOptions,
    ) -> Result<Self, LiveMapError> {
        let entries = fs::read_dir(&dir).map_err(|source| LiveMapError::ConfigurationUnavailable {
            path: dir.clone(),
            source,
        })?;

        let shared = Shared {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
            records: ArcSwap::from_pointee(Records::new()),
            transform,
            quiet_errors: AtomicBool::new(options.quiet_errors),
        };

        let mut records = Records::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(key) = shared.key_for(&path) else {
                continue;
            };
            match shared.load(&path, &key) {
                Ok(record) => {
                    records.insert(key, Arc::new(record));
                }
                Err(e) => shared.report(&path, &e),
            }
        }
        tracing::info!(dir = %shared.dir.display(), records = records.len(), "Loaded configuration directory");
        shared.records.store(Arc::new(records));
        shared.publish_size();

        Ok(Self {
            shared: Arc::new(shared),
            watch: Mutex::new(None),
        })
    }

    /// Start mirroring filesystem events into the map.
    ///
    /// Must be called from within a tokio runtime. Calling it while already
    /// watching is a no-op.
    pub fn start_watch(&self) -> Result<(), LiveMapError> {
        let mut watch = self.watch.lock().expect("live map watch mutex poisoned");
        if watch.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LiveMapError::NoRuntime)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<FileEvent>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(event) {
                        let _ = tx.send(file_event);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;
        watcher.watch(&self.shared.dir, RecursiveMode::NonRecursive)?;

        let shared = Arc::clone(&self.shared);
        // File reads happen on the blocking pool, one event at a time so
        // the order of events for a file is kept.
        let task = runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                let shared = Arc::clone(&shared);
                if let Err(e) = tokio::task::spawn_blocking(move || shared.apply(event)).await {
                    tracing::error!(error = %e, "Record reload task failed");
                }
            }
        });

        tracing::info!(dir = %self.shared.dir.display(), "Directory watcher started");
        *watch = Some(ActiveWatch { _watcher: watcher, task });
        Ok(())
    }
}

impl<T: DeserializeOwned> LiveMap<T> {
    /// Release the filesystem watch. Safe to call when not watching.
    pub fn stop_watch(&self) {
        let active = self.watch.lock().expect("live map watch mutex poisoned").take();
        if let Some(active) = active {
            active.task.abort();
            tracing::info!(dir = %self.shared.dir.display(), "Directory watcher stopped");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch.lock().expect("live map watch mutex poisoned").is_some()
    }

    /// Stop watching and drop the map.
    pub fn close(self) {
        self.stop_watch();
    }

    /// Feed one filesystem event through the same path the watcher uses.
    pub fn apply(&self, event: FileEvent) {
        self.shared.apply(event);
    }

    /// Log parse failures at `debug` instead of `error`.
    pub fn set_quiet_errors(&self, quiet: bool) {
        self.shared.quiet_errors.store(quiet, Ordering::Relaxed);
    }

    pub fn quiet_errors(&self) -> bool {
        self.shared.quiet_errors.load(Ordering::Relaxed)
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.shared.records.load().get(key).cloned()
    }

    /// Every `(key, record)` pair, in key order.
    pub fn entries(&self) -> Vec<(String, Arc<T>)> {
        self.shared
            .records
            .load()
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.shared.records.load().keys().cloned().collect()
    }

    /// The current records as one consistent snapshot.
    pub fn snapshot(&self) -> Arc<Records<T>> {
        self.shared.records.load_full()
    }

    pub fn len(&self) -> usize {
        self.shared.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.records.load().is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    pub fn extension(&self) -> &str {
        &self.shared.extension
    }
}

impl<T> Drop for LiveMap<T> {
    fn drop(&mut self) {
        let active = match self.watch.get_mut() {
            Ok(watch) => watch.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(active) = active {
            active.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Entry {
        value: u32,
        #[serde(default)]
        key: String,
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_open_filters_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"value":1}"#);
        write(dir.path(), "b.json", r#"{"value":2}"#);
        write(dir.path(), "_draft.json", r#"{"value":3}"#);
        write(dir.path(), "notes.txt", "hello");
        write(dir.path(), "broken.json", "{ nope");

        let map: LiveMap<Entry> = LiveMap::open(dir.path(), "json").unwrap();
        assert_eq!(map.keys(), vec!["a", "b"]);
        assert_eq!(map.get("b").unwrap().value, 2);
        assert!(map.get("_draft").is_none());
    }

    #[test]
    fn test_open_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<LiveMap<Entry>, _> = LiveMap::open(dir.path().join("missing"), "json");
        assert!(matches!(result, Err(LiveMapError::ConfigurationUnavailable { .. })));
    }

    #[test]
    fn test_transform_receives_key() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web.json", r#"{"value":7}"#);

        let map = LiveMap::open_with(dir.path(), "json", |mut e: Entry, key| {
            e.key = key.to_string();
            e
        })
        .unwrap();
        assert_eq!(map.get("web").unwrap().key, "web");
    }

    #[test]
    fn test_apply_events() {
        let dir = tempfile::tempdir().unwrap();
        let map: LiveMap<Entry> = LiveMap::open(dir.path(), "json").unwrap();
        assert!(map.is_empty());

        let path = write(dir.path(), "svc.json", r#"{"value":1}"#);
        map.apply(FileEvent::Changed(path.clone()));
        map.apply(FileEvent::Changed(path.clone()));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("svc").unwrap().value, 1);

        // A broken write keeps the last good record.
        fs::write(&path, r#"{"value":"#).unwrap();
        map.apply(FileEvent::Changed(path.clone()));
        assert_eq!(map.get("svc").unwrap().value, 1);

        fs::write(&path, r#"{"value":2}"#).unwrap();
        map.apply(FileEvent::Changed(path.clone()));
        assert_eq!(map.get("svc").unwrap().value, 2);

        fs::remove_file(&path).unwrap();
        map.apply(FileEvent::Removed(path.clone()));
        assert!(map.get("svc").is_none());

        write(dir.path(), "svc.json", r#"{"value":3}"#);
        map.apply(FileEvent::Changed(path));
        assert_eq!(map.get("svc").unwrap().value, 3);
    }

    #[test]
    fn test_apply_ignores_ineligible_files() {
        let dir = tempfile::tempdir().unwrap();
        let map: LiveMap<Entry> = LiveMap::open(dir.path(), "json").unwrap();

        let draft = write(dir.path(), "_svc.json", r#"{"value":1}"#);
        let text = write(dir.path(), "svc.txt", r#"{"value":1}"#);
        let bare = write(dir.path(), ".json", r#"{"value":1}"#);
        map.apply(FileEvent::Changed(draft));
        map.apply(FileEvent::Changed(text));
        map.apply(FileEvent::Changed(bare));
        assert!(map.is_empty());
    }

    #[test]
    fn test_event_path_is_source_of_truth() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "svc.json", r#"{"value":1}"#);
        let map: LiveMap<Entry> = LiveMap::open(dir.path(), "json").unwrap();

        // Stale removal for a file that is back on disk.
        map.apply(FileEvent::Removed(path.clone()));
        assert!(map.get("svc").is_some());

        // Change notification for a file that has since vanished.
        fs::remove_file(&path).unwrap();
        map.apply(FileEvent::Changed(path));
        assert!(map.get("svc").is_none());
    }

    #[test]
    fn test_snapshot_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "svc.json", r#"{"value":1}"#);
        let map: LiveMap<Entry> = LiveMap::open(dir.path(), "json").unwrap();

        let before = map.snapshot();
        fs::write(&path, r#"{"value":2}"#).unwrap();
        map.apply(FileEvent::Changed(path));

        assert_eq!(before["svc"].value, 1);
        assert_eq!(map.snapshot()["svc"].value, 2);
    }

    /// Records the level of every event emitted while installed.
    #[derive(Clone, Default)]
    struct LevelLog(Arc<Mutex<Vec<tracing::Level>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LevelLog {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    impl LevelLog {
        fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
            use tracing_subscriber::layer::SubscriberExt;
            let subscriber = tracing_subscriber::registry().with(self.clone());
            tracing::subscriber::with_default(subscriber, f)
        }

        fn errors(&self) -> usize {
            self.0.lock().unwrap().iter().filter(|l| **l == tracing::Level::ERROR).count()
        }
    }

    #[test]
    fn test_initial_scan_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "ok.json", r#"{"value":1}"#);
        write(dir.path(), "bad.json", "{ broken");

        let log = LevelLog::default();
        let map: LiveMap<Entry> = log.capture(|| LiveMap::open(dir.path(), "json").unwrap());
        assert_eq!(map.keys(), vec!["ok"]);
        assert_eq!(log.errors(), 1);
    }

    #[test]
    fn test_quiet_option_covers_initial_scan() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.json", "{ broken");

        let log = LevelLog::default();
        let options = LoadOptions { quiet_errors: true };
        let map: LiveMap<Entry> =
            log.capture(|| LiveMap::open_with_options(dir.path(), "json", |e, _| e, options).unwrap());
        assert!(map.is_empty());
        assert!(map.quiet_errors());
        assert_eq!(log.errors(), 0);
        assert!(log.0.lock().unwrap().contains(&tracing::Level::DEBUG));
    }

    #[test]
    fn test_set_quiet_errors_applies_to_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let map: LiveMap<Entry> = LiveMap::open(dir.path(), "json").unwrap();
        let path = write(dir.path(), "bad.json", "{ broken");

        let log = LevelLog::default();
        log.capture(|| map.apply(FileEvent::Changed(path.clone())));
        assert_eq!(log.errors(), 1);

        map.set_quiet_errors(true);
        let log = LevelLog::default();
        log.capture(|| map.apply(FileEvent::Changed(path)));
        assert_eq!(log.errors(), 0);
    }

    #[test]
    fn test_start_watch_requires_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let map: LiveMap<Entry> = LiveMap::open(dir.path(), "json").unwrap();
        assert!(matches!(map.start_watch(), Err(LiveMapError::NoRuntime)));
        // Stopping without a watch is fine, twice.
        map.stop_watch();
        map.stop_watch();
        assert!(!map.is_watching());
    }

    #[test]
    fn test_from_notify_kinds() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        let path = PathBuf::from("/tmp/x.json");
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        let modified = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.clone());
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write))).add_path(path.clone());
        let accessed = Event::new(EventKind::Access(AccessKind::Any)).add_path(path.clone());

        assert_eq!(FileEvent::from_notify(created), vec![FileEvent::Changed(path.clone())]);
        assert_eq!(FileEvent::from_notify(modified), vec![FileEvent::Changed(path.clone())]);
        assert_eq!(FileEvent::from_notify(closed), vec![FileEvent::Changed(path.clone())]);
        assert_eq!(FileEvent::from_notify(removed), vec![FileEvent::Removed(path)]);
        assert!(FileEvent::from_notify(accessed).is_empty());
    }
}
