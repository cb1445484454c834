/// Local snapshot persistence for session resume
/// Single slot, last write wins; never the source of truth for multi-client state
use canvas::{CanvasDocument, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::Result;

/// Contents of the snapshot slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub document: CanvasDocument,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Timestamp,
}

impl Snapshot {
    pub fn of(document: &CanvasDocument) -> Self {
        Self {
            document: document.clone(),
            created_at: canvas::now(),
        }
    }
}

/// A single named storage slot holding serialized snapshot text.
pub trait SnapshotStore: Send + Sync + 'static {
    /// `Ok(None)` when the slot has never been written.
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, contents: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Slot backed by one JSON file, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process slot, handy for tests and headless sessions.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Mutex<Option<String>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.slot.lock().clone())
    }

    fn write(&self, contents: &str) -> Result<()> {
        *self.slot.lock() = Some(contents.to_string());
        *self.writes.lock() += 1;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

pub fn save_snapshot(store: &dyn SnapshotStore, document: &CanvasDocument) -> Result<()> {
    let json = serde_json::to_string(&Snapshot::of(document))?;
    store.write(&json)
}

/// Reads the slot. A missing slot, an unreadable one and unparsable contents
/// all yield `None`.
pub fn load_snapshot(store: &dyn SnapshotStore) -> Option<Snapshot> {
    let contents = match store.read() {
        Ok(Some(contents)) => contents,
        Ok(None) => return None,
        Err(err) => {
            warn!(%err, "failed to read canvas snapshot");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!(%err, "discarding unreadable canvas snapshot");
            None
        }
    }
}

/// Trailing-edge debounced snapshot writer.
///
/// At most one write is pending. Each `schedule` cancels the pending write and
/// restarts the delay, so the slot receives the last document once changes
/// have been quiet for `delay`. Dropping the persister cancels a pending write.
pub struct DebouncedPersister {
    store: Arc<dyn SnapshotStore>,
    delay: Duration,
    pending: Arc<Mutex<Option<CanvasDocument>>>,
    timer: Option<JoinHandle<()>>,
}

impl DebouncedPersister {
    pub fn new(store: impl SnapshotStore, delay: Duration) -> Self {
        Self::with_store(Arc::new(store), delay)
    }

    pub fn with_store(store: Arc<dyn SnapshotStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            pending: Arc::new(Mutex::new(None)),
            timer: None,
        }
    }

    pub fn store(&self) -> &dyn SnapshotStore {
        self.store.as_ref()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    pub fn load(&self) -> Option<Snapshot> {
        load_snapshot(self.store.as_ref())
    }

    pub fn schedule(&mut self, document: &CanvasDocument) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        *self.pending.lock() = Some(document.clone());

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime for debounced snapshot, writing immediately");
            self.flush();
            return;
        };

        let store = self.store.clone();
        let pending = self.pending.clone();
        let delay = self.delay;
        self.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let document = pending.lock().take();
            if let Some(document) = document {
                // file stores block; keep them off the runtime workers
                let write = tokio::task::spawn_blocking(move || write_logged(store.as_ref(), &document));
                if let Err(err) = write.await {
                    error!(%err, "canvas snapshot write task failed");
                }
            }
        }));
    }

    /// Writes the pending document now, if there is one.
    pub fn flush(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let document = self.pending.lock().take();
        if let Some(document) = document {
            write_logged(self.store.as_ref(), &document);
        }
    }

    /// Drops the pending write without touching the slot.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending.lock().take();
    }
}

impl Drop for DebouncedPersister {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn write_logged(store: &dyn SnapshotStore, document: &CanvasDocument) {
    match save_snapshot(store, document) {
        Ok(()) => debug!(version = document.version, "canvas snapshot written"),
        Err(err) => error!(%err, "failed to write canvas snapshot"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas::{apply_operation, CanvasNode, NodeType, Operation};

    const DELAY: Duration = Duration::from_millis(50);

    fn doc_at(version: u64) -> CanvasDocument {
        let mut doc = CanvasDocument::new("doc");
        doc.version = version;
        doc
    }

    fn stored_version(store: &MemorySnapshotStore) -> Option<u64> {
        load_snapshot(store).map(|s| s.document.version)
    }

    #[test]
    fn missing_slot_loads_as_none() {
        assert!(load_snapshot(&MemorySnapshotStore::new()).is_none());
    }

    #[test]
    fn corrupt_slot_loads_as_none() {
        let store = MemorySnapshotStore::new();
        store.write("{\"document\": 12").unwrap();
        assert!(load_snapshot(&store).is_none());
    }

    #[test]
    fn saved_snapshot_loads_back() {
        let store = MemorySnapshotStore::new();
        let doc = apply_operation(
            &CanvasDocument::new("doc"),
            &Operation::add_node(CanvasNode::new("a", NodeType::Text).with_prop("text", "hi")),
        );
        save_snapshot(&store, &doc).unwrap();
        let snapshot = load_snapshot(&store).unwrap();
        assert_eq!(snapshot.document, doc);
        let raw: serde_json::Value = serde_json::from_str(&store.contents().unwrap()).unwrap();
        assert!(raw["createdAt"].is_i64());
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested").join("slot.json"));
        assert_eq!(store.read().unwrap(), None);
        store.write("one").unwrap();
        store.write("two").unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some("two"));
        assert!(!store.temp_path().exists());
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.read().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_collapse_into_last_write() {
        let store = MemorySnapshotStore::new();
        let mut persister = DebouncedPersister::new(store.clone(), DELAY);

        persister.schedule(&doc_at(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        persister.schedule(&doc_at(2));
        tokio::time::sleep(Duration::from_millis(30)).await;
        // 60ms since the first change but only 30ms of quiet
        assert_eq!(store.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.write_count(), 1);
        assert_eq!(stored_version(&store), Some(2));
        assert!(!persister.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_immediately() {
        let store = MemorySnapshotStore::new();
        let mut persister = DebouncedPersister::new(store.clone(), DELAY);
        persister.schedule(&doc_at(7));
        persister.flush();
        assert_eq!(stored_version(&store), Some(7));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_pending_write() {
        let store = MemorySnapshotStore::new();
        {
            let mut persister = DebouncedPersister::new(store.clone(), DELAY);
            persister.schedule(&doc_at(3));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn debounced_write_runs_off_the_runtime_thread() {
        #[derive(Clone, Default)]
        struct RecordingStore {
            inner: MemorySnapshotStore,
            writer: Arc<Mutex<Option<std::thread::ThreadId>>>,
        }

        impl SnapshotStore for RecordingStore {
            fn read(&self) -> Result<Option<String>> {
                self.inner.read()
            }
            fn write(&self, contents: &str) -> Result<()> {
                *self.writer.lock() = Some(std::thread::current().id());
                self.inner.write(contents)
            }
            fn clear(&self) -> Result<()> {
                self.inner.clear()
            }
        }

        let store = RecordingStore::default();
        let mut persister = DebouncedPersister::new(store.clone(), Duration::from_millis(5));
        persister.schedule(&doc_at(1));

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.inner.write_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let writer = (*store.writer.lock()).unwrap();
        assert_ne!(writer, std::thread::current().id());
    }

    #[test]
    fn schedule_without_runtime_writes_through() {
        let store = MemorySnapshotStore::new();
        let mut persister = DebouncedPersister::new(store.clone(), DELAY);
        persister.schedule(&doc_at(4));
        assert_eq!(stored_version(&store), Some(4));
    }
}
