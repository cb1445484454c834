use std::path::PathBuf;
use std::time::Duration;

use crate::{DebouncedPersister, FileSnapshotStore};

/// Environment variable holding the realtime server endpoint.
pub const REALTIME_URL_ENV: &str = "CANVAS_REALTIME_URL";

/// Trailing delay between the last document change and the snapshot write.
pub const DEFAULT_PERSIST_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8080/ws`. `None` runs offline.
    pub endpoint: Option<String>,
}

impl RealtimeConfig {
    pub fn offline() -> Self {
        Self { endpoint: None }
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self::from_value(Some(endpoint.into()))
    }

    pub fn from_env() -> Self {
        Self::from_value(std::env::var(REALTIME_URL_ENV).ok())
    }

    fn from_value(value: Option<String>) -> Self {
        let endpoint = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self { endpoint }
    }

    pub fn is_offline(&self) -> bool {
        self.endpoint.is_none()
    }

    /// Socket URL for one project.
    pub fn project_url(&self, project_id: &str) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            let sep = if endpoint.contains('?') { '&' } else { '?' };
            format!("{endpoint}{sep}projectId={project_id}")
        })
    }
}

pub fn default_snapshot_path() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("canvas").join("snapshot.json")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub delay: Duration,
    pub slot: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_PERSIST_DELAY,
            slot: default_snapshot_path(),
        }
    }
}

impl PersistenceConfig {
    pub fn at(slot: impl Into<PathBuf>) -> Self {
        Self {
            slot: slot.into(),
            ..Self::default()
        }
    }

    pub fn persister(&self) -> DebouncedPersister {
        DebouncedPersister::new(FileSnapshotStore::new(&self.slot), self.delay)
    }
}
