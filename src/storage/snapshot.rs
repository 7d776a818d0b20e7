//! Durable session snapshots. Namespaced get/set, last write wins.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::core::session::SessionSnapshot;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, namespace: &str, snapshot: &SessionSnapshot) -> anyhow::Result<()>;
    async fn load(&self, namespace: &str) -> anyhow::Result<Option<SessionSnapshot>>;
}

/// All namespaces live in one JSON object file. Writes go through a temp
/// file in the same directory and are renamed into place.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> anyhow::Result<Map<String, Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(Map::new()),
            Ok(raw) => {
                let value: Value = serde_json::from_str(&raw)
                    .with_context(|| format!("parse {}", self.path.display()))?;
                match value {
                    Value::Object(map) => Ok(map),
                    _ => anyhow::bail!("{} does not hold a JSON object", self.path.display()),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e).with_context(|| format!("read {}", self.path.display())),
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn save(&self, namespace: &str, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;

        let mut all = self.read_all().await.unwrap_or_else(|e| {
            tracing::warn!("[store] starting over, previous contents unreadable: {}", e);
            Map::new()
        });
        all.insert(namespace.to_string(), serde_json::to_value(snapshot)?);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(all))?)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }

    async fn load(&self, namespace: &str) -> anyhow::Result<Option<SessionSnapshot>> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        match all.remove(namespace) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: StdMutex<HashMap<String, SessionSnapshot>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, namespace: &str, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        entries.insert(namespace.to_string(), snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, namespace: &str) -> anyhow::Result<Option<SessionSnapshot>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(entries.get(namespace).cloned())
    }
}
