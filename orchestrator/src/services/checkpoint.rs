//! Checkpoint store implementations
//!
//! `FileCheckpointStore` persists manifest snapshots as JSON under a
//! directory, one file per run, written atomically (temp file + rename).
//! File I/O runs on the blocking pool so it never stalls the worker loops.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::debug;
use uuid::Uuid;

use crate::core::manifest::ManifestSnapshot;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::traits::CheckpointStore;

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_path(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("manifest-{run_id}.json"))
    }
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, run_id: Uuid, snapshot: ManifestSnapshot) -> OrchestratorResult<()> {
        let path = self.snapshot_path(run_id);
        let tmp = path.with_extension("json.tmp");
        let dir = self.dir.clone();
        let payload = serde_json::to_vec_pretty(&snapshot)?;

        tokio::task::spawn_blocking(move || -> OrchestratorResult<()> {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&tmp, &payload)?;
            // Rename makes the write atomic: a crash leaves either the old
            // snapshot or the new one, never a torn file
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })
        .await??;

        debug!("💾 Checkpointed run {} to {}", run_id, self.snapshot_path(run_id).display());
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> OrchestratorResult<Option<ManifestSnapshot>> {
        let path = self.snapshot_path(run_id);

        let bytes = tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(OrchestratorError::Io(err)),
        })
        .await??;

        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Map-backed store for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    snapshots: Mutex<HashMap<Uuid, ManifestSnapshot>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().expect("checkpoint store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, run_id: Uuid, snapshot: ManifestSnapshot) -> OrchestratorResult<()> {
        self.snapshots
            .lock()
            .expect("checkpoint store lock poisoned")
            .insert(run_id, snapshot);
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> OrchestratorResult<Option<ManifestSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .expect("checkpoint store lock poisoned")
            .get(&run_id)
            .cloned())
    }
}
