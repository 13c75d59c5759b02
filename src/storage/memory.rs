//! In-memory snapshot storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::storage::traits::SnapshotStore;

/// Process-local snapshot store. Survives room destruction but not a server
/// restart; also the storage double used by tests.
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get_snapshot(&self, room_id: &str) -> Result<Option<HashMap<String, String>>> {
        Ok(self.snapshots.read().await.get(room_id).cloned())
    }

    async fn set_snapshot(&self, room_id: &str, variables: &HashMap<String, String>) -> Result<()> {
        self.snapshots
            .write()
            .await
            .insert(room_id.to_string(), variables.clone());
        Ok(())
    }
}
