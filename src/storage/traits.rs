//! Abstract snapshot storage for pluggable backends.
//!
//! The registry persists each room's variable map through this interface and
//! hydrates newly created rooms from it. Persistence is best-effort: a
//! failed save is logged, never fatal to a connection.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Fetch the stored variable map for a room, or `None` if the room has
    /// never been saved.
    async fn get_snapshot(&self, room_id: &str) -> Result<Option<HashMap<String, String>>>;

    /// Store the current variable map for a room, replacing any previous
    /// snapshot.
    async fn set_snapshot(&self, room_id: &str, variables: &HashMap<String, String>) -> Result<()>;
}

/// Ephemeral backend: never returns a snapshot, discards every save.
pub struct NullSnapshotStore;

#[async_trait]
impl SnapshotStore for NullSnapshotStore {
    async fn get_snapshot(&self, _room_id: &str) -> Result<Option<HashMap<String, String>>> {
        Ok(None)
    }

    async fn set_snapshot(
        &self,
        _room_id: &str,
        _variables: &HashMap<String, String>,
    ) -> Result<()> {
        Ok(())
    }
}
