//! The process-wide room table.
//!
//! One registry instance owns every room. A single write lock serializes all
//! room mutation, which is the serialization point the rooms themselves rely
//! on. The janitor and autosave sweeps run as background tasks with an
//! explicit start/stop lifecycle; both tolerate rooms appearing and
//! disappearing between enumeration and action.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::constants::{AUTOSAVE_INTERVAL_SECS, JANITOR_INTERVAL_SECS};
use crate::core::room::Room;
use crate::error::{NimbusError, Result};
use crate::storage::SnapshotStore;

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Room>>,
    max_rooms: usize,
    max_variables_per_room: usize,
    max_members_per_room: usize,
    empty_room_grace: Duration,
    store: Arc<dyn SnapshotStore>,
    janitor_task: Mutex<Option<JoinHandle<()>>>,
    autosave_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomRegistry {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        max_rooms: usize,
        max_variables_per_room: usize,
        max_members_per_room: usize,
        empty_room_grace: Duration,
    ) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_rooms,
            max_variables_per_room,
            max_members_per_room,
            empty_room_grace,
            store,
            janitor_task: Mutex::new(None),
            autosave_task: Mutex::new(None),
        }
    }

    pub async fn has(&self, id: &str) -> bool {
        self.rooms.read().await.contains_key(id)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Create a new room, hydrating it from the client-declared variable map
    /// and, when one exists, the stored snapshot (stored values win).
    /// Returns whether a snapshot was applied, so the caller knows the room
    /// may differ from what the creating client declared.
    pub async fn create(&self, id: &str, initial: &HashMap<String, String>) -> Result<bool> {
        // Fetch the snapshot before taking the lock; a lost creation race
        // surfaces as RoomExists below and the fetch is simply discarded.
        let snapshot = match self.store.get_snapshot(id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Could not load snapshot for room {}: {}", id, e);
                None
            }
        };

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(id) {
            return Err(NimbusError::RoomExists(id.to_string()));
        }
        if rooms.len() >= self.max_rooms {
            return Err(NimbusError::TooManyRooms);
        }

        let mut room = Room::with_limits(
            id.to_string(),
            self.max_variables_per_room,
            self.max_members_per_room,
        );
        for (name, value) in initial {
            room.hydrate(name, value)?;
        }
        let hydrated = match snapshot {
            Some(stored) => {
                for (name, value) in &stored {
                    room.hydrate(name, value)?;
                }
                true
            }
            None => false,
        };

        rooms.insert(id.to_string(), room);
        info!("Created room {}", id);
        Ok(hydrated)
    }

    /// Run a closure against one room under the registry's write lock. This
    /// is the single serialization point for all room mutation.
    pub async fn update<F, T>(&self, id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Room) -> Result<T>,
    {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(id)
            .ok_or_else(|| NimbusError::RoomNotFound(id.to_string()))?;
        f(room)
    }

    /// Read-only access to one room.
    pub async fn with_room<F, T>(&self, id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Room) -> T,
    {
        let rooms = self.rooms.read().await;
        let room = rooms
            .get(id)
            .ok_or_else(|| NimbusError::RoomNotFound(id.to_string()))?;
        Ok(f(room))
    }

    /// Detach a connection from its room on disconnect. The room having
    /// vanished in the meantime (janitor, explicit removal) is a benign
    /// race, not an error.
    pub async fn leave(&self, id: &str, conn_id: &str) {
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(id) {
            Some(room) => {
                if let Err(e) = room.remove_member(conn_id) {
                    debug!("Leave of room {} ignored: {}", id, e);
                }
            }
            None => debug!("Leave of vanished room {} ignored", id),
        }
    }

    /// Remove a room explicitly. Refused while members remain; the final
    /// variable snapshot is persisted before the room goes away.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let removed = {
            let mut rooms = self.rooms.write().await;
            match rooms.get(id) {
                None => return Err(NimbusError::RoomNotFound(id.to_string())),
                Some(room) if !room.is_empty() => {
                    return Err(NimbusError::RoomNotEmpty(id.to_string()))
                }
                Some(_) => {}
            }
            rooms.remove(id)
        };
        if let Some(room) = removed {
            self.persist(&room.id, room.variables()).await;
        }
        Ok(())
    }

    /// Janitor sweep: drop every room that has been empty for longer than
    /// the grace period, persisting each final snapshot. Returns the number
    /// of rooms reclaimed.
    pub async fn janitor_sweep(&self) -> usize {
        let removed: Vec<Room> = {
            let mut rooms = self.rooms.write().await;
            let expired: Vec<String> = rooms
                .iter()
                .filter(|(_, room)| room.is_empty() && room.idle_for() > self.empty_room_grace)
                .map(|(id, _)| id.clone())
                .collect();
            expired
                .iter()
                .filter_map(|id| rooms.remove(id))
                .collect()
        };

        for room in &removed {
            self.persist(&room.id, room.variables()).await;
            info!("Janitor removed empty room {}", room.id);
        }
        removed.len()
    }

    /// Autosave sweep: persist every room's current variables. Returns the
    /// number of rooms saved.
    pub async fn autosave_sweep(&self) -> usize {
        let snapshots: Vec<(String, HashMap<String, String>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(id, room)| (id.clone(), room.variables().clone()))
                .collect()
        };

        let count = snapshots.len();
        for (id, variables) in snapshots {
            self.persist(&id, &variables).await;
        }
        count
    }

    async fn persist(&self, id: &str, variables: &HashMap<String, String>) {
        if let Err(e) = self.store.set_snapshot(id, variables).await {
            warn!("Could not persist snapshot for room {}: {}", id, e);
        }
    }

    /// Start the janitor and autosave timers. Starting twice is a logged
    /// no-op.
    pub fn start(self: &Arc<Self>) {
        let mut janitor = self
            .janitor_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if janitor.is_some() {
            warn!("Room registry timers already started");
            return;
        }

        let registry = Arc::clone(self);
        *janitor = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(JANITOR_INTERVAL_SECS));
            loop {
                interval.tick().await;
                registry.janitor_sweep().await;
            }
        }));

        let registry = Arc::clone(self);
        let mut autosave = self
            .autosave_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *autosave = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(AUTOSAVE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let saved = registry.autosave_sweep().await;
                if saved > 0 {
                    debug!("Autosaved {} rooms", saved);
                }
            }
        }));
    }

    /// Stop both timers. Safe when never started, and safe to call twice.
    pub fn stop(&self) {
        if let Some(task) = self
            .janitor_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        if let Some(task) = self
            .autosave_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}
