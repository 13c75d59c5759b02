//! Process-wide server state.
//!
//! Everything that used to be a global in less careful designs lives here as
//! explicitly owned, constructor-injected state with a documented start/stop
//! lifecycle. Tests build a fresh state per case.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::registry::RoomRegistry;
use crate::core::scheduler::BroadcastScheduler;
use crate::core::supervisor::ConnectionSupervisor;
use crate::security::{ContentFilter, ReputationChecker};
use crate::storage::SnapshotStore;

pub struct ServerState {
    pub config: ServerConfig,
    pub rooms: Arc<RoomRegistry>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub scheduler: Arc<BroadcastScheduler>,
    pub filter: Arc<ContentFilter>,
    pub reputation: Arc<dyn ReputationChecker>,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn SnapshotStore>,
        reputation: Arc<dyn ReputationChecker>,
    ) -> SharedState {
        let filter = match &config.blocklist_path {
            Some(path) => ContentFilter::from_sources(&[path]),
            None => ContentFilter::new(),
        };

        let rooms = Arc::new(RoomRegistry::new(
            store,
            config.max_rooms,
            config.max_variables_per_room,
            config.max_members_per_room,
            config.empty_room_grace,
        ));
        let supervisor = Arc::new(ConnectionSupervisor::new(config.ping_interval));
        let scheduler = Arc::new(BroadcastScheduler::new(config.buffer_sends));

        Arc::new(Self {
            config,
            rooms,
            supervisor,
            scheduler,
            filter: Arc::new(filter),
            reputation,
        })
    }

    /// Start all background timers: janitor, autosave, heartbeat, broadcast
    /// flushing.
    pub fn start(&self) {
        self.rooms.start();
        self.supervisor.start();
        self.scheduler.start();
    }

    /// Stop all background timers. Safe when never started.
    pub fn stop(&self) {
        self.rooms.stop();
        self.supervisor.stop();
        self.scheduler.stop();
    }
}
