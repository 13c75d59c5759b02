//! Per-client connection state.
//!
//! Every outbound message and lifecycle transition goes through this one
//! type so that closing is idempotent no matter which of the three contexts
//! (inbound error, transport error, heartbeat sweep) triggers it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use log::{debug, warn};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;
use warp::ws::Message;

use crate::error::{NimbusError, Result};

pub struct Connection {
    pub id: String,
    /// Resolved remote address, already proxy- and anonymization-adjusted.
    pub addr: String,
    pub connected_at: Instant,
    sender: mpsc::UnboundedSender<Message>,
    closed: AtomicBool,
    // Wakes the read loop when the connection is closed server-side; a dead
    // peer never sends anything that would wake it otherwise.
    closed_tx: watch::Sender<bool>,
    responded_to_ping: AtomicBool,
    // Set once at handshake, then immutable.
    username: RwLock<Option<String>>,
    // Weak back-reference: the room owns the membership list, the
    // connection only remembers the key.
    room: RwLock<Option<String>>,
}

impl Connection {
    pub fn new(addr: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            addr,
            connected_at: Instant::now(),
            sender,
            closed: AtomicBool::new(false),
            closed_tx: watch::channel(false).0,
            // A fresh connection counts as having answered: the first probe
            // sends a ping rather than disconnecting it.
            responded_to_ping: AtomicBool::new(true),
            username: RwLock::new(None),
            room: RwLock::new(None),
        }
    }

    /// Send a text frame. A send to a closed or torn-down transport is a
    /// logged no-op, never an error.
    pub fn send_text(&self, text: &str) -> bool {
        if self.is_closed() {
            debug!("Dropping message to closed connection {}", self.label());
            return false;
        }
        if self.sender.send(Message::text(text)).is_err() {
            warn!("Failed to send message to {}", self.label());
            return false;
        }
        true
    }

    /// Send a heartbeat probe frame.
    pub fn send_ping(&self) -> bool {
        !self.is_closed() && self.sender.send(Message::ping(Vec::new())).is_ok()
    }

    /// Close the transport with a reason code. Safe to call repeatedly and
    /// from any task; only the first call sends the close frame.
    pub fn close(&self, code: u16, reason: &'static str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.sender.send(Message::close_with(code, reason)).is_err() {
            debug!("Close frame for {} not delivered; transport already gone", self.id);
        }
        self.closed_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the connection has been closed, from any task.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        if self.is_closed() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    /// Record a pong from the peer.
    pub fn mark_pong(&self) {
        self.responded_to_ping.store(true, Ordering::SeqCst);
    }

    /// Arm the one-bit liveness check: the peer has until the next probe to
    /// answer with a pong.
    pub fn expect_pong(&self) {
        self.responded_to_ping.store(false, Ordering::SeqCst);
    }

    pub fn responded_to_ping(&self) -> bool {
        self.responded_to_ping.load(Ordering::SeqCst)
    }

    /// Attach to a room. A connection joins at most one room over its
    /// lifetime; a second join is a contract violation.
    pub fn set_room(&self, room_id: &str) -> Result<()> {
        let mut room = self.room.write().unwrap_or_else(|e| e.into_inner());
        if room.is_some() {
            return Err(NimbusError::AlreadyInRoom);
        }
        *room = Some(room_id.to_string());
        Ok(())
    }

    pub fn room(&self) -> Option<String> {
        self.room.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_username(&self, username: &str) {
        let mut slot = self.username.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(username.to_string());
    }

    pub fn username(&self) -> Option<String> {
        self.username
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Short identity string for logs: address plus username once known.
    pub fn label(&self) -> String {
        match self.username() {
            Some(username) => format!("{} ({})", self.addr, username),
            None => self.addr.clone(),
        }
    }
}
