//! Liveness supervision for all open connections.
//!
//! A one-bit heartbeat: every probe, connections that never answered the
//! previous ping are force-closed, connections that still have not completed
//! a handshake after a full interval are force-closed, and everyone else
//! gets their liveness bit cleared and a fresh ping. A false positive just
//! disconnects a client that will reconnect; that is normal behavior, not a
//! server error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::constants::CLOSE_GENERIC_ERROR;
use crate::core::connection::Connection;

pub struct ConnectionSupervisor {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    probe_interval: Duration,
    probe_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub fn new(probe_interval: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            probe_interval,
            probe_task: StdMutex::new(None),
        }
    }

    pub async fn register(&self, conn: Arc<Connection>) {
        self.connections.write().await.insert(conn.id.clone(), conn);
    }

    pub async fn unregister(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// One probe pass over every live connection. Returns how many were
    /// declared dead.
    pub async fn probe(&self) -> usize {
        let connections: Vec<Arc<Connection>> = {
            let connections = self.connections.read().await;
            connections.values().cloned().collect()
        };

        if !connections.is_empty() {
            info!("Pinging {} clients...", connections.len());
        }

        let mut timed_out = 0;
        for conn in connections {
            if conn.is_closed() {
                continue;
            }

            if !conn.responded_to_ping() {
                // No pong since the last probe; the peer is probably dead.
                // Closing the transport triggers the normal close cleanup.
                info!("Connection {} timed out (no pong)", conn.label());
                conn.close(CLOSE_GENERIC_ERROR, "ping timeout");
                timed_out += 1;
                continue;
            }

            if conn.room().is_none() && conn.connected_at.elapsed() > self.probe_interval {
                info!("Connection {} timed out (no handshake)", conn.label());
                conn.close(CLOSE_GENERIC_ERROR, "handshake timeout");
                timed_out += 1;
                continue;
            }

            // The peer has until the next probe to answer this ping.
            conn.expect_pong();
            conn.send_ping();
        }
        timed_out
    }

    /// Start the periodic probe. Starting twice is a logged no-op.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.probe_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            warn!("Connection supervisor already started");
            return;
        }

        let supervisor = Arc::clone(self);
        let period = self.probe_interval;
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The immediate first tick would probe connections that were
            // never pinged; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                supervisor.probe().await;
            }
        }));
    }

    /// Stop the probe. Safe when never started, and safe to call twice.
    pub fn stop(&self) {
        if let Some(task) = self
            .probe_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<warp::ws::Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Connection::new("127.0.0.1".to_string(), tx)), rx)
    }

    #[tokio::test]
    async fn unanswered_ping_closes_the_connection() {
        let supervisor = ConnectionSupervisor::new(Duration::from_secs(30));
        let (conn, mut rx) = connection();
        conn.set_room("123").ok();
        supervisor.register(Arc::clone(&conn)).await;

        // First probe arms the check and pings.
        assert_eq!(supervisor.probe().await, 0);
        assert!(rx.try_recv().unwrap().is_ping());

        // No pong arrives; second probe declares the peer dead.
        assert_eq!(supervisor.probe().await, 1);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn pong_keeps_the_connection_alive() {
        let supervisor = ConnectionSupervisor::new(Duration::from_secs(30));
        let (conn, _rx) = connection();
        conn.set_room("123").ok();
        supervisor.register(Arc::clone(&conn)).await;

        supervisor.probe().await;
        conn.mark_pong();
        assert_eq!(supervisor.probe().await, 0);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn missing_handshake_times_out() {
        let supervisor = ConnectionSupervisor::new(Duration::from_millis(10));
        let (conn, _rx) = connection();
        supervisor.register(Arc::clone(&conn)).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.mark_pong();
        assert_eq!(supervisor.probe().await, 1);
        assert!(conn.is_closed());
    }
}
