//! Buffered, coalescing delivery of variable updates.
//!
//! With buffering enabled, updates destined for a connection are parked in a
//! per-connection pending map and flushed together on a fixed tick as one
//! physical frame. Multiple updates to the same variable within one tick
//! collapse to the latest value, so a connection never receives a stale
//! value after a newer one. With buffering disabled every update is sent the
//! instant it is produced. Either way this stays decoupled from room
//! mutation; rooms never perform I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use log::warn;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::connection::Connection;
use crate::core::message::{encode_set, encode_set_batch};

struct PendingBatch {
    conn: Arc<Connection>,
    // variable name -> latest value, last write wins
    updates: HashMap<String, String>,
}

pub struct BroadcastScheduler {
    /// Flushes per second; zero means immediate mode.
    flushes_per_second: u32,
    pending: Mutex<HashMap<String, PendingBatch>>,
    flush_task: StdMutex<Option<JoinHandle<()>>>,
}

impl BroadcastScheduler {
    pub fn new(flushes_per_second: u32) -> Self {
        Self {
            flushes_per_second,
            pending: Mutex::new(HashMap::new()),
            flush_task: StdMutex::new(None),
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.flushes_per_second == 0
    }

    /// Queue one variable update for one connection, or deliver it on the
    /// spot in immediate mode.
    pub async fn queue(&self, conn: &Arc<Connection>, name: &str, value: &str) {
        if conn.is_closed() {
            return;
        }
        if self.is_immediate() {
            conn.send_text(&encode_set(name, value));
            return;
        }

        let mut pending = self.pending.lock().await;
        let batch = pending
            .entry(conn.id.clone())
            .or_insert_with(|| PendingBatch {
                conn: Arc::clone(conn),
                updates: HashMap::new(),
            });
        batch.updates.insert(name.to_string(), value.to_string());
    }

    /// Deliver everything pending, one frame per connection.
    pub async fn flush(&self) {
        let drained: Vec<PendingBatch> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, batch)| batch).collect()
        };

        for batch in drained {
            if batch.conn.is_closed() {
                continue;
            }
            let frame = encode_set_batch(
                batch
                    .updates
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            );
            batch.conn.send_text(&frame);
        }
    }

    /// Number of connections with updates waiting, for diagnostics.
    pub async fn pending_connections(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Start the flush timer. Immediate mode needs no timer; starting twice
    /// is a logged no-op.
    pub fn start(self: &Arc<Self>) {
        if self.is_immediate() {
            return;
        }
        let mut task = self.flush_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            warn!("Broadcast scheduler already started");
            return;
        }

        let scheduler = Arc::clone(self);
        // A tick never goes below 1ms no matter how high the rate is set.
        let period = Duration::from_millis((1000 / u64::from(self.flushes_per_second)).max(1));
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                scheduler.flush().await;
            }
        }));
    }

    /// Stop the flush timer. Safe when never started, and safe to call
    /// twice. Anything still pending is delivered in one final flush by the
    /// caller if it cares; normally shutdown just drops it.
    pub fn stop(&self) {
        if let Some(task) = self
            .flush_task
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
    async fn immediate_mode_sends_right_away() {
        let scheduler = BroadcastScheduler::new(0);
        let (conn, mut rx) = connection();
        scheduler.queue(&conn, "☁ x", "5").await;
        let frame = rx.try_recv().unwrap();
        assert!(frame.to_str().unwrap().contains("\"value\":\"5\""));
    }

    #[tokio::test]
    async fn buffered_mode_coalesces_per_variable() {
        let scheduler = BroadcastScheduler::new(30);
        let (conn, mut rx) = connection();

        scheduler.queue(&conn, "☁ x", "1").await;
        scheduler.queue(&conn, "☁ x", "2").await;
        scheduler.queue(&conn, "☁ y", "9").await;
        // Nothing delivered until the flush.
        assert!(rx.try_recv().is_err());

        scheduler.flush().await;
        let frame = rx.try_recv().unwrap();
        let text = frame.to_str().unwrap();
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(!text.contains("\"value\":\"1\""));
        assert!(text.contains("\"value\":\"2\""));
        assert!(text.contains("\"value\":\"9\""));

        // The flush drained everything.
        assert_eq!(scheduler.pending_connections().await, 0);
    }

    #[tokio::test]
    async fn closed_connections_are_skipped() {
        let scheduler = BroadcastScheduler::new(30);
        let (conn, mut rx) = connection();
        scheduler.queue(&conn, "☁ x", "1").await;
        conn.close(4000, "gone");
        let _ = rx.try_recv(); // close frame
        scheduler.flush().await;
        assert!(rx.try_recv().is_err());
    }
}
