//! Nimbus - a real-time cloud variable synchronization server
//!
//! Clients join numbered rooms over WebSocket connections and broadcast
//! key/value updates to every other member of the same room. This library
//! provides the room/connection lifecycle, validation, heartbeat, rate
//! limiting and buffered broadcast machinery; the binary wires it to a warp
//! HTTP/WebSocket front.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod security;
pub mod storage;

// Re-export main components
pub use config::*;
pub use constants::*;
