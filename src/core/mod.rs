//! Core room, connection, and delivery machinery.

pub mod address;
pub mod connection;
pub mod message;
pub mod rate_limiter;
pub mod registry;
pub mod room;
pub mod scheduler;
pub mod state;
pub mod supervisor;
pub mod validation;

// Re-export main components for convenience
pub use connection::Connection;
pub use rate_limiter::RateLimiter;
pub use registry::RoomRegistry;
pub use room::Room;
pub use scheduler::BroadcastScheduler;
pub use state::{ServerState, SharedState};
pub use supervisor::ConnectionSupervisor;
