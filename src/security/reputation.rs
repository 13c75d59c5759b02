//! Pluggable username-reputation lookup.
//!
//! The handshake consults this before admitting a client. Implementations
//! may call out to an external account service; the check runs inside the
//! connection's own serial task so a slow lookup never stalls the rest of
//! the server.

use async_trait::async_trait;

#[async_trait]
pub trait ReputationChecker: Send + Sync {
    /// Whether the username plausibly belongs to a real account.
    async fn is_plausible_account(&self, username: &str) -> bool;
}

/// Default checker that accepts every username.
pub struct AllowAll;

#[async_trait]
impl ReputationChecker for AllowAll {
    async fn is_plausible_account(&self, _username: &str) -> bool {
        true
    }
}
