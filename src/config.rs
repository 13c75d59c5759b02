//! Server configuration.
//!
//! All knobs come from `NIMBUS_*` environment variables with sane defaults;
//! unparseable values fall back to the default rather than failing startup.
//! Only a genuinely invalid choice (an unknown persistence backend) is an
//! error.

use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BUFFER_SENDS, DEFAULT_EMPTY_ROOM_GRACE_SECS, DEFAULT_HOST,
    DEFAULT_MAX_MEMBERS_PER_ROOM, DEFAULT_MAX_ROOMS, DEFAULT_MAX_VARIABLES_PER_ROOM,
    DEFAULT_PING_INTERVAL_SECS, DEFAULT_PORT, DEFAULT_RATE_LIMIT_OPERATIONS,
    DEFAULT_RATE_LIMIT_WINDOW_MS,
};
use crate::error::{NimbusError, Result};

/// Which snapshot store backs the room registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// No persistence; rooms are ephemeral.
    None,
    /// Process-local in-memory store.
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Global cap on simultaneously existing rooms.
    pub max_rooms: usize,
    pub max_variables_per_room: usize,
    pub max_members_per_room: usize,
    /// How long an empty room survives before the janitor reclaims it.
    pub empty_room_grace: Duration,
    /// Heartbeat probe cadence; also the handshake grace window.
    pub ping_interval: Duration,
    /// Outgoing update batches per second; zero sends immediately.
    pub buffer_sends: u32,
    pub enable_delete: bool,
    pub enable_rename: bool,
    pub rate_limit_operations: usize,
    pub rate_limit_window: Duration,
    /// Use x-forwarded-for when behind a reverse proxy.
    pub trust_proxy: bool,
    /// Remove client addresses from logs.
    pub anonymize_addresses: bool,
    /// Reduce generated usernames like "player123456" to just "player".
    pub anonymize_generated_usernames: bool,
    /// Run variable names through the content filter.
    pub filter_variable_names: bool,
    /// Extra blocklist file for the content filter.
    pub blocklist_path: Option<String>,
    pub persistence: Persistence,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_rooms: DEFAULT_MAX_ROOMS,
            max_variables_per_room: DEFAULT_MAX_VARIABLES_PER_ROOM,
            max_members_per_room: DEFAULT_MAX_MEMBERS_PER_ROOM,
            empty_room_grace: Duration::from_secs(DEFAULT_EMPTY_ROOM_GRACE_SECS),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            buffer_sends: DEFAULT_BUFFER_SENDS,
            enable_delete: false,
            enable_rename: false,
            rate_limit_operations: DEFAULT_RATE_LIMIT_OPERATIONS,
            rate_limit_window: Duration::from_millis(DEFAULT_RATE_LIMIT_WINDOW_MS),
            trust_proxy: false,
            anonymize_addresses: false,
            anonymize_generated_usernames: true,
            filter_variable_names: true,
            blocklist_path: None,
            persistence: Persistence::None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults above.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let persistence = match env::var("NIMBUS_PERSISTENCE").as_deref() {
            Err(_) | Ok("none") => Persistence::None,
            Ok("memory") => Persistence::Memory,
            Ok(other) => {
                return Err(NimbusError::Config(format!(
                    "Unknown persistence backend: {}",
                    other
                )))
            }
        };

        Ok(Self {
            host: env::var("NIMBUS_HOST").unwrap_or(defaults.host),
            port: env_parse("NIMBUS_PORT", defaults.port),
            max_rooms: env_parse("NIMBUS_MAX_ROOMS", defaults.max_rooms),
            max_variables_per_room: env_parse(
                "NIMBUS_MAX_VARIABLES_PER_ROOM",
                defaults.max_variables_per_room,
            ),
            max_members_per_room: env_parse(
                "NIMBUS_MAX_MEMBERS_PER_ROOM",
                defaults.max_members_per_room,
            ),
            empty_room_grace: Duration::from_secs(env_parse(
                "NIMBUS_EMPTY_ROOM_GRACE_SECS",
                DEFAULT_EMPTY_ROOM_GRACE_SECS,
            )),
            ping_interval: Duration::from_secs(env_parse(
                "NIMBUS_PING_INTERVAL_SECS",
                DEFAULT_PING_INTERVAL_SECS,
            )),
            buffer_sends: env_parse("NIMBUS_BUFFER_SENDS", defaults.buffer_sends),
            enable_delete: env_flag("NIMBUS_ENABLE_DELETE", defaults.enable_delete),
            enable_rename: env_flag("NIMBUS_ENABLE_RENAME", defaults.enable_rename),
            rate_limit_operations: env_parse(
                "NIMBUS_RATE_LIMIT_OPS",
                defaults.rate_limit_operations,
            ),
            rate_limit_window: Duration::from_millis(env_parse(
                "NIMBUS_RATE_LIMIT_WINDOW_MS",
                DEFAULT_RATE_LIMIT_WINDOW_MS,
            )),
            trust_proxy: env_flag("NIMBUS_TRUST_PROXY", defaults.trust_proxy),
            anonymize_addresses: env_flag(
                "NIMBUS_ANONYMIZE_ADDRESSES",
                defaults.anonymize_addresses,
            ),
            anonymize_generated_usernames: env_flag(
                "NIMBUS_ANONYMIZE_GENERATED_USERNAMES",
                defaults.anonymize_generated_usernames,
            ),
            filter_variable_names: env_flag(
                "NIMBUS_FILTER_VARIABLE_NAMES",
                defaults.filter_variable_names,
            ),
            blocklist_path: env::var("NIMBUS_BLOCKLIST_PATH").ok(),
            persistence,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(value) => value == "1" || value.eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_variables_per_room, 128);
        assert_eq!(config.max_members_per_room, 128);
        assert!(!config.enable_delete);
        assert!(!config.enable_rename);
        assert!(config.anonymize_generated_usernames);
        assert_eq!(config.persistence, Persistence::None);
    }

    #[test]
    fn unknown_persistence_is_rejected() {
        env::set_var("NIMBUS_PERSISTENCE", "cloud9");
        let result = ServerConfig::from_env();
        env::remove_var("NIMBUS_PERSISTENCE");
        assert!(result.is_err());
    }
}
