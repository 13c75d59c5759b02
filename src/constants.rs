// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9080;

/// A required prefix that must appear at the beginning of every variable name.
pub const VARIABLE_NAME_PREFIX: &str = "☁ ";
/// The maximum length, in characters, of a variable name.
pub const VARIABLE_NAME_MAX_LENGTH: usize = 1024;
/// The maximum length of a variable value.
pub const VALUE_MAX_LENGTH: usize = 100_000;

// Username length bounds, inclusive.
pub const USERNAME_MIN_LENGTH: usize = 1;
pub const USERNAME_MAX_LENGTH: usize = 20;

// Default capacity bounds
pub const DEFAULT_MAX_ROOMS: usize = 2048;
pub const DEFAULT_MAX_VARIABLES_PER_ROOM: usize = 128;
pub const DEFAULT_MAX_MEMBERS_PER_ROOM: usize = 128;

// Default timer cadences
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_EMPTY_ROOM_GRACE_SECS: u64 = 300;
pub const JANITOR_INTERVAL_SECS: u64 = 60;
pub const AUTOSAVE_INTERVAL_SECS: u64 = 60;

// Default per-connection rate limit: no more than this many messages in any
// trailing window of the given length.
pub const DEFAULT_RATE_LIMIT_OPERATIONS: usize = 30;
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 1000;

/// Default number of buffered-broadcast flushes per second. Zero disables
/// buffering and sends every update immediately.
pub const DEFAULT_BUFFER_SENDS: u32 = 30;

// WebSocket close codes. These are part of the wire contract and must stay
// stable across releases.
pub const CLOSE_GENERIC_ERROR: u16 = 4000;
pub const CLOSE_INCOMPATIBILITY: u16 = 4001;
pub const CLOSE_USERNAME_ERROR: u16 = 4002;
pub const CLOSE_OVERLOADED: u16 = 4003;
pub const CLOSE_TRY_AGAIN_LATER: u16 = 4004;
