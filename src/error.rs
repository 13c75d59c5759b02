use std::error::Error;
use std::fmt;

use crate::constants::{
    CLOSE_GENERIC_ERROR, CLOSE_INCOMPATIBILITY, CLOSE_OVERLOADED, CLOSE_TRY_AGAIN_LATER,
    CLOSE_USERNAME_ERROR,
};

#[derive(Debug)]
pub enum NimbusError {
    // Handshake rejections
    InvalidRoomId(String),
    InvalidUsername(String),
    BlockedUsername(String),
    ImplausibleUsername(String),
    UsernameTaken(String),
    VariableSchemaMismatch,

    // Capacity errors
    RoomFull(String),
    TooManyRooms,
    TooManyVariables(String),
    RateLimited(u128),

    // Protocol errors
    HandshakeRequired,
    DuplicateHandshake,
    MessageParse(String),
    FeatureDisabled(&'static str),
    InvalidVariableName,
    InvalidVariableValue,
    BlockedVariableName,
    VariableNotFound(String),
    VariableExists(String),

    // Membership contract violations
    AlreadyMember(String),
    NotMember(String),
    AlreadyInRoom,
    RoomNotFound(String),
    RoomExists(String),
    RoomNotEmpty(String),

    // System errors
    Storage(String),
    Config(String),
}

impl fmt::Display for NimbusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRoomId(id) => write!(f, "Invalid room ID: {}", id),
            Self::InvalidUsername(name) => write!(f, "Invalid username: {}", name),
            Self::BlockedUsername(name) => write!(f, "Username is not allowed: {}", name),
            Self::ImplausibleUsername(name) => write!(f, "Username failed reputation check: {}", name),
            Self::UsernameTaken(name) => {
                write!(f, "Client with provided username already exists: {}", name)
            }
            Self::VariableSchemaMismatch => write!(f, "Variable list does not match"),
            Self::RoomFull(id) => write!(f, "Too many clients are connected to room {}", id),
            Self::TooManyRooms => write!(f, "Too many rooms"),
            Self::TooManyVariables(id) => write!(f, "Too many variables in room {}", id),
            Self::RateLimited(ms) => {
                write!(f, "Too many messages (last in period: {}ms ago)", ms)
            }
            Self::HandshakeRequired => write!(f, "No room setup yet"),
            Self::DuplicateHandshake => write!(f, "Already performed handshake"),
            Self::MessageParse(msg) => write!(f, "Could not parse message: {}", msg),
            Self::FeatureDisabled(feature) => write!(f, "{} is disabled", feature),
            Self::InvalidVariableName => write!(f, "Invalid variable name"),
            Self::InvalidVariableValue => write!(f, "Invalid variable value"),
            Self::BlockedVariableName => write!(f, "Variable name is not allowed"),
            Self::VariableNotFound(name) => write!(f, "Variable does not exist: {}", name),
            Self::VariableExists(name) => write!(f, "Variable already exists: {}", name),
            Self::AlreadyMember(id) => write!(f, "Connection {} is already in the room", id),
            Self::NotMember(id) => write!(f, "Connection {} is not part of the room", id),
            Self::AlreadyInRoom => write!(f, "Connection has already joined a room"),
            Self::RoomNotFound(id) => write!(f, "Room does not exist: {}", id),
            Self::RoomExists(id) => write!(f, "Room already exists: {}", id),
            Self::RoomNotEmpty(id) => write!(f, "Room still has members: {}", id),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for NimbusError {}

impl NimbusError {
    /// The WebSocket close code sent to the client when this error tears
    /// down a connection. Codes are a stable wire contract.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::InvalidUsername(_)
            | Self::BlockedUsername(_)
            | Self::ImplausibleUsername(_)
            | Self::UsernameTaken(_) => CLOSE_USERNAME_ERROR,
            Self::VariableSchemaMismatch | Self::BlockedVariableName => CLOSE_INCOMPATIBILITY,
            Self::RoomFull(_) | Self::TooManyRooms => CLOSE_OVERLOADED,
            Self::RateLimited(_) => CLOSE_TRY_AGAIN_LATER,
            _ => CLOSE_GENERIC_ERROR,
        }
    }

    /// A short close-frame reason. Close reasons are capped at 123 bytes by
    /// the protocol, so this never includes client-supplied text; the full
    /// detail goes to the log instead.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::InvalidRoomId(_) => "invalid room id",
            Self::InvalidUsername(_) => "invalid username",
            Self::BlockedUsername(_) | Self::ImplausibleUsername(_) => "username not allowed",
            Self::UsernameTaken(_) => "username taken",
            Self::VariableSchemaMismatch => "incompatible variable list",
            Self::RoomFull(_) | Self::TooManyRooms => "overloaded",
            Self::RateLimited(_) => "try again later",
            _ => "error",
        }
    }
}

// Generic result type for nimbus
pub type Result<T> = std::result::Result<T, NimbusError>;
