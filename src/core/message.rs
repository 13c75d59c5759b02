//! Wire protocol messages.
//!
//! Inbound messages are decoded once at the boundary into a tagged enum, so
//! an unknown `kind` is a parse-time rejection rather than a runtime
//! surprise deeper in the dispatch. Identifier and value fields stay as raw
//! JSON values here; the validators decide what is acceptable so that a
//! non-string where a string belongs is handled by policy, not by a decode
//! error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NimbusError, Result};

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Must be the first message on a connection; declares the room and
    /// identity to join. `variables` is the variable map the client expects
    /// the room to hold.
    Handshake {
        #[serde(rename = "roomId")]
        room_id: Value,
        username: Value,
        #[serde(default)]
        variables: HashMap<String, Value>,
    },
    /// Overwrite an existing variable.
    Set { name: Value, value: Value },
    /// Set-or-create alias of `set`.
    Create { name: Value, value: Value },
    /// Remove a variable. Gated by a deployment feature flag.
    Delete { name: Value },
    /// Rename a variable. Gated by a deployment feature flag.
    Rename {
        name: Value,
        #[serde(rename = "newName")]
        new_name: Value,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ServerMessage<'a> {
    Set { name: &'a str, value: &'a str },
}

/// Parse one inbound frame.
pub fn parse_client_message(text: &str) -> Result<ClientMessage> {
    serde_json::from_str(text).map_err(|e| NimbusError::MessageParse(e.to_string()))
}

/// Encode a single `set` notification.
pub fn encode_set(name: &str, value: &str) -> String {
    serde_json::to_string(&ServerMessage::Set { name, value }).unwrap_or_default()
}

/// Encode a batch of `set` notifications as one physical frame, individual
/// messages separated by newlines.
pub fn encode_set_batch<'a, I>(variables: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    variables
        .into_iter()
        .map(|(name, value)| encode_set(name, value))
        .collect::<Vec<_>>()
        .join("\n")
}
