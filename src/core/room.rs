//! A room: the variables shared under one room ID and the connections
//! subscribed to them.
//!
//! All methods are synchronous and perform no I/O. Mutation is serialized by
//! the registry's lock; the room itself holds none.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::{DEFAULT_MAX_MEMBERS_PER_ROOM, DEFAULT_MAX_VARIABLES_PER_ROOM};
use crate::core::connection::Connection;
use crate::core::validation::{is_valid_variable_name_str, is_valid_variable_value_str};
use crate::error::{NimbusError, Result};

pub struct Room {
    pub id: String,
    variables: HashMap<String, String>,
    members: HashMap<String, Arc<Connection>>,
    /// Time of the last member departure. Initialized at creation so a room
    /// that never gets a member still ages out.
    last_disconnect: Instant,
    max_variables: usize,
    max_members: usize,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self::with_limits(
            id,
            DEFAULT_MAX_VARIABLES_PER_ROOM,
            DEFAULT_MAX_MEMBERS_PER_ROOM,
        )
    }

    pub fn with_limits(id: String, max_variables: usize, max_members: usize) -> Self {
        Self {
            id,
            variables: HashMap::new(),
            members: HashMap::new(),
            last_disconnect: Instant::now(),
            max_variables,
            max_members,
        }
    }

    /// Add a member connection. Double-adds and overflow are errors.
    pub fn add_member(&mut self, conn: Arc<Connection>) -> Result<()> {
        if self.members.contains_key(&conn.id) {
            return Err(NimbusError::AlreadyMember(conn.id.clone()));
        }
        if self.members.len() >= self.max_members {
            return Err(NimbusError::RoomFull(self.id.clone()));
        }
        self.members.insert(conn.id.clone(), conn);
        Ok(())
    }

    /// Remove a member connection and stamp the departure time.
    pub fn remove_member(&mut self, conn_id: &str) -> Result<()> {
        if self.members.remove(conn_id).is_none() {
            return Err(NimbusError::NotMember(conn_id.to_string()));
        }
        self.last_disconnect = Instant::now();
        Ok(())
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// How long the room has been without any member departure or, if it
    /// never had members, since creation. Only meaningful while empty.
    pub fn idle_for(&self) -> Duration {
        self.last_disconnect.elapsed()
    }

    /// All members except the given connection, for sender-excluded fan-out.
    pub fn others(&self, conn_id: &str) -> Vec<Arc<Connection>> {
        self.members
            .iter()
            .filter(|(id, _)| id.as_str() != conn_id)
            .map(|(_, conn)| Arc::clone(conn))
            .collect()
    }

    /// Case-insensitive scan for a member with the given username.
    pub fn has_member_with_username(&self, username: &str) -> bool {
        self.members.values().any(|conn| {
            conn.username()
                .map_or(false, |existing| existing.eq_ignore_ascii_case(username))
        })
    }

    /// Order-independent, case-sensitive comparison between a candidate
    /// variable name list and this room's current variable names.
    pub fn matches_variable_set(&self, names: &[&str]) -> bool {
        names.len() == self.variables.len()
            && names.iter().all(|name| self.variables.contains_key(*name))
    }

    /// Create a new variable. Does not inform clients of the change.
    pub fn create(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_valid_variable_value_str(value) {
            return Err(NimbusError::InvalidVariableValue);
        }
        if !is_valid_variable_name_str(name) {
            return Err(NimbusError::InvalidVariableName);
        }
        if self.variables.contains_key(name) {
            return Err(NimbusError::VariableExists(name.to_string()));
        }
        if self.variables.len() >= self.max_variables {
            return Err(NimbusError::TooManyVariables(self.id.clone()));
        }
        self.variables.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Overwrite an existing variable. Does not inform clients of the change.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_valid_variable_value_str(value) {
            return Err(NimbusError::InvalidVariableValue);
        }
        match self.variables.get_mut(name) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(())
            }
            None => Err(NimbusError::VariableNotFound(name.to_string())),
        }
    }

    /// Remove a variable.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        if self.variables.remove(name).is_none() {
            return Err(NimbusError::VariableNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Move a variable to a new name, keeping its value. Validation happens
    /// before any mutation so a failure never leaves the room half-renamed.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if !is_valid_variable_name_str(new) {
            return Err(NimbusError::InvalidVariableName);
        }
        if self.variables.contains_key(new) {
            return Err(NimbusError::VariableExists(new.to_string()));
        }
        let value = self
            .variables
            .remove(old)
            .ok_or_else(|| NimbusError::VariableNotFound(old.to_string()))?;
        self.variables.insert(new.to_string(), value);
        Ok(())
    }

    /// Insert-or-overwrite used when building a room from a handshake
    /// variable map or a storage snapshot. The name must validate; an
    /// invalid value is coerced to `"0"` instead of failing the whole room.
    pub fn hydrate(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_valid_variable_name_str(name) {
            return Err(NimbusError::InvalidVariableName);
        }
        if !self.variables.contains_key(name) && self.variables.len() >= self.max_variables {
            return Err(NimbusError::TooManyVariables(self.id.clone()));
        }
        let value = if is_valid_variable_value_str(value) {
            value
        } else {
            "0"
        };
        self.variables.insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }
}
