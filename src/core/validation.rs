//! Well-formedness predicates for identifiers and variable data.
//!
//! Every predicate has an untyped entry point over `serde_json::Value` so
//! that non-string inputs coming off the wire are rejected defensively, plus
//! a `_str` form used once the input is known to be a string.

use serde_json::Value;

use crate::constants::{
    USERNAME_MAX_LENGTH, USERNAME_MIN_LENGTH, VALUE_MAX_LENGTH, VARIABLE_NAME_MAX_LENGTH,
    VARIABLE_NAME_PREFIX,
};

/// Room IDs are non-empty strings of ASCII digits. The grammar is fixed at
/// compile time; it is not a deployment knob.
pub fn is_valid_room_id(value: &Value) -> bool {
    value.as_str().map_or(false, is_valid_room_id_str)
}

pub fn is_valid_room_id_str(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Username shape check: length within bounds, characters limited to
/// `[A-Za-z0-9_-]`. Content filtering is layered on by the caller.
pub fn is_valid_username(value: &Value) -> bool {
    value.as_str().map_or(false, is_valid_username_str)
}

pub fn is_valid_username_str(username: &str) -> bool {
    let length = username.chars().count();
    if length < USERNAME_MIN_LENGTH || length > USERNAME_MAX_LENGTH {
        return false;
    }
    username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Variable names must carry the cloud prefix, have something after it, and
/// stay under the length cap.
pub fn is_valid_variable_name(value: &Value) -> bool {
    value.as_str().map_or(false, is_valid_variable_name_str)
}

pub fn is_valid_variable_name_str(name: &str) -> bool {
    if !name.starts_with(VARIABLE_NAME_PREFIX) {
        return false;
    }
    let length = name.chars().count();
    length > VARIABLE_NAME_PREFIX.chars().count() && length < VARIABLE_NAME_MAX_LENGTH
}

/// Variable values are opaque numeric strings: an optional leading `-`, at
/// most one `.`, every other character an ASCII digit. The empty string is
/// valid (it means "zero/clear"); a lone `-` or `.` is not. Scientific
/// notation and hex are always rejected so the wire format stays simple
/// string arithmetic. Values are never parsed as floats; hundred-digit
/// strings are fine up to the length cap.
pub fn is_valid_variable_value(value: &Value) -> bool {
    value.as_str().map_or(false, is_valid_variable_value_str)
}

pub fn is_valid_variable_value_str(value: &str) -> bool {
    if value.len() > VALUE_MAX_LENGTH {
        return false;
    }
    if value == "." || value == "-" {
        return false;
    }

    let bytes = value.as_bytes();
    let mut i = usize::from(bytes.first() == Some(&b'-'));
    let mut seen_decimal = false;
    while i < bytes.len() {
        match bytes[i] {
            b'.' if seen_decimal => return false,
            b'.' => seen_decimal = true,
            b'0'..=b'9' => {}
            _ => return false,
        }
        i += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn room_id_rejects_non_strings() {
        assert!(!is_valid_room_id(&json!(123)));
        assert!(!is_valid_room_id(&json!(null)));
        assert!(!is_valid_room_id(&json!(true)));
        assert!(!is_valid_room_id(&json!([])));
        assert!(!is_valid_room_id(&json!({})));
        assert!(is_valid_room_id(&json!("123")));
    }

    #[test]
    fn value_edge_cases() {
        assert!(is_valid_variable_value_str(""));
        assert!(!is_valid_variable_value_str("-"));
        assert!(!is_valid_variable_value_str("."));
        assert!(is_valid_variable_value_str("4."));
        assert!(is_valid_variable_value_str(".4"));
        assert!(!is_valid_variable_value_str("4..4"));
        assert!(!is_valid_variable_value_str("1e+100"));
    }
}
