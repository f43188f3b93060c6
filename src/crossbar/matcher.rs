//! Trigger matching for the crossbar.
//!
//! A notification matches a trigger if every key the two share has equal
//! values. Keys missing from the notification never block a match, and keys
//! the trigger does not mention are ignored.
//!
//! - N `{collection: "C"}` matches T `{collection: "C"}`
//! - N `{collection: "C", id: "X"}` matches T `{collection: "C"}`
//! - N `{collection: "C"}` matches T `{collection: "C", id: "X"}`
//! - N `{collection: "C", id: "X"}` matches T `{collection: "C", id: "X"}`
//! - N `{collection: "C", id: "X"}` does not match T `{collection: "C", id: "Y"}`

use crate::value::Value;

use super::message::Message;

/// Returns true if `notification` matches `trigger`.
#[must_use]
pub fn matches(notification: &Message, trigger: &Message) -> bool {
    // Most messages differ only by id; decide those without the generic walk.
    match (notification.id(), trigger.id()) {
        (Some(Value::String(n)), Some(Value::String(t))) if n != t => return false,
        (Some(Value::ObjectId(n)), Some(Value::ObjectId(t))) if n != t => return false,
        _ => {}
    }

    trigger
        .iter()
        .all(|(key, expected)| notification.get(key).map_or(true, |actual| actual == expected))
}
