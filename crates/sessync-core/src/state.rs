//! Session state: the replicated unit of the store.
//!
//! A `SessionState` is one logical HTTP session. Every node that has seen
//! the session holds exactly one authoritative in-memory instance per id;
//! cross-node copies converge via replayed operations but are not required
//! to be instantaneously identical.
//!
//! Timestamps are unix milliseconds assigned by the node that originated
//! the event, so replicas adopt the originator's clock for creation and
//! touch times. Inactivity windows are in seconds; a negative
//! `max_inactive_secs` means the session never expires.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Unix epoch milliseconds.
pub type UnixMillis = i64;

/// Attribute values are arbitrary JSON-serializable data.
pub type AttributeValue = serde_json::Value;

/// Current wall-clock time in unix milliseconds.
#[must_use]
pub fn now_millis() -> UnixMillis {
    chrono::Utc::now().timestamp_millis()
}

/// Globally unique session identifier, assigned by the first creator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Shared handle to one session's state.
///
/// The store maps ids to these; subscribers and session handles mutate
/// through the same allocation, so local and replayed updates observe a
/// single instance per node.
pub type SharedState = Arc<Mutex<SessionState>>;

/// One logical HTTP session, replicated across all nodes that have seen it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    id: SessionId,
    creation_time: UnixMillis,
    last_accessed_time: UnixMillis,
    max_inactive_secs: i64,
    actual_max_inactive_secs: i64,
    attributes: HashMap<String, AttributeValue>,
}

impl SessionState {
    /// Create a fresh session. The last-access time starts at creation.
    #[must_use]
    pub fn new(
        id: SessionId,
        creation_time: UnixMillis,
        max_inactive_secs: i64,
        actual_max_inactive_secs: i64,
    ) -> Self {
        Self {
            id,
            creation_time,
            last_accessed_time: creation_time,
            max_inactive_secs,
            actual_max_inactive_secs,
            attributes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn creation_time(&self) -> UnixMillis {
        self.creation_time
    }

    #[must_use]
    pub fn last_accessed_time(&self) -> UnixMillis {
        self.last_accessed_time
    }

    #[must_use]
    pub fn max_inactive_secs(&self) -> i64 {
        self.max_inactive_secs
    }

    #[must_use]
    pub fn actual_max_inactive_secs(&self) -> i64 {
        self.actual_max_inactive_secs
    }

    /// Inactivity window the local scavenger actually applies.
    ///
    /// The configured cluster-aware window wins when set; otherwise the
    /// session's own interval is used.
    #[must_use]
    pub fn effective_max_inactive_secs(&self) -> i64 {
        if self.actual_max_inactive_secs > 0 {
            self.actual_max_inactive_secs
        } else {
            self.max_inactive_secs
        }
    }

    pub fn set_last_accessed_time(&mut self, time: UnixMillis) {
        self.last_accessed_time = time;
    }

    pub fn set_max_inactive_secs(&mut self, secs: i64) {
        self.max_inactive_secs = secs;
    }

    /// Set one attribute, returning the previous value if any.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: AttributeValue,
    ) -> Option<AttributeValue> {
        self.attributes.insert(key.into(), value)
    }

    /// Replace the whole attribute map.
    pub fn set_attributes(&mut self, attributes: HashMap<String, AttributeValue>) {
        self.attributes = attributes;
    }

    /// Remove one attribute, returning the previous value if any.
    pub fn remove_attribute(&mut self, key: &str) -> Option<AttributeValue> {
        self.attributes.remove(key)
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    /// Is the session still live at `now`, allowing `extra_grace_secs` for
    /// touches that may not have propagated from a peer yet?
    ///
    /// A negative `max_inactive_secs` means the session never expires.
    #[must_use]
    pub fn is_valid(&self, now: UnixMillis, extra_grace_secs: i64) -> bool {
        if self.max_inactive_secs < 0 {
            return true;
        }
        let window_ms = self
            .effective_max_inactive_secs()
            .saturating_add(extra_grace_secs)
            .saturating_mul(1000);
        now.saturating_sub(self.last_accessed_time) <= window_ms
    }
}
