//! Subscriber registry: session id → locally-attached delegate.
//!
//! A subscriber represents "this session is currently active and bound to
//! request-processing machinery on this node". Zero or one subscriber per
//! id at any time; a session may exist in the store without a subscriber
//! (not yet locally touched), and a subscribe may race ahead of store
//! population during creation. The registry exists only to resolve
//! instance-level dispatch targets and to fan out batch touches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::SubscriberError;
use crate::state::{AttributeValue, SessionId, UnixMillis};

/// Locally-attached delegate receiving instance-level operations for one
/// session id.
pub trait Subscriber: Send + Sync {
    fn set_last_accessed_time(&self, time: UnixMillis) -> Result<(), SubscriberError>;

    fn set_max_inactive_interval(&self, secs: i64) -> Result<(), SubscriberError>;

    fn set_attribute(&self, key: &str, value: AttributeValue) -> Result<(), SubscriberError>;

    fn set_attributes(
        &self,
        attributes: HashMap<String, AttributeValue>,
    ) -> Result<(), SubscriberError>;

    fn remove_attribute(&self, key: &str) -> Result<(), SubscriberError>;
}

/// Concurrent mapping from session id to its delegate.
///
/// Guarded independently from the session map; no caller holds both locks
/// at once, and delegates are cloned out before being invoked.
#[derive(Default)]
pub struct SubscriberRegistry {
    inner: Mutex<HashMap<SessionId, Arc<dyn Subscriber>>>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a delegate to an id, replacing any previous binding.
    pub fn subscribe(&self, id: SessionId, subscriber: Arc<dyn Subscriber>) {
        trace!(session_id = %id, "subscribing");
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.insert(id, subscriber);
    }

    /// Remove the binding for an id. A no-op if none is registered.
    pub fn unsubscribe(&self, id: &SessionId) {
        trace!(session_id = %id, "unsubscribing");
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.remove(id);
    }

    /// Clone the delegate out from under the lock, if one is bound.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn Subscriber>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all bindings (store shutdown).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.clear();
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("len", &self.len())
            .finish()
    }
}
