//! Publishing session handle.
//!
//! `SessionHandle` is the mutation entry point for one session: every
//! mutator checks the replay flag, publishes the equivalent instance-level
//! operation when the call originates from local traffic, and then applies
//! the change to the shared state. The same handle implements
//! [`Subscriber`], so a replayed operation dispatched to it runs the very
//! same code path — the replay guard is what keeps it from echoing the
//! mutation back out.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SubscriberError;
use crate::ops::{Envelope, SessionOp};
use crate::publish::Publisher;
use crate::replay;
use crate::state::{AttributeValue, SessionId, SessionState, SharedState, UnixMillis};
use crate::subscriber::Subscriber;

/// Handle binding a session id, its shared state, and the cluster
/// publisher.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    state: SharedState,
    publisher: Arc<dyn Publisher>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(state: SharedState, publisher: Arc<dyn Publisher>) -> Self {
        let id = {
            let guard = state.lock().unwrap_or_else(|e| e.into_inner());
            guard.id().clone()
        };
        Self {
            id,
            state,
            publisher,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The shared state backing this handle.
    #[must_use]
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Point-in-time copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    #[must_use]
    pub fn creation_time(&self) -> UnixMillis {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.creation_time()
    }

    #[must_use]
    pub fn last_accessed_time(&self) -> UnixMillis {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.last_accessed_time()
    }

    #[must_use]
    pub fn max_inactive_secs(&self) -> i64 {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.max_inactive_secs()
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.attribute(key).cloned()
    }

    #[must_use]
    pub fn is_valid(&self, now: UnixMillis, extra_grace_secs: i64) -> bool {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.is_valid(now, extra_grace_secs)
    }

    fn publish_unless_replaying(&self, op: SessionOp) {
        if !replay::is_replaying() {
            self.publisher
                .publish(&Envelope::session_op(self.id.clone(), op));
        }
    }

    /// Update the last-access time, replicating to peers.
    pub fn set_last_accessed_time(&self, time: UnixMillis) {
        self.publish_unless_replaying(SessionOp::SetLastAccessedTime { time });
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.set_last_accessed_time(time);
    }

    /// Update the inactivity timeout, replicating to peers.
    pub fn set_max_inactive_secs(&self, secs: i64) {
        self.publish_unless_replaying(SessionOp::SetMaxInactiveInterval { secs });
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.set_max_inactive_secs(secs);
    }

    /// Set one attribute, replicating to peers. Returns the previous value.
    pub fn set_attribute(
        &self,
        key: impl Into<String>,
        value: AttributeValue,
    ) -> Option<AttributeValue> {
        let key = key.into();
        self.publish_unless_replaying(SessionOp::SetAttribute {
            key: key.clone(),
            value: value.clone(),
        });
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.set_attribute(key, value)
    }

    /// Replace the whole attribute map, replicating to peers.
    pub fn set_attributes(&self, attributes: HashMap<String, AttributeValue>) {
        self.publish_unless_replaying(SessionOp::SetAttributes {
            attributes: attributes.clone(),
        });
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.set_attributes(attributes);
    }

    /// Remove one attribute, replicating to peers. Returns the previous
    /// value.
    pub fn remove_attribute(&self, key: &str) -> Option<AttributeValue> {
        self.publish_unless_replaying(SessionOp::RemoveAttribute {
            key: key.to_string(),
        });
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove_attribute(key)
    }
}

impl Subscriber for SessionHandle {
    fn set_last_accessed_time(&self, time: UnixMillis) -> Result<(), SubscriberError> {
        Self::set_last_accessed_time(self, time);
        Ok(())
    }

    fn set_max_inactive_interval(&self, secs: i64) -> Result<(), SubscriberError> {
        self.set_max_inactive_secs(secs);
        Ok(())
    }

    fn set_attribute(&self, key: &str, value: AttributeValue) -> Result<(), SubscriberError> {
        Self::set_attribute(self, key, value);
        Ok(())
    }

    fn set_attributes(
        &self,
        attributes: HashMap<String, AttributeValue>,
    ) -> Result<(), SubscriberError> {
        Self::set_attributes(self, attributes);
        Ok(())
    }

    fn remove_attribute(&self, key: &str) -> Result<(), SubscriberError> {
        Self::remove_attribute(self, key);
        Ok(())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplayGuard;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Envelope>>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, envelope: &Envelope) {
            self.published.lock().unwrap().push(envelope.clone());
        }
    }

    fn handle_with_publisher() -> (SessionHandle, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let state = Arc::new(Mutex::new(SessionState::new(
            SessionId::from("s1"),
            1000,
            1800,
            1800,
        )));
        (SessionHandle::new(state, publisher.clone()), publisher)
    }

    #[test]
    fn local_mutations_publish_before_applying() {
        let (handle, publisher) = handle_with_publisher();
        handle.set_attribute("user", json!("alice"));

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].session_id, Some(SessionId::from("s1")));
        assert_eq!(
            published[0].op,
            SessionOp::SetAttribute {
                key: "user".to_string(),
                value: json!("alice"),
            }
        );
        drop(published);
        assert_eq!(handle.attribute("user"), Some(json!("alice")));
    }

    #[test]
    fn replayed_mutations_do_not_republish() {
        let (handle, publisher) = handle_with_publisher();
        {
            let _guard = ReplayGuard::enter();
            handle.set_attribute("user", json!("bob"));
            handle.set_last_accessed_time(2000);
        }
        assert!(publisher.published.lock().unwrap().is_empty());
        assert_eq!(handle.attribute("user"), Some(json!("bob")));
        assert_eq!(handle.last_accessed_time(), 2000);
    }

    #[test]
    fn subscriber_impl_runs_the_same_mutation_path() {
        let (handle, publisher) = handle_with_publisher();
        let subscriber: &dyn Subscriber = &handle;
        {
            let _guard = ReplayGuard::enter();
            subscriber.set_max_inactive_interval(3600).unwrap();
            subscriber.remove_attribute("missing").unwrap();
        }
        assert!(publisher.published.lock().unwrap().is_empty());
        assert_eq!(handle.max_inactive_secs(), 3600);
    }

    #[test]
    fn every_mutator_publishes_its_own_operation() {
        let (handle, publisher) = handle_with_publisher();
        handle.set_last_accessed_time(5);
        handle.set_max_inactive_secs(60);
        handle.set_attributes(HashMap::new());
        handle.remove_attribute("x");

        let kinds: Vec<_> = publisher
            .published
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.op.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                crate::ops::OpKind::SetLastAccessedTime,
                crate::ops::OpKind::SetMaxInactiveInterval,
                crate::ops::OpKind::SetAttributes,
                crate::ops::OpKind::RemoveAttribute,
            ]
        );
    }
}
