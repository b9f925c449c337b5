//! Dispatcher for inbound replicated operations.
//!
//! Two effective states per thread: idle and replaying. A dispatch enters
//! replaying (scoped, guaranteed exit on every path), resolves its target
//! (the store itself for class-level operations, the registered subscriber
//! for instance-level ones), invokes the handler, and exits. Any local
//! mutation performed inside the handler observes the replaying flag and
//! therefore does not re-publish — this is what breaks the otherwise
//! infinite replicate → apply → replicate cycle.
//!
//! Nothing in here propagates an error back toward the transport: a failed
//! handler, an unknown ident, or a malformed argument list costs exactly
//! that one message.

use tracing::{error, warn};

use crate::error::SubscriberError;
use crate::ops::{Envelope, OpTarget, SessionOp, WireMessage};
use crate::replay::ReplayGuard;
use crate::store::ReplicatedStore;
use crate::subscriber::Subscriber;

impl ReplicatedStore {
    /// Apply one replicated operation that originated on another node.
    pub fn dispatch(&self, envelope: &Envelope) {
        let _guard = ReplayGuard::enter();

        let kind = envelope.op.kind();
        match kind.target() {
            OpTarget::Store => {
                if envelope.session_id.is_some() {
                    error!(
                        op = kind.name(),
                        "class-level operation carried a session id; code version mismatch?"
                    );
                    return;
                }
                self.apply_store_op(&envelope.op);
            }
            OpTarget::Session => {
                let Some(id) = &envelope.session_id else {
                    error!(
                        op = kind.name(),
                        "instance-level operation without a session id; code version mismatch?"
                    );
                    return;
                };
                let Some(target) = self.subscriber_registry().get(id) else {
                    // The session was likely already removed locally; the
                    // operation is simply not applicable here.
                    warn!(session_id = %id, op = kind.name(), "null target for operation");
                    return;
                };
                if let Err(err) = apply_session_op(target.as_ref(), &envelope.op) {
                    error!(
                        session_id = %id,
                        op = kind.name(),
                        error = %err,
                        "this should never happen - code version mismatch?"
                    );
                }
            }
        }
    }

    /// Decode a wire message through the operation registry and dispatch
    /// it. Undecodable messages are logged and dropped.
    pub fn dispatch_wire(&self, msg: &WireMessage) {
        match Envelope::from_wire(self.op_table(), msg) {
            Ok(envelope) => self.dispatch(&envelope),
            Err(err) => {
                error!(
                    ident = msg.ident,
                    error = %err,
                    "dropping undecodable replicated message"
                );
            }
        }
    }

    fn apply_store_op(&self, op: &SessionOp) {
        match op {
            SessionOp::CreateSession {
                id,
                creation_time,
                max_inactive_secs,
                actual_max_inactive_secs,
            } => {
                self.create_session(id, *creation_time, *max_inactive_secs, *actual_max_inactive_secs);
            }
            SessionOp::DestroySession { id } => self.destroy_session(id),
            SessionOp::TouchSessions { ids, time } => self.touch_sessions(ids, *time),
            other => {
                error!(op = other.kind().name(), "not a class-level operation");
            }
        }
    }
}

fn apply_session_op(target: &dyn Subscriber, op: &SessionOp) -> Result<(), SubscriberError> {
    match op {
        SessionOp::SetLastAccessedTime { time } => target.set_last_accessed_time(*time),
        SessionOp::SetMaxInactiveInterval { secs } => target.set_max_inactive_interval(*secs),
        SessionOp::SetAttribute { key, value } => target.set_attribute(key, value.clone()),
        SessionOp::SetAttributes { attributes } => target.set_attributes(attributes.clone()),
        SessionOp::RemoveAttribute { key } => target.remove_attribute(key),
        other => Err(SubscriberError::Other(format!(
            "{} is not an instance-level operation",
            other.kind().name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicationConfig;
    use crate::manager::DetachedManager;
    use crate::ops::OpKind;
    use crate::publish::Publisher;
    use crate::state::{AttributeValue, SessionId, UnixMillis};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Envelope>>,
    }

    impl RecordingPublisher {
        fn take(&self) -> Vec<Envelope> {
            std::mem::take(&mut self.published.lock().unwrap())
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, envelope: &Envelope) {
            self.published.lock().unwrap().push(envelope.clone());
        }
    }

    fn store_with_publisher() -> (Arc<ReplicatedStore>, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(
            ReplicatedStore::new(
                ReplicationConfig::default(),
                publisher.clone(),
                Arc::new(DetachedManager),
            )
            .unwrap(),
        );
        (store, publisher)
    }

    #[test]
    fn replayed_create_materializes_without_republishing() {
        let (store, publisher) = store_with_publisher();
        let id = SessionId::from("s1");
        store.dispatch(&Envelope::store_op(SessionOp::CreateSession {
            id: id.clone(),
            creation_time: 1234,
            max_inactive_secs: 1800,
            actual_max_inactive_secs: 1800,
        }));

        // The handler performs the same local mutation an ungated call
        // would publish; the dispatcher's guard must suppress it.
        assert!(publisher.take().is_empty());
        let cached = store.load_state(&id).expect("materialized");
        assert_eq!(cached.lock().unwrap().creation_time(), 1234);
    }

    #[test]
    fn replayed_attribute_mutation_reaches_the_subscriber_silently() {
        let (store, publisher) = store_with_publisher();
        let id = SessionId::from("s1");
        let handle = store.new_state(&id, 1800).unwrap();
        store.subscribe(id.clone(), Arc::new(handle.clone()));
        publisher.take();

        store.dispatch(&Envelope::session_op(
            id,
            SessionOp::SetAttribute {
                key: "user".to_string(),
                value: json!("carol"),
            },
        ));

        assert!(publisher.take().is_empty());
        assert_eq!(handle.attribute("user"), Some(json!("carol")));
    }

    #[test]
    fn missing_subscriber_skips_without_crashing() {
        let (store, publisher) = store_with_publisher();
        store.dispatch(&Envelope::session_op(
            SessionId::from("gone"),
            SessionOp::SetLastAccessedTime { time: 99 },
        ));
        assert!(publisher.take().is_empty());
    }

    #[test]
    fn failing_handler_is_dropped_without_retry() {
        struct FailingSubscriber;
        impl Subscriber for FailingSubscriber {
            fn set_last_accessed_time(&self, _: UnixMillis) -> Result<(), SubscriberError> {
                Err(SubscriberError::Other("schema drift".to_string()))
            }
            fn set_max_inactive_interval(&self, _: i64) -> Result<(), SubscriberError> {
                Ok(())
            }
            fn set_attribute(&self, _: &str, _: AttributeValue) -> Result<(), SubscriberError> {
                Ok(())
            }
            fn set_attributes(
                &self,
                _: HashMap<String, AttributeValue>,
            ) -> Result<(), SubscriberError> {
                Ok(())
            }
            fn remove_attribute(&self, _: &str) -> Result<(), SubscriberError> {
                Ok(())
            }
        }

        let (store, publisher) = store_with_publisher();
        let id = SessionId::from("s1");
        store.subscribe(id.clone(), Arc::new(FailingSubscriber));

        // Delivery is considered complete regardless of handler outcome.
        store.dispatch(&Envelope::session_op(
            id,
            SessionOp::SetLastAccessedTime { time: 1 },
        ));
        assert!(publisher.take().is_empty());
    }

    #[test]
    fn wire_dispatch_decodes_and_applies() {
        let (store, publisher) = store_with_publisher();
        let id = SessionId::from("s1");
        let wire = Envelope::store_op(SessionOp::CreateSession {
            id: id.clone(),
            creation_time: 5,
            max_inactive_secs: 60,
            actual_max_inactive_secs: 60,
        })
        .to_wire();

        store.dispatch_wire(&wire);
        assert!(store.load_state(&id).is_some());
        assert!(publisher.take().is_empty());
    }

    #[test]
    fn undecodable_wire_messages_are_dropped() {
        let (store, _publisher) = store_with_publisher();
        store.dispatch_wire(&WireMessage {
            session_id: None,
            ident: 200,
            args: json!([]),
        });
        store.dispatch_wire(&WireMessage {
            session_id: None,
            ident: OpKind::CreateSession.ident(),
            args: json!(["only-an-id"]),
        });
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn replayed_destroy_converges_the_local_cache() {
        let (store, publisher) = store_with_publisher();
        let id = SessionId::from("s1");
        store.new_state(&id, 1800).unwrap();
        publisher.take();

        store.dispatch(&Envelope::store_op(SessionOp::DestroySession {
            id: id.clone(),
        }));
        assert!(store.load_state(&id).is_none());
        assert!(publisher.take().is_empty());
    }

    #[test]
    fn guard_is_cleared_after_dispatch() {
        let (store, _publisher) = store_with_publisher();
        store.dispatch(&Envelope::store_op(SessionOp::DestroySession {
            id: SessionId::from("nope"),
        }));
        assert!(!crate::replay::is_replaying());
    }
}
