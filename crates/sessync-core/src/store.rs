//! Replicated session store.
//!
//! Owns the id → state mapping for the local node and keeps it
//! synchronized with other cluster members by publishing changes made
//! locally and applying changes replayed from peers. Local mutation entry
//! points check the replay flag before publishing; the dispatcher applies
//! inbound operations under the same flag so the mutation path never
//! echoes them back out.
//!
//! # Lock discipline
//!
//! The session map and the subscriber registry are guarded independently.
//! No operation holds both locks at once, and no lock is held across a
//! call to the Publisher or the SessionManager (those may perform I/O or
//! remote calls) — values are copied out from under the lock first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{error, trace, warn};

use crate::config::ReplicationConfig;
use crate::error::{Result, StoreError};
use crate::manager::SessionManager;
use crate::ops::{Envelope, OpTable, SessionOp};
use crate::publish::Publisher;
use crate::replay;
use crate::session::SessionHandle;
use crate::state::{SessionId, SessionState, SharedState, UnixMillis, now_millis};
use crate::subscriber::{Subscriber, SubscriberRegistry};

/// Per-node replicated session store.
pub struct ReplicatedStore {
    config: ReplicationConfig,
    ops: Arc<OpTable>,
    sessions: Mutex<HashMap<SessionId, SharedState>>,
    subscribers: SubscriberRegistry,
    publisher: Arc<dyn Publisher>,
    manager: Arc<dyn SessionManager>,
}

impl ReplicatedStore {
    /// Build a store. Fails only on invalid configuration or an
    /// inconsistent operation registry — both fatal startup conditions,
    /// since a store without a handler table can never apply a replicated
    /// operation.
    pub fn new(
        config: ReplicationConfig,
        publisher: Arc<dyn Publisher>,
        manager: Arc<dyn SessionManager>,
    ) -> Result<Self> {
        config.validate()?;
        let ops = Arc::new(OpTable::build()?);
        Ok(Self {
            config,
            ops,
            sessions: Mutex::new(HashMap::new()),
            subscribers: SubscriberRegistry::new(),
            publisher,
            manager,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// The operation registry this store dispatches through.
    #[must_use]
    pub fn op_table(&self) -> &Arc<OpTable> {
        &self.ops
    }

    /// Context path of the surrounding web application.
    #[must_use]
    pub fn context_path(&self) -> String {
        self.manager.context_path()
    }

    /// Create a new session originating on this node.
    ///
    /// The creation time is assigned here, at the originating call site,
    /// so all replicas adopt this node's timestamp. Unless the call is
    /// itself a replay, the CREATE is published before the local create.
    pub fn new_state(
        &self,
        id: &SessionId,
        max_inactive_secs: i64,
    ) -> std::result::Result<SessionHandle, StoreError> {
        let creation_time = now_millis();
        let actual_max_inactive_secs = self.config.effective_max_for(max_inactive_secs);

        if !replay::is_replaying() {
            self.publisher
                .publish(&Envelope::store_op(SessionOp::CreateSession {
                    id: id.clone(),
                    creation_time,
                    max_inactive_secs,
                    actual_max_inactive_secs,
                }));
        }

        self.create_session(id, creation_time, max_inactive_secs, actual_max_inactive_secs);

        // We just created it, so all that is left is to load it.
        self.session(id)
            .ok_or_else(|| StoreError::UnknownSession(id.clone()))
    }

    /// Pull a session out of the local cache. Absence means "not yet known
    /// locally", not necessarily "does not exist anywhere in the cluster".
    #[must_use]
    pub fn load_state(&self, id: &SessionId) -> Option<SharedState> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(id).cloned()
    }

    /// Publishing handle for a locally cached session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<SessionHandle> {
        self.load_state(id)
            .map(|state| SessionHandle::new(state, self.publisher.clone()))
    }

    /// Insert or overwrite the local entry for the state's id.
    ///
    /// Failures are logged and swallowed: the replication pipeline's
    /// availability wins over individual-mutation durability.
    pub fn store_state(&self, state: SharedState) {
        let id = match state.lock() {
            Ok(guard) => guard.id().clone(),
            Err(_) => {
                error!("error storing session: state lock poisoned, discarding");
                return;
            }
        };
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(id, state);
    }

    /// Remove a session, publishing the DESTROY unless this call is itself
    /// a replay. Always removes locally and asks the session manager to
    /// release any externally-visible object.
    pub fn remove_state(&self, state: &SharedState) {
        let id = {
            let guard = state.lock().unwrap_or_else(|e| e.into_inner());
            guard.id().clone()
        };

        if !replay::is_replaying() {
            self.publisher
                .publish(&Envelope::store_op(SessionOp::DestroySession {
                    id: id.clone(),
                }));
        }

        self.destroy_session(&id);
    }

    /// Idempotent materialization of a session into the local cache.
    ///
    /// When invoked while replaying, additionally asks the session manager
    /// to promote an externally-visible handle: replicas lazily build full
    /// session objects once something references the id locally.
    pub fn create_session(
        &self,
        id: &SessionId,
        creation_time: UnixMillis,
        max_inactive_secs: i64,
        actual_max_inactive_secs: i64,
    ) {
        trace!(session_id = %id, "creating replicated session");
        let state = Arc::new(Mutex::new(SessionState::new(
            id.clone(),
            creation_time,
            max_inactive_secs,
            actual_max_inactive_secs,
        )));
        {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.insert(id.clone(), state);
        }

        if replay::is_replaying() {
            self.manager.materialize_session(id);
        }
    }

    /// Remove the entry if present and tear down any externally-visible
    /// session bound to the id. Never publishes; the publishing paths are
    /// `remove_state` and the scavenger.
    pub fn destroy_session(&self, id: &SessionId) {
        trace!(session_id = %id, "destroying replicated session");
        if self.manager.session_exists(id) {
            self.manager.release_session(id);
        }
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(id);
    }

    /// Best-effort batch update of last-access times.
    ///
    /// Publishes the batch (unless replaying), then resolves each id
    /// independently via the subscriber registry; a failure on one id is
    /// logged and does not abort the remaining ids.
    pub fn touch_sessions(&self, ids: &[SessionId], time: UnixMillis) {
        if !replay::is_replaying() {
            self.publisher
                .publish(&Envelope::store_op(SessionOp::TouchSessions {
                    ids: ids.to_vec(),
                    time,
                }));
        }

        for id in ids {
            // Cloning the delegate out per id is slower than holding the
            // registry lock over the batch, but never blocks other work.
            match self.subscribers.get(id) {
                None => {
                    warn!(session_id = %id, "unable to touch session: probably already removed");
                }
                Some(subscriber) => {
                    if let Err(err) = subscriber.set_last_accessed_time(time) {
                        warn!(
                            session_id = %id,
                            error = %err,
                            "unable to touch session: probably already removed"
                        );
                    }
                }
            }
        }
    }

    /// Number of locally cached sessions (snapshot read).
    #[must_use]
    pub fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }

    /// Bind a delegate to receive instance-level operations for `id`.
    pub fn subscribe(&self, id: SessionId, subscriber: Arc<dyn Subscriber>) {
        self.subscribers.subscribe(id, subscriber);
    }

    /// Remove the delegate binding for `id`. No-op if none is bound.
    pub fn unsubscribe(&self, id: &SessionId) {
        self.subscribers.unsubscribe(id);
    }

    pub(crate) fn subscriber_registry(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    pub(crate) fn publisher(&self) -> &Arc<dyn Publisher> {
        &self.publisher
    }

    /// Point-in-time copy of all cached states, for sweeps that must not
    /// block concurrent access.
    pub(crate) fn snapshot_states(&self) -> Vec<SharedState> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.values().cloned().collect()
    }

    /// Store shutdown: drop all cached sessions and delegate bindings.
    pub fn close(&self) {
        trace!("destroying store");
        {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.clear();
        }
        self.subscribers.clear();
        trace!("store destroyed");
    }
}

impl std::fmt::Debug for ReplicatedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedStore")
            .field("sessions", &self.session_count())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
