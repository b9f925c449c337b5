//! SessionManager boundary: the surrounding container that owns live,
//! externally-visible session objects.
//!
//! The store never constructs those handles itself; it asks the manager to
//! promote replicated state into a usable session (lazy cross-node
//! promotion, triggered only while replaying a create) and to tear the
//! handle down when the backing state is destroyed.

use crate::state::SessionId;

/// Surrounding session container contract.
pub trait SessionManager: Send + Sync {
    /// Materialize (or return) the externally-visible session for `id`,
    /// binding it to request-processing machinery. Invoked by the
    /// dispatcher when replaying a create so replicas lazily build full
    /// session objects once something references the id locally.
    fn materialize_session(&self, id: &SessionId);

    /// Does an externally-visible session currently exist for `id`?
    fn session_exists(&self, id: &SessionId) -> bool;

    /// Tear down the externally-visible session bound to `id`.
    fn release_session(&self, id: &SessionId);

    /// Context path of the web application this store serves.
    fn context_path(&self) -> String;
}

/// Manager for embedders without a container: nothing to promote or tear
/// down.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedManager;

impl SessionManager for DetachedManager {
    fn materialize_session(&self, _id: &SessionId) {}

    fn session_exists(&self, _id: &SessionId) -> bool {
        false
    }

    fn release_session(&self, _id: &SessionId) {}

    fn context_path(&self) -> String {
        "/".to_string()
    }
}
