//! Cluster-aware garbage collection of expired sessions.
//!
//! Each node discovers and destroys its own expired entries; the sweep
//! itself is never replicated, but every destruction it performs is
//! published like any other destroy, so peers converge. The validity test
//! allows extra grace time because a peer may hold a more recent
//! last-access time that has not propagated yet.

use tracing::{debug, info, trace};

use crate::ops::{Envelope, SessionOp};
use crate::replay;
use crate::state::now_millis;
use crate::store::ReplicatedStore;

/// Result of one scavenge sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScavengeOutcome {
    /// Entries examined (size of the point-in-time snapshot).
    pub examined: usize,
    /// Entries destroyed.
    pub removed: usize,
}

impl ReplicatedStore {
    /// Sweep the store once, destroying sessions whose validity window
    /// (last access + timeout + extra grace) elapsed before the sweep
    /// started.
    ///
    /// Works over a point-in-time snapshot so a slow sweep never blocks
    /// concurrent access to the session map.
    pub fn scavenge(&self) -> ScavengeOutcome {
        trace!("starting distributed scavenging");
        let snapshot = self.snapshot_states();
        let now = now_millis();
        let extra_grace_secs = self.config().scavenger.extra_time_secs;
        trace!(
            sessions = snapshot.len(),
            subscribers = self.subscriber_registry().len(),
            "scavenge snapshot"
        );

        let mut removed = 0;
        for state in &snapshot {
            let (id, valid) = {
                let guard = state.lock().unwrap_or_else(|e| e.into_inner());
                (guard.id().clone(), guard.is_valid(now, extra_grace_secs))
            };
            if valid {
                continue;
            }

            debug!(session_id = %id, "scavenging expired session");
            if !replay::is_replaying() {
                self.publisher()
                    .publish(&Envelope::store_op(SessionOp::DestroySession {
                        id: id.clone(),
                    }));
            }
            self.destroy_session(&id);
            removed += 1;
        }

        if removed > 0 {
            info!(removed, "scavenged expired sessions");
        }
        trace!("finished distributed scavenging");
        ScavengeOutcome {
            examined: snapshot.len(),
            removed,
        }
    }
}
