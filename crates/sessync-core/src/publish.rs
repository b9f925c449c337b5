//! Publisher boundary: the hook the store calls to broadcast an encoded
//! operation to the rest of the cluster.
//!
//! The transport itself is external. The contract assumed by the core:
//! delivery is at-least-once to every other live member, FIFO per
//! originating node, with no acknowledgement returned to the caller. The
//! core never holds a map lock across a publish, and implementations must
//! never propagate a failure back into the replication path — a bad
//! message may be dropped, the pipeline must stay up.

use crate::ops::Envelope;

/// Broadcast hook for replicated operations.
pub trait Publisher: Send + Sync {
    /// Broadcast one operation to every other cluster member.
    fn publish(&self, envelope: &Envelope);
}

/// Publisher for detached/single-node operation: drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _envelope: &Envelope) {}
}
