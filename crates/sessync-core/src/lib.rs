//! sessync-core: clustered in-memory session replication
//!
//! Keeps a per-node cache of HTTP session state synchronized across
//! cluster members by publishing mutation events and replaying them on
//! peers.
//!
//! # Architecture
//!
//! ```text
//! local request traffic                inbound replicated messages
//!        │                                        │
//!        ▼                                        ▼
//! SessionHandle / ReplicatedStore ──publish──▶ Publisher (transport, external)
//!        │              ▲                         │
//!        │              └────── dispatch ◀────────┘   (replay guard set)
//!        ▼
//!   session map ◀── scavenger sweep (periodic, publishes destroys)
//! ```
//!
//! # Modules
//!
//! - `state`: session state and validity-window math
//! - `ops`: the operation registry and the compact wire shape
//! - `replay`: the thread-scoped reentrancy guard that breaks
//!   replication loops
//! - `subscriber`: session id → locally-attached delegate registry
//! - `session`: publishing mutation handle for one session
//! - `store`: the replicated store itself
//! - `dispatch`: applying inbound replicated operations
//! - `scavenge`: cluster-aware expiry sweeps
//! - `runtime`: tokio ticker driving periodic scavenging
//! - `publish` / `manager`: trait seams for the transport and the
//!   surrounding session container
//! - `config` / `logging` / `error`: the usual ambient pieces
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod manager;
pub mod ops;
pub mod publish;
pub mod replay;
pub mod runtime;
pub mod scavenge;
pub mod session;
pub mod state;
pub mod store;
pub mod subscriber;

pub use config::{ReplicationConfig, ScavengerConfig};
pub use error::{
    ConfigError, Error, ProtocolError, RegistryError, Result, StoreError, SubscriberError,
};
pub use manager::{DetachedManager, SessionManager};
pub use ops::{Envelope, OpEntry, OpKind, OpTable, OpTarget, SessionOp, WireMessage};
pub use publish::{NoopPublisher, Publisher};
pub use replay::{ReplayGuard, is_replaying};
pub use scavenge::ScavengeOutcome;
pub use session::SessionHandle;
pub use state::{AttributeValue, SessionId, SessionState, SharedState, UnixMillis, now_millis};
pub use store::ReplicatedStore;
pub use subscriber::{Subscriber, SubscriberRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
