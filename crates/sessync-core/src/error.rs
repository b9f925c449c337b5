//! Error types for sessync-core

use thiserror::Error;

use crate::state::SessionId;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sessync-core
#[derive(Error, Debug)]
pub enum Error {
    /// Operation registry construction errors (fatal at startup)
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Session store errors
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Replicated message decode/shape errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Subscriber delegate errors
    #[error("subscriber error: {0}")]
    Subscriber(#[from] SubscriberError),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operation registry construction failures.
///
/// Any of these at startup means no replicated operation can ever be
/// applied, so the store refuses to construct.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two operations registered under the same wire ident
    #[error("operations `{first}` and `{second}` share wire ident {ident}")]
    DuplicateIdent {
        ident: u8,
        first: &'static str,
        second: &'static str,
    },

    /// Two operations registered under the same name
    #[error("duplicate operation name `{0}`")]
    DuplicateName(&'static str),

    /// Wire idents must be contiguous from zero
    #[error("operation `{name}` has ident {found}, expected {expected}")]
    NonContiguousIdent {
        name: &'static str,
        expected: u8,
        found: u8,
    },
}

/// Per-message protocol failures.
///
/// These are dropped by the dispatcher (logged, never retried, never
/// re-raised); they are treated as a version mismatch between cluster
/// members, unrecoverable for that single message only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Wire ident not present in the operation registry
    #[error("unknown operation ident {0}")]
    UnknownOperation(u8),

    /// Argument list does not match the registered operation
    #[error("bad arguments for `{op}`: {reason}")]
    BadArguments { op: &'static str, reason: String },

    /// Class-level operation carried a session id, or an instance-level
    /// operation arrived without one
    #[error("operation `{op}` does not match its target kind")]
    TargetMismatch { op: &'static str },
}

/// Session store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The id is not present in the local cache
    #[error("session {0} is not known locally")]
    UnknownSession(SessionId),
}

/// Subscriber delegate errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    /// The delegate's session has already been torn down locally
    #[error("session {0} is no longer active")]
    SessionGone(SessionId),

    /// Delegate-specific failure
    #[error("{0}")]
    Other(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// TOML parse failure
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}
