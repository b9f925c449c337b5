//! Replicated operations and the operation registry.
//!
//! Messages between nodes carry a compact integer ident plus positional
//! argument values, never a full method descriptor; the registry maps
//! name ↔ ident ↔ target kind in both directions and is built exactly once
//! at startup. Idents are stable wire constants, so peers built from
//! different versions of this code can still talk: an unknown ident or a
//! malformed argument list is a per-message error the dispatcher drops, not
//! a reason to tear down the replication pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ProtocolError, RegistryError};
use crate::state::{AttributeValue, SessionId, UnixMillis};

/// Which object a replicated operation is invoked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpTarget {
    /// Class-level: the store itself (create, destroy, batch-touch).
    Store,
    /// Instance-level: the subscriber registered under the session id.
    Session,
}

/// The fixed set of replicated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    CreateSession,
    DestroySession,
    TouchSessions,
    SetLastAccessedTime,
    SetMaxInactiveInterval,
    SetAttribute,
    SetAttributes,
    RemoveAttribute,
}

impl OpKind {
    /// Registration order; idents are assigned contiguously from zero.
    pub const ALL: [Self; 8] = [
        Self::CreateSession,
        Self::DestroySession,
        Self::TouchSessions,
        Self::SetLastAccessedTime,
        Self::SetMaxInactiveInterval,
        Self::SetAttribute,
        Self::SetAttributes,
        Self::RemoveAttribute,
    ];

    /// Stable wire ident.
    #[must_use]
    pub fn ident(self) -> u8 {
        match self {
            Self::CreateSession => 0,
            Self::DestroySession => 1,
            Self::TouchSessions => 2,
            Self::SetLastAccessedTime => 3,
            Self::SetMaxInactiveInterval => 4,
            Self::SetAttribute => 5,
            Self::SetAttributes => 6,
            Self::RemoveAttribute => 7,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateSession => "create-session",
            Self::DestroySession => "destroy-session",
            Self::TouchSessions => "touch-sessions",
            Self::SetLastAccessedTime => "set-last-accessed-time",
            Self::SetMaxInactiveInterval => "set-max-inactive-interval",
            Self::SetAttribute => "set-attribute",
            Self::SetAttributes => "set-attributes",
            Self::RemoveAttribute => "remove-attribute",
        }
    }

    #[must_use]
    pub fn target(self) -> OpTarget {
        match self {
            Self::CreateSession | Self::DestroySession | Self::TouchSessions => OpTarget::Store,
            Self::SetLastAccessedTime
            | Self::SetMaxInactiveInterval
            | Self::SetAttribute
            | Self::SetAttributes
            | Self::RemoveAttribute => OpTarget::Session,
        }
    }
}

/// One registry entry: immutable after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpEntry {
    pub kind: OpKind,
    pub ident: u8,
    pub name: &'static str,
    pub target: OpTarget,
}

/// Bidirectional operation table, built once at process start.
///
/// Construction failure is fatal: with no handler table, no replicated
/// operation can ever be applied, so there is no degraded mode.
#[derive(Debug)]
pub struct OpTable {
    entries: Vec<OpEntry>,
    by_name: HashMap<&'static str, u8>,
}

impl OpTable {
    /// Build the registry from the full operation set.
    pub fn build() -> Result<Self, RegistryError> {
        Self::from_kinds(&OpKind::ALL)
    }

    fn from_kinds(kinds: &[OpKind]) -> Result<Self, RegistryError> {
        let mut entries: Vec<OpEntry> = Vec::with_capacity(kinds.len());
        let mut by_name: HashMap<&'static str, u8> = HashMap::with_capacity(kinds.len());

        for (index, kind) in kinds.iter().copied().enumerate() {
            let expected = index as u8;
            if kind.ident() != expected {
                if let Some(first) = entries.iter().find(|e| e.ident == kind.ident()) {
                    return Err(RegistryError::DuplicateIdent {
                        ident: kind.ident(),
                        first: first.name,
                        second: kind.name(),
                    });
                }
                return Err(RegistryError::NonContiguousIdent {
                    name: kind.name(),
                    expected,
                    found: kind.ident(),
                });
            }
            if by_name.insert(kind.name(), kind.ident()).is_some() {
                return Err(RegistryError::DuplicateName(kind.name()));
            }
            entries.push(OpEntry {
                kind,
                ident: kind.ident(),
                name: kind.name(),
                target: kind.target(),
            });
        }

        Ok(Self { entries, by_name })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an entry by wire ident.
    #[must_use]
    pub fn entry(&self, ident: u8) -> Option<&OpEntry> {
        self.entries.get(usize::from(ident))
    }

    /// Resolve an entry by operation name.
    #[must_use]
    pub fn entry_by_name(&self, name: &str) -> Option<&OpEntry> {
        self.by_name.get(name).and_then(|ident| self.entry(*ident))
    }
}

/// A replicated operation with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionOp {
    CreateSession {
        id: SessionId,
        creation_time: UnixMillis,
        max_inactive_secs: i64,
        actual_max_inactive_secs: i64,
    },
    DestroySession {
        id: SessionId,
    },
    TouchSessions {
        ids: Vec<SessionId>,
        time: UnixMillis,
    },
    SetLastAccessedTime {
        time: UnixMillis,
    },
    SetMaxInactiveInterval {
        secs: i64,
    },
    SetAttribute {
        key: String,
        value: AttributeValue,
    },
    SetAttributes {
        attributes: HashMap<String, AttributeValue>,
    },
    RemoveAttribute {
        key: String,
    },
}

impl SessionOp {
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            Self::CreateSession { .. } => OpKind::CreateSession,
            Self::DestroySession { .. } => OpKind::DestroySession,
            Self::TouchSessions { .. } => OpKind::TouchSessions,
            Self::SetLastAccessedTime { .. } => OpKind::SetLastAccessedTime,
            Self::SetMaxInactiveInterval { .. } => OpKind::SetMaxInactiveInterval,
            Self::SetAttribute { .. } => OpKind::SetAttribute,
            Self::SetAttributes { .. } => OpKind::SetAttributes,
            Self::RemoveAttribute { .. } => OpKind::RemoveAttribute,
        }
    }
}

/// The logical message shape carried by the Publisher:
/// `(session_id | null, operation, arguments)`.
///
/// Class-level operations travel with no session id; instance-level
/// operations carry the id of the session whose subscriber should apply
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session_id: Option<SessionId>,
    pub op: SessionOp,
}

impl Envelope {
    /// Class-level operation, targeted at the store itself.
    #[must_use]
    pub fn store_op(op: SessionOp) -> Self {
        Self {
            session_id: None,
            op,
        }
    }

    /// Instance-level operation, targeted at one session's subscriber.
    #[must_use]
    pub fn session_op(id: SessionId, op: SessionOp) -> Self {
        Self {
            session_id: Some(id),
            op,
        }
    }

    /// Encode to the compact wire shape: ident plus positional args.
    #[must_use]
    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            session_id: self.session_id.clone(),
            ident: self.op.kind().ident(),
            args: encode_args(&self.op),
        }
    }

    /// Decode from the wire shape, resolving the ident via the registry.
    pub fn from_wire(table: &OpTable, msg: &WireMessage) -> Result<Self, ProtocolError> {
        let entry = table
            .entry(msg.ident)
            .ok_or(ProtocolError::UnknownOperation(msg.ident))?;

        match entry.target {
            OpTarget::Store if msg.session_id.is_some() => {
                return Err(ProtocolError::TargetMismatch { op: entry.name });
            }
            OpTarget::Session if msg.session_id.is_none() => {
                return Err(ProtocolError::TargetMismatch { op: entry.name });
            }
            _ => {}
        }

        let op = decode_args(entry, &msg.args)?;
        Ok(Self {
            session_id: msg.session_id.clone(),
            op,
        })
    }
}

/// The concrete replicated message: `(session_id | null, ident, args)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub session_id: Option<SessionId>,
    pub ident: u8,
    pub args: Value,
}

fn encode_args(op: &SessionOp) -> Value {
    match op {
        SessionOp::CreateSession {
            id,
            creation_time,
            max_inactive_secs,
            actual_max_inactive_secs,
        } => json!([id, creation_time, max_inactive_secs, actual_max_inactive_secs]),
        SessionOp::DestroySession { id } => json!([id]),
        SessionOp::TouchSessions { ids, time } => json!([ids, time]),
        SessionOp::SetLastAccessedTime { time } => json!([time]),
        SessionOp::SetMaxInactiveInterval { secs } => json!([secs]),
        SessionOp::SetAttribute { key, value } => json!([key, value]),
        SessionOp::SetAttributes { attributes } => json!([attributes]),
        SessionOp::RemoveAttribute { key } => json!([key]),
    }
}

fn decode_args(entry: &OpEntry, args: &Value) -> Result<SessionOp, ProtocolError> {
    let op = entry.name;
    let args = args
        .as_array()
        .ok_or_else(|| bad_args(op, "argument list is not an array"))?;

    let expect_len = |n: usize| -> Result<(), ProtocolError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(bad_args(
                op,
                format!("expected {n} arguments, got {}", args.len()),
            ))
        }
    };

    match entry.kind {
        OpKind::CreateSession => {
            expect_len(4)?;
            Ok(SessionOp::CreateSession {
                id: arg_session_id(op, &args[0])?,
                creation_time: arg_i64(op, &args[1], "creation_time")?,
                max_inactive_secs: arg_i64(op, &args[2], "max_inactive_secs")?,
                actual_max_inactive_secs: arg_i64(op, &args[3], "actual_max_inactive_secs")?,
            })
        }
        OpKind::DestroySession => {
            expect_len(1)?;
            Ok(SessionOp::DestroySession {
                id: arg_session_id(op, &args[0])?,
            })
        }
        OpKind::TouchSessions => {
            expect_len(2)?;
            let ids = args[0]
                .as_array()
                .ok_or_else(|| bad_args(op, "ids is not an array"))?
                .iter()
                .map(|v| arg_session_id(op, v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(SessionOp::TouchSessions {
                ids,
                time: arg_i64(op, &args[1], "time")?,
            })
        }
        OpKind::SetLastAccessedTime => {
            expect_len(1)?;
            Ok(SessionOp::SetLastAccessedTime {
                time: arg_i64(op, &args[0], "time")?,
            })
        }
        OpKind::SetMaxInactiveInterval => {
            expect_len(1)?;
            Ok(SessionOp::SetMaxInactiveInterval {
                secs: arg_i64(op, &args[0], "secs")?,
            })
        }
        OpKind::SetAttribute => {
            expect_len(2)?;
            Ok(SessionOp::SetAttribute {
                key: arg_string(op, &args[0], "key")?,
                value: args[1].clone(),
            })
        }
        OpKind::SetAttributes => {
            expect_len(1)?;
            let map = args[0]
                .as_object()
                .ok_or_else(|| bad_args(op, "attributes is not an object"))?
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Ok(SessionOp::SetAttributes { attributes: map })
        }
        OpKind::RemoveAttribute => {
            expect_len(1)?;
            Ok(SessionOp::RemoveAttribute {
                key: arg_string(op, &args[0], "key")?,
            })
        }
    }
}

fn bad_args(op: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::BadArguments {
        op,
        reason: reason.into(),
    }
}

fn arg_string(op: &'static str, value: &Value, field: &str) -> Result<String, ProtocolError> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| bad_args(op, format!("{field} is not a string")))
}

fn arg_session_id(op: &'static str, value: &Value) -> Result<SessionId, ProtocolError> {
    value
        .as_str()
        .map(SessionId::from)
        .ok_or_else(|| bad_args(op, "session id is not a string"))
}

fn arg_i64(op: &'static str, value: &Value, field: &str) -> Result<i64, ProtocolError> {
    value
        .as_i64()
        .ok_or_else(|| bad_args(op, format!("{field} is not an integer")))
}
