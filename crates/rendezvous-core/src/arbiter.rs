//! Identity arbitration.
//!
//! Enforces the two uniqueness axes of the registry: no two live connections
//! share an identity UUID, and no two share a stream ID. Every check is
//! followed by its bind against the same `&mut Registry`, so a caller that
//! serializes access gets at-most-one-winner semantics for free.

use crate::connection::ConnectionId;
use crate::registry::Registry;
use rendezvous_protocol::{Envelope, ErrorReply};
use thiserror::Error;
use tracing::debug;

/// Arbitration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArbiterError {
    /// Another connection is bound to this identity.
    #[error("uuid already in use")]
    UuidInUse,

    /// Another connection is bound to this stream ID.
    #[error("sid already in use")]
    SidInUse,

    /// The connection already holds a different stream ID.
    #[error("can't change sid")]
    SidChange,

    /// The connection is not in the registry.
    #[error("Connection not registered: {0}")]
    UnknownConnection(ConnectionId),
}

impl ArbiterError {
    /// The reply owed to the sender, if any.
    #[must_use]
    pub fn reply(&self) -> Option<ErrorReply> {
        match self {
            ArbiterError::UuidInUse => Some(ErrorReply::UuidInUse),
            ArbiterError::SidInUse => Some(ErrorReply::SidInUse),
            ArbiterError::SidChange => Some(ErrorReply::SidChange),
            ArbiterError::UnknownConnection(_) => None,
        }
    }
}

/// Bind `from` as the connection's identity unless it already has one.
///
/// A connection that is already bound keeps its identity; later `from`
/// values are not checked against it.
///
/// # Errors
///
/// Returns [`ArbiterError::UuidInUse`] if another connection holds `from`.
pub fn claim_identity(
    registry: &mut Registry,
    id: ConnectionId,
    from: &str,
) -> Result<(), ArbiterError> {
    let bound = registry
        .get(id)
        .ok_or(ArbiterError::UnknownConnection(id))?
        .identity()
        .is_some();
    if bound {
        return Ok(());
    }

    if let Some(owner) = registry.find_identity_owner(from, id) {
        debug!(connection = %id, owner = %owner, uuid = %from, "Identity already in use");
        return Err(ArbiterError::UuidInUse);
    }

    if let Some(conn) = registry.get_mut(id) {
        conn.bind_identity(from);
    }
    debug!(connection = %id, uuid = %from, "Identity bound");
    Ok(())
}

/// Bind or confirm `stream_id` for the connection.
///
/// # Errors
///
/// Returns [`ArbiterError::SidChange`] if the connection holds a different
/// stream ID, or [`ArbiterError::SidInUse`] if another connection holds this one.
pub fn claim_stream(
    registry: &mut Registry,
    id: ConnectionId,
    stream_id: &str,
) -> Result<(), ArbiterError> {
    let conn = registry.get(id).ok_or(ArbiterError::UnknownConnection(id))?;
    if let Some(bound) = conn.stream_id() {
        if bound != stream_id {
            debug!(connection = %id, bound = %bound, requested = %stream_id, "Stream ID change refused");
            return Err(ArbiterError::SidChange);
        }
    }

    if let Some(owner) = registry.find_stream_owner(stream_id, id) {
        debug!(connection = %id, owner = %owner, stream = %stream_id, "Stream ID already in use");
        return Err(ArbiterError::SidInUse);
    }

    if let Some(conn) = registry.get_mut(id) {
        if conn.bind_stream(stream_id) {
            debug!(connection = %id, stream = %stream_id, "Stream ID bound");
        }
    }
    Ok(())
}

/// Apply every binding an envelope asks for, in order: identity, room, stream.
///
/// The room is set before the stream claim is checked, so a `joinroom` whose
/// stream claim is refused still moves the connection into the room.
///
/// # Errors
///
/// Returns the first arbitration failure; bindings made before it are kept.
pub fn arbitrate(
    registry: &mut Registry,
    id: ConnectionId,
    envelope: &Envelope,
) -> Result<(), ArbiterError> {
    claim_identity(registry, id, &envelope.from)?;

    if let Some(room) = envelope.joined_room() {
        if let Some(conn) = registry.get_mut(id) {
            conn.set_room(room);
            debug!(connection = %id, room = %room, "Joined room");
        }
    }

    if let Some(stream_id) = envelope.claimed_stream() {
        claim_stream(registry, id, stream_id)?;
    }

    Ok(())
}
