//! Connection model.
//!
//! A connection owns the outbound sink for one client and the three routing
//! attributes the relay binds from its messages.

use rendezvous_protocol::ErrorReply;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Atomic counter for connection IDs.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{:x}", self.0)
    }
}

/// A message queued for delivery to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A frame relayed verbatim from another client.
    Forward(Arc<str>),
    /// An error reply for this client.
    Reply(ErrorReply),
}

impl Outbound {
    /// Render the message as the text frame to put on the wire.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Outbound::Forward(frame) => frame.to_string(),
            Outbound::Reply(reply) => reply.to_json(),
        }
    }
}

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::Sender<Outbound>;

/// A live client connection.
///
/// Identity and stream ID are bound at most once; the room may be
/// overwritten by every `joinroom`.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    sink: OutboundSender,
    identity: Option<String>,
    stream_id: Option<String>,
    room: Option<String>,
}

impl Connection {
    /// Create an unbound connection.
    #[must_use]
    pub fn new(id: ConnectionId, sink: OutboundSender) -> Self {
        Self {
            id,
            sink,
            identity: None,
            stream_id: None,
            room: None,
        }
    }

    /// Connection ID.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Outbound queue.
    #[must_use]
    pub fn sink(&self) -> &OutboundSender {
        &self.sink
    }

    /// Bound identity UUID.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Bound stream ID.
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// Current room.
    #[must_use]
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Bind the identity if it is not bound yet.
    ///
    /// Returns `true` if the binding was made.
    pub(crate) fn bind_identity(&mut self, uuid: &str) -> bool {
        if self.identity.is_some() {
            return false;
        }
        self.identity = Some(uuid.to_string());
        true
    }

    /// Bind the stream ID if it is not bound yet.
    ///
    /// Returns `true` if the binding was made.
    pub(crate) fn bind_stream(&mut self, stream_id: &str) -> bool {
        if self.stream_id.is_some() {
            return false;
        }
        self.stream_id = Some(stream_id.to_string());
        true
    }

    pub(crate) fn set_room(&mut self, room: &str) {
        self.room = Some(room.to_string());
    }

    /// Copy out the routing attributes.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            id: self.id,
            identity: self.identity.clone(),
            stream_id: self.stream_id.clone(),
            room: self.room.clone(),
        }
    }
}

/// Point-in-time copy of a connection's routing attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    /// Connection ID.
    pub id: ConnectionId,
    /// Bound identity.
    pub identity: Option<String>,
    /// Bound stream ID.
    pub stream_id: Option<String>,
    /// Current room.
    pub room: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        let (tx, _rx) = mpsc::channel(1);
        Connection::new(ConnectionId::generate(), tx)
    }

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn_"));
    }

    #[test]
    fn test_identity_binds_once() {
        let mut conn = connection();
        assert!(conn.bind_identity("u1"));
        assert!(!conn.bind_identity("u2"));
        assert_eq!(conn.identity(), Some("u1"));
    }

    #[test]
    fn test_stream_binds_once() {
        let mut conn = connection();
        assert!(conn.bind_stream("s1"));
        assert!(!conn.bind_stream("s2"));
        assert_eq!(conn.stream_id(), Some("s1"));
    }

    #[test]
    fn test_room_overwrites() {
        let mut conn = connection();
        conn.set_room("r1");
        conn.set_room("r2");
        assert_eq!(conn.room(), Some("r2"));
    }

    #[test]
    fn test_outbound_text() {
        let frame: Arc<str> = Arc::from(r#"{"from":"u1"}"#);
        assert_eq!(Outbound::Forward(frame).to_text(), r#"{"from":"u1"}"#);
        assert_eq!(
            Outbound::Reply(ErrorReply::SidInUse).to_text(),
            r#"{"error":"sid already in use"}"#
        );
    }
}
