//! Recipient selection and fan-out.
//!
//! Routing is evaluated fresh for every message from whatever attributes
//! are bound at that moment. Delivery never waits on a peer: a full or
//! closed queue costs that peer the message and nothing else.

use crate::connection::{Connection, ConnectionId, Outbound, OutboundSender};
use crate::registry::Registry;
use rendezvous_protocol::Envelope;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Decide whether `candidate` receives a message from `sender`.
///
/// A candidate is excluded when any of these hold:
///
/// 1. it is the sender;
/// 2. the message names a `UUID` target and the candidate is not bound to it;
/// 3. the sender is in a room and the candidate is not in that same room;
/// 4. the sender is not in a room and the candidate is;
/// 5. the message is a `play` for a stream the candidate does not publish.
#[must_use]
pub fn should_deliver(sender: &Connection, candidate: &Connection, envelope: &Envelope) -> bool {
    if candidate.id() == sender.id() {
        return false;
    }

    if let Some(target) = envelope.target.as_deref() {
        if candidate.identity() != Some(target) {
            return false;
        }
    }

    match (sender.room(), candidate.room()) {
        (Some(room), Some(other)) if room != other => return false,
        (Some(_), None) | (None, Some(_)) => return false,
        _ => {}
    }

    if let Some(stream_id) = envelope.play_target() {
        if candidate.stream_id() != Some(stream_id) {
            return false;
        }
    }

    true
}

/// Snapshot the recipients of a message from `sender_id`.
///
/// Returns an empty list if the sender is not registered.
#[must_use]
pub fn recipients(
    registry: &Registry,
    sender_id: ConnectionId,
    envelope: &Envelope,
) -> Vec<(ConnectionId, OutboundSender)> {
    let Some(sender) = registry.get(sender_id) else {
        return Vec::new();
    };

    registry
        .iter()
        .filter(|candidate| should_deliver(sender, candidate, envelope))
        .map(|candidate| (candidate.id(), candidate.sink().clone()))
        .collect()
}

/// Result of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,
    /// Recipients whose queue was full.
    pub dropped: Vec<ConnectionId>,
    /// Recipients whose queue was already closed.
    pub closed: Vec<ConnectionId>,
}

impl FanOut {
    /// Total number of recipients selected.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.delivered + self.dropped.len() + self.closed.len()
    }
}

/// Queue `frame` on every recipient without blocking.
pub fn fan_out(recipients: &[(ConnectionId, OutboundSender)], frame: &Arc<str>) -> FanOut {
    let mut result = FanOut::default();

    for (id, sink) in recipients {
        match sink.try_send(Outbound::Forward(Arc::clone(frame))) {
            Ok(()) => result.delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %id, "Outbound queue full, dropping message");
                result.dropped.push(*id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %id, "Outbound queue closed");
                result.closed.push(*id);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::arbitrate;
    use tokio::sync::mpsc;

    fn add(registry: &mut Registry) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(8);
        let id = ConnectionId::generate();
        registry.register(Connection::new(id, tx));
        (id, rx)
    }

    fn bind(registry: &mut Registry, id: ConnectionId, text: &str) {
        arbitrate(registry, id, &Envelope::parse(text).unwrap()).unwrap();
    }

    fn route(registry: &Registry, sender: ConnectionId, text: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = recipients(registry, sender, &Envelope::parse(text).unwrap())
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_never_echo_to_self() {
        let mut registry = Registry::new();
        let (a, _rx) = add(&mut registry);
        bind(&mut registry, a, r#"{"from":"u1"}"#);
        assert!(route(&registry, a, r#"{"from":"u1"}"#).is_empty());
    }

    #[test]
    fn test_global_broadcast() {
        let mut registry = Registry::new();
        let (a, _ra) = add(&mut registry);
        let (b, _rb) = add(&mut registry);
        let (c, _rc) = add(&mut registry);
        bind(&mut registry, a, r#"{"from":"u1"}"#);

        assert_eq!(route(&registry, a, r#"{"from":"u1","msg":"x"}"#), vec![b, c]);
    }

    #[test]
    fn test_directed_message() {
        let mut registry = Registry::new();
        let (a, _ra) = add(&mut registry);
        let (b, _rb) = add(&mut registry);
        let (c, _rc) = add(&mut registry);
        bind(&mut registry, a, r#"{"from":"u1"}"#);
        bind(&mut registry, b, r#"{"from":"u2"}"#);
        bind(&mut registry, c, r#"{"from":"u3"}"#);

        assert_eq!(route(&registry, a, r#"{"from":"u1","UUID":"u3"}"#), vec![c]);
        assert!(route(&registry, a, r#"{"from":"u1","UUID":"nobody"}"#).is_empty());
    }

    #[test]
    fn test_room_migration() {
        let mut registry = Registry::new();
        let (a, _ra) = add(&mut registry);
        let (b, _rb) = add(&mut registry);
        let (c, _rc) = add(&mut registry);
        bind(&mut registry, a, r#"{"from":"u1","request":"joinroom","roomid":"r1"}"#);
        bind(&mut registry, b, r#"{"from":"u2","request":"joinroom","roomid":"r2"}"#);
        bind(&mut registry, c, r#"{"from":"u3","request":"joinroom","roomid":"r1"}"#);
        assert_eq!(route(&registry, a, r#"{"from":"u1"}"#), vec![c]);

        // c moves to r2
        bind(&mut registry, c, r#"{"from":"u3","request":"joinroom","roomid":"r2"}"#);
        assert!(route(&registry, a, r#"{"from":"u1"}"#).is_empty());
        assert_eq!(route(&registry, b, r#"{"from":"u2"}"#), vec![c]);
        assert_eq!(route(&registry, c, r#"{"from":"u3"}"#), vec![b]);
    }

    #[test]
    fn test_room_isolation() {
        let mut registry = Registry::new();
        let (a, _ra) = add(&mut registry);
        let (b, _rb) = add(&mut registry);
        let (c, _rc) = add(&mut registry);
        let (d, _rd) = add(&mut registry);
        bind(&mut registry, a, r#"{"from":"u1","request":"joinroom","roomid":"r1"}"#);
        bind(&mut registry, b, r#"{"from":"u2","request":"joinroom","roomid":"r2"}"#);
        bind(&mut registry, c, r#"{"from":"u3","request":"joinroom","roomid":"r1"}"#);
        bind(&mut registry, d, r#"{"from":"u4"}"#);

        // room traffic stays in the room
        assert_eq!(route(&registry, a, r#"{"from":"u1","msg":"x"}"#), vec![c]);
        // non-room traffic never reaches a room
        assert!(route(&registry, d, r#"{"from":"u4","msg":"y"}"#).is_empty());
    }

    #[test]
    fn test_play_targets_publisher() {
        let mut registry = Registry::new();
        let (a, _ra) = add(&mut registry);
        let (b, _rb) = add(&mut registry);
        let (c, _rc) = add(&mut registry);
        bind(&mut registry, a, r#"{"from":"u1","request":"seed","streamID":"s1"}"#);
        bind(&mut registry, b, r#"{"from":"u2","request":"seed","streamID":"s2"}"#);
        bind(&mut registry, c, r#"{"from":"u3"}"#);

        assert_eq!(
            route(&registry, c, r#"{"from":"u3","request":"play","streamID":"s1"}"#),
            vec![a]
        );
        assert!(route(&registry, c, r#"{"from":"u3","request":"play","streamID":"zz"}"#).is_empty());
        // play without a stream ID is plain broadcast
        assert_eq!(route(&registry, c, r#"{"from":"u3","request":"play"}"#), vec![a, b]);
    }

    #[test]
    fn test_fan_out_isolates_failures() {
        let mut registry = Registry::new();
        let (a, _ra) = add(&mut registry);
        let (full_tx, _full_rx) = mpsc::channel(1);
        let full = ConnectionId::generate();
        registry.register(Connection::new(full, full_tx.clone()));
        full_tx
            .try_send(Outbound::Forward(Arc::from("backlog")))
            .unwrap();
        let (closed_tx, closed_rx) = mpsc::channel(1);
        let closed = ConnectionId::generate();
        registry.register(Connection::new(closed, closed_tx));
        drop(closed_rx);
        let (_b, mut rb) = add(&mut registry);

        let envelope = Envelope::parse(r#"{"from":"u1"}"#).unwrap();
        arbitrate(&mut registry, a, &envelope).unwrap();
        let frame: Arc<str> = Arc::from(r#"{"from":"u1"}"#);
        let result = fan_out(&recipients(&registry, a, &envelope), &frame);

        assert_eq!(result.delivered, 1);
        assert_eq!(result.dropped, vec![full]);
        assert_eq!(result.closed, vec![closed]);
        assert_eq!(result.recipient_count(), 3);
        assert_eq!(rb.try_recv().unwrap(), Outbound::Forward(frame));
    }
}
