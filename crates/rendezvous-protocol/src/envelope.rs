//! Inbound signaling envelopes.
//!
//! An envelope is the routing view of a client message. It is decoded once
//! per frame; the payload itself is never re-serialized.

use crate::codec::ProtocolError;
use serde_json::{Map, Number, Value};

/// Request kinds the relay routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Publisher announcement, optionally claiming a stream ID.
    Seed {
        /// Stream ID being claimed.
        stream_id: Option<String>,
    },

    /// Join (or move to) a room, optionally claiming a stream ID.
    JoinRoom {
        /// Room label, coerced to a string.
        room: String,
        /// Stream ID being claimed.
        stream_id: Option<String>,
    },

    /// Ask the publisher of a stream to start playback.
    Play {
        /// Stream ID being requested.
        stream_id: Option<String>,
    },

    /// Any other (or no) request; routed without extra targeting.
    Other,
}

/// A decoded signaling envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender's claimed identity.
    pub from: String,
    /// Request kind.
    pub request: Request,
    /// Directed recipient identity (`UUID` field).
    pub target: Option<String>,
}

impl Envelope {
    /// Decode an envelope from a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, has no usable
    /// `from` field, or is a `joinroom` without a usable `roomid`.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Self::from_map(&map),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let from = non_empty_str(map.get("from")).ok_or(ProtocolError::MissingFrom)?;
        let stream_id = non_empty_str(map.get("streamID"));

        let request = match map.get("request").and_then(Value::as_str) {
            Some("seed") => Request::Seed { stream_id },
            Some("joinroom") => {
                let room = coerce_room(map.get("roomid"))
                    .ok_or(ProtocolError::InvalidField("roomid"))?;
                Request::JoinRoom { room, stream_id }
            }
            Some("play") => Request::Play { stream_id },
            _ => Request::Other,
        };

        Ok(Self {
            from,
            request,
            target: non_empty_str(map.get("UUID")),
        })
    }

    /// The stream ID this message claims for its sender, if any.
    ///
    /// Only `seed` and `joinroom` claim; a `play` stream ID names a target.
    #[must_use]
    pub fn claimed_stream(&self) -> Option<&str> {
        match &self.request {
            Request::Seed { stream_id } | Request::JoinRoom { stream_id, .. } => {
                stream_id.as_deref()
            }
            _ => None,
        }
    }

    /// The room this message joins, if it is a `joinroom`.
    #[must_use]
    pub fn joined_room(&self) -> Option<&str> {
        match &self.request {
            Request::JoinRoom { room, .. } => Some(room.as_str()),
            _ => None,
        }
    }

    /// The stream a `play` request is aimed at.
    #[must_use]
    pub fn play_target(&self) -> Option<&str> {
        match &self.request {
            Request::Play { stream_id } => stream_id.as_deref(),
            _ => None,
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn coerce_room(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_label(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Integral numbers render without a fraction, so `1` and `1.0` name the
/// same room.
fn number_label(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f == 0.0 => "0".to_string(),
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{:.0}", f),
        _ => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        let env = Envelope::parse(r#"{"from":"u1","request":"seed","streamID":"s1"}"#).unwrap();
        assert_eq!(env.from, "u1");
        assert_eq!(
            env.request,
            Request::Seed {
                stream_id: Some("s1".into())
            }
        );
        assert_eq!(env.claimed_stream(), Some("s1"));
        assert_eq!(env.play_target(), None);
    }

    #[test]
    fn test_parse_joinroom_numeric_room() {
        let env = Envelope::parse(r#"{"from":"u1","request":"joinroom","roomid":42}"#).unwrap();
        assert_eq!(env.joined_room(), Some("42"));
        assert_eq!(env.claimed_stream(), None);
    }

    #[test]
    fn test_integral_float_room_matches_integer_room() {
        let env = Envelope::parse(r#"{"from":"u1","request":"joinroom","roomid":1.0}"#).unwrap();
        assert_eq!(env.joined_room(), Some("1"));
        let env = Envelope::parse(r#"{"from":"u1","request":"joinroom","roomid":-3.0}"#).unwrap();
        assert_eq!(env.joined_room(), Some("-3"));
        let env = Envelope::parse(r#"{"from":"u1","request":"joinroom","roomid":2.5}"#).unwrap();
        assert_eq!(env.joined_room(), Some("2.5"));
    }

    #[test]
    fn test_parse_joinroom_with_stream() {
        let env = Envelope::parse(
            r#"{"from":"u1","request":"joinroom","roomid":"r1","streamID":"s9"}"#,
        )
        .unwrap();
        assert_eq!(env.joined_room(), Some("r1"));
        assert_eq!(env.claimed_stream(), Some("s9"));
    }

    #[test]
    fn test_joinroom_without_room_is_malformed() {
        assert!(matches!(
            Envelope::parse(r#"{"from":"u1","request":"joinroom"}"#),
            Err(ProtocolError::InvalidField("roomid"))
        ));
        assert!(Envelope::parse(r#"{"from":"u1","request":"joinroom","roomid":null}"#).is_err());
    }

    #[test]
    fn test_play_is_not_a_claim() {
        let env = Envelope::parse(r#"{"from":"u2","request":"play","streamID":"s1"}"#).unwrap();
        assert_eq!(env.claimed_stream(), None);
        assert_eq!(env.play_target(), Some("s1"));
    }

    #[test]
    fn test_stream_without_request_is_not_a_claim() {
        let env = Envelope::parse(r#"{"from":"u1","streamID":"s2"}"#).unwrap();
        assert_eq!(env.request, Request::Other);
        assert_eq!(env.claimed_stream(), None);
    }

    #[test]
    fn test_missing_from() {
        assert!(matches!(
            Envelope::parse(r#"{"request":"seed"}"#),
            Err(ProtocolError::MissingFrom)
        ));
        assert!(matches!(
            Envelope::parse(r#"{"from":""}"#),
            Err(ProtocolError::MissingFrom)
        ));
        assert!(matches!(
            Envelope::parse(r#"{"from":7}"#),
            Err(ProtocolError::MissingFrom)
        ));
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            Envelope::parse("[1,2,3]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            Envelope::parse("not json"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_directed_target() {
        let env = Envelope::parse(r#"{"from":"u1","UUID":"u2","description":{}}"#).unwrap();
        assert_eq!(env.target.as_deref(), Some("u2"));

        let env = Envelope::parse(r#"{"from":"u1","UUID":""}"#).unwrap();
        assert_eq!(env.target, None);
    }

    #[test]
    fn test_unknown_request() {
        let env = Envelope::parse(r#"{"from":"u1","request":"listing"}"#).unwrap();
        assert_eq!(env.request, Request::Other);
        let env = Envelope::parse(r#"{"from":"u1","request":5}"#).unwrap();
        assert_eq!(env.request, Request::Other);
    }
}
