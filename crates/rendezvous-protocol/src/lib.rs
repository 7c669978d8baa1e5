//! # rendezvous-protocol
//!
//! Wire message model for the Rendezvous signaling relay.
//!
//! Clients exchange JSON text frames. The relay only looks at a handful of
//! routing fields and forwards everything else untouched:
//!
//! | field      | meaning                                          |
//! |------------|--------------------------------------------------|
//! | `from`     | sender identity, required on every message       |
//! | `request`  | `seed`, `joinroom`, `play` or anything else      |
//! | `streamID` | stream claim (seed/joinroom) or target (play)    |
//! | `roomid`   | room label for `joinroom`                        |
//! | `UUID`     | directed recipient                               |
//!
//! ## Example
//!
//! ```rust
//! use rendezvous_protocol::{Envelope, Request};
//!
//! let envelope = Envelope::parse(r#"{"from":"u1","request":"seed","streamID":"s1"}"#).unwrap();
//! assert_eq!(envelope.from, "u1");
//! assert_eq!(envelope.claimed_stream(), Some("s1"));
//! assert!(matches!(envelope.request, Request::Seed { .. }));
//! ```

pub mod codec;
pub mod envelope;
pub mod reply;

pub use codec::{decode_text, ProtocolError, DEFAULT_MAX_FRAME_SIZE};
pub use envelope::{Envelope, Request};
pub use reply::ErrorReply;
