//! # rendezvous-core
//!
//! Connection bookkeeping and message fan-out for the Rendezvous signaling relay.
//!
//! This crate provides the building blocks:
//!
//! - **Connection** - A client channel and its bound routing attributes
//! - **Registry** - The live set of connections
//! - **Arbiter** - Identity and stream-ID uniqueness checks
//! - **Router** - Recipient selection and non-blocking fan-out
//! - **Relay** - A single task that owns the registry and serializes all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  dispatch  ┌─────────────┐     ┌─────────────┐
//! │  Connection │───────────▶│    Relay    │────▶│   Arbiter   │
//! └─────────────┘            └─────────────┘     └─────────────┘
//!        ▲                          │
//!        │      try_send            ▼
//!        └───────────────────┌─────────────┐
//!                            │   Router    │
//!                            └─────────────┘
//! ```

pub mod arbiter;
pub mod connection;
pub mod registry;
pub mod relay;
pub mod router;

pub use arbiter::ArbiterError;
pub use connection::{Connection, ConnectionId, ConnectionSnapshot, Outbound, OutboundSender};
pub use registry::{Registry, RegistryStats};
pub use relay::{Outcome, Relay, RelayConfig, RelayError};
pub use router::FanOut;
