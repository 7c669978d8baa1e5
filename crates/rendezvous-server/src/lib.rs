//! # rendezvous-server
//!
//! WebSocket front end for the Rendezvous signaling relay: configuration,
//! connection handling, and metrics around a [`rendezvous_core::Relay`].

pub mod config;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, AppState};
