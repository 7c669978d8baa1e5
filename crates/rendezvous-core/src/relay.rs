//! The relay actor.
//!
//! A single task owns the [`Registry`] and processes commands one at a time,
//! so every uniqueness check and its bind happen without interleaving, and
//! every fan-out sees a consistent registry. Connection tasks talk to it
//! through the cloneable [`Relay`] handle.

use crate::arbiter::{self, ArbiterError};
use crate::connection::{Connection, ConnectionId, ConnectionSnapshot, Outbound, OutboundSender};
use crate::registry::{Registry, RegistryStats};
use crate::router::{self, FanOut};
use rendezvous_protocol::{Envelope, ErrorReply};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Relay errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The relay task has stopped.
    #[error("Relay is not running")]
    Closed,

    /// Maximum number of connections reached.
    #[error("Connection limit reached ({0})")]
    Full(usize),
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum number of live connections.
    pub max_connections: usize,
    /// Capacity of the command queue feeding the relay task.
    pub command_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_connections: 100_000,
            command_capacity: 4096,
        }
    }
}

/// What happened to a dispatched frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Malformed or from an unknown connection; dropped without a reply.
    Dropped,
    /// Refused by the arbiter; the reply was queued for the sender.
    Rejected(ErrorReply),
    /// Forwarded to the selected recipients.
    Routed(FanOut),
}

enum Command {
    Register {
        sink: OutboundSender,
        reply: oneshot::Sender<Result<ConnectionId, RelayError>>,
    },
    Unregister {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Dispatch {
        id: ConnectionId,
        envelope: Envelope,
        frame: Arc<str>,
        reply: oneshot::Sender<Outcome>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
    Snapshot {
        id: ConnectionId,
        reply: oneshot::Sender<Option<ConnectionSnapshot>>,
    },
}

/// Handle to the relay task.
///
/// The task stops once every handle has been dropped.
#[derive(Clone)]
pub struct Relay {
    commands: mpsc::Sender<Command>,
}

impl Relay {
    /// Spawn the relay task on the current Tokio runtime.
    #[must_use]
    pub fn spawn(config: RelayConfig) -> Self {
        info!("Starting relay with config: {:?}", config);
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let actor = RelayActor {
            registry: Registry::new(),
            receiver,
            config,
        };
        tokio::spawn(actor.run());
        Self { commands }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| RelayError::Closed)?;
        rx.await.map_err(|_| RelayError::Closed)
    }

    /// Register a new connection whose outbound queue is `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Full`] at the connection limit, or
    /// [`RelayError::Closed`] if the relay has stopped.
    pub async fn register(&self, sink: OutboundSender) -> Result<ConnectionId, RelayError> {
        self.request(|reply| Command::Register { sink, reply })
            .await?
    }

    /// Remove a connection.
    ///
    /// Returns once the registry no longer contains it; returns `false` if it
    /// was not registered.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Closed`] if the relay has stopped.
    pub async fn unregister(&self, id: ConnectionId) -> Result<bool, RelayError> {
        self.request(|reply| Command::Unregister { id, reply }).await
    }

    /// Arbitrate and route one inbound text frame from `id`.
    ///
    /// Frames that do not decode into an envelope are dropped here without
    /// reaching the relay task.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Closed`] if the relay has stopped.
    pub async fn dispatch(&self, id: ConnectionId, frame: Arc<str>) -> Result<Outcome, RelayError> {
        let envelope = match Envelope::parse(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                trace!(connection = %id, error = %e, "Dropping malformed message");
                return Ok(Outcome::Dropped);
            }
        };

        self.request(|reply| Command::Dispatch {
            id,
            envelope,
            frame,
            reply,
        })
        .await
    }

    /// Get registry statistics.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Closed`] if the relay has stopped.
    pub async fn stats(&self) -> Result<RegistryStats, RelayError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Get a connection's current routing attributes.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Closed`] if the relay has stopped.
    pub async fn snapshot(&self, id: ConnectionId) -> Result<Option<ConnectionSnapshot>, RelayError> {
        self.request(|reply| Command::Snapshot { id, reply }).await
    }
}

struct RelayActor {
    registry: Registry,
    receiver: mpsc::Receiver<Command>,
    config: RelayConfig,
}

impl RelayActor {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            self.handle(command);
        }
        debug!(remaining = self.registry.len(), "Relay stopped");
    }

    // Replies are best-effort: a caller that went away no longer cares.
    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { sink, reply } => {
                let _ = reply.send(self.register(sink));
            }
            Command::Unregister { id, reply } => {
                let _ = reply.send(self.registry.unregister(id).is_some());
            }
            Command::Dispatch {
                id,
                envelope,
                frame,
                reply,
            } => {
                let _ = reply.send(self.dispatch(id, &envelope, &frame));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.registry.stats());
            }
            Command::Snapshot { id, reply } => {
                let _ = reply.send(self.registry.get(id).map(Connection::snapshot));
            }
        }
    }

    fn register(&mut self, sink: OutboundSender) -> Result<ConnectionId, RelayError> {
        if self.registry.len() >= self.config.max_connections {
            warn!(limit = self.config.max_connections, "Connection limit reached");
            return Err(RelayError::Full(self.config.max_connections));
        }

        let id = ConnectionId::generate();
        self.registry.register(Connection::new(id, sink));
        Ok(id)
    }

    fn dispatch(&mut self, id: ConnectionId, envelope: &Envelope, frame: &Arc<str>) -> Outcome {
        if let Err(e) = arbiter::arbitrate(&mut self.registry, id, envelope) {
            return self.reject(id, &e);
        }

        let recipients = router::recipients(&self.registry, id, envelope);
        let result = router::fan_out(&recipients, frame);
        trace!(
            connection = %id,
            recipients = result.recipient_count(),
            delivered = result.delivered,
            "Routed"
        );
        Outcome::Routed(result)
    }

    fn reject(&self, id: ConnectionId, error: &ArbiterError) -> Outcome {
        let Some(reply) = error.reply() else {
            debug!(connection = %id, error = %error, "Dropping message");
            return Outcome::Dropped;
        };

        debug!(connection = %id, reason = %reply, "Rejected");
        if let Some(conn) = self.registry.get(id) {
            match conn.sink().try_send(Outbound::Reply(reply)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(connection = %id, "Outbound queue full, dropping error reply");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection = %id, "Outbound queue closed");
                }
            }
        }
        Outcome::Rejected(reply)
    }
}
