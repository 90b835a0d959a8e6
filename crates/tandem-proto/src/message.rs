//! Transport envelope.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{command::Command, ids::PeerId};

/// Content of a transport message.
///
/// `Connect`, `Connected` and `Close` model the socket lifecycle. Protocol
/// traffic rides in `Command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Client asks the server to accept its connection.
    Connect,
    /// Server confirms a connection.
    Connected,
    /// Client closes its connection.
    Close,
    /// Protocol command.
    Command(Command),
}

impl Payload {
    /// Short payload name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Connected => "connected",
            Self::Close => "close",
            Self::Command(command) => command.name(),
        }
    }
}

/// Message in flight between two named endpoints.
///
/// Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sending endpoint.
    pub from: PeerId,
    /// Receiving endpoint.
    pub to: PeerId,
    /// Content.
    pub payload: Payload,
}

impl Message {
    /// Create a message.
    pub fn new(from: PeerId, to: PeerId, payload: Payload) -> Self {
        Self { from, to, payload }
    }

    /// Create a message carrying a protocol command.
    pub fn command(from: PeerId, to: PeerId, command: Command) -> Self {
        Self::new(from, to, Payload::Command(command))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.from, self.to, self.payload.name())
    }
}
