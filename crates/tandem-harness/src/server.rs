//! Server side of the simulated network.

use std::{
    cell::{Ref, RefCell},
    collections::BTreeSet,
    fmt,
    rc::{Rc, Weak},
};

use tandem_proto::{Command, Message, Payload, PeerId};
use tracing::{debug, info, warn};

use crate::queue::{Endpoint, MessageQueue};

/// Command addressed to one connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Recipient.
    pub to: PeerId,
    /// Command to send.
    pub command: Command,
}

/// Protocol logic behind a [`SimulatedSocketServer`].
pub trait ServerHandler {
    /// A peer connected.
    fn on_connect(&mut self, peer: &PeerId);

    /// A connected peer sent a command. Returns the replies to send.
    fn on_command(&mut self, peer: &PeerId, command: Command) -> Vec<Outbound>;

    /// A peer closed its connection.
    fn on_disconnect(&mut self, peer: &PeerId);
}

/// Named server endpoint accepting simulated connections.
///
/// Tracks which peers are connected and routes the handler's replies through
/// the queue. Replies to peers that are not connected are discarded.
pub struct SimulatedSocketServer<H> {
    queue: MessageQueue,
    id: PeerId,
    connections: RefCell<BTreeSet<PeerId>>,
    handler: RefCell<H>,
}

impl<H: ServerHandler + 'static> SimulatedSocketServer<H> {
    /// Create a server and register it on the queue under `id`.
    pub fn bind(queue: MessageQueue, id: PeerId, handler: H) -> Rc<Self> {
        let server = Rc::new(Self {
            queue,
            id,
            connections: RefCell::new(BTreeSet::new()),
            handler: RefCell::new(handler),
        });

        let endpoint: Weak<dyn Endpoint> = Rc::downgrade(&server) as Weak<dyn Endpoint>;
        server.queue.connect(server.id.clone(), endpoint);
        info!(server = %server.id, "server listening");

        server
    }
}

impl<H> SimulatedSocketServer<H> {
    /// Connected peers, sorted.
    pub fn connections(&self) -> Vec<PeerId> {
        self.connections.borrow().iter().cloned().collect()
    }

    /// Whether `peer` is connected.
    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connections.borrow().contains(peer)
    }

    /// Protocol handler.
    pub fn handler(&self) -> Ref<'_, H> {
        self.handler.borrow()
    }
}

impl<H: ServerHandler> Endpoint for SimulatedSocketServer<H> {
    fn deliver(&self, message: Message) {
        let Message { from, payload, .. } = message;

        match payload {
            Payload::Connect => {
                self.connections.borrow_mut().insert(from.clone());
                self.handler.borrow_mut().on_connect(&from);
                self.queue.send(Message::new(self.id.clone(), from, Payload::Connected));
            },
            Payload::Close => {
                if self.connections.borrow_mut().remove(&from) {
                    self.handler.borrow_mut().on_disconnect(&from);
                }
            },
            Payload::Command(command) => {
                if !self.is_connected(&from) {
                    debug!(peer = %from, command = command.name(), "command from unknown peer");
                    return;
                }

                let replies = self.handler.borrow_mut().on_command(&from, command);
                for Outbound { to, command } in replies {
                    if self.is_connected(&to) {
                        self.queue.send(Message::command(self.id.clone(), to, command));
                    } else {
                        debug!(peer = %to, command = command.name(), "reply to disconnected peer");
                    }
                }
            },
            Payload::Connected => {
                warn!(server = %self.id, peer = %from, "unexpected connected payload at server");
            },
        }
    }
}

impl<H: fmt::Debug> fmt::Debug for SimulatedSocketServer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedSocketServer")
            .field("id", &self.id)
            .field("connections", &self.connections.borrow())
            .field("handler", &self.handler.borrow())
            .finish()
    }
}
