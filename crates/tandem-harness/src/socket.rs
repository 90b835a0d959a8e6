//! Client side of a simulated connection.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use tandem_proto::{Command, Message, Payload, PeerId};
use tracing::{debug, warn};

use crate::queue::{Endpoint, MessageQueue};

/// Connection lifecycle of a [`SimulatedSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Not registered with the queue.
    Closed,
    /// `Connect` sent, waiting for `Connected`.
    Connecting,
    /// Server confirmed the connection.
    Open,
}

/// Protocol layer bound to a socket.
pub trait SocketHandler {
    /// Server confirmed the connection.
    fn on_connected(&self);

    /// Server sent a protocol command.
    fn on_command(&self, command: Command);
}

/// Simulated client socket.
///
/// Registers itself on the [`MessageQueue`] under its peer id and forwards
/// what the server sends to the bound [`SocketHandler`].
pub struct SimulatedSocket {
    queue: MessageQueue,
    peer: PeerId,
    server: PeerId,
    state: Cell<SocketState>,
    handler: RefCell<Option<Weak<dyn SocketHandler>>>,
}

impl SimulatedSocket {
    /// Create a closed socket for `peer` talking to `server`.
    pub fn new(queue: MessageQueue, peer: PeerId, server: PeerId) -> Rc<Self> {
        Rc::new(Self {
            queue,
            peer,
            server,
            state: Cell::new(SocketState::Closed),
            handler: RefCell::new(None),
        })
    }

    /// Bind the protocol layer receiving server traffic.
    pub fn bind(&self, handler: Weak<dyn SocketHandler>) {
        *self.handler.borrow_mut() = Some(handler);
    }

    /// Connection state.
    pub fn state(&self) -> SocketState {
        self.state.get()
    }

    /// Register on the queue and ask the server for a connection.
    ///
    /// No-op unless closed.
    pub fn connect(self: &Rc<Self>) {
        if self.state.get() != SocketState::Closed {
            return;
        }

        let endpoint: Weak<dyn Endpoint> = Rc::downgrade(self) as Weak<dyn Endpoint>;
        self.queue.connect(self.peer.clone(), endpoint);
        self.state.set(SocketState::Connecting);
        self.queue.send(Message::new(self.peer.clone(), self.server.clone(), Payload::Connect));
    }

    /// Send a command to the server. Returns `false` if the socket is closed.
    pub fn send(&self, command: Command) -> bool {
        if self.state.get() == SocketState::Closed {
            debug!(peer = %self.peer, command = command.name(), "send on closed socket");
            return false;
        }

        self.queue.send(Message::command(self.peer.clone(), self.server.clone(), command));
        true
    }

    /// Tell the server the connection is gone and leave the queue.
    ///
    /// Messages still buffered for this socket are dropped on delivery.
    pub fn disconnect(&self) {
        if self.state.get() == SocketState::Closed {
            return;
        }

        self.state.set(SocketState::Closed);
        self.queue.disconnect(&self.peer);
        self.queue.send(Message::new(self.peer.clone(), self.server.clone(), Payload::Close));
    }

    fn handler(&self) -> Option<Rc<dyn SocketHandler>> {
        self.handler.borrow().as_ref().and_then(Weak::upgrade)
    }
}

impl Endpoint for SimulatedSocket {
    fn deliver(&self, message: Message) {
        let Some(handler) = self.handler() else {
            debug!(peer = %self.peer, %message, "no handler bound, dropping");
            return;
        };

        match message.payload {
            Payload::Connected => {
                self.state.set(SocketState::Open);
                handler.on_connected();
            },
            Payload::Command(command) => handler.on_command(command),
            Payload::Connect | Payload::Close => {
                warn!(peer = %self.peer, from = %message.from, "unexpected payload at client");
            },
        }
    }
}

impl fmt::Debug for SimulatedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedSocket")
            .field("peer", &self.peer)
            .field("server", &self.server)
            .field("state", &self.state.get())
            .finish()
    }
}
