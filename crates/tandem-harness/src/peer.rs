//! Simulated collaborator.
//!
//! Glues a [`CollabSession`] to a [`SimulatedSocket`]: socket traffic becomes
//! session events, session actions become socket sends and observer
//! notifications.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use tandem_client::{
    CollabSession, Document, DocumentChange, Environment, SessionAction, SessionError,
    SessionEvent, SessionState,
};
use tandem_proto::{Command, Op, PeerId, Version};
use tracing::{debug, warn};

use crate::{
    observer::{Observers, SubscriptionId},
    queue::MessageQueue,
    socket::{SimulatedSocket, SocketHandler, SocketState},
};

/// One collaborator on the simulated network.
pub struct CollabPeer<E: Environment, D: Document> {
    id: PeerId,
    queue: MessageQueue,
    socket: Rc<SimulatedSocket>,
    session: RefCell<CollabSession<E, D>>,
    observers: Observers<DocumentChange>,
}

impl<E: Environment, D: Document + 'static> CollabPeer<E, D> {
    /// Create a peer named `id` that talks to `hub` over `queue`.
    ///
    /// The peer starts disconnected.
    pub fn new(
        queue: MessageQueue,
        id: PeerId,
        hub: PeerId,
        session: CollabSession<E, D>,
    ) -> Rc<Self> {
        let socket = SimulatedSocket::new(queue.clone(), id.clone(), hub);
        let peer = Rc::new(Self {
            id,
            queue,
            socket,
            session: RefCell::new(session),
            observers: Observers::new(),
        });

        let handler: Weak<dyn SocketHandler> = Rc::downgrade(&peer) as Weak<dyn SocketHandler>;
        peer.socket.bind(handler);
        peer
    }

    /// Open the connection. The session opens the document once the server
    /// confirms.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` if the session is not
    /// disconnected.
    pub fn connect(&self) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::Connecting)?;
        self.socket.connect();
        Ok(())
    }

    /// Close the connection. Unconfirmed work stays with the session and is
    /// resent after the next `connect`.
    pub fn disconnect(&self) {
        self.close("closed by peer");
    }

    /// Apply a local edit to the replica.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the edit.
    pub fn edit(&self, ops: Vec<Op>) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::Edit { ops })
    }

    /// Submit buffered edits. Ignored when nothing can be committed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the session rejects the request.
    pub fn commit(&self) -> Result<(), SessionError> {
        self.dispatch(SessionEvent::Commit)
    }

    /// Freeze the peer: no automatic commits and no deliveries until `start`.
    pub fn stop(&self) {
        if let Err(err) = self.dispatch(SessionEvent::Stop) {
            warn!(peer = %self.id, error = %err, "stop failed");
        }
        self.queue.pause(&self.id);
    }

    /// Undo `stop`. Held messages are delivered if the queue is live.
    pub fn start(&self) {
        if let Err(err) = self.dispatch(SessionEvent::Start) {
            warn!(peer = %self.id, error = %err, "start failed");
        }
        self.queue.resume(&self.id);
    }

    /// Enable or disable automatic commits. Enabling commits buffered work
    /// if possible.
    pub fn set_auto_commit(&self, auto_commit: bool) {
        self.session.borrow_mut().set_auto_commit(auto_commit);
        if auto_commit && !self.is_stopped() {
            if let Err(err) = self.dispatch(SessionEvent::Start) {
                warn!(peer = %self.id, error = %err, "auto-commit failed");
            }
        }
    }

    /// Observe document changes.
    pub fn subscribe(&self, observer: impl Fn(&DocumentChange) + 'static) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    /// Remove a document observer.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn close(&self, reason: &str) {
        self.socket.disconnect();
        if let Err(err) = self.dispatch(SessionEvent::Disconnected { reason: reason.to_string() }) {
            warn!(peer = %self.id, error = %err, "disconnect failed");
        }
    }

    /// Drop the connection and open it again, catching up from the last
    /// confirmed version.
    fn resync(&self, reason: &str) {
        warn!(peer = %self.id, reason, "resynchronizing");
        self.close(reason);
        if let Err(err) = self.connect() {
            warn!(peer = %self.id, error = %err, "reconnect failed");
        }
    }

    fn dispatch(&self, event: SessionEvent) -> Result<(), SessionError> {
        let actions = self.session.borrow_mut().handle(event)?;
        self.execute(actions);
        Ok(())
    }

    /// Run session actions in order.
    ///
    /// Observers are notified after every send went out. On a live queue a
    /// send can drain into this peer again, so the notification carries the
    /// session's state at that point rather than the one the action was
    /// built with.
    fn execute(&self, actions: Vec<SessionAction>) {
        let mut changed = false;

        for action in actions {
            match action {
                SessionAction::Send(command) => {
                    self.socket.send(command);
                },
                SessionAction::DocumentChanged(_) => changed = true,
                SessionAction::StateChanged { from, to } => {
                    debug!(peer = %self.id, ?from, ?to, "peer state changed");
                },
                SessionAction::Disconnect { reason } => {
                    warn!(peer = %self.id, %reason, "closing connection");
                    self.socket.disconnect();
                },
            }
        }

        if changed {
            let change = {
                let session = self.session.borrow();
                DocumentChange { version: session.version(), can_commit: session.can_commit() }
            };
            self.observers.notify(&change);
        }
    }

    fn receive(&self, event: SessionEvent) {
        match self.dispatch(event) {
            Ok(()) => {},
            Err(err) if err.is_fatal() => self.resync(&err.to_string()),
            Err(err) => debug!(peer = %self.id, error = %err, "event ignored"),
        }
    }
}

impl<E: Environment, D: Document> CollabPeer<E, D> {
    /// Endpoint name.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Connection state of the underlying socket.
    pub fn socket_state(&self) -> SocketState {
        self.socket.state()
    }

    /// Snapshot of the local replica.
    pub fn document(&self) -> D {
        self.session.borrow().document().clone()
    }

    /// Last confirmed version.
    pub fn version(&self) -> Version {
        self.session.borrow().version()
    }

    /// Session state.
    pub fn state(&self) -> SessionState {
        self.session.borrow().state()
    }

    /// Whether `commit` would submit anything.
    pub fn can_commit(&self) -> bool {
        self.session.borrow().can_commit()
    }

    /// Whether local work is not yet confirmed by the hub.
    pub fn has_unconfirmed(&self) -> bool {
        self.session.borrow().has_unconfirmed()
    }

    /// Whether the peer is frozen.
    pub fn is_stopped(&self) -> bool {
        self.session.borrow().is_stopped()
    }
}

impl<E: Environment, D: Document + 'static> SocketHandler for CollabPeer<E, D> {
    fn on_connected(&self) {
        self.receive(SessionEvent::Connected);
    }

    fn on_command(&self, command: Command) {
        self.receive(SessionEvent::Received(command));
    }
}

impl<E: Environment, D: Document> fmt::Debug for CollabPeer<E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollabPeer")
            .field("id", &self.id)
            .field("socket", &self.socket)
            .field("session", &self.session.borrow())
            .finish()
    }
}
