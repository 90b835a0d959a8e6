//! Message queue.
//!
//! The simulated network. A single FIFO buffer of [`Message`]s between named
//! endpoints, with two delivery modes:
//!
//! - **live** (`start`): every `send` drains the buffer immediately
//! - **stopped** (`stop`): messages stay buffered until `tick` or `flush`
//!
//! Endpoints are held weakly; a message addressed to an endpoint that is gone
//! or was never registered is dropped on delivery. A paused endpoint keeps its
//! messages in the buffer, in order, while traffic to everyone else flows.
//!
//! Delivery is never re-entered. Sends issued from inside a delivery are
//! buffered and picked up by the drain loop already running, so the global
//! FIFO order holds in both modes.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::{Rc, Weak},
};

use tandem_proto::{Message, PeerId, ProtoError};
use tracing::{debug, trace};

use crate::observer::{Observers, SubscriptionId};

/// Receiver of delivered messages.
pub trait Endpoint {
    /// Handle one message. Runs to completion before the next delivery.
    fn deliver(&self, message: Message);
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages accepted by `send`.
    pub enqueued: u64,
    /// Messages handed to an endpoint.
    pub delivered: u64,
    /// Messages whose recipient was not registered.
    pub dropped: u64,
}

#[derive(Default)]
struct QueueState {
    messages: VecDeque<Message>,
    endpoints: HashMap<PeerId, Weak<dyn Endpoint>>,
    paused: HashSet<PeerId>,
    running: bool,
    delivering: bool,
    stats: QueueStats,
}

struct Inner {
    state: RefCell<QueueState>,
    observers: Observers<usize>,
}

/// Shared handle to the simulated network.
///
/// Clones refer to the same queue.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Rc<Inner>,
}

impl MessageQueue {
    /// Empty, stopped queue.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(QueueState::default()),
                observers: Observers::new(),
            }),
        }
    }

    /// Register `endpoint` under `peer`, replacing any previous registration.
    pub fn connect(&self, peer: PeerId, endpoint: Weak<dyn Endpoint>) {
        debug!(%peer, "endpoint registered");
        self.inner.state.borrow_mut().endpoints.insert(peer, endpoint);
    }

    /// Remove the endpoint registered under `peer`.
    ///
    /// Buffered messages for it stay queued and are dropped on delivery.
    pub fn disconnect(&self, peer: &PeerId) {
        if self.inner.state.borrow_mut().endpoints.remove(peer).is_some() {
            debug!(%peer, "endpoint removed");
        }
    }

    /// Whether an endpoint is registered under `peer`.
    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.inner.state.borrow().endpoints.contains_key(peer)
    }

    /// Enqueue a message. In live mode the buffer is drained before
    /// returning, unless a delivery is already in progress.
    pub fn send(&self, message: Message) {
        trace!(%message, "enqueue");
        let running = {
            let mut state = self.inner.state.borrow_mut();
            state.messages.push_back(message);
            state.stats.enqueued += 1;
            state.running
        };
        self.notify();

        if running {
            self.flush();
        }
    }

    /// Switch to live mode and drain the buffer.
    pub fn start(&self) {
        self.inner.state.borrow_mut().running = true;
        debug!("queue started");
        self.flush();
    }

    /// Switch to stopped mode. Buffered messages stay queued.
    pub fn stop(&self) {
        self.inner.state.borrow_mut().running = false;
        debug!("queue stopped");
    }

    /// Whether the queue is in live mode.
    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().running
    }

    /// Hold messages addressed to `peer` in the buffer.
    pub fn pause(&self, peer: &PeerId) {
        if self.inner.state.borrow_mut().paused.insert(peer.clone()) {
            debug!(%peer, "peer paused");
        }
    }

    /// Release messages held for `peer`. In live mode they are delivered now.
    pub fn resume(&self, peer: &PeerId) {
        let (resumed, running) = {
            let mut state = self.inner.state.borrow_mut();
            (state.paused.remove(peer), state.running)
        };

        if resumed {
            debug!(%peer, "peer resumed");
            if running {
                self.flush();
            }
        }
    }

    /// Whether messages to `peer` are being held.
    pub fn is_paused(&self, peer: &PeerId) -> bool {
        self.inner.state.borrow().paused.contains(peer)
    }

    /// Deliver the oldest deliverable message.
    ///
    /// Returns `false` if nothing was deliverable, or if called from inside
    /// another delivery.
    pub fn tick(&self) -> bool {
        let (message, endpoint) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            if state.delivering {
                return false;
            }

            let Some(position) =
                state.messages.iter().position(|message| !state.paused.contains(&message.to))
            else {
                return false;
            };
            let Some(message) = state.messages.remove(position) else {
                return false;
            };

            let endpoint = state.endpoints.get(&message.to).and_then(Weak::upgrade);
            if endpoint.is_some() {
                state.stats.delivered += 1;
                state.delivering = true;
            } else {
                state.stats.dropped += 1;
            }
            (message, endpoint)
        };
        self.notify();

        match endpoint {
            Some(endpoint) => {
                debug!(%message, "deliver");
                endpoint.deliver(message);
                self.inner.state.borrow_mut().delivering = false;
            },
            None => debug!(%message, "dropping message for unregistered endpoint"),
        }

        true
    }

    /// Deliver until nothing is deliverable, including messages sent while
    /// flushing. Returns the number of messages taken off the buffer.
    pub fn flush(&self) -> usize {
        let mut count = 0;
        while self.tick() {
            count += 1;
        }
        count
    }

    /// Snapshot of the buffer, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.borrow().messages.iter().cloned().collect()
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().messages.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().messages.is_empty()
    }

    /// Delivery counters.
    pub fn stats(&self) -> QueueStats {
        self.inner.state.borrow().stats
    }

    /// CBOR encoding of the buffer, for offline inspection.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::Encode` if serialization fails.
    pub fn dump(&self) -> Result<Vec<u8>, ProtoError> {
        tandem_proto::encode_messages(&self.messages())
    }

    /// Observe buffer length. Called after every enqueue and every removal.
    pub fn subscribe(&self, observer: impl Fn(usize) + 'static) -> SubscriptionId {
        self.inner.observers.subscribe(move |len: &usize| observer(*len))
    }

    /// Remove an observer.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.observers.unsubscribe(id)
    }

    fn notify(&self) {
        let len = self.len();
        self.inner.observers.notify(&len);
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("MessageQueue")
            .field("buffered", &state.messages.len())
            .field("endpoints", &state.endpoints.len())
            .field("paused", &state.paused)
            .field("running", &state.running)
            .field("stats", &state.stats)
            .finish()
    }
}
