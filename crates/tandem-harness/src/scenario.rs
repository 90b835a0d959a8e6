//! Multi-peer collaboration scenario.
//!
//! Wires one hub and N peers over a [`MessageQueue`] and exposes the
//! controls a debugging UI would: toggle between live and stepped delivery,
//! deliver one message, commit for a peer, flush.
//!
//! Setup always completes the connection handshake before handing control
//! back, so a fresh scenario has every peer synced at version 0.

use std::{cell::Ref, collections::BTreeSet, rc::Rc};

use tandem_client::{CollabSession, SessionConfig};
use tandem_core::{Document, ParagraphDocument, fixtures};
use tandem_hub::{Hub, HubConfig, MemoryStorage};
use tandem_proto::{DocId, Message, Op, PeerId, Version};
use tracing::{debug, info};

use crate::{
    error::HarnessError, peer::CollabPeer, queue::MessageQueue, router::HubRouter,
    server::SimulatedSocketServer, sim_env::SimEnv,
};

/// Hub type used by scenarios.
pub type SimHub = Hub<SimEnv, MemoryStorage>;

/// Peer type used by scenarios.
pub type SimPeer = CollabPeer<SimEnv, ParagraphDocument>;

type SimServer = SimulatedSocketServer<HubRouter<SimEnv, MemoryStorage>>;

/// Upper bound on commit/flush rounds in [`Scenario::settle`].
const MAX_SETTLE_ROUNDS: usize = 64;

/// Scenario setup.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Shared document.
    pub doc_id: DocId,
    /// Hub endpoint name.
    pub hub_id: PeerId,
    /// Peer endpoint names, in index order.
    pub peers: Vec<PeerId>,
    /// Content of version 0.
    pub seed: Vec<Op>,
    /// Start in stepped mode with automatic commits disabled.
    pub debug: bool,
    /// Seed of the environment RNG.
    pub rng_seed: u64,
    /// Hub settings.
    pub hub: HubConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            doc_id: DocId::from("test"),
            hub_id: PeerId::from("hub"),
            peers: vec![PeerId::from("user1"), PeerId::from("user2")],
            seed: fixtures::two_paragraphs(),
            debug: false,
            rng_seed: 0,
            hub: HubConfig::default(),
        }
    }
}

/// One hub, N peers, one queue.
pub struct Scenario {
    config: ScenarioConfig,
    env: SimEnv,
    queue: MessageQueue,
    server: Rc<SimServer>,
    peers: Vec<Rc<SimPeer>>,
    debug: bool,
}

impl Scenario {
    /// Build the network and complete the handshake for every peer.
    ///
    /// # Errors
    ///
    /// - `HarnessError::DuplicatePeer` if two endpoints share a name
    /// - `HarnessError::Hub` if the document cannot be created
    /// - `HarnessError::Session` if a peer fails to connect
    pub fn new(config: ScenarioConfig) -> Result<Self, HarnessError> {
        let mut names = BTreeSet::from([config.hub_id.clone()]);
        for peer in &config.peers {
            if !names.insert(peer.clone()) {
                return Err(HarnessError::DuplicatePeer(peer.clone()));
            }
        }

        let env = SimEnv::with_seed(config.rng_seed);
        let queue = MessageQueue::new();

        let mut hub = Hub::new(env.clone(), MemoryStorage::new(), config.hub.clone());
        hub.create_document(config.doc_id.clone(), config.seed.clone())?;
        let server =
            SimulatedSocketServer::bind(queue.clone(), config.hub_id.clone(), HubRouter::new(hub));

        let seed_document = ParagraphDocument::from_ops(&config.seed);
        let session_config = SessionConfig { auto_commit: !config.debug };
        let peers: Vec<Rc<SimPeer>> = config
            .peers
            .iter()
            .map(|id| {
                let session = CollabSession::new(
                    env.clone(),
                    config.doc_id.clone(),
                    seed_document.clone(),
                    0,
                    session_config.clone(),
                );
                CollabPeer::new(queue.clone(), id.clone(), config.hub_id.clone(), session)
            })
            .collect();

        for peer in &peers {
            peer.connect()?;
        }
        let handshake = queue.flush();
        debug!(messages = handshake, "handshake complete");

        if !config.debug {
            queue.start();
        }
        info!(
            doc = %config.doc_id,
            peers = peers.len(),
            seed = env.seed(),
            debug = config.debug,
            "scenario ready"
        );

        let debug = config.debug;
        Ok(Self { config, env, queue, server, peers, debug })
    }

    /// The simulated network.
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// All peers, in index order.
    pub fn peers(&self) -> &[Rc<SimPeer>] {
        &self.peers
    }

    /// Peer at `index`.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::UnknownPeer` if out of range.
    pub fn peer(&self, index: usize) -> Result<&Rc<SimPeer>, HarnessError> {
        self.peers.get(index).ok_or(HarnessError::UnknownPeer(index))
    }

    /// The hub. Must not be held across a queue operation.
    pub fn hub(&self) -> Ref<'_, SimHub> {
        Ref::map(self.server.handler(), HubRouter::hub)
    }

    /// Peers connected to the hub server.
    pub fn connections(&self) -> Vec<PeerId> {
        self.server.connections()
    }

    /// Whether delivery is stepped and automatic commits are off.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Switch between live and stepped delivery.
    ///
    /// Entering debug stops the queue and disables automatic commits.
    /// Leaving it re-enables them (committing buffered work) and drains the
    /// queue.
    pub fn toggle_debug(&mut self) {
        self.debug = !self.debug;
        info!(debug = self.debug, "debug mode toggled");

        if self.debug {
            self.queue.stop();
            for peer in &self.peers {
                peer.set_auto_commit(false);
            }
        } else {
            for peer in &self.peers {
                peer.set_auto_commit(true);
            }
            self.queue.start();
        }
    }

    /// Deliver the oldest deliverable message. Returns whether one was.
    pub fn process_next_message(&self) -> bool {
        self.env.advance(1);
        self.queue.tick()
    }

    /// Apply a local edit at peer `index`.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError` if the peer is unknown or rejects the edit.
    pub fn edit(&self, index: usize, ops: Vec<Op>) -> Result<(), HarnessError> {
        self.peer(index)?.edit(ops)?;
        Ok(())
    }

    /// Commit buffered edits at peer `index`.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError` if the peer is unknown or rejects the commit.
    pub fn commit(&self, index: usize) -> Result<(), HarnessError> {
        self.peer(index)?.commit()?;
        Ok(())
    }

    /// Deliver until nothing is deliverable. Returns the number delivered.
    pub fn flush(&self) -> usize {
        let count = self.queue.flush();
        self.env.advance(count as u64);
        count
    }

    /// Snapshot of undelivered messages, oldest first.
    pub fn messages_in_flight(&self) -> Vec<Message> {
        self.queue.messages()
    }

    /// Commit everything committable and flush, until no peer holds
    /// unconfirmed work. Returns whether that point was reached.
    pub fn settle(&self) -> bool {
        for _ in 0..MAX_SETTLE_ROUNDS {
            for peer in &self.peers {
                if let Err(err) = peer.commit() {
                    debug!(peer = %peer.id(), error = %err, "commit during settle failed");
                }
            }
            self.flush();

            if self.peers.iter().all(|peer| !peer.has_unconfirmed()) {
                return true;
            }
        }
        false
    }

    /// Current hub version of the document.
    pub fn hub_version(&self) -> Version {
        self.hub().version(&self.config.doc_id).unwrap_or_default()
    }

    /// Document as the hub sees it: seed plus every accepted changeset.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Hub` if the document is missing.
    pub fn hub_document(&self) -> Result<ParagraphDocument, HarnessError> {
        let hub = self.hub();
        let mut document = ParagraphDocument::from_ops(&hub.seed(&self.config.doc_id)?);
        for changeset in hub.changesets(&self.config.doc_id)? {
            document.apply_all(&changeset.ops);
        }
        Ok(document)
    }

    /// Whether the network is quiet and every peer holds the hub's document
    /// at the hub's version with no local work outstanding.
    pub fn is_converged(&self) -> bool {
        if !self.queue.is_empty() {
            return false;
        }

        let Ok(expected) = self.hub_document() else {
            return false;
        };
        let version = self.hub_version();

        self.peers.iter().all(|peer| {
            !peer.has_unconfirmed() && peer.version() == version && peer.document() == expected
        })
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("doc_id", &self.config.doc_id)
            .field("debug", &self.debug)
            .field("queue", &self.queue)
            .field("peers", &self.peers.len())
            .finish()
    }
}
