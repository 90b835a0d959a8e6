//! Hub
//!
//! Validates and sequences commits per document.
//!
//! ## Responsibilities
//!
//! - Document Lifecycle: explicit seeding, or lazy creation on first open
//! - Catch-up: reply to `open` with the changesets a session is missing
//! - Commit Sequencing: accept a commit only against the current version,
//!   assigning `version + 1`
//! - Routing: acknowledge the originator, broadcast to other subscribers
//!
//! ## Design
//!
//! - The hub never merges: a stale commit is rejected together with the
//!   catch-up the client needs to rebase and resubmit
//! - Commit ids are remembered, so a resent commit that was already accepted
//!   is acknowledged again instead of applied twice
//! - Action-based: all methods return actions, no direct I/O

use std::collections::{BTreeMap, BTreeSet};

use tandem_core::Environment;
use tandem_proto::{Changeset, Command, CommitId, DocId, Op, PeerId, Version};

use crate::{error::HubError, storage::Storage};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of changesets in one `open-confirmed` reply.
    pub catch_up_limit: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { catch_up_limit: 100 }
    }
}

/// Metadata about a document.
#[derive(Debug, Clone)]
pub struct DocumentMetadata<I> {
    /// Peer whose open created the document. `None` for seeded documents.
    pub creator: Option<PeerId>,
    /// When the document was created.
    pub created_at: I,
}

/// Actions returned by the hub for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubAction {
    /// Send a command to one peer.
    SendTo {
        /// Recipient.
        peer: PeerId,
        /// Command to send.
        command: Command,
    },

    /// Send a command to every subscriber of a document.
    Broadcast {
        /// Document whose subscribers receive the command.
        doc_id: DocId,
        /// Command to send.
        command: Command,
        /// Subscriber to skip (the originator).
        exclude: Option<PeerId>,
    },
}

/// Document synchronization hub.
pub struct Hub<E, S>
where
    E: Environment,
    S: Storage,
{
    env: E,
    storage: S,
    config: HubConfig,
    /// Subscribers per document, ordered so broadcasts are deterministic.
    subscriptions: BTreeMap<DocId, BTreeSet<PeerId>>,
    metadata: BTreeMap<DocId, DocumentMetadata<E::Instant>>,
}

impl<E, S> Hub<E, S>
where
    E: Environment,
    S: Storage,
{
    /// Create a hub over `storage`.
    pub fn new(env: E, storage: S, config: HubConfig) -> Self {
        Self {
            env,
            storage,
            config,
            subscriptions: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Check if a document exists.
    pub fn has_document(&self, doc_id: &DocId) -> bool {
        self.metadata.contains_key(doc_id)
    }

    /// Current version of a document. `None` if it does not exist.
    pub fn version(&self, doc_id: &DocId) -> Option<Version> {
        self.storage.version(doc_id).ok().flatten()
    }

    /// Metadata of a document.
    pub fn metadata(&self, doc_id: &DocId) -> Option<&DocumentMetadata<E::Instant>> {
        self.metadata.get(doc_id)
    }

    /// Seed operations of a document.
    pub fn seed(&self, doc_id: &DocId) -> Result<Vec<Op>, HubError> {
        Ok(self.storage.seed(doc_id)?)
    }

    /// Every accepted changeset of a document, in version order.
    pub fn changesets(&self, doc_id: &DocId) -> Result<Vec<Changeset>, HubError> {
        Ok(self.storage.load_changesets(doc_id, 0, usize::MAX)?)
    }

    /// Peers subscribed to a document.
    pub fn subscribers(&self, doc_id: &DocId) -> impl Iterator<Item = &PeerId> {
        self.subscriptions.get(doc_id).into_iter().flatten()
    }

    /// Create a document whose version 0 is `seed`.
    ///
    /// # Errors
    ///
    /// Returns `HubError::DocumentExists` if the document already exists.
    pub fn create_document(&mut self, doc_id: DocId, seed: Vec<Op>) -> Result<(), HubError> {
        if self.has_document(&doc_id) {
            return Err(HubError::DocumentExists(doc_id));
        }

        self.storage.create_document(&doc_id, seed)?;
        self.metadata
            .insert(doc_id.clone(), DocumentMetadata { creator: None, created_at: self.env.now() });
        tracing::info!(doc = %doc_id, "document created");

        Ok(())
    }

    /// Process one command from `peer`.
    ///
    /// Failures are turned into an `Error` command for the sender only.
    pub fn handle(&mut self, peer: &PeerId, command: Command) -> Vec<HubAction> {
        let doc_id = command.doc_id().cloned();
        let name = command.name();

        match self.process(peer, command) {
            Ok(actions) => actions,
            Err(err) => {
                tracing::warn!(%peer, command = name, error = %err, "rejecting command");
                vec![HubAction::SendTo {
                    peer: peer.clone(),
                    command: Command::Error { doc_id, kind: err.kind(), reason: err.to_string() },
                }]
            },
        }
    }

    /// Forget every subscription of a disconnected peer.
    pub fn disconnect(&mut self, peer: &PeerId) {
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(peer);
        }
        tracing::debug!(%peer, "peer unsubscribed from all documents");
    }

    fn process(&mut self, peer: &PeerId, command: Command) -> Result<Vec<HubAction>, HubError> {
        match command {
            Command::Open { doc_id, version } => self.handle_open(peer, doc_id, version),
            Command::Commit { doc_id, base_version, commit_id, ops } => {
                self.handle_commit(peer, doc_id, base_version, commit_id, ops)
            },
            other => {
                Err(HubError::UnexpectedCommand { peer: peer.clone(), command: other.name() })
            },
        }
    }

    /// Handle `open`: subscribe the peer and send its catch-up.
    ///
    /// The reply carries at most `catch_up_limit` changesets; `has_more`
    /// tells the session to open again from its new version.
    fn handle_open(
        &mut self,
        peer: &PeerId,
        doc_id: DocId,
        client_version: Version,
    ) -> Result<Vec<HubAction>, HubError> {
        if !self.has_document(&doc_id) {
            self.storage.create_document(&doc_id, Vec::new())?;
            self.metadata.insert(
                doc_id.clone(),
                DocumentMetadata { creator: Some(peer.clone()), created_at: self.env.now() },
            );
            tracing::info!(doc = %doc_id, %peer, "document created on first open");
        }

        let current = self.current_version(&doc_id)?;
        if client_version > current {
            return Err(HubError::VersionAhead { doc_id, client: client_version, server: current });
        }

        let changes =
            self.storage.load_changesets(&doc_id, client_version, self.config.catch_up_limit)?;
        let has_more = client_version + (changes.len() as Version) < current;

        self.subscriptions.entry(doc_id.clone()).or_default().insert(peer.clone());
        tracing::debug!(
            doc = %doc_id,
            %peer,
            from = client_version,
            count = changes.len(),
            has_more,
            "open confirmed"
        );

        Ok(vec![HubAction::SendTo {
            peer: peer.clone(),
            command: Command::OpenConfirmed { doc_id, version: current, changes, has_more },
        }])
    }

    /// Handle `commit`.
    ///
    /// 1. Document must exist and the peer must have opened it
    /// 2. A commit id seen before is acknowledged with its original version
    /// 3. A stale base is rejected with the missing changesets
    /// 4. Otherwise append, ack the originator and broadcast to the others
    fn handle_commit(
        &mut self,
        peer: &PeerId,
        doc_id: DocId,
        base_version: Version,
        commit_id: CommitId,
        ops: Vec<Op>,
    ) -> Result<Vec<HubAction>, HubError> {
        if !self.has_document(&doc_id) {
            return Err(HubError::DocumentNotFound(doc_id));
        }

        let subscribed = self.subscriptions.get(&doc_id).is_some_and(|s| s.contains(peer));
        if !subscribed {
            return Err(HubError::NotOpen { peer: peer.clone(), doc_id });
        }

        if let Some(version) = self.storage.find_commit(&doc_id, commit_id)? {
            tracing::debug!(doc = %doc_id, %peer, %commit_id, version, "duplicate commit acknowledged");
            return Ok(vec![HubAction::SendTo {
                peer: peer.clone(),
                command: Command::Ack { doc_id, commit_id, version },
            }]);
        }

        let current = self.current_version(&doc_id)?;
        if base_version > current {
            return Err(HubError::VersionAhead { doc_id, client: base_version, server: current });
        }

        if base_version < current {
            let changes = self.storage.load_changesets(&doc_id, base_version, usize::MAX)?;
            tracing::info!(
                doc = %doc_id,
                %peer,
                %commit_id,
                base = base_version,
                current,
                "stale commit rejected"
            );
            return Ok(vec![HubAction::SendTo {
                peer: peer.clone(),
                command: Command::Rejected { doc_id, commit_id, version: current, changes },
            }]);
        }

        let version = current + 1;
        let changeset = Changeset { version, author: peer.clone(), commit_id, ops };
        self.storage.append(&doc_id, changeset.clone())?;
        tracing::info!(doc = %doc_id, %peer, %commit_id, version, "commit accepted");

        Ok(vec![
            HubAction::SendTo {
                peer: peer.clone(),
                command: Command::Ack { doc_id: doc_id.clone(), commit_id, version },
            },
            HubAction::Broadcast {
                doc_id: doc_id.clone(),
                command: Command::Update { doc_id, changeset },
                exclude: Some(peer.clone()),
            },
        ])
    }

    fn current_version(&self, doc_id: &DocId) -> Result<Version, HubError> {
        self.storage.version(doc_id)?.ok_or_else(|| HubError::DocumentNotFound(doc_id.clone()))
    }
}

impl<E, S> std::fmt::Debug for Hub<E, S>
where
    E: Environment,
    S: Storage,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("document_count", &self.metadata.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
