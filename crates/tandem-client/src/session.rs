//! Session state machine.
//!
//! The replica a session exposes is always
//! `base + in-flight commit + buffered edits`, where `base` is the document
//! at the last hub-confirmed version. Remote changesets are applied to
//! `base` and the replica is re-derived on top, which rebases local work by
//! replay.
//!
//! # States
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Syncing ──▶ Synced ⇄ Committing
//!       ▲                                        │
//!       └──────────────── error / disconnect ────┘
//! ```
//!
//! `stopped` is orthogonal to the protocol state: a stopped session keeps its
//! state and only suppresses automatic commits.

use std::mem;

use tandem_core::{Document, Environment};
use tandem_proto::{Changeset, Command, CommitId, DocId, ErrorKind, Op, Version};

use crate::{
    error::SessionError,
    event::{DocumentChange, SessionAction, SessionEvent},
};

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport.
    Disconnected,
    /// Waiting for the transport to confirm the connection.
    Connecting,
    /// `open` sent, catch-up pending.
    Syncing,
    /// Caught up, no commit in flight.
    Synced,
    /// One local commit in flight.
    Committing,
}

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Commit local edits as soon as the session is able to.
    pub auto_commit: bool,
}

/// Local operations submitted to the hub but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    /// Identifier reused on every resend.
    pub commit_id: CommitId,
    /// Version the commit was last sent against.
    pub base_version: Version,
    /// Operations in the commit.
    pub ops: Vec<Op>,
}

/// Client-side protocol state machine for one document.
///
/// Pure state machine - returns actions, caller handles I/O.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
/// - `D`: Document model of the replica
pub struct CollabSession<E: Environment, D: Document> {
    env: E,
    config: SessionConfig,
    doc_id: DocId,
    state: SessionState,
    stopped: bool,

    /// Last hub-confirmed version.
    version: Version,
    /// Document at `version`.
    base: D,
    /// Replica shown to the user.
    document: D,

    /// At most one commit in flight.
    pending: Option<PendingCommit>,
    /// Local edits not yet sent (the next commit).
    buffered: Vec<Op>,

    synced_at: Option<E::Instant>,
    replica_changed: bool,
}

impl<E: Environment, D: Document> CollabSession<E, D> {
    /// Create a session for `doc_id` whose replica `document` is at `version`.
    pub fn new(env: E, doc_id: DocId, document: D, version: Version, config: SessionConfig) -> Self {
        Self {
            env,
            config,
            doc_id,
            state: SessionState::Disconnected,
            stopped: false,
            version,
            base: document.clone(),
            document,
            pending: None,
            buffered: Vec::new(),
            synced_at: None,
            replica_changed: false,
        }
    }

    /// Document this session edits.
    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    /// Protocol state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Last hub-confirmed version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Local replica, including unconfirmed edits.
    pub fn document(&self) -> &D {
        &self.document
    }

    /// Replica at the last confirmed version.
    pub fn confirmed_document(&self) -> &D {
        &self.base
    }

    /// Commit in flight.
    pub fn pending(&self) -> Option<&PendingCommit> {
        self.pending.as_ref()
    }

    /// Buffered local edits that the next commit would send.
    pub fn next_commit(&self) -> Option<&[Op]> {
        if self.buffered.is_empty() { None } else { Some(self.buffered.as_slice()) }
    }

    /// Whether a commit is currently permissible.
    pub fn can_commit(&self) -> bool {
        self.state == SessionState::Synced && self.pending.is_none() && !self.buffered.is_empty()
    }

    /// Whether there is local work the hub has not confirmed.
    pub fn has_unconfirmed(&self) -> bool {
        self.pending.is_some() || !self.buffered.is_empty()
    }

    /// When the session last finished catching up.
    pub fn synced_at(&self) -> Option<E::Instant> {
        self.synced_at
    }

    /// Toggle automatic commits.
    pub fn set_auto_commit(&mut self, auto_commit: bool) {
        self.config.auto_commit = auto_commit;
    }

    /// Process an event and return resulting actions.
    ///
    /// A `DocumentChanged` action is appended whenever the replica, the
    /// confirmed version or the commit affordance changed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the event cannot be processed.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, SessionError> {
        let could_commit = self.can_commit();
        let version = self.version;
        self.replica_changed = false;

        let mut actions = match event {
            SessionEvent::Connecting => self.handle_connecting()?,
            SessionEvent::Connected => self.handle_connected()?,
            SessionEvent::Disconnected { reason } => self.handle_disconnected(&reason),
            SessionEvent::Received(command) => self.handle_command(command)?,
            SessionEvent::Edit { ops } => self.handle_edit(ops),
            SessionEvent::Commit => self.handle_commit(),
            SessionEvent::Stop => {
                self.stopped = true;
                Vec::new()
            },
            SessionEvent::Start => {
                self.stopped = false;
                let mut actions = Vec::new();
                self.maybe_auto_commit(&mut actions);
                actions
            },
        };

        if self.replica_changed || could_commit != self.can_commit() || version != self.version {
            actions.push(SessionAction::DocumentChanged(DocumentChange {
                version: self.version,
                can_commit: self.can_commit(),
            }));
        }

        Ok(actions)
    }

    fn handle_connecting(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Disconnected {
            return Err(SessionError::InvalidState { event: "connecting", state: self.state });
        }

        let mut actions = Vec::new();
        self.transition(SessionState::Connecting, &mut actions);
        Ok(actions)
    }

    /// Connection confirmed: ask the hub for everything after our version.
    fn handle_connected(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        if !matches!(self.state, SessionState::Disconnected | SessionState::Connecting) {
            return Err(SessionError::InvalidState { event: "connected", state: self.state });
        }

        let mut actions = vec![self.open()];
        self.transition(SessionState::Syncing, &mut actions);
        Ok(actions)
    }

    fn handle_disconnected(&mut self, reason: &str) -> Vec<SessionAction> {
        tracing::debug!(doc = %self.doc_id, reason, "session disconnected");

        let mut actions = Vec::new();
        self.transition(SessionState::Disconnected, &mut actions);
        actions
    }

    fn handle_command(&mut self, command: Command) -> Result<Vec<SessionAction>, SessionError> {
        if let Some(doc_id) = command.doc_id() {
            if *doc_id != self.doc_id {
                return Err(SessionError::WrongDocument {
                    expected: self.doc_id.clone(),
                    actual: doc_id.clone(),
                });
            }
        }

        match command {
            Command::OpenConfirmed { version, changes, has_more, .. } => {
                self.handle_open_confirmed(version, &changes, has_more)
            },
            Command::Update { changeset, .. } => self.handle_update(&changeset),
            Command::Ack { commit_id, version, .. } => self.handle_ack(commit_id, version),
            Command::Rejected { commit_id, version, changes, .. } => {
                self.handle_rejected(commit_id, version, &changes)
            },
            Command::Error { kind, reason, .. } => Ok(self.handle_error(kind, &reason)),
            other @ (Command::Open { .. } | Command::Commit { .. }) => {
                Err(SessionError::UnexpectedCommand(other.name()))
            },
        }
    }

    /// Catch-up after `open`.
    ///
    /// A batch with `has_more` triggers another `open` from the new version.
    /// Once caught up, an unconfirmed commit from before a reconnect is
    /// resent against the new base.
    fn handle_open_confirmed(
        &mut self,
        server_version: Version,
        changes: &[Changeset],
        has_more: bool,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.state != SessionState::Syncing {
            return Err(SessionError::InvalidState { event: "open-confirmed", state: self.state });
        }

        let mut actions = Vec::new();
        self.apply_changesets(changes, &mut actions)?;

        if has_more {
            actions.push(self.open());
            return Ok(actions);
        }

        if self.version != server_version {
            return Err(SessionError::VersionGap { local: self.version, received: server_version });
        }

        self.synced_at = Some(self.env.now());
        tracing::debug!(doc = %self.doc_id, version = self.version, "caught up");

        if self.pending.is_some() {
            self.resend_pending(&mut actions);
        } else {
            self.transition(SessionState::Synced, &mut actions);
            self.maybe_auto_commit(&mut actions);
        }

        Ok(actions)
    }

    fn handle_update(&mut self, changeset: &Changeset) -> Result<Vec<SessionAction>, SessionError> {
        if matches!(self.state, SessionState::Disconnected | SessionState::Connecting) {
            return Err(SessionError::InvalidState { event: "update", state: self.state });
        }

        if self.state == SessionState::Syncing && changeset.version > self.version + 1 {
            // Subscribed before the catch-up finished; a later batch covers it.
            tracing::debug!(
                doc = %self.doc_id,
                local = self.version,
                received = changeset.version,
                "update ahead of catch-up skipped"
            );
            return Ok(Vec::new());
        }

        let mut actions = Vec::new();
        self.apply_changeset(changeset, &mut actions)?;
        Ok(actions)
    }

    fn handle_ack(
        &mut self,
        commit_id: CommitId,
        version: Version,
    ) -> Result<Vec<SessionAction>, SessionError> {
        let matches_pending = self.pending.as_ref().is_some_and(|p| p.commit_id == commit_id);
        if !matches_pending {
            if version <= self.version {
                // Already confirmed through a catch-up.
                tracing::debug!(doc = %self.doc_id, %commit_id, version, "duplicate ack ignored");
                return Ok(Vec::new());
            }
            return Err(SessionError::UnexpectedAck { commit_id, version });
        }

        if version != self.version + 1 {
            return Err(SessionError::VersionGap { local: self.version, received: version });
        }

        let mut actions = Vec::new();
        self.confirm_pending(version, &mut actions);
        Ok(actions)
    }

    /// Stale commit: catch up, rebase, resend with the same id.
    fn handle_rejected(
        &mut self,
        commit_id: CommitId,
        server_version: Version,
        changes: &[Changeset],
    ) -> Result<Vec<SessionAction>, SessionError> {
        if !self.pending.as_ref().is_some_and(|p| p.commit_id == commit_id) {
            tracing::debug!(doc = %self.doc_id, %commit_id, "rejection for unknown commit ignored");
            return Ok(Vec::new());
        }

        let mut actions = Vec::new();
        self.apply_changesets(changes, &mut actions)?;

        if self.pending.is_none() {
            // The catch-up contained our own commit.
            return Ok(actions);
        }

        if self.version < server_version {
            return Err(SessionError::VersionGap { local: self.version, received: server_version });
        }

        if self.state == SessionState::Committing {
            self.resend_pending(&mut actions);
        }

        Ok(actions)
    }

    fn handle_error(&mut self, kind: ErrorKind, reason: &str) -> Vec<SessionAction> {
        tracing::warn!(doc = %self.doc_id, %kind, reason, "hub reported protocol error");

        let mut actions = vec![SessionAction::Disconnect { reason: format!("{kind}: {reason}") }];
        self.transition(SessionState::Disconnected, &mut actions);
        actions
    }

    /// Local edit. Buffered until the next commit.
    fn handle_edit(&mut self, ops: Vec<Op>) -> Vec<SessionAction> {
        self.document.apply_all(&ops);
        self.buffered.extend(ops);
        self.replica_changed = true;

        let mut actions = Vec::new();
        self.maybe_auto_commit(&mut actions);
        actions
    }

    fn handle_commit(&mut self) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.can_commit() {
            self.commit_buffered(&mut actions);
        } else {
            tracing::debug!(
                doc = %self.doc_id,
                state = ?self.state,
                pending = self.pending.is_some(),
                buffered = self.buffered.len(),
                "commit ignored"
            );
        }
        actions
    }

    fn open(&self) -> SessionAction {
        SessionAction::Send(Command::Open { doc_id: self.doc_id.clone(), version: self.version })
    }

    fn maybe_auto_commit(&mut self, actions: &mut Vec<SessionAction>) {
        if self.config.auto_commit && !self.stopped && self.can_commit() {
            self.commit_buffered(actions);
        }
    }

    fn commit_buffered(&mut self, actions: &mut Vec<SessionAction>) {
        let ops = mem::take(&mut self.buffered);
        let commit_id = CommitId(self.env.random_u64());
        tracing::debug!(doc = %self.doc_id, %commit_id, base = self.version, "committing");

        actions.push(SessionAction::Send(Command::Commit {
            doc_id: self.doc_id.clone(),
            base_version: self.version,
            commit_id,
            ops: ops.clone(),
        }));
        self.pending = Some(PendingCommit { commit_id, base_version: self.version, ops });
        self.transition(SessionState::Committing, actions);
    }

    fn resend_pending(&mut self, actions: &mut Vec<SessionAction>) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        pending.base_version = self.version;
        tracing::debug!(
            doc = %self.doc_id,
            commit_id = %pending.commit_id,
            base = self.version,
            "resending rebased commit"
        );
        actions.push(SessionAction::Send(Command::Commit {
            doc_id: self.doc_id.clone(),
            base_version: self.version,
            commit_id: pending.commit_id,
            ops: pending.ops.clone(),
        }));
        self.transition(SessionState::Committing, actions);
    }

    fn confirm_pending(&mut self, version: Version, actions: &mut Vec<SessionAction>) {
        if let Some(pending) = self.pending.take() {
            self.base.apply_all(&pending.ops);
            self.version = version;
            tracing::debug!(doc = %self.doc_id, commit_id = %pending.commit_id, version, "commit confirmed");
        }

        if self.state == SessionState::Committing {
            self.transition(SessionState::Synced, actions);
            self.maybe_auto_commit(actions);
        }
    }

    fn apply_changesets(
        &mut self,
        changes: &[Changeset],
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        for changeset in changes {
            self.apply_changeset(changeset, actions)?;
        }
        Ok(())
    }

    /// Apply one hub-accepted changeset.
    ///
    /// Already applied versions are skipped. Our own in-flight commit counts
    /// as its acknowledgement.
    fn apply_changeset(
        &mut self,
        changeset: &Changeset,
        actions: &mut Vec<SessionAction>,
    ) -> Result<(), SessionError> {
        if changeset.version <= self.version {
            return Ok(());
        }

        if changeset.version != self.version + 1 {
            return Err(SessionError::VersionGap {
                local: self.version,
                received: changeset.version,
            });
        }

        if self.pending.as_ref().is_some_and(|p| p.commit_id == changeset.commit_id) {
            self.confirm_pending(changeset.version, actions);
            return Ok(());
        }

        self.base.apply_all(&changeset.ops);
        self.version = changeset.version;
        self.rebuild_document();
        tracing::debug!(
            doc = %self.doc_id,
            version = self.version,
            author = %changeset.author,
            "remote change applied"
        );

        Ok(())
    }

    /// Re-derive the replica from the confirmed base plus local work.
    fn rebuild_document(&mut self) {
        let mut document = self.base.clone();
        if let Some(pending) = &self.pending {
            document.apply_all(&pending.ops);
        }
        document.apply_all(&self.buffered);
        self.document = document;
        self.replica_changed = true;
    }

    fn transition(&mut self, to: SessionState, actions: &mut Vec<SessionAction>) {
        if self.state == to {
            return;
        }

        let from = mem::replace(&mut self.state, to);
        tracing::debug!(doc = %self.doc_id, ?from, ?to, "session state changed");
        actions.push(SessionAction::StateChanged { from, to });
    }
}

impl<E: Environment, D: Document> std::fmt::Debug for CollabSession<E, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollabSession")
            .field("doc_id", &self.doc_id)
            .field("state", &self.state)
            .field("stopped", &self.stopped)
            .field("version", &self.version)
            .field("pending", &self.pending)
            .field("buffered", &self.buffered.len())
            .finish_non_exhaustive()
    }
}
