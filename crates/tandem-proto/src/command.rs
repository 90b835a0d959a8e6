//! Protocol commands exchanged between sessions and the hub.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    ids::{CommitId, DocId, Version},
    op::{Changeset, Op},
};

/// Error categories reported by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Commit referenced a document the hub does not know.
    DocumentNotFound,
    /// Client claimed a version newer than the hub's.
    VersionAhead,
    /// Commit for a document the peer never opened.
    NotOpen,
    /// Command that is never sent towards the hub.
    UnexpectedCommand,
    /// Hub-side failure unrelated to the request.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DocumentNotFound => "document not found",
            Self::VersionAhead => "version ahead of server",
            Self::NotOpen => "document not open",
            Self::UnexpectedCommand => "unexpected command",
            Self::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// Protocol command.
///
/// `Open` and `Commit` travel session → hub, everything else hub → session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Subscribe to a document, asking for catch-up from `version`.
    Open {
        /// Document to open.
        doc_id: DocId,
        /// Last version the session has applied.
        version: Version,
    },

    /// Reply to `Open` with the changesets the session is missing.
    OpenConfirmed {
        /// Opened document.
        doc_id: DocId,
        /// Hub's current version.
        version: Version,
        /// Changesets in version order, starting right after the requested
        /// version.
        changes: Vec<Changeset>,
        /// More changesets exist; the session should open again from its new
        /// version.
        has_more: bool,
    },

    /// Propose a change on top of `base_version`.
    Commit {
        /// Target document.
        doc_id: DocId,
        /// Version the operations were made against.
        base_version: Version,
        /// Client-generated identifier, stable across resends.
        commit_id: CommitId,
        /// Operations to apply.
        ops: Vec<Op>,
    },

    /// Direct acknowledgement to the committing session.
    Ack {
        /// Target document.
        doc_id: DocId,
        /// Acknowledged commit.
        commit_id: CommitId,
        /// Version the commit produced.
        version: Version,
    },

    /// Change accepted from another peer.
    Update {
        /// Target document.
        doc_id: DocId,
        /// Accepted changeset; `author` is the origin peer.
        changeset: Changeset,
    },

    /// Commit was based on a stale version. Carries the catch-up needed to
    /// rebase and resubmit.
    Rejected {
        /// Target document.
        doc_id: DocId,
        /// Rejected commit.
        commit_id: CommitId,
        /// Hub's current version.
        version: Version,
        /// Changesets from the commit's base version up to `version`.
        changes: Vec<Changeset>,
    },

    /// Protocol error, sent only to the offending session.
    Error {
        /// Document the failing request referred to, if any.
        doc_id: Option<DocId>,
        /// Error category.
        kind: ErrorKind,
        /// Human-readable detail.
        reason: String,
    },
}

impl Command {
    /// Short command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::OpenConfirmed { .. } => "open-confirmed",
            Self::Commit { .. } => "commit",
            Self::Ack { .. } => "ack",
            Self::Update { .. } => "update",
            Self::Rejected { .. } => "rejected",
            Self::Error { .. } => "error",
        }
    }

    /// Document the command refers to.
    pub fn doc_id(&self) -> Option<&DocId> {
        match self {
            Self::Open { doc_id, .. }
            | Self::OpenConfirmed { doc_id, .. }
            | Self::Commit { doc_id, .. }
            | Self::Ack { doc_id, .. }
            | Self::Update { doc_id, .. }
            | Self::Rejected { doc_id, .. } => Some(doc_id),
            Self::Error { doc_id, .. } => doc_id.as_ref(),
        }
    }

    /// Whether this command is addressed to the hub.
    pub fn is_hub_bound(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Commit { .. })
    }
}
