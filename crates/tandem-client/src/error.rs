//! Session error types.

use tandem_proto::{CommitId, DocId, Version};
use thiserror::Error;

use crate::session::SessionState;

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Command for a document this session does not edit.
    #[error("wrong document: expected {expected}, got {actual}")]
    WrongDocument {
        /// Session's document.
        expected: DocId,
        /// Document named by the command.
        actual: DocId,
    },

    /// Changeset skips versions the session has not seen.
    #[error("version gap: at {local}, received {received}")]
    VersionGap {
        /// Session's confirmed version.
        local: Version,
        /// Version of the received changeset.
        received: Version,
    },

    /// Acknowledgement that matches no in-flight commit.
    #[error("unexpected ack for commit {commit_id} at version {version}")]
    UnexpectedAck {
        /// Acknowledged commit.
        commit_id: CommitId,
        /// Version in the ack.
        version: Version,
    },

    /// Command that only the hub receives.
    #[error("unexpected command: {0}")]
    UnexpectedCommand(&'static str),

    /// Event not valid in the current state.
    #[error("invalid state: {event} while {state:?}")]
    InvalidState {
        /// Event name.
        event: &'static str,
        /// Current state.
        state: SessionState,
    },
}

impl SessionError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors mean the replica can no longer be trusted; the session
    /// must reconnect and catch up from its confirmed version. Transient
    /// errors leave the replica consistent.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::VersionGap { .. } | Self::UnexpectedAck { .. } => true,

            Self::WrongDocument { .. }
            | Self::UnexpectedCommand(_)
            | Self::InvalidState { .. } => false,
        }
    }
}
