//! Hub error types.

use tandem_proto::{DocId, ErrorKind, PeerId, Version};
use thiserror::Error;

use crate::storage::StorageError;

/// Errors from hub operations.
///
/// Every variant is reported to the originating peer as a protocol `Error`
/// command and never broadcast.
#[derive(Debug, Error)]
pub enum HubError {
    /// Commit referenced an unknown document.
    #[error("document not found: {0}")]
    DocumentNotFound(DocId),

    /// Document already exists.
    #[error("document already exists: {0}")]
    DocumentExists(DocId),

    /// Client claimed a version the hub has not reached.
    #[error("version ahead of server for {doc_id}: client {client}, server {server}")]
    VersionAhead {
        /// Document being opened or committed to.
        doc_id: DocId,
        /// Version claimed by the client.
        client: Version,
        /// Hub's current version.
        server: Version,
    },

    /// Peer committed to a document it has not opened.
    #[error("{peer} has not opened {doc_id}")]
    NotOpen {
        /// Offending peer.
        peer: PeerId,
        /// Target document.
        doc_id: DocId,
    },

    /// Command the hub never receives.
    #[error("unexpected command from {peer}: {command}")]
    UnexpectedCommand {
        /// Sending peer.
        peer: PeerId,
        /// Command name.
        command: &'static str,
    },

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl HubError {
    /// Wire category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DocumentNotFound(_) => ErrorKind::DocumentNotFound,
            Self::VersionAhead { .. } => ErrorKind::VersionAhead,
            Self::NotOpen { .. } => ErrorKind::NotOpen,
            Self::UnexpectedCommand { .. } => ErrorKind::UnexpectedCommand,
            Self::DocumentExists(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ahead_display() {
        let err = HubError::VersionAhead { doc_id: DocId::from("test"), client: 5, server: 3 };
        assert_eq!(err.to_string(), "version ahead of server for test: client 5, server 3");
        assert_eq!(err.kind(), ErrorKind::VersionAhead);
    }

    #[test]
    fn storage_errors_are_internal() {
        let err = HubError::from(StorageError::Backend("disk on fire".to_string()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
