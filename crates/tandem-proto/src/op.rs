//! Document operations and changesets.

use serde::{Deserialize, Serialize};

use crate::ids::{CommitId, PeerId, Version};

/// Identifier of a node (paragraph) inside a document.
pub type NodeId = String;

/// Atomic document operation.
///
/// Opaque to the hub: it only stores and forwards operations. Applying them
/// is the document model's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Insert a node at the end of the document (replaces an existing node
    /// with the same id in place).
    Insert {
        /// Node to create.
        node: NodeId,
        /// Initial text.
        text: String,
    },
    /// Replace the text of a node.
    Set {
        /// Target node.
        node: NodeId,
        /// New text.
        text: String,
    },
    /// Append text to a node.
    Append {
        /// Target node.
        node: NodeId,
        /// Text to append.
        text: String,
    },
    /// Remove a node.
    Remove {
        /// Node to remove.
        node: NodeId,
    },
}

impl Op {
    /// Node this operation targets.
    pub fn node(&self) -> &str {
        match self {
            Self::Insert { node, .. }
            | Self::Set { node, .. }
            | Self::Append { node, .. }
            | Self::Remove { node } => node,
        }
    }
}

/// One hub-accepted batch of operations plus the version it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    /// Version this changeset produced (previous version + 1).
    pub version: Version,
    /// Peer that committed the change.
    pub author: PeerId,
    /// Client-generated commit identifier.
    pub commit_id: CommitId,
    /// Operations in application order.
    pub ops: Vec<Op>,
}
