//! Identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Document version.
///
/// Version `0` is the seed snapshot. Every accepted changeset advances the
/// version by exactly one, so the version equals the hub's log length.
pub type Version = u64;

/// Name of a transport endpoint (one per session, one for the hub).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The peer name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifier grouping one changeset log and every session editing it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    /// Create a document identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The document name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Client-generated identifier of one commit.
///
/// Survives rebase and resend unchanged, which lets the hub recognise a
/// commit it already accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitId(pub u64);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display() {
        assert_eq!(PeerId::from("user1").to_string(), "user1");
    }

    #[test]
    fn commit_id_display_is_fixed_width_hex() {
        assert_eq!(CommitId(0xab).to_string(), "00000000000000ab");
    }
}
