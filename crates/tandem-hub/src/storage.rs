//! Changeset log storage.
//!
//! One append-only log per document id plus the seed operations that define
//! version 0.
//!
//! # Invariants
//!
//! - Sequential versions: the changeset at position `i` has version `i + 1`
//! - No gaps: `append` refuses a changeset whose version is not
//!   `current + 1`
//! - Commit ids are unique per document

use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use tandem_proto::{Changeset, CommitId, DocId, Op, Version};
use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Document does not exist.
    #[error("document not found: {0}")]
    NotFound(DocId),

    /// Document already exists.
    #[error("document already exists: {0}")]
    AlreadyExists(DocId),

    /// Appended changeset does not directly follow the current version.
    #[error("version gap in {doc_id}: expected {expected}, got {actual}")]
    VersionGap {
        /// Document the append targeted.
        doc_id: DocId,
        /// Next version the log expects.
        expected: Version,
        /// Version carried by the changeset.
        actual: Version,
    },

    /// Commit id already present in the log.
    #[error("duplicate commit {commit_id} in {doc_id}")]
    DuplicateCommit {
        /// Document the append targeted.
        doc_id: DocId,
        /// Duplicated commit.
        commit_id: CommitId,
    },

    /// Storage backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Changeset log persistence.
///
/// Methods take `&self`; implementations use interior mutability so a log
/// can be inspected while the hub holds it.
pub trait Storage {
    /// Create a document whose version 0 is `seed`.
    fn create_document(&self, doc_id: &DocId, seed: Vec<Op>) -> Result<(), StorageError>;

    /// Whether the document exists.
    fn has_document(&self, doc_id: &DocId) -> Result<bool, StorageError>;

    /// Current version (log length). `None` if the document does not exist.
    fn version(&self, doc_id: &DocId) -> Result<Option<Version>, StorageError>;

    /// Append a changeset. Its version must be `current + 1`.
    fn append(&self, doc_id: &DocId, changeset: Changeset) -> Result<(), StorageError>;

    /// Load up to `limit` changesets producing versions `from + 1` onwards.
    fn load_changesets(
        &self,
        doc_id: &DocId,
        from: Version,
        limit: usize,
    ) -> Result<Vec<Changeset>, StorageError>;

    /// Seed operations of a document.
    fn seed(&self, doc_id: &DocId) -> Result<Vec<Op>, StorageError>;

    /// Version produced by a previously accepted commit.
    fn find_commit(
        &self,
        doc_id: &DocId,
        commit_id: CommitId,
    ) -> Result<Option<Version>, StorageError>;
}

#[derive(Debug, Default)]
struct DocumentLog {
    seed: Vec<Op>,
    changesets: Vec<Changeset>,
    commits: HashMap<CommitId, Version>,
}

/// In-memory storage. Lives as long as the hub that owns it.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<DocId, DocumentLog>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StorageError {
    StorageError::Backend("lock poisoned".to_string())
}

impl Storage for MemoryStorage {
    fn create_document(&self, doc_id: &DocId, seed: Vec<Op>) -> Result<(), StorageError> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        if documents.contains_key(doc_id) {
            return Err(StorageError::AlreadyExists(doc_id.clone()));
        }

        documents.insert(doc_id.clone(), DocumentLog { seed, ..DocumentLog::default() });
        Ok(())
    }

    fn has_document(&self, doc_id: &DocId) -> Result<bool, StorageError> {
        Ok(self.documents.read().map_err(poisoned)?.contains_key(doc_id))
    }

    fn version(&self, doc_id: &DocId) -> Result<Option<Version>, StorageError> {
        let documents = self.documents.read().map_err(poisoned)?;
        Ok(documents.get(doc_id).map(|log| log.changesets.len() as Version))
    }

    fn append(&self, doc_id: &DocId, changeset: Changeset) -> Result<(), StorageError> {
        let mut documents = self.documents.write().map_err(poisoned)?;
        let log = documents.get_mut(doc_id).ok_or_else(|| StorageError::NotFound(doc_id.clone()))?;

        let expected = log.changesets.len() as Version + 1;
        if changeset.version != expected {
            return Err(StorageError::VersionGap {
                doc_id: doc_id.clone(),
                expected,
                actual: changeset.version,
            });
        }

        if log.commits.contains_key(&changeset.commit_id) {
            return Err(StorageError::DuplicateCommit {
                doc_id: doc_id.clone(),
                commit_id: changeset.commit_id,
            });
        }

        log.commits.insert(changeset.commit_id, changeset.version);
        log.changesets.push(changeset);
        Ok(())
    }

    fn load_changesets(
        &self,
        doc_id: &DocId,
        from: Version,
        limit: usize,
    ) -> Result<Vec<Changeset>, StorageError> {
        let documents = self.documents.read().map_err(poisoned)?;
        let log = documents.get(doc_id).ok_or_else(|| StorageError::NotFound(doc_id.clone()))?;

        let start = usize::try_from(from).unwrap_or(usize::MAX).min(log.changesets.len());
        Ok(log.changesets[start..].iter().take(limit).cloned().collect())
    }

    fn seed(&self, doc_id: &DocId) -> Result<Vec<Op>, StorageError> {
        let documents = self.documents.read().map_err(poisoned)?;
        documents
            .get(doc_id)
            .map(|log| log.seed.clone())
            .ok_or_else(|| StorageError::NotFound(doc_id.clone()))
    }

    fn find_commit(
        &self,
        doc_id: &DocId,
        commit_id: CommitId,
    ) -> Result<Option<Version>, StorageError> {
        let documents = self.documents.read().map_err(poisoned)?;
        let log = documents.get(doc_id).ok_or_else(|| StorageError::NotFound(doc_id.clone()))?;
        Ok(log.commits.get(&commit_id).copied())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tandem_proto::PeerId;

    use super::*;

    fn changeset(version: Version, commit: u64) -> Changeset {
        Changeset {
            version,
            author: PeerId::from("user1"),
            commit_id: CommitId(commit),
            ops: vec![Op::Append { node: "p1".to_string(), text: format!("{version}") }],
        }
    }

    #[test]
    fn new_document_is_at_version_zero() {
        let storage = MemoryStorage::new();
        let doc = DocId::from("test");

        assert_eq!(storage.version(&doc).unwrap(), None);
        storage.create_document(&doc, vec![]).unwrap();
        assert_eq!(storage.version(&doc).unwrap(), Some(0));
    }

    #[test]
    fn append_rejects_gap() {
        let storage = MemoryStorage::new();
        let doc = DocId::from("test");
        storage.create_document(&doc, vec![]).unwrap();

        let result = storage.append(&doc, changeset(2, 1));
        assert_eq!(
            result,
            Err(StorageError::VersionGap { doc_id: doc.clone(), expected: 1, actual: 2 })
        );
        assert_eq!(storage.version(&doc).unwrap(), Some(0));
    }

    #[test]
    fn append_rejects_duplicate_commit() {
        let storage = MemoryStorage::new();
        let doc = DocId::from("test");
        storage.create_document(&doc, vec![]).unwrap();
        storage.append(&doc, changeset(1, 9)).unwrap();

        let result = storage.append(&doc, changeset(2, 9));
        assert!(matches!(result, Err(StorageError::DuplicateCommit { .. })));
    }

    #[test]
    fn load_changesets_window() {
        let storage = MemoryStorage::new();
        let doc = DocId::from("test");
        storage.create_document(&doc, vec![]).unwrap();
        for v in 1..=5 {
            storage.append(&doc, changeset(v, v)).unwrap();
        }

        let loaded = storage.load_changesets(&doc, 2, 2).unwrap();
        let versions: Vec<_> = loaded.iter().map(|c| c.version).collect();
        assert_eq!(versions, vec![3, 4]);

        assert!(storage.load_changesets(&doc, 5, 10).unwrap().is_empty());
        assert!(storage.load_changesets(&doc, 99, 10).unwrap().is_empty());
        assert_eq!(storage.find_commit(&doc, CommitId(4)).unwrap(), Some(4));
    }
}
