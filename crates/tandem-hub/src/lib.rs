//! Tandem hub.
//!
//! The hub is the single authoritative synchronization point for one or more
//! documents. It owns one changeset log per document id, sequences incoming
//! commits into a total order and tells the driver whom to notify.
//!
//! ## Architecture
//!
//! ```text
//! tandem-hub
//!   ├─ Hub            (open/commit handling, subscriptions)
//!   ├─ HubAction      (what the driver must send)
//!   └─ Storage        (changeset log per document)
//! ```
//!
//! The hub is action-based: it never performs I/O. Callers feed it
//! `(peer, command)` pairs one at a time and execute the returned actions,
//! which is what makes single-writer access to the log sufficient.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod hub;
pub mod storage;

pub use error::HubError;
pub use hub::{DocumentMetadata, Hub, HubAction, HubConfig};
pub use storage::{MemoryStorage, Storage, StorageError};
