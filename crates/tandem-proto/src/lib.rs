//! Tandem wire types.
//!
//! Everything that travels between a collaborating session and the hub:
//! identifiers, document operations, hub-accepted changesets, protocol
//! commands and the transport envelope that carries them through the
//! simulated network.
//!
//! # Protocol Flow
//!
//! ```text
//! session                         hub
//!    │ ── Connect ──────────────▶ │   transport handshake
//!    │ ◀──────────── Connected ── │
//!    │ ── Open(doc, v) ─────────▶ │
//!    │ ◀── OpenConfirmed(changes) │   catch-up from v
//!    │ ── Commit(doc, base, ops) ▶│
//!    │ ◀──────────────── Ack ──── │   originator
//!    │                            │ ── Update ──▶ other subscribers
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
mod command;
mod error;
mod ids;
mod message;
mod op;

pub use codec::{decode_messages, encode_messages};
pub use command::{Command, ErrorKind};
pub use error::ProtoError;
pub use ids::{CommitId, DocId, PeerId, Version};
pub use message::{Message, Payload};
pub use op::{Changeset, NodeId, Op};
