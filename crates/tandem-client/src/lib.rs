//! Collaboration session
//!
//! Action-based client state machine for the Tandem protocol. A session owns
//! one document replica, performs the open handshake, submits local edits as
//! commits and applies changes accepted by the hub.
//!
//! # Architecture
//!
//! The session is a pure state machine that:
//! - Receives events from the caller (connection changes, commands, local
//!   edits, commit requests)
//! - Produces actions for the caller to execute (send commands, notify
//!   observers)
//! - Uses the `Environment` trait for time and randomness (deterministic
//!   testing)
//!
//! # Components
//!
//! - [`CollabSession`]: the state machine
//! - [`SessionEvent`]: events fed into the session
//! - [`SessionAction`]: actions produced by the session

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
mod session;

pub use error::SessionError;
pub use event::{DocumentChange, SessionAction, SessionEvent};
pub use session::{CollabSession, PendingCommit, SessionConfig, SessionState};
pub use tandem_core::{Document, Environment};
