//! Session events and actions.

use tandem_proto::{Command, Op, Version};

use crate::session::SessionState;

/// Events fed into a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transport started connecting.
    Connecting,
    /// Transport confirmed the connection; the session opens its document.
    Connected,
    /// Transport went away.
    Disconnected {
        /// Why the connection ended.
        reason: String,
    },
    /// Command delivered from the hub.
    Received(Command),
    /// Local edit.
    Edit {
        /// Operations applied to the local replica.
        ops: Vec<Op>,
    },
    /// Submit buffered local edits.
    Commit,
    /// Pause the session (no automatic commits).
    Stop,
    /// Resume the session.
    Start,
}

/// Snapshot sent to observers after every replica mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentChange {
    /// Confirmed version after the change.
    pub version: Version,
    /// Whether a commit is currently permissible.
    pub can_commit: bool,
}

/// Actions produced by a session for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send a command to the hub.
    Send(Command),
    /// The replica or the commit affordance changed.
    DocumentChanged(DocumentChange),
    /// Protocol state transition.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// The hub reported a protocol error; the transport should be closed.
    Disconnect {
        /// Error reported by the hub.
        reason: String,
    },
}
