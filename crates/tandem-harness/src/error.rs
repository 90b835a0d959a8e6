//! Harness error types.

use tandem_client::SessionError;
use tandem_hub::HubError;
use tandem_proto::PeerId;
use thiserror::Error;

/// Errors from setting up or driving a simulation.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Hub rejected a setup operation.
    #[error("hub error: {0}")]
    Hub(#[from] HubError),

    /// Session rejected an event.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// No peer at this index.
    #[error("unknown peer index: {0}")]
    UnknownPeer(usize),

    /// Two endpoints share a name.
    #[error("duplicate peer id: {0}")]
    DuplicatePeer(PeerId),
}
