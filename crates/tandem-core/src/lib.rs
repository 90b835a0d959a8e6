//! Tandem core.
//!
//! Pieces shared by the hub and the client state machines:
//!
//! - [`Environment`]: time and randomness behind a trait, so both state
//!   machines run unchanged in deterministic simulation
//! - [`Document`]: the replica model a session applies operations to
//! - [`ParagraphDocument`]: minimal ordered-paragraph model used for
//!   convergence checks
//! - [`fixtures`]: seed content for two-party scenarios

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod document;
pub mod env;
pub mod fixtures;

pub use document::{Document, ParagraphDocument};
pub use env::Environment;
