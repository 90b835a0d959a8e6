//! Deterministic simulation harness for Tandem protocol testing.
//!
//! An in-memory stand-in for the network whose only job is to reproduce the
//! ordering and timing hazards of a real one: arbitrary delay, asynchronous
//! delivery, pause and resume. Delivery is driven explicitly through the
//! [`MessageQueue`] (`tick`, `flush`, `start`, `stop`), so every run is
//! replayable.
//!
//! # Architecture
//!
//! ```text
//! CollabPeer ── SimulatedSocket ──┐
//!                                 ├── MessageQueue ── SimulatedSocketServer ── HubRouter ── Hub
//! CollabPeer ── SimulatedSocket ──┘
//! ```
//!
//! Everything is single-threaded and run-to-completion. Shared objects use
//! `Rc`/`RefCell`; no borrow is held while a message is handed to the queue.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod observer;
pub mod peer;
pub mod queue;
pub mod router;
pub mod scenario;
pub mod server;
pub mod sim_env;
pub mod socket;
pub mod workload;

pub use error::HarnessError;
pub use observer::{Observers, SubscriptionId};
pub use peer::CollabPeer;
pub use queue::{Endpoint, MessageQueue, QueueStats};
pub use router::HubRouter;
pub use scenario::{Scenario, ScenarioConfig, SimHub, SimPeer};
pub use server::{Outbound, ServerHandler, SimulatedSocketServer};
pub use sim_env::SimEnv;
pub use socket::{SimulatedSocket, SocketHandler, SocketState};
