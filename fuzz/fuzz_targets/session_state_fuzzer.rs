//! Fuzz target for the [`CollabSession`] state machine
//!
//! # Strategy
//!
//! - Event sequences: arbitrary mixes of connection changes, local edits,
//!   commit requests and hub commands
//! - Hub commands carry versions near the local one, so both the accepted
//!   and the gap paths are exercised
//! - Acks and rejections sometimes name the in-flight commit, sometimes not
//!
//! # Invariants
//!
//! - Confirmed version NEVER decreases
//! - `Committing` ALWAYS has a commit in flight
//! - At most one commit is sent per event, and a new one only once synced
//! - NEVER panic on an unexpected command

#![no_main]

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tandem_client::{CollabSession, SessionAction, SessionConfig, SessionEvent, SessionState};
use tandem_core::{Environment, ParagraphDocument, fixtures};
use tandem_proto::{Changeset, Command, CommitId, DocId, ErrorKind, Op, PeerId, Version};

#[derive(Clone, Default)]
struct FuzzEnv {
    counter: Arc<AtomicU64>,
}

impl Environment for FuzzEnv {
    type Instant = u64;

    fn now(&self) -> Self::Instant {
        self.counter.load(Ordering::Relaxed)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        for (dst, src) in buffer.iter_mut().zip(next.to_be_bytes().iter().cycle()) {
            *dst = *src;
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Connecting,
    Connected,
    Disconnected,
    Edit { node: u8, text: u8 },
    Commit,
    Stop,
    Start,
    OpenConfirmed { ahead: u8, count: u8, has_more: bool },
    Update { offset: u8 },
    Ack { own: bool, offset: u8 },
    Rejected { own: bool, count: u8 },
    Error,
    WrongDocument,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    auto_commit: bool,
    events: Vec<FuzzEvent>,
}

fn doc_id() -> DocId {
    DocId::from("fuzz")
}

fn changesets(from: Version, count: u8) -> Vec<Changeset> {
    (1..=Version::from(count))
        .map(|i| Changeset {
            version: from + i,
            author: PeerId::from("remote"),
            commit_id: CommitId(u64::MAX - from - i),
            ops: vec![Op::Append { node: "p1".into(), text: i.to_string() }],
        })
        .collect()
}

fuzz_target!(|input: FuzzInput| {
    let seed = ParagraphDocument::from_ops(&fixtures::two_paragraphs());
    let config = SessionConfig { auto_commit: input.auto_commit };
    let mut session = CollabSession::new(FuzzEnv::default(), doc_id(), seed, 0, config);

    for event in input.events {
        let version = session.version();
        let previous_state = session.state();
        let pending = session.pending().map(|p| p.commit_id);
        let remote_id = CommitId(u64::MAX);

        let event = match event {
            FuzzEvent::Connecting => SessionEvent::Connecting,
            FuzzEvent::Connected => SessionEvent::Connected,
            FuzzEvent::Disconnected => SessionEvent::Disconnected { reason: "fuzz".into() },
            FuzzEvent::Edit { node, text } => SessionEvent::Edit {
                ops: vec![Op::Append {
                    node: format!("p{}", node % 3),
                    text: char::from(b'a' + text % 26).to_string(),
                }],
            },
            FuzzEvent::Commit => SessionEvent::Commit,
            FuzzEvent::Stop => SessionEvent::Stop,
            FuzzEvent::Start => SessionEvent::Start,
            FuzzEvent::OpenConfirmed { ahead, count, has_more } => {
                let count = count % 4;
                SessionEvent::Received(Command::OpenConfirmed {
                    doc_id: doc_id(),
                    version: version + Version::from(count) + Version::from(ahead % 2),
                    changes: changesets(version, count),
                    has_more,
                })
            },
            FuzzEvent::Update { offset } => SessionEvent::Received(Command::Update {
                doc_id: doc_id(),
                changeset: Changeset {
                    version: version + Version::from(offset % 3),
                    author: PeerId::from("remote"),
                    commit_id: remote_id,
                    ops: Vec::new(),
                },
            }),
            FuzzEvent::Ack { own, offset } => SessionEvent::Received(Command::Ack {
                doc_id: doc_id(),
                commit_id: if own { pending.unwrap_or(remote_id) } else { remote_id },
                version: version + Version::from(offset % 3),
            }),
            FuzzEvent::Rejected { own, count } => {
                let count = count % 3;
                SessionEvent::Received(Command::Rejected {
                    doc_id: doc_id(),
                    commit_id: if own { pending.unwrap_or(remote_id) } else { remote_id },
                    version: version + Version::from(count),
                    changes: changesets(version, count),
                })
            },
            FuzzEvent::Error => SessionEvent::Received(Command::Error {
                doc_id: Some(doc_id()),
                kind: ErrorKind::Internal,
                reason: "fuzz".into(),
            }),
            FuzzEvent::WrongDocument => SessionEvent::Received(Command::Open {
                doc_id: DocId::from("other"),
                version,
            }),
        };

        if let Ok(actions) = session.handle(event) {
            let commits = actions
                .iter()
                .filter(|a| matches!(a, SessionAction::Send(Command::Commit { .. })))
                .count();
            assert!(commits <= 1, "more than one commit sent for one event");
            if commits == 1 && pending.is_none() {
                assert!(
                    matches!(
                        previous_state,
                        SessionState::Synced | SessionState::Committing | SessionState::Syncing
                    ),
                    "new commit from {previous_state:?}"
                );
            }
        }

        assert!(session.version() >= version, "version went backwards");
        if session.state() == SessionState::Committing {
            assert!(session.pending().is_some(), "committing without a commit in flight");
        }
    }
});
