//! Hub wired to the simulated server.
//!
//! Translates [`HubAction`]s into per-peer [`Outbound`] replies, expanding
//! broadcasts over the document's current subscribers.

use tandem_core::Environment;
use tandem_hub::{Hub, HubAction, Storage};
use tandem_proto::{Command, PeerId};
use tracing::debug;

use crate::server::{Outbound, ServerHandler};

/// [`ServerHandler`] backed by a [`Hub`].
pub struct HubRouter<E: Environment, S: Storage> {
    hub: Hub<E, S>,
}

impl<E: Environment, S: Storage> HubRouter<E, S> {
    /// Route traffic to `hub`.
    pub fn new(hub: Hub<E, S>) -> Self {
        Self { hub }
    }

    /// Routed hub.
    pub fn hub(&self) -> &Hub<E, S> {
        &self.hub
    }

    fn route(&self, actions: Vec<HubAction>) -> Vec<Outbound> {
        let mut outbound = Vec::with_capacity(actions.len());

        for action in actions {
            match action {
                HubAction::SendTo { peer, command } => {
                    outbound.push(Outbound { to: peer, command });
                },
                HubAction::Broadcast { doc_id, command, exclude } => {
                    for peer in self.hub.subscribers(&doc_id) {
                        if exclude.as_ref() != Some(peer) {
                            outbound.push(Outbound { to: peer.clone(), command: command.clone() });
                        }
                    }
                },
            }
        }

        outbound
    }
}

impl<E: Environment, S: Storage> ServerHandler for HubRouter<E, S> {
    fn on_connect(&mut self, peer: &PeerId) {
        debug!(%peer, "peer connected to hub");
    }

    fn on_command(&mut self, peer: &PeerId, command: Command) -> Vec<Outbound> {
        let actions = self.hub.handle(peer, command);
        self.route(actions)
    }

    fn on_disconnect(&mut self, peer: &PeerId) {
        self.hub.disconnect(peer);
    }
}

impl<E: Environment, S: Storage> std::fmt::Debug for HubRouter<E, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubRouter").field("hub", &self.hub).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tandem_core::fixtures;
    use tandem_hub::{HubConfig, MemoryStorage};
    use tandem_proto::{CommitId, DocId, Op};

    use super::*;
    use crate::sim_env::SimEnv;

    fn router() -> HubRouter<SimEnv, MemoryStorage> {
        let env = SimEnv::with_seed(0);
        let mut hub = Hub::new(env, MemoryStorage::new(), HubConfig::default());
        hub.create_document(DocId::from("test"), fixtures::two_paragraphs()).unwrap();
        HubRouter::new(hub)
    }

    fn open(router: &mut HubRouter<SimEnv, MemoryStorage>, peer: &str) {
        let open = Command::Open { doc_id: DocId::from("test"), version: 0 };
        let replies = router.on_command(&PeerId::from(peer), open);
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn broadcast_expands_to_other_subscribers() {
        let mut router = router();
        for peer in ["user1", "user2", "user3"] {
            open(&mut router, peer);
        }

        let replies = router.on_command(&PeerId::from("user1"), Command::Commit {
            doc_id: DocId::from("test"),
            base_version: 0,
            commit_id: CommitId(1),
            ops: vec![Op::Append { node: "p1".into(), text: "!".into() }],
        });

        let recipients: Vec<&str> = replies.iter().map(|reply| reply.to.as_str()).collect();
        assert_eq!(recipients, vec!["user1", "user2", "user3"]);
        assert!(matches!(replies[0].command, Command::Ack { .. }));
        assert!(matches!(replies[1].command, Command::Update { .. }));
    }

    #[test]
    fn disconnect_stops_broadcasts() {
        let mut router = router();
        open(&mut router, "user1");
        open(&mut router, "user2");
        router.on_disconnect(&PeerId::from("user2"));

        let replies = router.on_command(&PeerId::from("user1"), Command::Commit {
            doc_id: DocId::from("test"),
            base_version: 0,
            commit_id: CommitId(1),
            ops: vec![],
        });

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].to, PeerId::from("user1"));
    }
}
