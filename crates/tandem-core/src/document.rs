//! Document replica model.
//!
//! The synchronization protocol never interprets operations; it only needs a
//! replica that applies them deterministically. Two replicas that apply the
//! same operations in the same order are equal.

use std::fmt::Debug;

use tandem_proto::{NodeId, Op};

/// Replica a session keeps in sync with the hub.
pub trait Document: Clone + Debug + PartialEq {
    /// Apply one operation.
    ///
    /// Must be total: operations that do not fit the current content (e.g.
    /// appending to a removed node) are ignored rather than rejected, because
    /// the hub has already fixed their order.
    fn apply(&mut self, op: &Op);

    /// Apply a sequence of operations in order.
    fn apply_all(&mut self, ops: &[Op]) {
        for op in ops {
            self.apply(op);
        }
    }
}

/// Ordered list of paragraphs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphDocument {
    paragraphs: Vec<(NodeId, String)>,
}

impl ParagraphDocument {
    /// Empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Document produced by applying `ops` to an empty document.
    pub fn from_ops(ops: &[Op]) -> Self {
        let mut doc = Self::new();
        doc.apply_all(ops);
        doc
    }

    /// Text of a paragraph.
    pub fn text(&self, node: &str) -> Option<&str> {
        self.position(node).map(|i| self.paragraphs[i].1.as_str())
    }

    /// Paragraphs in document order.
    pub fn paragraphs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.paragraphs.iter().map(|(id, text)| (id.as_str(), text.as_str()))
    }

    /// Number of paragraphs.
    pub fn len(&self) -> usize {
        self.paragraphs.len()
    }

    /// Whether the document has no paragraphs.
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    fn position(&self, node: &str) -> Option<usize> {
        self.paragraphs.iter().position(|(id, _)| id == node)
    }
}

impl Document for ParagraphDocument {
    fn apply(&mut self, op: &Op) {
        match op {
            Op::Insert { node, text } => match self.position(node) {
                Some(i) => self.paragraphs[i].1.clone_from(text),
                None => self.paragraphs.push((node.clone(), text.clone())),
            },
            Op::Set { node, text } => {
                if let Some(i) = self.position(node) {
                    self.paragraphs[i].1.clone_from(text);
                }
            },
            Op::Append { node, text } => {
                if let Some(i) = self.position(node) {
                    self.paragraphs[i].1.push_str(text);
                }
            },
            Op::Remove { node } => {
                if let Some(i) = self.position(node) {
                    self.paragraphs.remove(i);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn append(node: &str, text: &str) -> Op {
        Op::Append { node: node.to_string(), text: text.to_string() }
    }

    #[test]
    fn insert_then_append() {
        let mut doc = ParagraphDocument::new();
        doc.apply(&Op::Insert { node: "p1".to_string(), text: "Hello".to_string() });
        doc.apply(&append("p1", ", world"));

        assert_eq!(doc.text("p1"), Some("Hello, world"));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn insert_existing_node_replaces_in_place() {
        let mut doc = ParagraphDocument::from_ops(&[
            Op::Insert { node: "p1".to_string(), text: "a".to_string() },
            Op::Insert { node: "p2".to_string(), text: "b".to_string() },
        ]);
        doc.apply(&Op::Insert { node: "p1".to_string(), text: "c".to_string() });

        let order: Vec<_> = doc.paragraphs().collect();
        assert_eq!(order, vec![("p1", "c"), ("p2", "b")]);
    }

    #[test]
    fn operations_on_missing_nodes_are_ignored() {
        let mut doc = ParagraphDocument::new();
        doc.apply(&append("ghost", "boo"));
        doc.apply(&Op::Set { node: "ghost".to_string(), text: "x".to_string() });
        doc.apply(&Op::Remove { node: "ghost".to_string() });

        assert!(doc.is_empty());
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        let node = prop_oneof![Just("p1".to_string()), Just("p2".to_string())];
        (node, "[a-c]{0,3}", 0u8..4).prop_map(|(node, text, kind)| match kind {
            0 => Op::Insert { node, text },
            1 => Op::Set { node, text },
            2 => Op::Append { node, text },
            _ => Op::Remove { node },
        })
    }

    proptest! {
        #[test]
        fn same_ops_same_order_same_document(ops in proptest::collection::vec(arb_op(), 0..32)) {
            let mut left = ParagraphDocument::new();
            let mut right = ParagraphDocument::new();
            left.apply_all(&ops);
            for op in &ops {
                right.apply(op);
            }
            prop_assert_eq!(left, right);
        }
    }
}
