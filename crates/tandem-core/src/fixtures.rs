//! Seed content for two-party scenarios.

use tandem_proto::Op;

/// Two paragraphs, `p1` and `p2`.
pub fn two_paragraphs() -> Vec<Op> {
    vec![
        Op::Insert { node: "p1".to_string(), text: "Hello World!".to_string() },
        Op::Insert { node: "p2".to_string(), text: "Goodbye World!".to_string() },
    ]
}

/// A short poem, one paragraph per line.
pub fn poem() -> Vec<Op> {
    [
        "Roses are red,",
        "violets are blue,",
        "two sessions edit,",
        "one hub keeps them true.",
    ]
    .iter()
    .enumerate()
    .map(|(i, line)| Op::Insert { node: format!("p{}", i + 1), text: (*line).to_string() })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Document, ParagraphDocument};

    #[test]
    fn two_paragraphs_seed() {
        let doc = ParagraphDocument::from_ops(&two_paragraphs());
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.text("p1"), Some("Hello World!"));
    }

    #[test]
    fn poem_has_one_paragraph_per_line() {
        let mut doc = ParagraphDocument::new();
        doc.apply_all(&poem());
        assert_eq!(doc.len(), 4);
        assert_eq!(doc.text("p4"), Some("one hub keeps them true."));
    }
}
