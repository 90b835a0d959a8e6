//! Seeded random edits for simulation runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tandem_core::ParagraphDocument;
use tandem_proto::{Op, PeerId};

/// Deterministic source of edits and scheduling choices.
#[derive(Debug, Clone)]
pub struct Workload {
    rng: ChaCha8Rng,
    counter: u64,
}

impl Workload {
    /// Create a workload from a seed.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed), counter: 0 }
    }

    /// `true` with probability `p`, clamped to `[0, 1]`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Uniform index in `0..n`. Returns 0 when `n` is 0.
    pub fn pick(&mut self, n: usize) -> usize {
        if n == 0 { 0 } else { self.rng.gen_range(0..n) }
    }

    /// Random edit by `author` against its current replica.
    ///
    /// Mostly appends, sometimes replaces, inserts or removes a paragraph.
    /// Every generated text is unique, so lost or duplicated edits show up
    /// in the converged document.
    pub fn next_edit(&mut self, author: &PeerId, document: &ParagraphDocument) -> Op {
        self.counter += 1;
        let tag = format!("{author}#{}", self.counter);

        let nodes: Vec<&str> = document.paragraphs().map(|(node, _)| node).collect();
        if nodes.is_empty() {
            return Op::Insert { node: format!("n-{tag}"), text: tag };
        }

        let node = nodes[self.pick(nodes.len())].to_string();
        match self.rng.gen_range(0..10) {
            0..=5 => Op::Append { node, text: format!(" {tag}") },
            6 => Op::Set { node, text: tag },
            7 | 8 => Op::Insert { node: format!("n-{tag}"), text: tag },
            _ if nodes.len() > 1 => Op::Remove { node },
            _ => Op::Append { node, text: format!(" {tag}") },
        }
    }
}
