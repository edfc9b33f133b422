/// Decoder tree of the fixed-point successive cancellation decoder
///
/// The tree is an arena of nodes addressed by index. Each node owns a slice
/// of the per-decode alpha (LLR) and beta (partial sum) buffers given by its
/// offsets. The schedule of node operations is recorded on the first decode
/// and replayed by every later one.

use std::sync::OnceLock;

use tracing::trace;

use super::kernels;

/// One node of the decoder tree
#[derive(Debug, Clone)]
pub struct DecoderNode {
    /// log2 of the number of leaves below this node
    pub level: usize,
    /// Bit-channel index of the leftmost leaf
    pub first_leaf_index: usize,
    /// Bit channel or all-frozen subtree
    pub leaf: bool,
    /// Every leaf below carries a frozen bit
    pub all_frozen: bool,
    /// Offset of the 2^level LLRs of this node in the alpha buffer
    pub alpha_offset: usize,
    /// Offset of the 2^level partial sums of this node in the beta buffer
    pub beta_offset: usize,
    pub left: Option<usize>,
    pub right: Option<usize>,
}

/// Node operation of the linearized schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    /// LLRs of the left child
    F(usize),
    /// LLRs of the right child
    G(usize),
    /// Partial sums of the node from both children
    Beta(usize),
}

/// Per-decode working memory
#[derive(Debug, Clone)]
pub struct TreeScratch {
    pub alpha: Vec<i16>,
    pub beta: Vec<i8>,
    /// Hard decisions u_0..u_{N-1}
    pub hard_decisions: Vec<u8>,
}

#[derive(Debug)]
pub struct DecoderTree {
    nodes: Vec<DecoderNode>,
    root: usize,
    alpha_len: usize,
    beta_len: usize,
    n: usize,
    schedule: OnceLock<Vec<TreeOp>>,
}

impl DecoderTree {
    /// Build the tree for a code whose non-frozen bit channels are flagged
    /// in `non_frozen` (information and parity-check positions).
    pub fn build(non_frozen: &[bool]) -> Self {
        let n = non_frozen.len();
        assert!(n.is_power_of_two(), "decoder tree over {} bit channels", n);

        let mut tree = Self {
            nodes: Vec::with_capacity(2 * n),
            root: 0,
            alpha_len: 0,
            beta_len: 0,
            n,
            schedule: OnceLock::new(),
        };
        tree.root = tree.add_node(non_frozen, n.trailing_zeros() as usize, 0);

        trace!(
            "Decoder tree: {} nodes, alpha {} beta {}",
            tree.nodes.len(),
            tree.alpha_len,
            tree.beta_len
        );

        tree
    }

    fn add_node(&mut self, non_frozen: &[bool], level: usize, first: usize) -> usize {
        let size = 1 << level;
        let index = self.nodes.len();
        let all_frozen = !non_frozen[first..first + size].iter().any(|&b| b);

        self.nodes.push(DecoderNode {
            level,
            first_leaf_index: first,
            leaf: level == 0 || all_frozen,
            all_frozen,
            alpha_offset: self.alpha_len,
            beta_offset: self.beta_len,
            left: None,
            right: None,
        });
        self.alpha_len += size;
        self.beta_len += size;

        if !self.nodes[index].leaf {
            let left = self.add_node(non_frozen, level - 1, first);
            let right = self.add_node(non_frozen, level - 1, first + size / 2);
            self.nodes[index].left = Some(left);
            self.nodes[index].right = Some(right);
        }

        index
    }

    pub fn nodes(&self) -> &[DecoderNode] {
        &self.nodes
    }

    pub fn is_linearized(&self) -> bool {
        self.schedule.get().is_some()
    }

    /// Recorded schedule, if a decode has run
    pub fn schedule(&self) -> Option<&[TreeOp]> {
        self.schedule.get().map(Vec::as_slice)
    }

    pub fn scratch(&self) -> TreeScratch {
        TreeScratch {
            alpha: vec![0; self.alpha_len],
            beta: vec![-1; self.beta_len],
            hard_decisions: vec![0; self.n],
        }
    }

    /// Run successive cancellation on the mother-code LLRs and return u.
    pub fn decode(&self, llrs: &[i16]) -> Vec<u8> {
        assert_eq!(llrs.len(), self.n, "decoder tree fed {} LLRs", llrs.len());

        let mut scratch = self.scratch();
        let root = &self.nodes[self.root];
        scratch.alpha[root.alpha_offset..root.alpha_offset + self.n].copy_from_slice(llrs);

        if !root.leaf {
            let schedule = self.schedule.get_or_init(|| {
                let mut ops = Vec::with_capacity(3 * self.nodes.len() / 2);
                self.record(self.root, &mut ops);
                trace!("Linearized decoder tree into {} operations", ops.len());
                ops
            });

            for &op in schedule {
                match op {
                    TreeOp::F(node) => self.apply_f(node, &mut scratch),
                    TreeOp::G(node) => self.apply_g(node, &mut scratch),
                    TreeOp::Beta(node) => self.compute_beta(node, &mut scratch),
                }
            }
        }

        scratch.hard_decisions
    }

    fn record(&self, index: usize, ops: &mut Vec<TreeOp>) {
        let node = &self.nodes[index];
        let (Some(left), Some(right)) = (node.left, node.right) else {
            return;
        };

        ops.push(TreeOp::F(index));
        if !self.nodes[left].leaf {
            self.record(left, ops);
        }
        ops.push(TreeOp::G(index));
        if !self.nodes[right].leaf {
            self.record(right, ops);
        }
        ops.push(TreeOp::Beta(index));
    }

    fn children(&self, index: usize) -> (&DecoderNode, &DecoderNode, &DecoderNode) {
        let node = &self.nodes[index];
        match (node.left, node.right) {
            (Some(left), Some(right)) => (node, &self.nodes[left], &self.nodes[right]),
            _ => panic!("operation scheduled on leaf node {}", index),
        }
    }

    fn apply_f(&self, index: usize, scratch: &mut TreeScratch) {
        let (node, left, _) = self.children(index);
        if left.all_frozen {
            return;
        }
        let half = 1 << (node.level - 1);

        let (head, tail) = scratch.alpha.split_at_mut(left.alpha_offset);
        let parent = &head[node.alpha_offset..node.alpha_offset + 2 * half];
        kernels::f_chunked(&mut tail[..half], &parent[..half], &parent[half..]);

        if half == 1 {
            let bit = kernels::hard_decision(tail[0]);
            scratch.beta[left.beta_offset] = 2 * bit as i8 - 1;
            scratch.hard_decisions[node.first_leaf_index] = bit;
        }
    }

    fn apply_g(&self, index: usize, scratch: &mut TreeScratch) {
        let (node, left, right) = self.children(index);
        if right.all_frozen {
            return;
        }
        let half = 1 << (node.level - 1);

        let (head, tail) = scratch.alpha.split_at_mut(right.alpha_offset);
        let parent = &head[node.alpha_offset..node.alpha_offset + 2 * half];
        let out = &mut tail[..half];
        if left.all_frozen {
            kernels::g_frozen_chunked(out, &parent[..half], &parent[half..]);
        } else {
            let beta = &scratch.beta[left.beta_offset..left.beta_offset + half];
            kernels::g_chunked(out, &parent[..half], &parent[half..], beta);
        }

        if half == 1 {
            let bit = kernels::hard_decision(tail[0]);
            scratch.beta[right.beta_offset] = 2 * bit as i8 - 1;
            scratch.hard_decisions[node.first_leaf_index + 1] = bit;
        }
    }

    fn compute_beta(&self, index: usize, scratch: &mut TreeScratch) {
        let (node, left, right) = self.children(index);
        let half = 1 << (node.level - 1);

        let (head, tail) = scratch.beta.split_at_mut(left.beta_offset);
        let right_start = right.beta_offset - left.beta_offset;
        kernels::beta_chunked(
            &mut head[node.beta_offset..node.beta_offset + 2 * half],
            &tail[..half],
            &tail[right_start..right_start + half],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(n: usize, info: &[usize]) -> Vec<bool> {
        let mut flags = vec![false; n];
        for &i in info {
            flags[i] = true;
        }
        flags
    }

    #[test]
    fn test_build_prunes_frozen_subtrees() {
        let tree = DecoderTree::build(&pattern(8, &[7]));
        let root = &tree.nodes()[0];
        assert_eq!(root.level, 3);
        assert!(!root.leaf);

        // Left half [0, 4) collapses into one frozen leaf
        let left = &tree.nodes()[root.left.unwrap()];
        assert!(left.leaf && left.all_frozen);
        assert_eq!(left.level, 2);

        // Children are stored after their parent in both buffers
        for node in tree.nodes() {
            if let Some(l) = node.left {
                assert!(tree.nodes()[l].alpha_offset >= node.alpha_offset + (1 << node.level));
            }
        }
    }

    #[test]
    fn test_schedule_recorded_once() {
        let tree = DecoderTree::build(&pattern(8, &[3, 5, 6, 7]));
        assert!(!tree.is_linearized());

        tree.decode(&[10; 8]);
        assert!(tree.is_linearized());
        let first = tree.schedule().unwrap().to_vec();
        assert_eq!(first[0], TreeOp::F(0));
        assert_eq!(*first.last().unwrap(), TreeOp::Beta(0));

        tree.decode(&[-10; 8]);
        assert_eq!(tree.schedule().unwrap(), &first[..]);
    }

    #[test]
    fn test_decode_single_information_bit() {
        // u_7 is the only information bit: every codeword bit equals it
        let tree = DecoderTree::build(&pattern(8, &[7]));
        assert_eq!(tree.decode(&[100; 8]), vec![0; 8]);

        let u = tree.decode(&[-100; 8]);
        assert_eq!(u[7], 1);
        assert!(u[..7].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_recovers_codeword() {
        let info = [3, 5, 6, 7];
        let tree = DecoderTree::build(&pattern(8, &info));

        // u = [0,0,0,1,0,1,1,0] through the butterfly x = u F^{⊗3}
        let mut x = [0u8, 0, 0, 1, 0, 1, 1, 0];
        let mut s = 1;
        while s < 8 {
            for j in (0..8).step_by(2 * s) {
                for i in 0..s {
                    x[j + i] ^= x[j + i + s];
                }
            }
            s *= 2;
        }
        let llrs: Vec<i16> = x.iter().map(|&b| if b == 0 { 64 } else { -64 }).collect();

        assert_eq!(tree.decode(&llrs), vec![0, 0, 0, 1, 0, 1, 1, 0]);
    }
}
