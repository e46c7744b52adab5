//! The opponent-preference memoization tree (spec §4.3).
//!
//! A single arena-owned `petgraph::DiGraph`, rooted at the initial
//! action-path hash, with a side index from hash to `NodeIndex` for O(1)
//! lookup. Grounded in the teacher's `cfr::tree::Tree`
//! (`DiGraph<Node, Edge>` + a `HashMap` side index built by walking the
//! graph) and `cfr::info::Info` (parent/child navigation via stored
//! `NodeIndex`, no `Rc`/GC ownership required).

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction::{Incoming, Outgoing};

use crate::types::ActionPathHash;

#[derive(Debug, Clone, Copy)]
pub struct LikelihoodNode {
    pub hash: ActionPathHash,
    /// opponent-rollout aggregate; always >= 0.
    pub value: f64,
    /// fraction among siblings, in [0, 1].
    pub rel_likelihood: f64,
}

pub struct LikelihoodTree {
    graph: DiGraph<LikelihoodNode, ()>,
    index: HashMap<ActionPathHash, NodeIndex>,
    root: NodeIndex,
}

impl Default for LikelihoodTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LikelihoodTree {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(LikelihoodNode {
            hash: ActionPathHash::ROOT,
            value: 0.0,
            rel_likelihood: 1.0,
        });
        let mut index = HashMap::new();
        index.insert(ActionPathHash::ROOT, root);
        Self { graph, index, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn node(&self, hash: ActionPathHash) -> Option<NodeIndex> {
        self.index.get(&hash).copied()
    }

    pub fn node_data(&self, node: NodeIndex) -> &LikelihoodNode {
        &self.graph[node]
    }

    pub fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.graph.neighbors_directed(node, Incoming).next()
    }

    pub fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(node, Outgoing).collect()
    }

    pub fn is_expanded(&self, node: NodeIndex) -> bool {
        self.graph.neighbors_directed(node, Outgoing).next().is_some()
    }

    /// insert children under `parent` with the given raw opponent-rollout
    /// values, normalising siblings' `rel_likelihood`. A no-op if `parent`
    /// is already expanded (scenario "Likelihood expansion idempotence").
    pub fn expand(&mut self, parent: NodeIndex, children_values: Vec<(ActionPathHash, f64)>) {
        if self.is_expanded(parent) {
            log::debug!("node {:?} already expanded, skipping", self.graph[parent].hash);
            return;
        }
        log::debug!(
            "expanding node {:?} with {} children",
            self.graph[parent].hash,
            children_values.len()
        );
        let total: f64 = children_values.iter().map(|(_, v)| v.max(0.0)).sum();
        for (hash, value) in children_values {
            let value = value.max(0.0);
            let rel_likelihood = if total > 0.0 { value / total } else { 0.0 };
            let idx = self.graph.add_node(LikelihoodNode {
                hash,
                value,
                rel_likelihood,
            });
            self.graph.add_edge(parent, idx, ());
            self.index.insert(hash, idx);
        }
    }

    /// recompute a node's children's normalisation from their current
    /// values. Used after a child's value is zeroed by observed
    /// inconsistency (§4.3).
    pub fn update_rel_likelihood(&mut self, parent: NodeIndex) {
        let children = self.children(parent);
        let total: f64 = children.iter().map(|&c| self.graph[c].value).sum();
        for c in children {
            self.graph[c].rel_likelihood = if total > 0.0 {
                self.graph[c].value / total
            } else {
                0.0
            };
        }
    }

    /// mark `node` as proven inconsistent: zero its value and renormalise
    /// its siblings.
    pub fn zero_out(&mut self, node: NodeIndex) {
        log::debug!("zeroing out node {:?}", self.graph[node].hash);
        self.graph[node].value = 0.0;
        if let Some(parent) = self.parent(node) {
            self.update_rel_likelihood(parent);
        }
    }

    /// product of `rel_likelihood` along `hash_path`, short-circuiting to
    /// 0.0 the moment any step is 0 or unknown to the tree. `hash_path`'s
    /// first entry is expected to be the root hash.
    pub fn relative_likelihood(&self, hash_path: &[ActionPathHash]) -> f64 {
        let mut product = 1.0;
        for hash in hash_path.iter().skip(1) {
            let Some(&idx) = self.index.get(hash) else {
                return 0.0;
            };
            let rel = self.graph[idx].rel_likelihood;
            if rel == 0.0 {
                return 0.0;
            }
            product *= rel;
        }
        product
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_normalises_children() {
        let mut tree = LikelihoodTree::new();
        let root = tree.root();
        let h1 = ActionPathHash::ROOT.child(&crate::types::JointMove::<u8, u8>::new(vec![(0, 1)]));
        let h2 = ActionPathHash::ROOT.child(&crate::types::JointMove::<u8, u8>::new(vec![(0, 2)]));
        tree.expand(root, vec![(h1, 3.0), (h2, 1.0)]);
        let n1 = tree.node(h1).unwrap();
        let n2 = tree.node(h2).unwrap();
        assert!((tree.node_data(n1).rel_likelihood - 0.75).abs() < 1e-9);
        assert!((tree.node_data(n2).rel_likelihood - 0.25).abs() < 1e-9);
        let sum = tree.node_data(n1).rel_likelihood + tree.node_data(n2).rel_likelihood;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn expand_is_idempotent() {
        let mut tree = LikelihoodTree::new();
        let root = tree.root();
        let h1 = ActionPathHash::ROOT.child(&crate::types::JointMove::<u8, u8>::new(vec![(0, 1)]));
        tree.expand(root, vec![(h1, 5.0)]);
        let before = tree.node_data(tree.node(h1).unwrap()).rel_likelihood;
        tree.expand(root, vec![(h1, 999.0)]);
        let after = tree.node_data(tree.node(h1).unwrap()).rel_likelihood;
        assert_eq!(before, after);
        assert_eq!(tree.children(root).len(), 1);
    }

    #[test]
    fn zero_value_children_all_zero_relative_likelihood() {
        let mut tree = LikelihoodTree::new();
        let root = tree.root();
        let h1 = ActionPathHash::ROOT.child(&crate::types::JointMove::<u8, u8>::new(vec![(0, 1)]));
        let h2 = ActionPathHash::ROOT.child(&crate::types::JointMove::<u8, u8>::new(vec![(0, 2)]));
        tree.expand(root, vec![(h1, 0.0), (h2, 0.0)]);
        let n1 = tree.node(h1).unwrap();
        let n2 = tree.node(h2).unwrap();
        assert_eq!(tree.node_data(n1).rel_likelihood, 0.0);
        assert_eq!(tree.node_data(n2).rel_likelihood, 0.0);
    }

    #[test]
    fn zero_out_renormalises_surviving_sibling_to_one() {
        let mut tree = LikelihoodTree::new();
        let root = tree.root();
        let h1 = ActionPathHash::ROOT.child(&crate::types::JointMove::<u8, u8>::new(vec![(0, 1)]));
        let h2 = ActionPathHash::ROOT.child(&crate::types::JointMove::<u8, u8>::new(vec![(0, 2)]));
        tree.expand(root, vec![(h1, 2.0), (h2, 2.0)]);
        tree.zero_out(tree.node(h1).unwrap());
        let n2 = tree.node(h2).unwrap();
        assert_eq!(tree.node_data(n2).rel_likelihood, 1.0);
    }

    #[test]
    fn relative_likelihood_is_product_along_path() {
        let mut tree = LikelihoodTree::new();
        let root = tree.root();
        let j1 = crate::types::JointMove::<u8, u8>::new(vec![(0, 1)]);
        let h1 = ActionPathHash::ROOT.child(&j1);
        tree.expand(root, vec![(h1, 3.0), (ActionPathHash::ROOT.child(&crate::types::JointMove::<u8,u8>::new(vec![(0,2)])), 1.0)]);
        let n1 = tree.node(h1).unwrap();
        let j2 = crate::types::JointMove::<u8, u8>::new(vec![(0, 9)]);
        let h2 = h1.child(&j2);
        tree.expand(n1, vec![(h2, 5.0)]);
        let path = vec![ActionPathHash::ROOT, h1, h2];
        assert!((tree.relative_likelihood(&path) - 0.75).abs() < 1e-9);
    }
}
