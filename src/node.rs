//! Trie node model.
//!
//! The tree is a strict ownership hierarchy: every node is owned by exactly
//! one parent through a `BTreeMap` keyed by token, which also gives the
//! deterministic child order the iteration contract relies on. Leaves live
//! only at the maximum depth; every other node is internal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single token of an n-gram.
pub type Token = String;

/// Identifier of a document contributing occurrences.
pub type DocId = u64;

/// An internal trie node: occurrence count, cached branching entropy, and
/// children keyed by the next token.
///
/// The cached entropy is only meaningful while the owning tree is clean; it
/// is deliberately not serialized, so a loaded tree recomputes it on the
/// first statistical read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InternalNode {
    /// Sum of weighted occurrences of the prefix this node represents.
    pub count: u64,
    /// Cached branching entropy in bits; `None` until computed.
    #[serde(skip)]
    pub entropy: Option<f64>,
    /// Child nodes, one per continuation token.
    pub children: BTreeMap<Token, Node>,
}

/// A full-depth leaf: occurrence count plus per-document postings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeafNode {
    /// Sum of weighted occurrences; equals the sum of the postings.
    pub count: u64,
    /// Accumulated frequency per document.
    pub postings: BTreeMap<DocId, u64>,
}

/// Either an internal node or a full-depth leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// A node with children; carries a cached entropy.
    Internal(InternalNode),
    /// A terminal node; carries postings instead of children.
    Leaf(LeafNode),
}

impl Node {
    /// Occurrence count of this node, whichever variant it is.
    pub fn count(&self) -> u64 {
        match self {
            Node::Internal(n) => n.count,
            Node::Leaf(n) => n.count,
        }
    }

    /// Cached entropy. Leaves have no continuations and therefore no entropy.
    pub fn entropy(&self) -> Option<f64> {
        match self {
            Node::Internal(n) => n.entropy,
            Node::Leaf(_) => None,
        }
    }

    /// The postings map if this is a leaf.
    pub fn postings(&self) -> Option<&BTreeMap<DocId, u64>> {
        match self {
            Node::Internal(_) => None,
            Node::Leaf(n) => Some(&n.postings),
        }
    }
}
