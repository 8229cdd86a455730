//! In-memory n-gram trie storage engine.
//!
//! The engine owns a strict tree of counted nodes, a per-depth normalization
//! table for entropy variation, and a dirty flag. Mutations update counts
//! eagerly and mark the tree dirty; derived statistics (entropy, entropy
//! variation, autonomy) are recomputed lazily in one full-tree pass the next
//! time they are read. The recompute is O(nodes) and amortizes across many
//! reads, which is the intended trade-off for bulk ingestion workloads.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::node::{DocId, InternalNode, LeafNode, Node, Token};
use crate::storage::{
    ColdStorage, Diagnostic, DiagnosticHook, NodeQuery, Result, Storage, StorageError,
};
use crate::stats::{branch_entropy, mean_stdev};

/// In-memory trie storage for n-grams up to a fixed depth.
///
/// Implements the full [`Storage`] query contract and, via [`ColdStorage`],
/// can also serve as the durable tier of a
/// [`TieredStorage`](crate::tiered::TieredStorage) in single-process
/// pipelines and tests.
pub struct MemoryStorage {
    depth: usize,
    root: InternalNode,
    /// One `(mean, stdev)` of entropy variation per depth, indexed by
    /// ngram length minus one.
    normalization: Vec<(f64, f64)>,
    dirty: bool,
    /// Tokens expanded into unit-weight singleton events by the entropy
    /// pass (phrase boundaries, stop words). Classification is the
    /// caller's business; the default set is empty.
    terminals: BTreeSet<Token>,
    hook: Option<DiagnosticHook>,
}

/// Serialized layout: depth bound, node tree, normalization table, in that
/// order. Cached entropies are skipped by the node model, so no schema
/// version is needed beyond the layout itself; layout changes are breaking.
#[derive(Serialize)]
struct SaveStateRef<'a> {
    depth: usize,
    root: &'a InternalNode,
    normalization: &'a Vec<(f64, f64)>,
}

#[derive(Deserialize)]
struct SaveState {
    depth: usize,
    root: InternalNode,
    normalization: Vec<(f64, f64)>,
}

impl MemoryStorage {
    /// Create an empty storage holding ngrams of length `1..=depth`.
    pub fn new(depth: usize) -> Self {
        Self::with_terminals(depth, BTreeSet::new())
    }

    /// Create an empty storage with a set of terminal tokens.
    ///
    /// Terminal children are expanded into unit-weight events when entropy
    /// is computed, so a phrase boundary seen `c` times counts as `c`
    /// distinct continuations instead of one branch of mass `c`.
    pub fn with_terminals(depth: usize, terminals: BTreeSet<Token>) -> Self {
        Self {
            depth,
            root: InternalNode::default(),
            normalization: vec![(0.0, 0.0); depth],
            dirty: false,
            terminals,
            hook: None,
        }
    }

    /// Maximum ngram length accepted by this storage.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The per-depth `(mean, stdev)` normalization table.
    pub fn normalization(&self) -> &[(f64, f64)] {
        &self.normalization
    }

    /// Replace the terminal-token set. Marks the statistics stale.
    pub fn set_terminals(&mut self, terminals: BTreeSet<Token>) {
        self.terminals = terminals;
        self.dirty = true;
    }

    /// Install a hook receiving [`Diagnostic`] events, replacing any
    /// previous one. Without a hook the events go to `tracing`.
    pub fn set_diagnostic_hook(&mut self, hook: impl FnMut(Diagnostic) + Send + 'static) {
        self.hook = Some(Box::new(hook));
    }

    /// Replace the tree with an empty root. Idempotent; the normalization
    /// table is kept until the next statistics pass overwrites it.
    pub fn clear(&mut self) {
        self.root = InternalNode::default();
        self.dirty = true;
    }

    /// Total number of nodes in the tree, root included.
    pub fn node_count(&self) -> usize {
        fn count(node: &InternalNode) -> usize {
            1 + node
                .children
                .values()
                .map(|c| match c {
                    Node::Internal(inner) => count(inner),
                    Node::Leaf(_) => 1,
                })
                .sum::<usize>()
        }
        count(&self.root)
    }

    /// Add `freq` weighted occurrences of `ngram` for document `docid`.
    ///
    /// Every node along the path absorbs `freq`; a full-depth ngram ends in
    /// a leaf whose postings entry for `docid` absorbs it as well. Negative
    /// `freq` retracts occurrences; counts saturate at zero rather than
    /// wrapping, but driving them there leaves the statistics meaningless.
    pub fn add_ngram(&mut self, ngram: &[Token], docid: DocId, freq: i64) -> Result<()> {
        if ngram.is_empty() || ngram.len() > self.depth {
            return Err(StorageError::NgramLength {
                len: ngram.len(),
                depth: self.depth,
            });
        }
        self.dirty = true;
        self.root.count = self.root.count.saturating_add_signed(freq);

        let full = ngram.len() == self.depth;
        let mut node = &mut self.root;
        for (i, token) in ngram.iter().enumerate() {
            if full && i + 1 == ngram.len() {
                let child = node
                    .children
                    .entry(token.clone())
                    .or_insert_with(|| Node::Leaf(LeafNode::default()));
                match child {
                    Node::Leaf(leaf) => {
                        leaf.count = leaf.count.saturating_add_signed(freq);
                        let posting = leaf.postings.entry(docid).or_insert(0);
                        *posting = posting.saturating_add_signed(freq);
                    }
                    Node::Internal(_) => unreachable!("leaf position held by internal node"),
                }
            } else {
                let child = node
                    .children
                    .entry(token.clone())
                    .or_insert_with(|| Node::Internal(InternalNode::default()));
                match child {
                    Node::Internal(inner) => {
                        inner.count = inner.count.saturating_add_signed(freq);
                        node = inner;
                    }
                    Node::Leaf(_) => unreachable!("internal position held by leaf"),
                }
            }
        }
        Ok(())
    }

    /// Walk `ngram` from the root. Returns the reached node and the entropy
    /// of its parent, or `None` if any prefix token is missing.
    fn lookup(&self, ngram: &[Token]) -> Option<(Option<f64>, &Node)> {
        debug_assert!(!ngram.is_empty());
        let mut parent = &self.root;
        for token in &ngram[..ngram.len() - 1] {
            match parent.children.get(token)? {
                Node::Internal(inner) => parent = inner,
                // Can only happen for ngrams longer than the depth bound.
                Node::Leaf(_) => return None,
            }
        }
        let node = parent.children.get(&ngram[ngram.len() - 1])?;
        Some((parent.entropy, node))
    }

    /// Lazy iterator over every node in the tree, root included, as
    /// `(prefix, node data)` in depth-first order with children visited in
    /// token order. Restartable: each call starts a fresh traversal.
    pub fn iter_nodes(&self) -> NodeIter<'_> {
        NodeIter::new(&self.root, false)
    }

    /// As [`iter_nodes`](Self::iter_nodes), restricted to full-depth leaves.
    pub fn iter_leaves(&self) -> NodeIter<'_> {
        NodeIter::new(&self.root, true)
    }

    /// Recompute entropies and the normalization table if the tree is dirty.
    ///
    /// A full bottom-up pass: every internal node's entropy is rebuilt from
    /// its children's counts (terminal children expanded to unit events),
    /// then for each depth the entropy variations of the nodes at that depth
    /// are folded into `(mean, stdev)`. Depths with no defined variation
    /// keep their previous normalization entry. Idempotent; a second call
    /// without an intervening mutation does nothing.
    pub fn update_stats(&mut self) {
        if !self.dirty {
            return;
        }
        Self::update_entropy(&mut self.root, &self.terminals);
        for d in 1..=self.depth {
            let mut samples = Vec::new();
            Self::ev_samples(&self.root, d, &mut samples);
            // No samples at this depth: keep the previous entry.
            if let Some(stats) = mean_stdev(samples) {
                self.normalization[d - 1] = stats;
            }
        }
        self.dirty = false;
    }

    fn update_entropy(node: &mut InternalNode, terminals: &BTreeSet<Token>) {
        node.entropy = Some(branch_entropy(
            node.children
                .iter()
                .map(|(token, child)| (child.count() as f64, terminals.contains(token))),
        ));
        for child in node.children.values_mut() {
            if let Node::Internal(inner) = child {
                Self::update_entropy(inner, terminals);
            }
        }
    }

    /// Collect `entropy(node) - entropy(parent)` for every node `levels`
    /// steps below `node`. The variation is defined only when the child has
    /// an entropy and the two are not both zero.
    fn ev_samples(node: &InternalNode, levels: usize, out: &mut Vec<f64>) {
        let parent_entropy = node.entropy.unwrap_or(0.0);
        for child in node.children.values() {
            if levels == 1 {
                if let Some(e) = child.entropy() {
                    if e != 0.0 || parent_entropy != 0.0 {
                        out.push(e - parent_entropy);
                    }
                }
            } else if let Node::Internal(inner) = child {
                Self::ev_samples(inner, levels - 1, out);
            }
        }
    }

    /// Refresh statistics before a read, reporting the implicit work since
    /// it is a full-tree pass and can be costly right after bulk writes.
    fn check_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        let nodes = self.node_count();
        match self.hook.as_mut() {
            Some(hook) => hook(Diagnostic::ImplicitRefresh { nodes }),
            None => tracing::warn!(
                nodes,
                "statistics queried while stale; running a full-tree refresh"
            ),
        }
        self.update_stats();
    }

    /// Count and cached entropy of the node reached by `ngram`; the empty
    /// ngram addresses the root. Missing prefixes yield an absent result.
    pub fn query_node(&mut self, ngram: &[Token]) -> NodeQuery {
        self.check_dirty();
        if ngram.is_empty() {
            return NodeQuery {
                count: self.root.count,
                entropy: self.root.entropy,
            };
        }
        match self.lookup(ngram) {
            Some((_, node)) => NodeQuery {
                count: node.count(),
                entropy: node.entropy(),
            },
            None => NodeQuery::default(),
        }
    }

    /// Entropy variation of `ngram` relative to its parent prefix.
    ///
    /// Uniformly `None` when the ngram is empty, when the node (or any
    /// prefix) is missing, and when the variation is undefined — leaves
    /// carry no entropy, and a zero-to-zero transition is not a variation.
    pub fn query_ev(&mut self, ngram: &[Token]) -> Option<f64> {
        if ngram.is_empty() {
            return None;
        }
        self.check_dirty();
        let (parent_entropy, node) = self.lookup(ngram)?;
        let e = node.entropy()?;
        let p = parent_entropy.unwrap_or(0.0);
        if e == 0.0 && p == 0.0 {
            return None;
        }
        Some(e - p)
    }

    /// Depth-normalized entropy variation (autonomy) of `ngram`.
    ///
    /// Subtracts the per-depth mean; with `z_score` also divides by the
    /// per-depth standard deviation. A zero standard deviation makes the
    /// z-score undefined and yields `None` rather than a division fault.
    pub fn query_autonomy(&mut self, ngram: &[Token], z_score: bool) -> Result<Option<f64>> {
        if ngram.is_empty() {
            return Err(StorageError::EmptyNgram);
        }
        self.check_dirty();
        let ev = match self.query_ev(ngram) {
            Some(ev) => ev,
            None => return Ok(None),
        };
        let (mean, stdev) = self.normalization[ngram.len() - 1];
        let nev = ev - mean;
        if !z_score {
            return Ok(Some(nev));
        }
        if stdev == 0.0 {
            return Ok(None);
        }
        Ok(Some(nev / stdev))
    }

    /// Postings of the full-depth leaf reached by `ngram`.
    ///
    /// Empty for shorter prefixes and missing leaves. Postings are raw count
    /// data, so no freshness pass is needed.
    pub fn query_postings(&self, ngram: &[Token]) -> BTreeMap<DocId, u64> {
        if ngram.is_empty() || ngram.len() != self.depth {
            return BTreeMap::new();
        }
        match self.lookup(ngram) {
            Some((_, Node::Leaf(leaf))) => leaf.postings.clone(),
            _ => BTreeMap::new(),
        }
    }

    /// Additively fold another storage's counts and postings into this one,
    /// token by token. Marks the statistics stale.
    pub fn merge(&mut self, other: &MemoryStorage) {
        debug_assert_eq!(self.depth, other.depth, "merging storages of unequal depth");
        self.dirty = true;
        self.root.count = self.root.count.saturating_add(other.root.count);
        Self::merge_children(&mut self.root, &other.root);
    }

    fn merge_children(dst: &mut InternalNode, src: &InternalNode) {
        for (token, src_child) in &src.children {
            match dst.children.entry(token.clone()) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(src_child.clone());
                }
                btree_map::Entry::Occupied(mut slot) => match (slot.get_mut(), src_child) {
                    (Node::Internal(d), Node::Internal(s)) => {
                        d.count = d.count.saturating_add(s.count);
                        Self::merge_children(d, s);
                    }
                    (Node::Leaf(d), Node::Leaf(s)) => {
                        d.count = d.count.saturating_add(s.count);
                        for (doc, freq) in &s.postings {
                            let posting = d.postings.entry(*doc).or_insert(0);
                            *posting = posting.saturating_add(*freq);
                        }
                    }
                    _ => unreachable!("node kind mismatch between equal-depth tries"),
                },
            }
        }
    }

    /// Serialize `(depth, tree, normalization)` as one gzip-compressed
    /// bincode stream, forcing a statistics pass first so the persisted
    /// normalization table is current.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.update_stats();
        let file = File::create(path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        bincode::serialize_into(
            &mut encoder,
            &SaveStateRef {
                depth: self.depth,
                root: &self.root,
                normalization: &self.normalization,
            },
        )?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        Ok(())
    }

    /// Reconstruct a storage from a [`save`](Self::save) blob.
    ///
    /// Cached entropies are not persisted, so the loaded tree is dirty and
    /// recomputes them on the first statistical read. The terminal-token
    /// set is not part of the format; re-apply it with
    /// [`set_terminals`](Self::set_terminals) if one was in use.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let decoder = GzDecoder::new(BufReader::new(file));
        let state: SaveState = bincode::deserialize_from(decoder)?;
        Ok(Self {
            depth: state.depth,
            root: state.root,
            normalization: state.normalization,
            dirty: true,
            terminals: BTreeSet::new(),
            hook: None,
        })
    }
}

/// One step of a trie traversal.
#[derive(Debug, Clone)]
pub struct NodeEntry<'a> {
    /// Prefix tokens from the root to this node.
    pub ngram: Vec<Token>,
    /// Occurrence count of the node.
    pub count: u64,
    /// Cached entropy; stale while the owning tree is dirty.
    pub entropy: Option<f64>,
    /// Postings when the node is a full-depth leaf.
    pub postings: Option<&'a BTreeMap<DocId, u64>>,
}

/// Depth-first traversal over a trie, yielding every node or only leaves.
///
/// Not bound to any call state: the iterator borrows the tree immutably and
/// any number of traversals can run back to back.
pub struct NodeIter<'a> {
    root: Option<&'a InternalNode>,
    stack: Vec<btree_map::Iter<'a, Token, Node>>,
    prefix: SmallVec<[Token; 8]>,
    leaves_only: bool,
}

impl<'a> NodeIter<'a> {
    fn new(root: &'a InternalNode, leaves_only: bool) -> Self {
        Self {
            root: Some(root),
            stack: Vec::new(),
            prefix: SmallVec::new(),
            leaves_only,
        }
    }
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = NodeEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            self.stack.push(root.children.iter());
            if !self.leaves_only {
                return Some(NodeEntry {
                    ngram: Vec::new(),
                    count: root.count,
                    entropy: root.entropy,
                    postings: None,
                });
            }
        }
        loop {
            let step = self.stack.last_mut()?.next();
            match step {
                Some((token, child)) => {
                    self.prefix.push(token.clone());
                    match child {
                        Node::Internal(inner) => {
                            let entry = NodeEntry {
                                ngram: self.prefix.to_vec(),
                                count: inner.count,
                                entropy: inner.entropy,
                                postings: None,
                            };
                            self.stack.push(inner.children.iter());
                            if !self.leaves_only {
                                return Some(entry);
                            }
                        }
                        Node::Leaf(leaf) => {
                            let entry = NodeEntry {
                                ngram: self.prefix.to_vec(),
                                count: leaf.count,
                                entropy: None,
                                postings: Some(&leaf.postings),
                            };
                            self.prefix.pop();
                            return Some(entry);
                        }
                    }
                }
                None => {
                    self.stack.pop();
                    self.prefix.pop();
                }
            }
        }
    }
}

impl Storage for MemoryStorage {
    fn clear(&mut self) -> Result<()> {
        MemoryStorage::clear(self);
        Ok(())
    }

    fn add_ngram(&mut self, ngram: &[Token], docid: DocId, freq: i64) -> Result<()> {
        MemoryStorage::add_ngram(self, ngram, docid, freq)
    }

    fn update_stats(&mut self) -> Result<()> {
        MemoryStorage::update_stats(self);
        Ok(())
    }

    fn iter_ngrams(&mut self) -> Result<Box<dyn Iterator<Item = (Vec<Token>, u64)> + '_>> {
        Ok(Box::new(
            self.iter_nodes().map(|entry| (entry.ngram, entry.count)),
        ))
    }

    fn query_node(&mut self, ngram: &[Token]) -> Result<NodeQuery> {
        Ok(MemoryStorage::query_node(self, ngram))
    }

    fn query_ev(&mut self, ngram: &[Token]) -> Result<Option<f64>> {
        Ok(MemoryStorage::query_ev(self, ngram))
    }

    fn query_autonomy(&mut self, ngram: &[Token], z_score: bool) -> Result<Option<f64>> {
        MemoryStorage::query_autonomy(self, ngram, z_score)
    }

    fn query_postings(&mut self, ngram: &[Token]) -> Result<BTreeMap<DocId, u64>> {
        Ok(MemoryStorage::query_postings(self, ngram))
    }
}

impl ColdStorage for MemoryStorage {
    fn merge(&mut self, hot: &MemoryStorage) -> Result<()> {
        MemoryStorage::merge(self, hot);
        Ok(())
    }
}
