//! The storage capability contract shared by the in-memory engine, the
//! tiered orchestrator, and any external cold backend.
//!
//! Data absence (a prefix not present in the tree) is never an error: it
//! surfaces as zero counts, `None` entropies, and empty postings through each
//! query's own result type. Errors are reserved for contract violations and
//! for I/O or codec failures in a backend.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::memory::MemoryStorage;
use crate::node::{DocId, Token};

/// Errors surfaced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The ngram passed to `add_ngram` is empty or longer than the depth bound.
    #[error("ngram length {len} outside the accepted range 1..={depth}")]
    NgramLength {
        /// Length of the offending ngram.
        len: usize,
        /// Maximum ngram length of the storage.
        depth: usize,
    },
    /// Autonomy was queried for the empty ngram, which has no parent.
    #[error("autonomy is undefined for the empty ngram")]
    EmptyNgram,
    /// Underlying file operation failed during save/load.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization of a persisted tree failed.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Count and cached entropy of a queried node.
///
/// A missing node yields `count == 0` and no entropy.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeQuery {
    /// Number of weighted occurrences of the queried prefix.
    pub count: u64,
    /// Branching entropy after the prefix, if defined.
    pub entropy: Option<f64>,
}

/// Caller-visible signals about potentially expensive internal work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// A statistics query hit a dirty tree and forced a full recomputation.
    ImplicitRefresh {
        /// Number of nodes the recomputation pass visits.
        nodes: usize,
    },
}

/// Hook receiving [`Diagnostic`] events from a storage instance.
pub type DiagnosticHook = Box<dyn FnMut(Diagnostic) + Send>;

/// The query contract every storage tier implements.
///
/// All methods take `&mut self`: reads may refresh cached statistics or, in
/// the tiered orchestrator, force a merge of buffered writes. Implementations
/// backed by remote stores report failures through [`StorageError`].
pub trait Storage {
    /// Replace the tree with an empty root. Idempotent.
    fn clear(&mut self) -> Result<()>;

    /// Add `freq` weighted occurrences of `ngram` for document `docid`.
    ///
    /// `freq` may be negative to retract occurrences previously added;
    /// callers must not drive any count below zero, or the derived
    /// statistics become meaningless.
    fn add_ngram(&mut self, ngram: &[Token], docid: DocId, freq: i64) -> Result<()>;

    /// Recompute entropies and the normalization table if stale.
    fn update_stats(&mut self) -> Result<()>;

    /// Iterate over `(prefix, count)` for every node in the tree, root
    /// included, in deterministic depth-first order.
    fn iter_ngrams(&mut self) -> Result<Box<dyn Iterator<Item = (Vec<Token>, u64)> + '_>>;

    /// Count and entropy of the node reached by `ngram`.
    fn query_node(&mut self, ngram: &[Token]) -> Result<NodeQuery>;

    /// Entropy variation of `ngram`: its entropy minus its parent's.
    ///
    /// `None` for the empty ngram, for missing nodes, and wherever the
    /// variation is undefined.
    fn query_ev(&mut self, ngram: &[Token]) -> Result<Option<f64>>;

    /// Depth-normalized entropy variation.
    ///
    /// With `z_score` the value is additionally divided by the per-depth
    /// standard deviation; a zero standard deviation yields `None`.
    /// Fails with [`StorageError::EmptyNgram`] for the empty ngram.
    fn query_autonomy(&mut self, ngram: &[Token], z_score: bool) -> Result<Option<f64>>;

    /// Postings of the full-depth leaf reached by `ngram`, empty otherwise.
    fn query_postings(&mut self, ngram: &[Token]) -> Result<BTreeMap<DocId, u64>>;
}

/// A durable tier that can additively fold a hot buffer into itself.
pub trait ColdStorage: Storage {
    /// Fold another storage's counts and postings into this one,
    /// token by token.
    fn merge(&mut self, hot: &MemoryStorage) -> Result<()>;
}
