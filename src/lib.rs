//! # entrie
//!
//! An n-gram trie storage engine computing the statistics used to detect
//! linguistically significant units without supervision: branching entropy,
//! its variation across n-gram extension, and a depth-normalized autonomy
//! score.
//!
//! ## Architecture
//!
//! - [`MemoryStorage`]: a trie accumulating per-prefix counts and per-leaf
//!   document postings, with lazily recomputed entropy statistics and a
//!   per-depth normalization table.
//! - [`TieredStorage`]: a write-buffer orchestrator composing a hot
//!   `MemoryStorage` with any durable [`ColdStorage`] backend, merging the
//!   buffer on a size threshold or before any read.
//! - [`Storage`]: the query contract all tiers share, so engines and
//!   orchestrators are interchangeable and the cold backend substitutable.
//!
//! ## Example
//!
//! ```rust
//! use entrie::MemoryStorage;
//!
//! let mut trie = MemoryStorage::new(2);
//! trie.add_ngram(&["the".into(), "cat".into()], 1, 1).unwrap();
//! trie.add_ngram(&["the".into(), "dog".into()], 2, 1).unwrap();
//!
//! let hit = trie.query_node(&["the".into()]);
//! assert_eq!(hit.count, 2);
//! assert_eq!(hit.entropy, Some(1.0));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod node;
pub mod stats;
pub mod storage;
pub mod tiered;

pub use memory::{MemoryStorage, NodeEntry, NodeIter};
pub use node::{DocId, InternalNode, LeafNode, Node, Token};
pub use storage::{ColdStorage, Diagnostic, NodeQuery, Result, Storage, StorageError};
pub use tiered::{TieredStorage, DEFAULT_MAX_HOT_COUNT};

#[cfg(test)]
mod proptests;
