//! Hot/cold tiered storage orchestrator.
//!
//! Writes land in a fast in-memory trie (the hot tier) and are periodically
//! folded into a durable backend (the cold tier), either when the buffered
//! write count passes a threshold or before any read. Reads always merge
//! first and then delegate entirely to the cold tier, so the orchestrator is
//! read-your-writes consistent at the cost of paying the merge on the first
//! read after buffered writes — the usual write-buffer/compaction bargain.

use std::collections::BTreeMap;

use crate::memory::MemoryStorage;
use crate::node::{DocId, Token};
use crate::storage::{ColdStorage, NodeQuery, Result, Storage};

/// Buffered writes tolerated before a merge is forced on the write path.
pub const DEFAULT_MAX_HOT_COUNT: usize = 1000;

/// Write-buffering storage composed of a hot [`MemoryStorage`] and a cold
/// [`ColdStorage`] backend.
pub struct TieredStorage<C: ColdStorage> {
    hot: MemoryStorage,
    cold: C,
    /// Writes buffered in the hot tier since the last merge.
    hot_count: usize,
    max_hot_count: usize,
}

impl<C: ColdStorage> TieredStorage<C> {
    /// Wrap `cold` with a hot buffer of the same depth and the default
    /// merge threshold.
    pub fn new(depth: usize, cold: C) -> Self {
        Self::with_threshold(depth, cold, DEFAULT_MAX_HOT_COUNT)
    }

    /// As [`new`](Self::new) with an explicit merge threshold.
    pub fn with_threshold(depth: usize, cold: C, max_hot_count: usize) -> Self {
        Self {
            hot: MemoryStorage::new(depth),
            cold,
            hot_count: 0,
            max_hot_count,
        }
    }

    /// The cold tier, for callers that need backend-specific access.
    pub fn cold(&mut self) -> &mut C {
        &mut self.cold
    }

    /// Writes currently buffered in the hot tier.
    pub fn buffered_writes(&self) -> usize {
        self.hot_count
    }

    /// Fold the hot tier into the cold tier and reset the buffer.
    ///
    /// No-op when nothing has been written since the last merge. This is
    /// the only path by which data becomes visible in the cold tier.
    fn merge(&mut self) -> Result<()> {
        if self.hot_count == 0 {
            return Ok(());
        }
        tracing::debug!(
            buffered = self.hot_count,
            "merging hot tier into cold tier"
        );
        self.cold.merge(&self.hot)?;
        self.hot.clear();
        self.hot_count = 0;
        Ok(())
    }
}

impl<C: ColdStorage> Storage for TieredStorage<C> {
    fn clear(&mut self) -> Result<()> {
        self.hot.clear();
        self.cold.clear()?;
        self.hot_count = 0;
        Ok(())
    }

    /// Buffer the write in the hot tier.
    ///
    /// When the buffer has outgrown the threshold the merge happens first,
    /// and the new write counts against the reset threshold — so a read
    /// issued right after still sees it.
    fn add_ngram(&mut self, ngram: &[Token], docid: DocId, freq: i64) -> Result<()> {
        if self.hot_count > self.max_hot_count {
            self.merge()?;
        }
        self.hot.add_ngram(ngram, docid, freq)?;
        self.hot_count += 1;
        Ok(())
    }

    fn update_stats(&mut self) -> Result<()> {
        self.merge()?;
        self.cold.update_stats()
    }

    fn iter_ngrams(&mut self) -> Result<Box<dyn Iterator<Item = (Vec<Token>, u64)> + '_>> {
        self.merge()?;
        self.cold.iter_ngrams()
    }

    fn query_node(&mut self, ngram: &[Token]) -> Result<NodeQuery> {
        self.merge()?;
        self.cold.query_node(ngram)
    }

    fn query_ev(&mut self, ngram: &[Token]) -> Result<Option<f64>> {
        self.merge()?;
        self.cold.query_ev(ngram)
    }

    fn query_autonomy(&mut self, ngram: &[Token], z_score: bool) -> Result<Option<f64>> {
        self.merge()?;
        self.cold.query_autonomy(ngram, z_score)
    }

    fn query_postings(&mut self, ngram: &[Token]) -> Result<BTreeMap<DocId, u64>> {
        self.merge()?;
        self.cold.query_postings(ngram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    fn ngram(tokens: &[&str]) -> Vec<Token> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn tiered(max_hot_count: usize) -> TieredStorage<MemoryStorage> {
        TieredStorage::with_threshold(2, MemoryStorage::new(2), max_hot_count)
    }

    #[test]
    fn threshold_triggers_exactly_one_merge() {
        let mut t = tiered(2);
        for _ in 0..3 {
            t.add_ngram(&ngram(&["a", "b"]), 1, 1).unwrap();
        }
        // Three writes buffered, none merged yet.
        assert_eq!(t.buffered_writes(), 3);
        assert_eq!(t.cold().query_node(&[]).count, 0);

        // The fourth write merges the first three and stays buffered itself.
        t.add_ngram(&ngram(&["a", "c"]), 2, 1).unwrap();
        assert_eq!(t.buffered_writes(), 1);
        assert_eq!(t.cold().query_node(&[]).count, 3);

        // A read right after sees all four occurrences.
        assert_eq!(t.query_node(&[]).unwrap().count, 4);
        assert_eq!(t.buffered_writes(), 0);
    }

    #[test]
    fn reads_force_the_merge() {
        let mut t = tiered(100);
        t.add_ngram(&ngram(&["a", "b"]), 1, 1).unwrap();
        t.add_ngram(&ngram(&["a", "c"]), 1, 1).unwrap();

        assert_eq!(t.query_node(&ngram(&["a"])).unwrap().count, 2);
        let postings = t.query_postings(&ngram(&["a", "b"])).unwrap();
        assert_eq!(postings.get(&1), Some(&1));

        let all: Vec<_> = t.iter_ngrams().unwrap().collect();
        assert_eq!(
            all,
            vec![
                (vec![], 2),
                (ngram(&["a"]), 2),
                (ngram(&["a", "b"]), 1),
                (ngram(&["a", "c"]), 1),
            ]
        );
    }

    #[test]
    fn merge_is_noop_without_writes() {
        let mut t = tiered(2);
        // Reads on an empty orchestrator touch nothing.
        assert_eq!(t.query_node(&[]).unwrap().count, 0);
        assert_eq!(t.query_ev(&ngram(&["a"])).unwrap(), None);
        assert_eq!(t.buffered_writes(), 0);
    }

    #[test]
    fn statistics_delegate_to_the_cold_tier() {
        let mut t = tiered(100);
        for _ in 0..3 {
            t.add_ngram(&ngram(&["a", "b"]), 1, 1).unwrap();
        }
        t.add_ngram(&ngram(&["a", "c"]), 2, 1).unwrap();

        let expected = crate::stats::entropy([3.0, 1.0]);
        assert_eq!(
            t.query_node(&ngram(&["a"])).unwrap().entropy,
            Some(expected)
        );
        assert_eq!(t.query_ev(&ngram(&["a"])).unwrap(), Some(expected));
        // One EV sample at depth 1: raw autonomy 0, z-score undefined.
        assert_eq!(
            t.query_autonomy(&ngram(&["a"]), false).unwrap(),
            Some(0.0)
        );
        assert_eq!(t.query_autonomy(&ngram(&["a"]), true).unwrap(), None);
    }

    #[test]
    fn contract_errors_pass_through() {
        let mut t = tiered(2);
        assert!(matches!(
            t.add_ngram(&[], 1, 1),
            Err(StorageError::NgramLength { .. })
        ));
        assert!(matches!(
            t.query_autonomy(&[], true),
            Err(StorageError::EmptyNgram)
        ));
        // A failed write does not count against the buffer.
        assert_eq!(t.buffered_writes(), 0);
    }

    #[test]
    fn clear_empties_both_tiers() {
        let mut t = tiered(1);
        for _ in 0..4 {
            t.add_ngram(&ngram(&["a", "b"]), 1, 1).unwrap();
        }
        t.clear().unwrap();
        assert_eq!(t.buffered_writes(), 0);
        assert_eq!(t.query_node(&[]).unwrap().count, 0);
        assert!(t.query_postings(&ngram(&["a", "b"])).unwrap().is_empty());
    }
}
