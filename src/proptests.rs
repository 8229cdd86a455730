use super::*;

use proptest::prelude::*;

const DEPTH: usize = 3;

fn token_strategy() -> impl Strategy<Value = Token> {
    prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(String::from)
}

fn op_strategy() -> impl Strategy<Value = (Vec<Token>, DocId, i64)> {
    (
        prop::collection::vec(token_strategy(), 1..=DEPTH),
        0u64..4,
        1i64..=3,
    )
}

/// Walk the whole tree and check the structural invariants the mutation
/// path must preserve.
fn validate_tree(storage: &MemoryStorage, expected_root_count: u64) {
    let mut seen_root = false;
    for entry in storage.iter_nodes() {
        if entry.ngram.is_empty() {
            assert_eq!(
                entry.count, expected_root_count,
                "root count must equal the sum of all freq arguments"
            );
            seen_root = true;
        }
        assert!(entry.ngram.len() <= DEPTH, "prefix deeper than the bound");
        if let Some(postings) = entry.postings {
            assert_eq!(
                entry.ngram.len(),
                DEPTH,
                "postings may only live on full-depth leaves"
            );
            let total: u64 = postings.values().sum();
            assert_eq!(entry.count, total, "leaf count must match its postings");
        }
    }
    assert!(seen_root, "traversal must include the root");
}

proptest! {
    #[test]
    fn invariants_hold_under_random_inserts(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut storage = MemoryStorage::new(DEPTH);
        let mut total = 0u64;
        for (ngram, doc, freq) in &ops {
            storage.add_ngram(ngram, *doc, *freq).unwrap();
            total += *freq as u64;
        }
        validate_tree(&storage, total);

        // A statistics pass never disturbs counts or postings.
        storage.update_stats();
        validate_tree(&storage, total);
    }

    #[test]
    fn tiered_matches_the_plain_engine(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut plain = MemoryStorage::new(DEPTH);
        let mut tiered = TieredStorage::with_threshold(DEPTH, MemoryStorage::new(DEPTH), 4);
        for (ngram, doc, freq) in &ops {
            plain.add_ngram(ngram, *doc, *freq).unwrap();
            Storage::add_ngram(&mut tiered, ngram, *doc, *freq).unwrap();
        }
        for (ngram, _, _) in &ops {
            for len in 1..=ngram.len() {
                let prefix = &ngram[..len];
                let expected = plain.query_node(prefix);
                let got = tiered.query_node(prefix).unwrap();
                prop_assert_eq!(expected.count, got.count);
                prop_assert_eq!(expected.entropy, got.entropy);
                prop_assert_eq!(
                    plain.query_postings(prefix),
                    tiered.query_postings(prefix).unwrap()
                );
            }
        }
        prop_assert_eq!(
            plain.query_node(&[]).count,
            tiered.query_node(&[]).unwrap().count
        );
    }

    #[test]
    fn retraction_restores_the_previous_tree(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let mut storage = MemoryStorage::new(DEPTH);
        for (ngram, doc, freq) in &ops {
            storage.add_ngram(ngram, *doc, *freq).unwrap();
        }
        let before: Vec<_> = storage.iter_nodes().map(|e| (e.ngram, e.count)).collect();

        // Add and then retract one extra occurrence of every ngram.
        for (ngram, doc, _) in &ops {
            storage.add_ngram(ngram, *doc, 1).unwrap();
        }
        for (ngram, doc, _) in &ops {
            storage.add_ngram(ngram, *doc, -1).unwrap();
        }
        let after: Vec<_> = storage.iter_nodes().map(|e| (e.ngram, e.count)).collect();
        prop_assert_eq!(before, after);
    }
}
