//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the skip list against an ordered-set model and the
//! cache aggregates against the contents of the point index.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::cache::{Cache, SkipList};
use crate::config::CacheConfig;
use crate::tasks::Clock;

// == Test Configuration ==
const START: i64 = 1_700_000_000;

// == Strategies ==
/// Small key space so that operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,2}".prop_map(|s| s)
}

/// Narrow score range so that ties are common
fn score_strategy() -> impl Strategy<Value = i64> {
    0i64..20
}

#[derive(Debug, Clone)]
enum ListOp {
    Insert { member: String, score: i64 },
    Remove { member: String, score: i64 },
}

fn list_op_strategy() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        (key_strategy(), score_strategy())
            .prop_map(|(member, score)| ListOp::Insert { member, score }),
        (key_strategy(), score_strategy())
            .prop_map(|(member, score)| ListOp::Remove { member, score }),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, len: usize, ttl: i64 },
    Keep { key: String, len: usize },
    Delete { key: String },
    Tick { secs: i64 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), 0usize..64, 1i64..20).prop_map(|(key, len, ttl)| CacheOp::Set {
            key,
            len,
            ttl
        }),
        (key_strategy(), 0usize..64).prop_map(|(key, len)| CacheOp::Keep { key, len }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
        (1i64..5).prop_map(|secs| CacheOp::Tick { secs }),
    ]
}

/// Applies `ops` to a skip list and to a model, keeping members unique the
/// way the cache does.
fn build(ops: &[ListOp]) -> (SkipList, BTreeSet<(i64, String)>) {
    let mut list = SkipList::with_seed(0xC0FFEE);
    let mut model = BTreeSet::new();
    let mut current: HashMap<String, i64> = HashMap::new();

    for op in ops {
        match op {
            ListOp::Insert { member, score } => {
                if let Some(previous) = current.insert(member.clone(), *score) {
                    assert!(list.remove(member, previous));
                    model.remove(&(previous, member.clone()));
                }
                list.insert(member.clone(), *score);
                model.insert((*score, member.clone()));
            }
            ListOp::Remove { member, score } => {
                let expected = model.remove(&(*score, member.clone()));
                assert_eq!(list.remove(member, *score), expected);
                if expected {
                    current.remove(member);
                }
            }
        }
    }
    (list, model)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // The skip list iterates in (score, member) order and agrees with the
    // model on length, ranks and lookups by rank.
    #[test]
    fn prop_skiplist_matches_model(ops in prop::collection::vec(list_op_strategy(), 1..120)) {
        let (list, model) = build(&ops);

        prop_assert_eq!(list.len(), model.len());

        let listed: Vec<(i64, String)> = list.iter().map(|(m, s)| (s, m.to_string())).collect();
        let expected: Vec<(i64, String)> = model.iter().cloned().collect();
        prop_assert_eq!(&listed, &expected);

        for (idx, (score, member)) in expected.iter().enumerate() {
            prop_assert_eq!(list.rank(member, *score), Some(idx + 1));
            prop_assert_eq!(list.get_by_rank(idx + 1), Some((member.as_str(), *score)));
        }
        prop_assert_eq!(list.get_by_rank(expected.len() + 1), None);
    }

    // Score ranges are exactly the half-open interval [min, max).
    #[test]
    fn prop_range_by_score_half_open(
        ops in prop::collection::vec(list_op_strategy(), 1..80),
        min in -2i64..22,
        width in 0i64..10
    ) {
        let (list, model) = build(&ops);
        let max = min + width;

        let expected: Vec<String> = model
            .iter()
            .filter(|(score, _)| *score >= min && *score < max)
            .map(|(_, member)| member.clone())
            .collect();
        prop_assert_eq!(list.range_by_score(min, max), expected);
    }

    // Rank ranges are exactly the ranks in [max(start, 1), end).
    #[test]
    fn prop_range_by_rank_half_open(
        ops in prop::collection::vec(list_op_strategy(), 1..80),
        start in 0usize..40,
        width in 0usize..40
    ) {
        let (list, model) = build(&ops);
        let end = start + width;

        let expected: Vec<String> = model
            .iter()
            .enumerate()
            .filter(|(idx, _)| idx + 1 >= start.max(1) && idx + 1 < end)
            .map(|(_, (_, member))| member.clone())
            .collect();
        prop_assert_eq!(list.range_by_rank(start, end), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    // Aggregates track physical presence: items and bytes always equal the
    // count and size sum of what the point index holds, and the expiry index
    // ends up with one member per entry.
    #[test]
    fn prop_aggregates_track_point_index(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        tokio_test::block_on(async {
            let clock = Clock::starting_at(START);
            let config = CacheConfig {
                recycle_check_interval_secs: 3600,
                ..CacheConfig::default()
            };
            let cache: Cache<String> = Cache::with_clock(Some(config), clock.clone()).unwrap();
            let mut model: HashMap<String, usize> = HashMap::new();

            for op in ops {
                match op {
                    CacheOp::Set { key, len, ttl } => {
                        cache.set_ttl(key.clone(), Arc::new("x".repeat(len)), ttl).await.unwrap();
                        model.insert(key, len);
                    }
                    CacheOp::Keep { key, len } => {
                        let kept = cache.keep(key.clone(), Arc::new("y".repeat(len))).await.unwrap();
                        prop_assert_eq!(kept, model.contains_key(&key));
                        if kept {
                            model.insert(key, len);
                        }
                    }
                    CacheOp::Delete { key } => {
                        let deleted = cache.delete(&key).await.unwrap();
                        prop_assert_eq!(deleted, model.remove(&key).is_some());
                    }
                    CacheOp::Tick { secs } => clock.advance(secs),
                }

                prop_assert_eq!(cache.items(), model.len() as i64);
                prop_assert_eq!(cache.bytes(), model.values().sum::<usize>() as i64);
            }

            prop_assert_eq!(cache.indexed().await.unwrap(), model.len());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
