//! Sorted set: dual-indexed by (score, name) rank order and by name.

use std::collections::BTreeMap;
use std::ops::Bound;

use ordered_float::OrderedFloat;

use crate::containers::HotMap;

type RankKey = (OrderedFloat<f64>, Box<[u8]>);

/// An ordered collection of (name, score) pairs.
///
/// Elements are totally ordered by (score ascending, name lexicographic).
/// A `BTreeMap` keyed by (score, name) provides ordered traversal and
/// seeking; a hash map provides O(1) name→score lookups. NaN scores are
/// rejected upstream by the dispatcher, so `OrderedFloat` only ever orders
/// finite values here.
#[derive(Debug, Default)]
pub struct SortedSet {
    rank: BTreeMap<RankKey, ()>,
    scores: HotMap<Box<[u8]>, OrderedFloat<f64>>,
}

impl SortedSet {
    /// Creates an empty sorted set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rank: BTreeMap::new(),
            scores: HotMap::new(),
        }
    }

    /// Adds `name` with `score`, or re-scores an existing element (moving
    /// its ranked position). Returns `true` when the element is new.
    pub fn insert(&mut self, name: &[u8], score: f64) -> bool {
        let score = OrderedFloat(score);
        if let Some(current) = self.scores.get_mut(name) {
            if *current != score {
                let previous = std::mem::replace(current, score);
                self.rank.remove(&(previous, Box::from(name)));
                self.rank.insert((score, Box::from(name)), ());
            }
            false
        } else {
            self.scores.insert(Box::from(name), score);
            self.rank.insert((score, Box::from(name)), ());
            true
        }
    }

    /// Score of `name`, if present.
    #[must_use]
    pub fn score(&self, name: &[u8]) -> Option<f64> {
        self.scores.get(name).map(|score| score.0)
    }

    /// Removes `name`. Returns `true` if it was present.
    pub fn remove(&mut self, name: &[u8]) -> bool {
        match self.scores.remove(name) {
            Some(score) => {
                self.rank.remove(&(score, Box::from(name)));
                true
            }
            None => false,
        }
    }

    /// First element with (score, name) ≥ the given pair.
    #[must_use]
    pub fn seek_ge(&self, score: f64, name: &[u8]) -> Option<(f64, &[u8])> {
        let from: RankKey = (OrderedFloat(score), Box::from(name));
        self.rank
            .range((Bound::Included(from), Bound::Unbounded))
            .next()
            .map(|(key, ())| (key.0 .0, key.1.as_ref()))
    }

    /// Steps `delta` positions from `at` in rank order. Returns `None` when
    /// the walk leaves either end, or when `at` itself is not an element;
    /// `delta` = 0 returns `at`.
    #[must_use]
    pub fn offset(&self, at: (f64, &[u8]), delta: i64) -> Option<(f64, &[u8])> {
        let key: RankKey = (OrderedFloat(at.0), Box::from(at.1));
        if !self.rank.contains_key(&key) {
            return None;
        }
        let stepped = if delta >= 0 {
            let forward = usize::try_from(delta).unwrap_or(usize::MAX);
            self.rank
                .range((Bound::Included(key), Bound::Unbounded))
                .nth(forward)
        } else {
            let backward = usize::try_from(delta.unsigned_abs()).unwrap_or(usize::MAX);
            self.rank
                .range((Bound::Unbounded, Bound::Excluded(key)))
                .rev()
                .nth(backward - 1)
        };
        stepped.map(|(key, ())| (key.0 .0, key.1.as_ref()))
    }

    /// Forward iteration in rank order from `at`, inclusive.
    pub fn iter_from(&self, at: (f64, &[u8])) -> impl Iterator<Item = (f64, &[u8])> + '_ {
        let from: RankKey = (OrderedFloat(at.0), Box::from(at.1));
        self.rank
            .range((Bound::Included(from), Bound::Unbounded))
            .map(|(key, ())| (key.0 .0, key.1.as_ref()))
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the set holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Releases every element.
    pub fn clear(&mut self) {
        self.rank.clear();
        self.scores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::SortedSet;
    use googletest::prelude::*;
    use rstest::rstest;

    fn sample() -> SortedSet {
        let mut set = SortedSet::new();
        set.insert(b"x", 1.0);
        set.insert(b"y", 2.0);
        set.insert(b"z", 3.0);
        set
    }

    #[rstest]
    fn insert_reports_new_versus_updated() {
        let mut set = SortedSet::new();
        assert_that!(set.insert(b"x", 1.0), eq(true));
        assert_that!(set.insert(b"x", 2.5), eq(false));
        assert_that!(set.score(b"x"), eq(Some(2.5)));
        assert_that!(set.len(), eq(1_usize));
    }

    #[rstest]
    fn rescoring_moves_the_ranked_position() {
        let mut set = sample();
        set.insert(b"x", 9.0);
        let first = set.seek_ge(f64::MIN, b"");
        assert_that!(first.map(|(_, name)| name.to_vec()), eq(&Some(b"y".to_vec())));
        let last: Vec<_> = set.iter_from((f64::MIN, &b""[..])).collect();
        assert_that!(last.len(), eq(3_usize));
        assert_that!(last[2].1, eq(&b"x"[..]));
    }

    #[rstest]
    fn remove_deletes_both_indexes() {
        let mut set = sample();
        assert_that!(set.remove(b"y"), eq(true));
        assert_that!(set.remove(b"y"), eq(false));
        assert_that!(set.score(b"y"), eq(None));
        assert_that!(set.seek_ge(2.0, b""), eq(Some((3.0, &b"z"[..]))));
    }

    #[rstest]
    fn equal_scores_order_by_name() {
        let mut set = SortedSet::new();
        set.insert(b"b", 1.0);
        set.insert(b"a", 1.0);
        set.insert(b"c", 1.0);
        let ordered: Vec<_> = set
            .iter_from((f64::MIN, &b""[..]))
            .map(|(_, name)| name.to_vec())
            .collect();
        assert_that!(
            &ordered,
            eq(&vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
        );
    }

    #[rstest]
    #[case(0.0, &b""[..], Some(&b"x"[..]))]
    #[case(1.0, &b"x"[..], Some(&b"x"[..]))]
    #[case(1.0, &b"y"[..], Some(&b"y"[..]))]
    #[case(3.5, &b""[..], None)]
    fn seek_ge_finds_first_at_or_after(
        #[case] score: f64,
        #[case] name: &[u8],
        #[case] expected: Option<&[u8]>,
    ) {
        let set = sample();
        let found = set.seek_ge(score, name).map(|(_, name)| name.to_vec());
        assert_that!(found, eq(&expected.map(<[u8]>::to_vec)));
    }

    #[rstest]
    #[case(0, Some(&b"y"[..]))]
    #[case(1, Some(&b"z"[..]))]
    #[case(-1, Some(&b"x"[..]))]
    #[case(2, None)]
    #[case(-2, None)]
    fn offset_steps_and_clamps(#[case] delta: i64, #[case] expected: Option<&[u8]>) {
        let set = sample();
        let stepped = set.offset((2.0, b"y"), delta).map(|(_, name)| name.to_vec());
        assert_that!(stepped, eq(&expected.map(<[u8]>::to_vec)));
    }

    #[rstest]
    fn offset_from_a_non_element_is_none() {
        let set = sample();
        assert_that!(set.offset((2.5, b"q"), 0), eq(None));
    }

    #[rstest]
    fn clear_releases_everything() {
        let mut set = sample();
        set.clear();
        assert_that!(set.is_empty(), eq(true));
        assert_that!(set.seek_ge(f64::MIN, b""), eq(None));
    }
}
