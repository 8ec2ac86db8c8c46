//! Aggregation: fold per-page byline counts into per-journalist totals.
//!
//! Journalist identity is the exact string the model returned. "Jane Doe"
//! and "J. Doe" are two entries; no normalisation happens here.

use crate::output::{JournalistStat, JournalistTally, PageStats};

impl JournalistTally {
    /// Add one page's counts to the running totals.
    ///
    /// Counts come straight from the model, so totals saturate at `u64::MAX`.
    ///
    /// `page_num` is recorded on every journalist present in `stats`, once.
    pub fn add_page(&mut self, page_num: usize, stats: &PageStats) {
        for (name, counts) in &stats.journalist_stats {
            let entry = self.journalist_stats.entry(name.clone()).or_default();
            entry.exclusive = entry.exclusive.saturating_add(counts.exclusive);
            entry.standard = entry.standard.saturating_add(counts.standard);
            if !entry.pages.contains(&page_num) {
                entry.pages.push(page_num);
            }
        }
    }

    /// Build a tally from `(page_num, reply)` pairs; `None` pages are ignored.
    pub fn from_pages<'a, I>(pages: I) -> Self
    where
        I: IntoIterator<Item = (usize, Option<&'a PageStats>)>,
    {
        let mut tally = Self::default();
        for (page_num, stats) in pages {
            if let Some(stats) = stats {
                tally.add_page(page_num, stats);
            }
        }
        tally
    }

    /// Fold another tally into this one (sums counts, unions page lists).
    pub fn merge(&mut self, other: &JournalistTally) {
        for (name, stat) in &other.journalist_stats {
            let entry = self.journalist_stats.entry(name.clone()).or_default();
            entry.exclusive = entry.exclusive.saturating_add(stat.exclusive);
            entry.standard = entry.standard.saturating_add(stat.standard);
            for page in &stat.pages {
                if !entry.pages.contains(page) {
                    entry.pages.push(*page);
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&JournalistStat> {
        self.journalist_stats.get(name)
    }

    pub fn len(&self) -> usize {
        self.journalist_stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.journalist_stats.is_empty()
    }

    /// Journalists in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JournalistStat)> {
        self.journalist_stats.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn total_exclusive(&self) -> u64 {
        self.journalist_stats
            .values()
            .fold(0, |acc: u64, s| acc.saturating_add(s.exclusive))
    }

    pub fn total_standard(&self) -> u64 {
        self.journalist_stats
            .values()
            .fold(0, |acc: u64, s| acc.saturating_add(s.standard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn page_set(stat: &JournalistStat) -> BTreeSet<usize> {
        stat.pages.iter().copied().collect()
    }

    fn two_pages() -> (PageStats, PageStats) {
        (
            PageStats::from_counts([("Alice", 1, 0)]),
            PageStats::from_counts([("Alice", 0, 2), ("Bob", 1, 0)]),
        )
    }

    #[test]
    fn worked_example() {
        let (p1, p2) = two_pages();
        let tally = JournalistTally::from_pages([(1, Some(&p1)), (2, Some(&p2))]);

        let alice = tally.get("Alice").unwrap();
        assert_eq!((alice.exclusive, alice.standard), (1, 2));
        assert_eq!(page_set(alice), BTreeSet::from([1, 2]));

        let bob = tally.get("Bob").unwrap();
        assert_eq!((bob.exclusive, bob.standard), (1, 0));
        assert_eq!(page_set(bob), BTreeSet::from([2]));
    }

    #[test]
    fn skipped_pages_leave_totals_unchanged() {
        let (p1, p2) = two_pages();
        let base = JournalistTally::from_pages([(1, Some(&p1)), (3, Some(&p2))]);
        let with_gaps =
            JournalistTally::from_pages([(1, Some(&p1)), (2, None), (3, Some(&p2)), (4, None)]);
        assert_eq!(base, with_gaps);
    }

    #[test]
    fn empty_page_stats_is_a_no_op() {
        let (p1, _) = two_pages();
        let mut tally = JournalistTally::from_pages([(1, Some(&p1))]);
        let before = tally.clone();
        tally.add_page(2, &PageStats::default());
        assert_eq!(tally, before);
    }

    #[test]
    fn page_order_does_not_change_totals_or_page_sets() {
        let (p1, p2) = two_pages();
        let p3 = PageStats::from_counts([("Bob", 0, 4), ("Carol", 2, 2)]);

        let forward = JournalistTally::from_pages([(1, Some(&p1)), (2, Some(&p2)), (3, Some(&p3))]);
        let backward =
            JournalistTally::from_pages([(3, Some(&p3)), (2, Some(&p2)), (1, Some(&p1))]);

        assert_eq!(forward.len(), backward.len());
        for (name, stat) in forward.iter() {
            let other = backward.get(name).unwrap();
            assert_eq!(stat.exclusive, other.exclusive, "{name}");
            assert_eq!(stat.standard, other.standard, "{name}");
            assert_eq!(page_set(stat), page_set(other), "{name}");
        }
        // first-seen order differs
        assert_eq!(forward.get("Alice").unwrap().pages, vec![1, 2]);
        assert_eq!(backward.get("Alice").unwrap().pages, vec![2, 1]);
    }

    #[test]
    fn same_page_twice_records_page_once() {
        let p = PageStats::from_counts([("Alice", 1, 1)]);
        let mut tally = JournalistTally::default();
        tally.add_page(5, &p);
        tally.add_page(5, &p);
        let alice = tally.get("Alice").unwrap();
        assert_eq!(alice.pages, vec![5]);
        assert_eq!(alice.exclusive, 2);
    }

    #[test]
    fn merge_matches_single_pass() {
        let (p1, p2) = two_pages();
        let whole = JournalistTally::from_pages([(1, Some(&p1)), (2, Some(&p2))]);

        let mut left = JournalistTally::from_pages([(1, Some(&p1))]);
        let right = JournalistTally::from_pages([(2, Some(&p2))]);
        left.merge(&right);
        assert_eq!(left, whole);

        let mut swapped = right.clone();
        swapped.merge(&JournalistTally::from_pages([(1, Some(&p1))]));
        assert_eq!(swapped.total_exclusive(), whole.total_exclusive());
        assert_eq!(swapped.total_standard(), whole.total_standard());
    }

    #[test]
    fn huge_counts_saturate() {
        let p1 = PageStats::from_counts([("A", u64::MAX, 0)]);
        let p2 = PageStats::from_counts([("A", 1, 0), ("B", u64::MAX, 0)]);
        let mut tally = JournalistTally::from_pages([(1, Some(&p1)), (2, Some(&p2))]);
        assert_eq!(tally.get("A").unwrap().exclusive, u64::MAX);
        assert_eq!(tally.get("A").unwrap().pages, vec![1, 2]);
        assert_eq!(tally.total_exclusive(), u64::MAX);

        let again = tally.clone();
        tally.merge(&again);
        assert_eq!(tally.get("B").unwrap().exclusive, u64::MAX);
    }

    #[test]
    fn name_variants_stay_distinct() {
        let p = PageStats::from_counts([("Jane Doe", 1, 0), ("J. Doe", 0, 1)]);
        let tally = JournalistTally::from_pages([(1, Some(&p))]);
        assert_eq!(tally.len(), 2);
    }

    #[test]
    fn serializes_under_journalist_stats_key() {
        let (p1, _) = two_pages();
        let tally = JournalistTally::from_pages([(1, Some(&p1))]);
        let v = serde_json::to_value(&tally).unwrap();
        assert_eq!(v["journalist_stats"]["Alice"]["exclusive"], 1);
        assert_eq!(v["journalist_stats"]["Alice"]["pages"][0], 1);
    }
}
