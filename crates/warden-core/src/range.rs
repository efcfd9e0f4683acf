//! Pure integer range search used by the UID allocator.
//!
//! Both operations here are free of I/O and side effects; they exist so the
//! allocator's search logic can be property-tested independently of the
//! filesystem and the lock.

use crate::identity::SubidRange;

/// Find the smallest `n` in `[lo, hi]` with `n` not present in `used`.
///
/// `used` need not be sorted. Returns `None` if every integer in the range
/// is taken.
pub fn find_first_available_integer(lo: u32, hi: u32, used: &[u32]) -> Option<u32> {
    if lo > hi {
        return None;
    }
    (lo..=hi).find(|n| !used.contains(n))
}

/// Find the smallest `s >= desired_start` such that `[s, s+size-1]` is
/// disjoint from every range in `existing` and `s+size-1 <= ceiling`.
///
/// `existing` need not be pre-sorted; this function sorts its own copy.
/// Algorithm: scan the sorted ranges left to right, advancing a candidate
/// start past any range it would otherwise overlap. Adjacency (ending
/// exactly where the next range starts) is legal — ranges are inclusive and
/// touching intervals do not overlap.
pub fn find_gap_for_range(
    existing: &[SubidRange],
    desired_start: u64,
    size: u64,
    ceiling: u64,
) -> Option<u64> {
    if size == 0 {
        return None;
    }

    let mut sorted: Vec<&SubidRange> = existing.iter().collect();
    sorted.sort_by_key(|r| r.start);

    let mut candidate = desired_start;
    for range in sorted {
        if candidate.checked_add(size - 1)? < range.start {
            break;
        }
        candidate = candidate.max(range.end + 1);
    }

    if candidate.checked_add(size - 1)? <= ceiling {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(owner: &str, start: u64, end: u64) -> SubidRange {
        SubidRange {
            owner: owner.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn first_available_skips_used() {
        assert_eq!(find_first_available_integer(10, 20, &[10, 11, 12]), Some(13));
    }

    #[test]
    fn first_available_exhausted() {
        let used: Vec<u32> = (10..=20).collect();
        assert_eq!(find_first_available_integer(10, 20, &used), None);
    }

    #[test]
    fn first_available_empty_used() {
        assert_eq!(find_first_available_integer(5, 5, &[]), Some(5));
    }

    #[test]
    fn s2_gap_search() {
        let existing = vec![
            range("a", 100_000, 165_535),
            range("b", 200_000, 265_535),
        ];
        let result = find_gap_for_range(&existing, 100_000, 65_536, 400_000);
        assert_eq!(result, Some(265_536));
    }

    #[test]
    fn gap_fits_before_first_range() {
        let existing = vec![range("a", 200_000, 265_535)];
        let result = find_gap_for_range(&existing, 100_000, 65_536, 400_000);
        assert_eq!(result, Some(100_000));
    }

    #[test]
    fn gap_adjacency_is_legal() {
        // desired gap touches the existing range's end + 1 exactly.
        let existing = vec![range("a", 100_000, 165_535)];
        let result = find_gap_for_range(&existing, 100_000, 65_536, 300_000);
        assert_eq!(result, Some(165_536));
    }

    #[test]
    fn gap_touching_ceiling_is_admitted() {
        let existing: Vec<SubidRange> = vec![];
        let result = find_gap_for_range(&existing, 100_000, 65_536, 165_535);
        assert_eq!(result, Some(100_000));
    }

    #[test]
    fn gap_exceeding_ceiling_is_rejected() {
        let existing: Vec<SubidRange> = vec![];
        let result = find_gap_for_range(&existing, 100_000, 65_536, 165_534);
        assert_eq!(result, None);
    }

    #[test]
    fn gap_unsorted_input_still_works() {
        let existing = vec![
            range("b", 200_000, 265_535),
            range("a", 100_000, 165_535),
        ];
        let result = find_gap_for_range(&existing, 100_000, 65_536, 400_000);
        assert_eq!(result, Some(265_536));
    }

    proptest::proptest! {
        #[test]
        fn prop_first_available_is_correct(
            lo in 0u32..200,
            span in 0u32..200,
            used in proptest::collection::vec(0u32..400, 0..50),
        ) {
            let hi = lo + span;
            let result = find_first_available_integer(lo, hi, &used);
            match result {
                Some(n) => {
                    prop_assert!(n >= lo && n <= hi);
                    prop_assert!(!used.contains(&n));
                    for k in lo..n {
                        prop_assert!(used.contains(&k));
                    }
                }
                None => {
                    for n in lo..=hi {
                        prop_assert!(used.contains(&n));
                    }
                }
            }
        }

        #[test]
        fn prop_gap_search_is_minimal_and_disjoint(
            desired_start in 0u64..500,
            size in 1u64..200,
            ceiling in 500u64..2000,
            starts in proptest::collection::vec(0u64..500, 0..8),
        ) {
            let existing: Vec<SubidRange> = starts
                .into_iter()
                .enumerate()
                .map(|(i, s)| range(&format!("owner{i}"), s, s + 49))
                .collect();

            if let Some(k) = find_gap_for_range(&existing, desired_start, size, ceiling) {
                prop_assert!(k >= desired_start);
                prop_assert!(k + size - 1 <= ceiling);
                for r in &existing {
                    let disjoint = k + size - 1 < r.start || k > r.end;
                    prop_assert!(disjoint);
                }
                // Minimality: nothing in [desired_start, k) could have worked.
                for candidate in desired_start..k {
                    let overlaps = existing
                        .iter()
                        .any(|r| !(candidate + size - 1 < r.start || candidate > r.end));
                    prop_assert!(overlaps, "candidate {candidate} should have been rejected only by overlap");
                }
            }
        }
    }
}
