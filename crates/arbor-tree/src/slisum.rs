//! Sliding-window consensus for leaf abstracts.
//!
//! A chunk is split into overlapping windows, each window is summarized on its
//! own, and the window abstracts are reconciled so a single spurious fact cannot
//! dominate the leaf.

use std::ops::Range;

/// Overlapping windows of `min(window_size, n)` facts with stride `window / 2`.
///
/// Windows start at `0, stride, 2 * stride, ...` up to `n - window`. Facts past
/// the last full window are not summarized again; a chunk of 8 or 9 facts
/// yields the single window `0..7`.
#[must_use]
pub fn windows(n: usize, window_size: usize) -> Vec<Range<usize>> {
    if n == 0 || window_size == 0 {
        return Vec::new();
    }
    let window = window_size.min(n);
    let stride = (window / 2).max(1);

    (0..=n - window)
        .step_by(stride)
        .map(|start| start..start + window)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ten_facts_give_two_windows() {
        assert_eq!(windows(10, 7), vec![0..7, 3..10]);
    }

    #[test]
    fn short_chunk_is_one_window() {
        assert_eq!(windows(5, 7), vec![0..5]);
        assert_eq!(windows(7, 7), vec![0..7]);
    }

    #[test]
    fn trailing_facts_do_not_add_a_window() {
        assert_eq!(windows(8, 7), vec![0..7]);
        assert_eq!(windows(9, 7), vec![0..7]);
        assert_eq!(windows(11, 7), vec![0..7, 3..10]);
    }

    #[test]
    fn empty_input() {
        assert!(windows(0, 7).is_empty());
        assert!(windows(4, 0).is_empty());
    }

    proptest! {
        #[test]
        fn windows_follow_the_stride(n in 1usize..200, w in 1usize..20) {
            let ws = windows(n, w);
            prop_assert!(!ws.is_empty());
            let size = w.min(n);
            let stride = (size / 2).max(1);
            prop_assert_eq!(ws.len(), (n - size) / stride + 1);
            for (i, r) in ws.iter().enumerate() {
                prop_assert_eq!(r.start, i * stride);
                prop_assert_eq!(r.len(), size);
                prop_assert!(r.end <= n);
            }
            // the last window leaves fewer than a stride of facts uncovered
            prop_assert!(n - ws[ws.len() - 1].end < stride);
        }

        #[test]
        fn windows_start_in_order(n in 1usize..200, w in 1usize..20) {
            let ws = windows(n, w);
            for pair in ws.windows(2) {
                prop_assert!(pair[0].start < pair[1].start);
            }
        }
    }
}
