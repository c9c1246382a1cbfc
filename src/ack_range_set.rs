// SPDX-License-Identifier: Apache-2.0

//! The receiver-side record of which packet numbers have arrived at a
//! given encryption level: a capped, sorted set of disjoint inclusive
//! ranges used to synthesize outgoing ACK frames.
//!
//! Internally this keeps plain `RangeInclusive<u64>` entries rather than
//! the wire's gap/range deltas; [`AckRangeSet::to_wire_ranges`] performs
//! the delta conversion only when an ACK is actually being encoded. The
//! two representations describe the same set of packet numbers, so every
//! invariant about the reconstructed set holds regardless of which one is
//! used internally.

use crate::{constants::MAX_RANGES, time::Timestamp};
use alloc::collections::VecDeque;
use core::ops::RangeInclusive;

/// Outcome of recording a newly received packet number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insert {
    /// The packet number was new and recorded. `forced_flush` is set when
    /// the set was already at [`MAX_RANGES`] capacity and recording this
    /// packet number evicted the oldest range — callers must flush the
    /// pending ACK *before* calling `insert` in that case, since once the
    /// evicted range is gone the peer can no longer be told about it.
    Recorded { out_of_order: bool, forced_flush: bool },
    /// The packet number had already been recorded; no state changed.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct AckRangeSet {
    /// Sorted strictly descending, pairwise disjoint, with at least a
    /// one-packet gap between consecutive entries (adjacent ranges are
    /// always merged).
    ranges: VecDeque<RangeInclusive<u64>>,
    /// Highest packet number not yet reflected in a sent ACK.
    pending_ack: Option<u64>,
    /// Count of unacknowledged ack-eliciting receipts since the last
    /// flush; reaching `MAX_ACK_GAP` forces an immediate ACK.
    pub send_ack: u32,
    pub ack_delay_start: Option<Timestamp>,
}

impl AckRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn largest(&self) -> Option<u64> {
        self.ranges.front().map(|r| *r.end())
    }

    pub fn pending_ack(&self) -> Option<u64> {
        self.pending_ack
    }

    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Returns true if `pn` is contained in the recorded set.
    pub fn contains(&self, pn: u64) -> bool {
        self.ranges.iter().any(|r| r.contains(&pn))
    }

    /// True if recording `pn` would require evicting the oldest range to
    /// stay within [`MAX_RANGES`] capacity: the set is already full and
    /// `pn` neither duplicates an existing range nor extends/bridges a
    /// neighbor of one. Callers must flush the current ACK state (so the
    /// peer learns what's about to be evicted) before calling `insert` in
    /// this case — see spec.md's ACK-range-set overflow policy.
    pub fn would_force_flush(&self, pn: u64) -> bool {
        if self.ranges.len() < MAX_RANGES || self.contains(pn) {
            return false;
        }
        !self.has_neighbor(pn)
    }

    fn has_neighbor(&self, pn: u64) -> bool {
        self.ranges
            .iter()
            .any(|r| pn.checked_add(1) == Some(*r.start()) || r.end().checked_add(1) == Some(pn))
    }

    /// Records receipt of `pn`. Returns whether it was new, and if so
    /// whether it arrived out of order (did not simply extend the current
    /// largest range by one) and whether recording it forced an eviction
    /// (see [`Self::would_force_flush`] — callers are expected to have
    /// already flushed in that case).
    ///
    /// When the set is already at [`MAX_RANGES`] capacity and `pn` would
    /// open a new, disjoint range, the oldest (smallest) range is dropped
    /// to bound memory, matching the eager-flush capacity policy: losing
    /// fidelity on very old ranges is acceptable only because dropping
    /// one always coincides with a forced flush of what we still know.
    pub fn insert(&mut self, pn: u64) -> Insert {
        if self.contains(pn) {
            return Insert::Duplicate;
        }

        let forced_flush = self.would_force_flush(pn);
        let prev_largest = self.largest();

        // Find a neighbor immediately above (range.start == pn + 1) and
        // immediately below (range.end == pn - 1) for merge purposes.
        let above_idx = self
            .ranges
            .iter()
            .position(|r| pn.checked_add(1) == Some(*r.start()));
        let below_idx = self
            .ranges
            .iter()
            .position(|r| r.end().checked_add(1) == Some(pn));

        match (above_idx, below_idx) {
            (Some(a), Some(b)) if a != b => {
                // pn bridges two existing ranges: merge them into one.
                let (hi, lo) = if a < b { (a, b) } else { (b, a) };
                let upper = self.ranges[hi].clone();
                let lower = self.ranges[lo].clone();
                self.ranges.remove(lo);
                self.ranges.remove(hi);
                self.insert_sorted(*lower.start()..=*upper.end());
            }
            (Some(a), _) => {
                let r = self.ranges[a].clone();
                self.ranges[a] = pn..=*r.end();
            }
            (_, Some(b)) => {
                let r = self.ranges[b].clone();
                self.ranges[b] = *r.start()..=pn;
            }
            (None, None) => {
                if self.ranges.len() >= MAX_RANGES {
                    self.ranges.pop_back();
                }
                self.insert_sorted(pn..=pn);
            }
        }

        let out_of_order = match prev_largest {
            None => false,
            Some(largest) => pn != largest + 1,
        };

        Insert::Recorded { out_of_order, forced_flush }
    }

    fn insert_sorted(&mut self, range: RangeInclusive<u64>) {
        let pos = self
            .ranges
            .iter()
            .position(|r| *r.start() < *range.start())
            .unwrap_or(self.ranges.len());
        self.ranges.insert(pos, range);
    }

    pub fn set_pending_ack(&mut self, pn: u64) {
        self.pending_ack = Some(pn);
    }

    pub fn clear_pending_ack(&mut self) {
        self.pending_ack = None;
    }

    /// Drops all recorded ranges with endpoints `<= largest`, called when
    /// the peer acknowledges an ACK frame we sent covering up to
    /// `largest`.
    pub fn drop_ack_ranges(&mut self, largest: u64) {
        while let Some(back) = self.ranges.back() {
            if *back.end() <= largest {
                self.ranges.pop_back();
            } else if *back.start() <= largest {
                let end = *back.end();
                *self.ranges.back_mut().unwrap() = (largest + 1)..=end;
                break;
            } else {
                break;
            }
        }
    }

    /// Converts the recorded set into the wire's `(largest, first_range,
    /// [(gap, range)])` representation, descending from the top.
    pub fn to_wire_ranges(&self) -> Option<(u64, u64, alloc::vec::Vec<(u64, u64)>)> {
        let mut iter = self.ranges.iter();
        let top = iter.next()?;
        let largest = *top.end();
        let first_range = largest - *top.start();

        let mut gap_ranges = alloc::vec::Vec::new();
        let mut prev_low = *top.start();
        for r in iter {
            let gap = prev_low - *r.end() - 2;
            let range = *r.end() - *r.start();
            gap_ranges.push((gap, range));
            prev_low = *r.start();
        }

        Some((largest, first_range, gap_ranges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_packet_opens_a_range() {
        let mut set = AckRangeSet::new();
        assert_eq!(
            set.insert(5),
            Insert::Recorded { out_of_order: false, forced_flush: false }
        );
        assert_eq!(set.largest(), Some(5));
    }

    #[test]
    fn contiguous_extension_is_in_order() {
        let mut set = AckRangeSet::new();
        set.insert(1);
        assert_eq!(
            set.insert(2),
            Insert::Recorded { out_of_order: false, forced_flush: false }
        );
        assert_eq!(
            set.insert(3),
            Insert::Recorded { out_of_order: false, forced_flush: false }
        );
        assert_eq!(set.range_count(), 1);
    }

    #[test]
    fn out_of_order_receipt_opens_new_range() {
        let mut set = AckRangeSet::new();
        set.insert(1);
        set.insert(3);
        assert_eq!(set.range_count(), 2);
        assert_eq!(set.largest(), Some(3));
    }

    #[test]
    fn gap_fill_merges_adjacent_ranges() {
        let mut set = AckRangeSet::new();
        set.insert(1);
        set.insert(3);
        assert_eq!(set.range_count(), 2);
        set.insert(2);
        assert_eq!(set.range_count(), 1);
        assert!(set.contains(1) && set.contains(2) && set.contains(3));
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut set = AckRangeSet::new();
        set.insert(5);
        assert_eq!(set.insert(5), Insert::Duplicate);
    }

    #[test]
    fn drop_ack_ranges_clips_settled_prefix() {
        let mut set = AckRangeSet::new();
        for pn in [1, 2, 3, 10, 11, 12] {
            set.insert(pn);
        }
        set.drop_ack_ranges(5);
        assert!(!set.contains(1));
        assert!(!set.contains(3));
        assert!(set.contains(10));
        assert!(set.contains(12));
    }

    #[test]
    fn overflow_drops_oldest_range_and_signals_forced_flush() {
        let mut set = AckRangeSet::new();
        // open MAX_RANGES disjoint singleton ranges, two apart so none merge
        for i in 0..MAX_RANGES as u64 {
            assert!(!set.would_force_flush(i * 2));
            set.insert(i * 2);
        }
        assert_eq!(set.range_count(), MAX_RANGES);
        let oldest = 0u64;
        let new_pn = MAX_RANGES as u64 * 2;
        assert!(set.would_force_flush(new_pn));
        let insert = set.insert(new_pn); // a brand-new disjoint range forces a drop
        assert_eq!(
            insert,
            Insert::Recorded { out_of_order: true, forced_flush: true }
        );
        assert_eq!(set.range_count(), MAX_RANGES);
        assert!(!set.contains(oldest));
    }

    #[test]
    fn to_wire_ranges_reconstructs_gap_and_range() {
        let mut set = AckRangeSet::new();
        for pn in [8, 9, 10, 2, 3] {
            set.insert(pn);
        }
        let (largest, first_range, gaps) = set.to_wire_ranges().unwrap();
        assert_eq!(largest, 10);
        assert_eq!(first_range, 2); // covers 8,9,10
        assert_eq!(gaps, alloc::vec![(3, 1)]); // gap of 4..=7 (4 packets -> gap=3), range covers 2,3
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn largest_tracks_the_maximum_inserted_packet_number() {
        bolero::check!()
            .with_type::<alloc::vec::Vec<u16>>()
            .for_each(|pns| {
                if pns.is_empty() {
                    return;
                }

                let mut set = AckRangeSet::new();
                let mut running_max = 0u64;

                for &pn in pns {
                    set.insert(pn as u64);
                    running_max = running_max.max(pn as u64);
                    // dropping the oldest (smallest) range on overflow never
                    // touches the largest range, so this must hold after
                    // every single insert, not just at the end
                    assert_eq!(set.largest(), Some(running_max));
                    assert!(set.range_count() <= MAX_RANGES);
                }
            });
    }
}
