// SPDX-License-Identifier: Apache-2.0

//! The per-level sent-frame ledger: an ordered, append-only-at-the-tail
//! queue of in-flight frames, plus the bookkeeping a send context needs
//! (next packet number, largest acknowledged).

use crate::{frame::FrameKind, level::Level, time::Timestamp};
use alloc::collections::VecDeque;

/// A single frame admitted to the wire, tracked until it is acknowledged
/// or declared lost.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRecord {
    pub pnum: u64,
    pub send_time: Timestamp,
    /// On-wire bytes counted toward `in_flight`. Zero for frames that are
    /// not congestion controlled (e.g. PTO probes).
    pub plen: u32,
    pub kind: FrameKind,
    pub level: Level,
    /// True for packets sent outside of normal congestion accounting
    /// (PTO probes): loss/ack of these never touches the window.
    pub ignore_congestion: bool,
}

impl FrameRecord {
    pub fn new(pnum: u64, send_time: Timestamp, plen: u32, kind: FrameKind, level: Level) -> Self {
        Self {
            pnum,
            send_time,
            plen,
            kind,
            level,
            ignore_congestion: false,
        }
    }

    pub fn probe(pnum: u64, send_time: Timestamp, level: Level) -> Self {
        Self {
            pnum,
            send_time,
            plen: 0,
            kind: FrameKind::Ping,
            level,
            ignore_congestion: true,
        }
    }
}

/// Per-level send state: the in-flight frame ledger plus the counters that
/// scope it.
#[derive(Debug, Default)]
pub struct SendContext {
    ledger: VecDeque<FrameRecord>,
    pnum: u64,
    largest_ack: Option<u64>,
    /// Packet numbers strictly below this were sent before the last key
    /// update at this level and are excluded from congestion accounting.
    pub rst_pnum: u64,
}

impl SendContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates and returns the next packet number at this level.
    pub fn next_pnum(&mut self) -> u64 {
        let pn = self.pnum;
        self.pnum += 1;
        pn
    }

    pub fn pnum(&self) -> u64 {
        self.pnum
    }

    pub fn largest_ack(&self) -> Option<u64> {
        self.largest_ack
    }

    /// Updates `largest_ack`, enforcing the monotonic-non-decreasing
    /// invariant.
    pub fn update_largest_ack(&mut self, largest: u64) {
        self.largest_ack = Some(self.largest_ack.map_or(largest, |prev| prev.max(largest)));
    }

    pub fn push(&mut self, record: FrameRecord) {
        debug_assert!(
            self.ledger.back().map(|r| r.pnum < record.pnum).unwrap_or(true),
            "frame records must be appended in strictly increasing packet-number order"
        );
        self.ledger.push_back(record);
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    pub fn head(&self) -> Option<&FrameRecord> {
        self.ledger.front()
    }

    pub fn tail(&self) -> Option<&FrameRecord> {
        self.ledger.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameRecord> {
        self.ledger.iter()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    /// Removes every record whose packet number falls in `[min, max]` and
    /// returns them in ascending order. Used by range settlement.
    pub fn drain_range(&mut self, min: u64, max: u64) -> alloc::vec::Vec<FrameRecord> {
        let mut drained = alloc::vec::Vec::new();
        self.ledger.retain(|r| {
            if r.pnum >= min && r.pnum <= max {
                drained.push(r.clone());
                false
            } else {
                true
            }
        });
        drained
    }

    /// Removes the records at the given packet numbers (used by loss
    /// detection's collect-then-apply second pass) and returns them.
    pub fn remove_pnums(&mut self, pnums: &[u64]) -> alloc::vec::Vec<FrameRecord> {
        let mut removed = alloc::vec::Vec::new();
        self.ledger.retain(|r| {
            if pnums.contains(&r.pnum) {
                removed.push(r.clone());
                false
            } else {
                true
            }
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::clock::{Clock, NoopClock};

    fn rec(pnum: u64) -> FrameRecord {
        FrameRecord::new(pnum, NoopClock.get_time(), 100, FrameKind::Other, Level::Application)
    }

    #[test]
    fn push_and_iterate_in_order() {
        let mut ctx = SendContext::new();
        for i in 0..5 {
            ctx.push(rec(i));
        }
        let pnums: alloc::vec::Vec<u64> = ctx.iter().map(|r| r.pnum).collect();
        assert_eq!(pnums, alloc::vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn drain_range_removes_and_returns_matching() {
        let mut ctx = SendContext::new();
        for i in 0..10 {
            ctx.push(rec(i));
        }
        let drained = ctx.drain_range(2, 5);
        assert_eq!(drained.len(), 4);
        assert_eq!(ctx.len(), 6);
    }

    #[test]
    fn largest_ack_is_monotonic() {
        let mut ctx = SendContext::new();
        ctx.update_largest_ack(5);
        ctx.update_largest_ack(3);
        assert_eq!(ctx.largest_ack(), Some(5));
        ctx.update_largest_ack(9);
        assert_eq!(ctx.largest_ack(), Some(9));
    }
}
