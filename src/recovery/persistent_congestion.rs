// SPDX-License-Identifier: Apache-2.0

//! Persistent-congestion detection (RFC 9002 §7.6.2), decided in favor of
//! the disjointness test over a contiguous-loss-period tracker: it is
//! evaluated once per loss-detection pass against the window the *latest*
//! ACK settled, which is the natural unit of work for an engine that
//! settles one ACK at a time.

use crate::time::Timestamp;
use core::time::Duration;

/// The span of send times covered by frames settled by the most recent
/// ACK, used as one side of the disjointness test.
#[derive(Clone, Copy, Debug)]
pub struct SettledWindow {
    pub oldest: Timestamp,
    pub newest: Timestamp,
}

/// The span of send times covered by packets declared lost in the current
/// loss-detection pass.
#[derive(Clone, Copy, Debug)]
pub struct LostWindow {
    pub oldest: Timestamp,
    pub newest: Timestamp,
    pub count: usize,
}

//= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.2
//# A sender determines that persistent congestion is established by
//# finding two ack-eliciting packets that are adjacent in packet
//# number, ... A persistent congestion period is defined as a sequence
//# of packets sent across an interval of at least congestion_period
//# that either all are declared lost or are too old to be acknowledged.
///
/// Returns true if the lost window and the latest settled window are
/// disjoint in time (the entire lost run falls outside what the most
/// recent ACK actually covered) and the lost run spans at least
/// `duration`.
pub fn is_persistent_congestion(
    settled: SettledWindow,
    lost: LostWindow,
    duration: Duration,
) -> bool {
    if lost.count < 2 {
        return false;
    }

    let disjoint = lost.newest < settled.oldest || lost.oldest > settled.newest;
    if !disjoint {
        return false;
    }

    lost.newest.saturating_duration_since(lost.oldest) > duration
}
