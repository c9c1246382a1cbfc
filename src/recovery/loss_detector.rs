// SPDX-License-Identifier: Apache-2.0

//! The packet-threshold and time-threshold loss rules of RFC 9002 §6.1,
//! plus the persistent-congestion trigger of §7.6.2.
//!
//! Detection is structured as collect-then-apply: this module only
//! decides which packet numbers are lost; the caller removes them from
//! the ledger and runs the retransmission policy in a second pass. This
//! avoids mutating the same list the walk below is reading.

use crate::{
    constants::{
        PERSISTENT_CONGESTION_THR, PKT_THR, TIME_GRANULARITY, TIME_THRESHOLD_DENOMINATOR,
        TIME_THRESHOLD_NUMERATOR,
    },
    recovery::{
        persistent_congestion::{self, LostWindow, SettledWindow},
        rtt_estimator::RttEstimator,
    },
    sent::SendContext,
    time::Timestamp,
};
use alloc::vec::Vec;
use core::time::Duration;

/// The result of one loss-detection pass over a single level's ledger.
#[derive(Debug, Default)]
pub struct LossOutcome {
    /// Packet numbers declared lost, in ascending order.
    pub lost_pnums: Vec<u64>,
    pub oldest_lost: Option<Timestamp>,
    pub newest_lost: Option<Timestamp>,
    pub persistent_congestion: bool,
}

pub struct LossDetector;

impl LossDetector {
    /// The RFC 9002 §6.1.2 time threshold: `9/8 * max(latest_rtt,
    /// smoothed_rtt)`, floored at [`TIME_GRANULARITY`].
    pub fn time_threshold(rtt: &RttEstimator) -> Duration {
        let base = rtt.latest_rtt().max(rtt.smoothed_rtt());
        let scaled = (base * TIME_THRESHOLD_NUMERATOR) / TIME_THRESHOLD_DENOMINATOR;
        scaled.max(TIME_GRANULARITY)
    }

    /// Walks `ledger` from the head, collecting packet numbers that are
    /// lost under either the packet- or time-threshold rule, and
    /// evaluates whether the loss run constitutes persistent congestion.
    #[allow(clippy::too_many_arguments)]
    pub fn detect(
        ledger: &SendContext,
        rtt: &RttEstimator,
        largest_ack: u64,
        now: Timestamp,
        settled: Option<SettledWindow>,
        max_ack_delay: Duration,
    ) -> LossOutcome {
        let thr = Self::time_threshold(rtt);
        let mut outcome = LossOutcome::default();
        let mut persistent_congestion_count = 0usize;

        for record in ledger.iter() {
            if record.pnum > largest_ack {
                break;
            }

            let packet_lost_time = record.send_time + thr;
            let time_threshold_exceeded = packet_lost_time.has_elapsed(now);
            let packet_threshold_exceeded = largest_ack - record.pnum >= PKT_THR;

            if !time_threshold_exceeded && !packet_threshold_exceeded {
                // earliest-sent record isn't lost yet; nothing later is either
                break;
            }

            outcome.lost_pnums.push(record.pnum);

            // persistent-congestion accounting only considers records sent
            // after the first RTT sample was drawn; loss declaration itself
            // (the push above) is unconditional.
            let counts_toward_persistent_congestion = rtt
                .first_rtt_sample()
                .map_or(false, |first| record.send_time > first);
            if counts_toward_persistent_congestion {
                outcome.oldest_lost =
                    Some(outcome.oldest_lost.map_or(record.send_time, |t| t.min(record.send_time)));
                outcome.newest_lost =
                    Some(outcome.newest_lost.map_or(record.send_time, |t| t.max(record.send_time)));
                persistent_congestion_count += 1;
            }
        }

        if let (Some(settled), Some(oldest), Some(newest)) =
            (settled, outcome.oldest_lost, outcome.newest_lost)
        {
            let duration = rtt.pto_period(max_ack_delay, TIME_GRANULARITY) * PERSISTENT_CONGESTION_THR;
            let lost_window = LostWindow {
                oldest,
                newest,
                count: persistent_congestion_count,
            };
            outcome.persistent_congestion =
                persistent_congestion::is_persistent_congestion(settled, lost_window, duration);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::FrameKind,
        level::Level,
        time::clock::{Clock, NoopClock},
    };

    fn now() -> Timestamp {
        NoopClock.get_time()
    }

    fn push(ctx: &mut SendContext, pnum: u64, send_time: Timestamp) {
        ctx.push(crate::sent::FrameRecord::new(
            pnum,
            send_time,
            100,
            FrameKind::Other,
            Level::Application,
        ));
    }

    #[test]
    fn packet_threshold_declares_loss_without_waiting_for_time() {
        let mut ctx = SendContext::new();
        let t0 = now();
        for i in 0..6 {
            push(&mut ctx, i, t0);
        }
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_rtt(Duration::ZERO, Duration::from_millis(10), t0);

        // largest_ack = 5, so packet 0,1,2 are >= PKT_THR(3) behind
        let outcome = LossDetector::detect(&ctx, &rtt, 5, t0, None, Duration::from_millis(25));
        assert_eq!(outcome.lost_pnums, alloc::vec![0, 1, 2]);
    }

    #[test]
    fn time_threshold_declares_loss_after_waiting() {
        let mut ctx = SendContext::new();
        let t0 = now();
        push(&mut ctx, 0, t0);
        push(&mut ctx, 1, t0 + Duration::from_millis(1));

        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_rtt(Duration::ZERO, Duration::from_millis(10), t0);

        // immediately after sending, packet 0 shouldn't be lost yet
        let outcome = LossDetector::detect(&ctx, &rtt, 1, t0, None, Duration::from_millis(25));
        assert!(outcome.lost_pnums.is_empty());

        // after the time threshold elapses, packet 0 is lost
        let later = t0 + Duration::from_millis(100);
        let outcome = LossDetector::detect(&ctx, &rtt, 1, later, None, Duration::from_millis(25));
        assert_eq!(outcome.lost_pnums, alloc::vec![0]);
    }

    #[test]
    fn stops_at_first_not_yet_lost_record() {
        let mut ctx = SendContext::new();
        let t0 = now();
        push(&mut ctx, 0, t0);
        push(&mut ctx, 1, t0 + Duration::from_millis(50));

        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update_rtt(Duration::ZERO, Duration::from_millis(10), t0);

        let later = t0 + Duration::from_millis(13);
        let outcome = LossDetector::detect(&ctx, &rtt, 1, later, None, Duration::from_millis(25));
        // record 0 exceeds the time threshold (9/8 * 10ms ~= 11.25ms) but
        // record 1 hasn't, and since it wasn't sent long enough ago it stops there
        assert!(outcome.lost_pnums.contains(&0));
    }
}
