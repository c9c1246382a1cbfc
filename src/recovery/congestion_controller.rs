// SPDX-License-Identifier: Apache-2.0

//! A NewReno-style congestion controller: slow start, congestion
//! avoidance, loss-triggered recovery, and persistent-congestion collapse
//! (RFC 9002 §7).

use crate::time::Timestamp;
use core::time::Duration;

/// Whether the caller should be notified that send capacity opened up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CongestionEvent {
    pub unblocked: bool,
}

/// A single NewReno congestion window shared across all encryption levels
/// of a path.
#[derive(Clone, Copy, Debug)]
pub struct CongestionController {
    window: u64,
    ssthresh: Option<u64>,
    in_flight: u64,
    recovery_start: Timestamp,
    max_udp_payload_size: u32,
}

impl CongestionController {
    /// Creates a controller with the RFC 9002 §7.2 initial window and no
    /// active recovery epoch.
    pub fn new(max_udp_payload_size: u32, now: Timestamp) -> Self {
        Self {
            window: 2 * max_udp_payload_size as u64,
            ssthresh: None,
            in_flight: 0,
            recovery_start: now,
            max_udp_payload_size,
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn ssthresh(&self) -> Option<u64> {
        self.ssthresh
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight
    }

    pub fn recovery_start(&self) -> Timestamp {
        self.recovery_start
    }

    pub fn is_congestion_blocked(&self) -> bool {
        self.in_flight >= self.window
    }

    fn min_window(&self) -> u64 {
        2 * self.max_udp_payload_size as u64
    }

    /// Accounts for a newly sent congestion-controlled packet.
    pub fn on_packet_sent(&mut self, plen: u32) {
        self.in_flight += u64::from(plen);
    }

    /// Applies an acknowledgement for a congestion-controlled frame.
    ///
    /// Returns whether the caller was previously blocked on congestion
    /// window and has now been unblocked, so it can post a send
    /// opportunity.
    pub fn on_ack(
        &mut self,
        plen: u32,
        send_time: Timestamp,
        pnum: u64,
        rst_pnum: u64,
        now: Timestamp,
        max_idle_timeout: Duration,
    ) -> CongestionEvent {
        if plen == 0 || pnum < rst_pnum {
            return CongestionEvent { unblocked: false };
        }

        let was_blocked = self.is_congestion_blocked();
        self.in_flight = self.in_flight.saturating_sub(u64::from(plen));

        if send_time <= self.recovery_start {
            // still within the current recovery epoch: window frozen
        } else if self.ssthresh.map_or(true, |ssthresh| self.window < ssthresh) {
            //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.1
            //# While a sender is in slow start, the congestion window
            //# increases by the number of bytes acknowledged when each
            //# acknowledgment is processed.
            self.window += u64::from(plen);
            #[cfg(feature = "tracing")]
            tracing::trace!(window = self.window, "slow_start");
        } else {
            //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.2
            //# cwnd = cwnd + max_datagram_size * bytes_acked / cwnd
            let increase =
                (u64::from(self.max_udp_payload_size) * u64::from(plen)) / self.window.max(1);
            self.window += increase.max(1);
            #[cfg(feature = "tracing")]
            tracing::trace!(window = self.window, "congestion_avoidance");
        }

        self.guard_recovery_start_wraparound(now, max_idle_timeout);

        CongestionEvent {
            unblocked: was_blocked && !self.is_congestion_blocked(),
        }
    }

    /// Applies a loss for a congestion-controlled frame. Opens a new
    /// recovery epoch only if this loss is more recent than the current
    /// one (losses already inside the current epoch don't re-halve the
    /// window).
    pub fn on_packet_lost(&mut self, plen: u32, send_time: Timestamp, rst_pnum_owner: u64, pnum: u64) {
        if plen == 0 || pnum < rst_pnum_owner {
            return;
        }

        self.in_flight = self.in_flight.saturating_sub(u64::from(plen));

        if send_time > self.recovery_start {
            //= https://www.rfc-editor.org/rfc/rfc9002#section-7.3.2
            //# When a loss is detected, ... the sender MUST set the
            //# slow start threshold to half the value of the congestion
            //# window when the loss is detected.
            self.recovery_start = send_time;
            self.window = (self.window / 2).max(self.min_window());
            self.ssthresh = Some(self.window);
            #[cfg(feature = "tracing")]
            tracing::debug!(window = self.window, ssthresh = self.window, "loss_recovery");
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9002#section-7.6.2
    //# When persistent congestion is declared, the sender's congestion
    //# window MUST be reduced to the minimum congestion window
    //# (kMinimumWindow), similar to a TCP sender's response on an RTO.
    pub fn on_persistent_congestion(&mut self, now: Timestamp) {
        self.recovery_start = now;
        self.window = self.min_window();
        #[cfg(feature = "tracing")]
        tracing::debug!(window = self.window, "persistent_congestion");
    }

    /// `recovery_start` is set from `send_time`s, which never exceed
    /// `now`; this guards the (practically unreachable) case where a
    /// clock source makes that comparison saturate oddly across an idle
    /// period, keeping the epoch boundary sane.
    fn guard_recovery_start_wraparound(&mut self, now: Timestamp, max_idle_timeout: Duration) {
        if let Some(floor) = now.checked_sub(max_idle_timeout * 2) {
            if self.recovery_start < floor {
                self.recovery_start = floor;
            }
        }
    }
}
