// SPDX-License-Identifier: Apache-2.0

//! The combined lost-detection/ack-delay/PTO timer (§4.8): a single
//! deadline per connection, tagged with which handler should run when it
//! fires. Precedence when more than one deadline is a candidate: the lost
//! deadline always wins, then a pending coalesced ACK's deadline, then
//! PTO; callers compute that precedence before calling
//! [`TimerScheduler::arm`].

use crate::time::{Timer, Timestamp};
use core::task::Poll;

/// Which handler a pending deadline should dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmedKind {
    /// Re-run loss detection (§4.4).
    LostDetection,
    /// Flush a deferred coalesced ACK whose `max_ack_delay` elapsed (§4.1).
    AckDelay,
    /// Send PING probes and back off (§4.8 PTO handler).
    ProbeTimeout,
}

#[derive(Debug, Default)]
pub struct TimerScheduler {
    timer: Timer,
    kind: Option<ArmedKind>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, kind: ArmedKind, at: Timestamp) {
        self.timer.set(at);
        self.kind = Some(kind);
    }

    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.kind = None;
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_armed()
    }

    pub fn armed_kind(&self) -> Option<ArmedKind> {
        self.kind
    }

    /// Consumes the deadline if it has passed, returning which handler
    /// should run.
    pub fn poll_expiration(&mut self, now: Timestamp) -> Poll<ArmedKind> {
        match self.timer.poll_expiration(now) {
            Poll::Ready(()) => Poll::Ready(self.kind.take().expect("timer armed implies a kind")),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Given the candidate deadlines computed by the manager for this
    /// tick, arms the timer with whichever takes precedence: a lost
    /// deadline always wins, then a pending ack-delay deadline, then PTO.
    pub fn reschedule(
        &mut self,
        lost: Option<Timestamp>,
        ack_delay: Option<Timestamp>,
        pto: Option<Timestamp>,
    ) {
        match (lost, ack_delay, pto) {
            (Some(at), _, _) => self.arm(ArmedKind::LostDetection, at),
            (None, Some(at), _) => self.arm(ArmedKind::AckDelay, at),
            (None, None, Some(at)) => self.arm(ArmedKind::ProbeTimeout, at),
            (None, None, None) => self.cancel(),
        }
    }
}
