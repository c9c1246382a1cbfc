// SPDX-License-Identifier: Apache-2.0

//! Per-frame-kind retransmission policy applied when a packet is declared
//! lost (§4.7): some frame kinds are simply discarded, others are
//! refreshed against current state before being requeued.

use crate::{frame::FrameKind, level::Level, sent::FrameRecord};
use alloc::vec::Vec;

/// What to do with a single lost frame record.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Drop the frame; nothing further is sent for it.
    Discard,
    /// Resend exactly the frame that was lost.
    Requeue(FrameRecord),
    /// The ACK's receive-set for this level should force its next flush.
    ForceAckFlush,
}

/// Looks up whatever current-state value a refreshed frame needs before
/// being requeued. Implemented by the transport layer; the recovery
/// engine only calls through it.
pub trait CurrentLimits {
    /// Current `MAX_DATA` limit to advertise.
    fn max_data(&self) -> u64;
    /// Current per-direction `MAX_STREAMS` limit.
    fn max_streams(&self, bidirectional: bool) -> u64;
    /// Current `MAX_STREAM_DATA` limit for `stream_id`, or `None` if the
    /// stream no longer exists.
    fn max_stream_data(&self, stream_id: u64) -> Option<u64>;
    /// True if the stream is in a reset-sent or reset-received send
    /// state and should not be retransmitted.
    fn stream_is_reset(&self, stream_id: u64) -> bool;
}

/// Decides the retransmission action for one lost frame record.
pub fn decide(record: &FrameRecord, limits: &dyn CurrentLimits) -> Action {
    match record.kind {
        FrameKind::Ack { .. } => {
            if record.level == Level::Application {
                Action::ForceAckFlush
            } else {
                Action::Discard
            }
        }
        FrameKind::Ping | FrameKind::PathChallenge | FrameKind::PathResponse | FrameKind::ConnectionClose => {
            Action::Discard
        }
        FrameKind::MaxData { .. } => {
            let mut refreshed = record.clone();
            refreshed.kind = FrameKind::MaxData { limit: limits.max_data() };
            Action::Requeue(refreshed)
        }
        FrameKind::MaxStreams { bidirectional, .. } => {
            let mut refreshed = record.clone();
            refreshed.kind = FrameKind::MaxStreams {
                bidirectional,
                limit: limits.max_streams(bidirectional),
            };
            Action::Requeue(refreshed)
        }
        FrameKind::MaxStreamData { stream_id, .. } => match limits.max_stream_data(stream_id) {
            Some(limit) => {
                let mut refreshed = record.clone();
                refreshed.kind = FrameKind::MaxStreamData { stream_id, limit };
                Action::Requeue(refreshed)
            }
            None => Action::Discard,
        },
        FrameKind::Stream { stream_id } => {
            if limits.stream_is_reset(stream_id) {
                Action::Discard
            } else {
                Action::Requeue(record.clone())
            }
        }
        FrameKind::ResetStream { .. } | FrameKind::Other => Action::Requeue(record.clone()),
    }
}

/// Applies the retransmission policy to every frame record sharing a lost
/// packet number, returning the frames to requeue and whether the ACK
/// receive-set for `level` must force its next flush.
pub fn apply(records: &[FrameRecord], limits: &dyn CurrentLimits) -> (Vec<FrameRecord>, bool) {
    let mut requeue = Vec::new();
    let mut force_ack_flush = false;

    for record in records {
        match decide(record, limits) {
            Action::Discard => {}
            Action::Requeue(r) => requeue.push(r),
            Action::ForceAckFlush => force_ack_flush = true,
        }
    }

    (requeue, force_ack_flush)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::clock::{Clock, NoopClock};

    struct Limits {
        max_data: u64,
        stream_exists: bool,
        stream_reset: bool,
    }

    impl CurrentLimits for Limits {
        fn max_data(&self) -> u64 {
            self.max_data
        }
        fn max_streams(&self, _bidirectional: bool) -> u64 {
            100
        }
        fn max_stream_data(&self, _stream_id: u64) -> Option<u64> {
            self.stream_exists.then_some(4096)
        }
        fn stream_is_reset(&self, _stream_id: u64) -> bool {
            self.stream_reset
        }
    }

    fn record(kind: FrameKind) -> FrameRecord {
        FrameRecord::new(1, NoopClock.get_time(), 50, kind, Level::Application)
    }

    #[test]
    fn ping_is_discarded() {
        let limits = Limits { max_data: 0, stream_exists: true, stream_reset: false };
        assert_eq!(decide(&record(FrameKind::Ping), &limits), Action::Discard);
    }

    #[test]
    fn ack_at_application_level_forces_flush() {
        let limits = Limits { max_data: 0, stream_exists: true, stream_reset: false };
        assert_eq!(
            decide(&record(FrameKind::Ack { largest: 9 }), &limits),
            Action::ForceAckFlush
        );
    }

    #[test]
    fn max_stream_data_discarded_when_stream_gone() {
        let limits = Limits { max_data: 0, stream_exists: false, stream_reset: false };
        assert_eq!(
            decide(&record(FrameKind::MaxStreamData { stream_id: 4, limit: 10 }), &limits),
            Action::Discard
        );
    }

    #[test]
    fn max_stream_data_refreshed_to_current_limit_when_requeued() {
        let limits = Limits { max_data: 0, stream_exists: true, stream_reset: false };
        let action = decide(&record(FrameKind::MaxStreamData { stream_id: 4, limit: 10 }), &limits);
        match action {
            Action::Requeue(r) => assert_eq!(r.kind, FrameKind::MaxStreamData { stream_id: 4, limit: 4096 }),
            other => panic!("expected Requeue, got {other:?}"),
        }
    }

    #[test]
    fn max_data_refreshed_to_current_limit_when_requeued() {
        let limits = Limits { max_data: 777, stream_exists: true, stream_reset: false };
        let action = decide(&record(FrameKind::MaxData { limit: 10 }), &limits);
        match action {
            Action::Requeue(r) => assert_eq!(r.kind, FrameKind::MaxData { limit: 777 }),
            other => panic!("expected Requeue, got {other:?}"),
        }
    }

    #[test]
    fn max_streams_refreshed_to_current_limit_when_requeued() {
        let limits = Limits { max_data: 0, stream_exists: true, stream_reset: false };
        let action = decide(&record(FrameKind::MaxStreams { bidirectional: true, limit: 10 }), &limits);
        match action {
            Action::Requeue(r) => {
                assert_eq!(r.kind, FrameKind::MaxStreams { bidirectional: true, limit: 100 })
            }
            other => panic!("expected Requeue, got {other:?}"),
        }
    }

    #[test]
    fn stream_discarded_when_reset() {
        let limits = Limits { max_data: 0, stream_exists: true, stream_reset: true };
        assert_eq!(
            decide(&record(FrameKind::Stream { stream_id: 4 }), &limits),
            Action::Discard
        );
    }

    #[test]
    fn stream_requeued_when_not_reset() {
        let limits = Limits { max_data: 0, stream_exists: true, stream_reset: false };
        assert!(matches!(
            decide(&record(FrameKind::Stream { stream_id: 4 }), &limits),
            Action::Requeue(_)
        ));
    }

    #[test]
    fn other_kinds_requeue_verbatim() {
        let limits = Limits { max_data: 0, stream_exists: true, stream_reset: false };
        assert!(matches!(decide(&record(FrameKind::Other), &limits), Action::Requeue(_)));
    }
}
