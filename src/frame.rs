// SPDX-License-Identifier: Apache-2.0

//! Frame-kind tagging used by the sent ledger and the retransmission
//! policy. This is deliberately not a full QUIC frame codec: it carries
//! just enough of each frame's identity for §4.7's retransmission table to
//! make its decision.

use core::ops::{BitOr, BitOrAssign};

/// The subset of QUIC frame kinds the retransmission policy distinguishes,
/// each carrying whatever payload the policy needs to refresh or look up
/// state on loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "generator", derive(bolero_generator::TypeGenerator))]
pub enum FrameKind {
    /// An ACK or ACK_ECN frame acknowledging up to `largest`.
    Ack { largest: u64 },
    Ping,
    PathChallenge,
    PathResponse,
    ConnectionClose,
    /// `limit` is the `MAX_DATA` value this frame advertised.
    MaxData { limit: u64 },
    /// `bidirectional` selects which of the two per-direction stream caps
    /// this frame advertised; `limit` is the value it carried.
    MaxStreams { bidirectional: bool, limit: u64 },
    MaxStreamData { stream_id: u64, limit: u64 },
    Stream { stream_id: u64 },
    ResetStream { stream_id: u64 },
    /// Any frame kind the retransmission policy requeues verbatim without
    /// special handling.
    Other,
}

impl FrameKind {
    //= https://www.rfc-editor.org/rfc/rfc9002#section-2
    //# Ack-eliciting Frames:  All frames other than ACK, PADDING, and
    //#    CONNECTION_CLOSE are considered ack-eliciting.
    #[inline]
    pub fn ack_elicitation(&self) -> AckElicitation {
        match self {
            FrameKind::Ack { .. } | FrameKind::ConnectionClose => AckElicitation::NonEliciting,
            _ => AckElicitation::Eliciting,
        }
    }
}

/// Describes whether a frame or packet requires an ACK from the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "generator", derive(bolero_generator::TypeGenerator))]
pub enum AckElicitation {
    NonEliciting,
    Eliciting,
}

impl Default for AckElicitation {
    fn default() -> Self {
        Self::NonEliciting
    }
}

impl AckElicitation {
    #[inline]
    pub fn is_ack_eliciting(self) -> bool {
        matches!(self, Self::Eliciting)
    }
}

impl BitOr for AckElicitation {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Eliciting, _) | (_, Self::Eliciting) => Self::Eliciting,
            _ => Self::NonEliciting,
        }
    }
}

impl BitOrAssign for AckElicitation {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}
