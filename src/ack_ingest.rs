// SPDX-License-Identifier: Apache-2.0

//! Decodes the ACK frame's largest/first-range/gap-range series (§4.2)
//! into a validated, descending list of acknowledged ranges.

use crate::{error::TransportError, varint};
use alloc::vec::Vec;
use core::time::Duration;

/// A fully validated, decoded ACK frame: a descending list of `(low,
/// high)` inclusive packet-number ranges, widest (most recent) first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAck {
    pub largest: u64,
    /// Raw `ACK Delay` field value, not yet scaled by the ack delay
    /// exponent.
    pub ack_delay_raw: u64,
    pub ranges: Vec<(u64, u64)>,
}

impl ParsedAck {
    //= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.1
    //# The ACK Delay field in the ACK frame identifies the peer's
    //# delay in processing the largest acknowledged packet... multiplied
    //# by 2 raised to the power of the ack_delay_exponent transport
    //# parameter.
    ///
    /// The peer-reported delay, scaled by the negotiated
    /// `ack_delay_exponent`.
    pub fn ack_delay(&self, ack_delay_exponent: u8) -> Duration {
        let micros = self.ack_delay_raw.saturating_mul(1u64 << ack_delay_exponent.min(63));
        Duration::from_micros(micros)
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# The first ACK Range ... must fall within the bounds that are
//# specified by the Largest Acknowledged and ACK Range Count fields.
///
/// Parses the `(largest, first_range, [gap, range]...)` series. `tail` is
/// whatever wire bytes remain after `first_range` was read; it must
/// contain exactly `range_count` `(gap, range)` varint pairs.
pub fn parse(
    largest: u64,
    ack_delay_raw: u64,
    first_range: u64,
    range_count: u64,
    mut tail: &[u8],
) -> Result<ParsedAck, TransportError> {
    if first_range > largest {
        return Err(TransportError::FRAME_ENCODING_ERROR.with_reason("first_range exceeds largest"));
    }

    let mut ranges = Vec::with_capacity(1 + range_count as usize);
    let top_low = largest - first_range;
    ranges.push((top_low, largest));
    let mut min = top_low;

    for _ in 0..range_count {
        let (gap, rest) = varint::decode(tail)?;
        tail = rest;
        let (range, rest) = varint::decode(tail)?;
        tail = rest;

        if gap + 2 > min {
            return Err(TransportError::FRAME_ENCODING_ERROR.with_reason("ack range gap underflows"));
        }
        let next_largest = min - gap - 2;

        if range > next_largest {
            return Err(TransportError::FRAME_ENCODING_ERROR.with_reason("ack range underflows"));
        }
        let next_low = next_largest - range;

        ranges.push((next_low, next_largest));
        min = next_low;
    }

    Ok(ParsedAck {
        largest,
        ack_delay_raw,
        ranges,
    })
}
