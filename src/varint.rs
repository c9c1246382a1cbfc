// SPDX-License-Identifier: Apache-2.0

//! Minimal decoder for the variable-length integer encoding used by the
//! ACK frame's gap/range series.

use crate::error::TransportError;

//= https://www.rfc-editor.org/rfc/rfc9000#section-16
//# The QUIC variable-length integer encoding reserves the two most
//# significant bits of the first byte to encode the base-2 logarithm of
//# the integer encoding length in bytes.

/// Reads one variable-length integer from the front of `buf`, returning the
/// decoded value and the remaining bytes.
pub fn decode(buf: &[u8]) -> Result<(u64, &[u8]), TransportError> {
    let first = *buf
        .first()
        .ok_or_else(|| TransportError::FRAME_ENCODING_ERROR.with_reason("truncated varint"))?;

    let len = 1usize << (first >> 6);
    if buf.len() < len {
        return Err(TransportError::FRAME_ENCODING_ERROR.with_reason("truncated varint"));
    }

    let mut value = u64::from(first & 0x3f);
    for &byte in &buf[1..len] {
        value = (value << 8) | u64::from(byte);
    }

    Ok((value, &buf[len..]))
}

/// The minimal byte length required to encode `value`, or `None` if it
/// exceeds the 62-bit range the encoding supports.
pub fn encoded_len(value: u64) -> Option<usize> {
    match value {
        v if v <= 0x3f => Some(1),
        v if v <= 0x3fff => Some(2),
        v if v <= 0x3fff_ffff => Some(4),
        v if v <= 0x3fff_ffff_ffff_ffff => Some(8),
        _ => None,
    }
}
