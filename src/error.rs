// SPDX-License-Identifier: Apache-2.0

//! Transport-level error values returned by the recovery engine.
//!
//! No heap allocation, no `std::error::Error` impl: callers map this
//! straight onto a CONNECTION_CLOSE frame.

use core::fmt;

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# 20.1.  Transport Error Codes
//#
//#    QUIC error codes are 62-bit unsigned integers.

/// A transport-level error, optionally scoped to the frame type that
/// triggered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportError {
    pub code: u64,
    pub frame_type: Option<u64>,
    pub reason: &'static str,
}

impl TransportError {
    /// Creates a new `TransportError` with the given code and reason.
    pub const fn new(code: u64, reason: &'static str) -> Self {
        Self {
            code,
            reason,
            frame_type: None,
        }
    }

    /// Attaches the frame type that was being processed when this error
    /// occurred.
    pub const fn with_frame_type(mut self, frame_type: u64) -> Self {
        self.frame_type = Some(frame_type);
        self
    }

    /// Overrides the reason string.
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "TransportError({})", self.code)
        } else {
            f.write_str(self.reason)
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TransportError {}

macro_rules! def_error {
    ($doc:expr, $name:ident, $code:expr) => {
        impl TransportError {
            #[doc = $doc]
            pub const $name: TransportError = TransportError::new($code, "");
        }
    };
}

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# INTERNAL_ERROR (0x1):  The endpoint encountered an internal error and
//#    cannot continue with the connection.
def_error!(
    "The endpoint encountered an internal error and cannot continue with the connection.",
    INTERNAL_ERROR,
    0x1
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# PROTOCOL_VIOLATION (0xA):  An endpoint detected an error with protocol
//#    compliance that was not covered by more specific error codes.
def_error!(
    "An endpoint detected an error with protocol compliance that was not covered by a more specific error code.",
    PROTOCOL_VIOLATION,
    0xA
);

//= https://www.rfc-editor.org/rfc/rfc9000#section-20.1
//# FRAME_ENCODING_ERROR (0x7):  An endpoint received a frame that was
//#    badly formatted.
def_error!(
    "An endpoint received a frame that was badly formatted.",
    FRAME_ENCODING_ERROR,
    0x7
);

pub type Result<T> = core::result::Result<T, TransportError>;
