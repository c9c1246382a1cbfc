// SPDX-License-Identifier: Apache-2.0

//! Protocol-level constants, bit-exact with RFC 9002 and RFC 9000 §16.
//!
//! These are the engine's only "configuration": there is no file or
//! environment-variable surface, only these compile-time knobs plus the
//! per-path values threaded in through constructor/setter arguments
//! (`max_udp_payload_size`, `max_ack_delay`, `max_idle_timeout`,
//! `ack_delay_exponent`, initial RTT).

use core::time::Duration;

/// RFC 9002 §6.1.1: number of packets that must be acknowledged above a
/// given packet before it is considered lost by the packet-threshold rule.
pub const PKT_THR: u64 = 3;

/// RFC 9002 §6.1.2: the smallest unit of time the loss timer reasons about.
/// Sub-millisecond deltas are not worth scheduling a wakeup for.
pub const TIME_GRANULARITY: Duration = Duration::from_millis(1);

/// RFC 9002 §7.6.2: multiplier applied to the PTO period to get the
/// persistent congestion duration.
pub const PERSISTENT_CONGESTION_THR: u32 = 3;

/// Number of pending ack-eliciting receipts allowed to accumulate at the
/// application level before an ACK must be flushed immediately.
pub const MAX_ACK_GAP: u32 = 2;

/// Capacity of the receive-set's `{gap, range}` array. Overflow forces an
/// eager ACK flush rather than unbounded growth.
pub const MAX_RANGES: usize = 32;

/// RFC 9002 §6.1.2 / Appendix A.3: time-threshold multiplier, expressed as
/// a fraction to keep the arithmetic in integer microseconds.
pub const TIME_THRESHOLD_NUMERATOR: u32 = 9;
pub const TIME_THRESHOLD_DENOMINATOR: u32 = 8;

/// RFC 9002 Appendix A: RTT estimator weighted-average shift amounts.
pub const RTT_ALPHA_SHIFT: u32 = 3; // 1/8 gain on smoothed_rtt
pub const RTT_BETA_SHIFT: u32 = 2; // 1/4 gain on rttvar

/// RFC 9002 §6.2.2: the initial RTT used before any sample has been taken.
pub const DEFAULT_INITIAL_RTT: Duration = Duration::from_millis(333);

/// RFC 9002 §5.8: floor under which an RTT sample is not trusted.
pub const MIN_RTT: Duration = Duration::from_micros(1);

/// RFC 9002 §7.6.2: the `pto_count` at which PTO backoff stops increasing
/// the bound used for persistent congestion (the duration calculation
/// itself does not consult `pto_count`; this exists purely as a documented
/// anchor for callers that cap probe backoff independently).
pub const MAX_PTO_BACKOFF_SHIFT: u32 = 24;
