// SPDX-License-Identifier: Apache-2.0

//! Opaque monotonic time, a `Clock` source trait, and a one-shot `Timer`.
//!
//! Mirrors the split used throughout the recovery engine: `Timestamp` is an
//! opaque point in time sourced from a single clock, `Clock` abstracts how
//! that point is obtained (wall clock in production, a steppable fake in
//! tests), and `Timer` is a reusable single-deadline alarm that components
//! poll rather than block on.

mod clock;
mod timer;
mod timestamp;

pub use clock::*;
pub use timer::Timer;
pub use timestamp::Timestamp;
