// SPDX-License-Identifier: Apache-2.0

use crate::time::timestamp::Timestamp;
use core::time::Duration;

/// A source of [`Timestamp`]s.
pub trait Clock {
    /// Returns the current [`Timestamp`].
    fn get_time(&self) -> Timestamp;
}

/// A clock that always reports a timestamp of 1us. Useful for tests that
/// don't care about wall-clock progression.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClock;

impl Clock for NoopClock {
    fn get_time(&self) -> Timestamp {
        unsafe { Timestamp::from_duration(Duration::from_micros(1)) }
    }
}

#[cfg(feature = "std")]
mod std_clock {
    use super::*;
    use std::time::Instant;

    #[derive(Clone, Copy, Debug)]
    pub struct StdClock {
        epoch: Instant,
    }

    impl Default for StdClock {
        fn default() -> Self {
            Self {
                epoch: Instant::now(),
            }
        }
    }

    impl StdClock {
        /// Creates a new `StdClock` with the given epoch.
        pub const fn new(epoch: Instant) -> Self {
            Self { epoch }
        }
    }

    impl Clock for StdClock {
        fn get_time(&self) -> Timestamp {
            unsafe { Timestamp::from_duration(self.epoch.elapsed()) }
        }
    }

    #[test]
    fn monotonicity_test() {
        let clock = StdClock::default();
        let ts1 = clock.get_time();
        std::thread::sleep(Duration::from_millis(50));
        let ts2 = clock.get_time();
        assert!(ts2 - ts1 >= Duration::from_millis(50));
    }
}

#[cfg(feature = "std")]
pub use std_clock::*;

/// A steppable clock for deterministic tests, mirroring production's
/// `StdClock` without depending on wall-clock time.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::{Duration, Timestamp};

    #[derive(Clone, Copy, Debug)]
    pub struct Clock {
        current_timestamp: Timestamp,
    }

    impl Default for Clock {
        fn default() -> Self {
            Self {
                current_timestamp: unsafe { Timestamp::from_duration(Duration::from_micros(1)) },
            }
        }
    }

    impl super::Clock for Clock {
        fn get_time(&self) -> Timestamp {
            self.current_timestamp
        }
    }

    impl Clock {
        pub fn inc_by(&mut self, duration: Duration) {
            self.current_timestamp += duration
        }
    }
}
