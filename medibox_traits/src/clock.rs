use chrono::NaiveDateTime;
use std::thread;
use std::time::{Duration, Instant};

/// Clock abstraction shared by the alerting and dispensing paths.
///
/// - now(): monotonic Instant, used for cooldown windows
/// - local_now(): local wall-clock time, used for schedule matching
/// - sleep(): sleeps for the provided duration (implementations may simulate)
pub trait Clock {
    fn now(&self) -> Instant;
    fn local_now(&self) -> NaiveDateTime;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Real-time clock backed by std::time::Instant and the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn local_now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-clock"))]
pub mod test_clock {
    use super::*;
    use chrono::TimeDelta;
    use std::sync::{Arc, Mutex};

    /// Deterministic test clock whose time can be advanced manually.
    ///
    /// now() = origin + offset, local_now() = wall_origin + offset.
    /// sleep(d) advances internal time by d without actually sleeping.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        wall_origin: NaiveDateTime,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self::starting_at(chrono::Local::now().naive_local())
        }

        /// Clock whose wall time starts at `wall`.
        pub fn starting_at(wall: NaiveDateTime) -> Self {
            Self {
                origin: Instant::now(),
                wall_origin: wall,
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Set the absolute offset relative to origin.
        pub fn set_offset(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = d;
            }
        }

        fn offset(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.offset()
        }

        fn local_now(&self) -> NaiveDateTime {
            let delta = TimeDelta::from_std(self.offset()).unwrap_or(TimeDelta::zero());
            self.wall_origin + delta
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }

}
