use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Host time source shared by the control core and its collaborators.
///
/// - now(): current host time in seconds (the same time base the motion plan
///   and the primary extruder use for `distance_at`)
/// - sleep(): sleeps for the provided duration (implementations may simulate)
pub trait Clock {
    fn now(&self) -> f64;
    fn sleep(&self, d: Duration);

    /// Seconds elapsed since `epoch`, saturating at 0 when time runs backwards.
    fn secs_since(&self, epoch: f64) -> f64 {
        (self.now() - epoch).max(0.0)
    }
}

/// Real-time monotonic clock; time 0.0 is the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time is advanced manually.
///
/// now() = offset
/// sleep(d) advances internal time by d without actually sleeping.
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    offset: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: f64) {
        if let Ok(mut off) = self.offset.lock() {
            *off += secs.max(0.0);
        }
    }

    /// Set the absolute time in seconds.
    pub fn set(&self, secs: f64) {
        if let Ok(mut off) = self.offset.lock() {
            *off = secs;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.offset.lock().map(|g| *g).unwrap_or(0.0)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d.as_secs_f64());
    }
}
