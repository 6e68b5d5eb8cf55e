//! Local time base and conductor clock-offset estimation
//!
//! Every node counts microseconds from its own boot. Performers translate
//! conductor timestamps into local time with a running estimate of
//! `offset = conductor_clock - local_clock`, fed by heartbeats.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic microsecond clock local to one node
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    epoch: Instant,
    bias_us: u64,
}

impl LocalClock {
    pub fn new() -> Self {
        Self::with_bias(0)
    }

    /// A clock that reads `bias_us` ahead of a fresh one
    pub fn with_bias(bias_us: u64) -> Self {
        Self {
            epoch: Instant::now(),
            bias_us,
        }
    }

    pub fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64 + self.bias_us
    }

    /// Milliseconds, truncated to the 32-bit discovery timestamp
    pub fn now_ms(&self) -> u32 {
        (self.now_us() / 1000) as u32
    }

    /// Instant corresponding to a local microsecond reading
    pub fn instant_at(&self, local_us: u64) -> Instant {
        self.epoch + Duration::from_micros(local_us.saturating_sub(self.bias_us))
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponentially smoothed estimate of the conductor clock offset.
///
/// Only the control worker writes; any thread may read.
#[derive(Debug, Default)]
pub struct ClockEstimator {
    offset_us: AtomicI64,
    samples: AtomicU64,
}

impl ClockEstimator {
    /// Weight of the history, out of `SMOOTHING_DENOMINATOR`
    pub const HISTORY_WEIGHT: i128 = 7;
    pub const SMOOTHING_DENOMINATOR: i128 = 8;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one heartbeat: remote reading and the local time it arrived.
    ///
    /// The first sample is taken verbatim; later ones are blended 7/8 history
    /// to 1/8 sample. Returns the updated estimate.
    pub fn observe(&self, remote_us: u64, local_us: u64) -> i64 {
        let raw = clamp_i64(remote_us as i128 - local_us as i128);
        let samples = self.samples.load(Ordering::Acquire);

        let estimate = if samples == 0 {
            raw
        } else {
            let history = self.offset_us.load(Ordering::Acquire) as i128;
            clamp_i64(
                (history * Self::HISTORY_WEIGHT + raw as i128) / Self::SMOOTHING_DENOMINATOR,
            )
        };

        self.offset_us.store(estimate, Ordering::Release);
        self.samples.store(samples + 1, Ordering::Release);

        tracing::trace!("Heartbeat offset sample {} us, estimate {} us", raw, estimate);
        estimate
    }

    /// Current best estimate in microseconds (0 before any heartbeat)
    pub fn offset_us(&self) -> i64 {
        self.offset_us.load(Ordering::Acquire)
    }

    /// Heartbeats folded into the estimate so far
    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::Acquire)
    }

    /// Convert a conductor timestamp to local microseconds
    pub fn to_local_us(&self, remote_us: u64) -> i64 {
        clamp_i64(remote_us as i128 - self.offset_us() as i128)
    }
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}
