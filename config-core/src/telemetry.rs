//! Raw sensor telemetry for the configurator's live graph.
//!
//! While streaming, every snapshot from the sampling loop is summed into a
//! [`StreamAccumulator`]. Once per [`STREAM_INTERVAL_MS`] the per-channel means
//! are emitted as one CSV line and the accumulator starts over, giving a
//! fixed-rate stream that does not depend on how fast the loop runs.

use core::fmt::{self, Write};

/// Interval between telemetry lines in milliseconds.
pub const STREAM_INTERVAL_MS: u64 = 10;

/// Raw readings of the four drum sensors at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InputSnapshot {
    pub don_left: u16,
    pub ka_left: u16,
    pub don_right: u16,
    pub ka_right: u16,
}

/// Per-channel means over one streaming interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorAverages {
    pub don_left: u16,
    pub ka_left: u16,
    pub don_right: u16,
    pub ka_right: u16,
}

impl SensorAverages {
    /// Write the averages as one CSV line.
    ///
    /// Column order is `ka_left,don_left,don_right,ka_right`, which is what
    /// the configurator's graph expects.
    pub fn write_csv<W: Write + ?Sized>(&self, out: &mut W) -> fmt::Result {
        writeln!(
            out,
            "{},{},{},{}",
            self.ka_left, self.don_left, self.don_right, self.ka_right
        )
    }
}

/// Running sums for one streaming session.
///
/// Sums and sample count are always cleared together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamAccumulator {
    don_left: u32,
    ka_left: u32,
    don_right: u32,
    ka_right: u32,
    samples: u32,
    last_emit_ms: u64,
}

impl StreamAccumulator {
    /// Start an empty accumulation window at `now_ms`.
    #[must_use]
    pub fn start(now_ms: u64) -> Self {
        Self {
            last_emit_ms: now_ms,
            ..Self::default()
        }
    }

    /// Add one snapshot to the window.
    pub fn push(&mut self, snapshot: &InputSnapshot) {
        self.don_left = self.don_left.saturating_add(snapshot.don_left.into());
        self.ka_left = self.ka_left.saturating_add(snapshot.ka_left.into());
        self.don_right = self.don_right.saturating_add(snapshot.don_right.into());
        self.ka_right = self.ka_right.saturating_add(snapshot.ka_right.into());
        self.samples = self.samples.saturating_add(1);
    }

    /// Number of samples in the current window.
    #[inline]
    #[must_use]
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Close the window if `interval_ms` has elapsed since the last emission.
    ///
    /// Returns the means and restarts the window at `now_ms`. Returns `None`
    /// while the interval is still running, or if the window holds no samples.
    pub fn poll(&mut self, now_ms: u64, interval_ms: u64) -> Option<SensorAverages> {
        if now_ms.saturating_sub(self.last_emit_ms) < interval_ms || self.samples == 0 {
            return None;
        }

        let mean = |sum: u32| (sum / self.samples) as u16;
        let averages = SensorAverages {
            don_left: mean(self.don_left),
            ka_left: mean(self.ka_left),
            don_right: mean(self.don_right),
            ka_right: mean(self.ka_right),
        };

        *self = Self::start(now_ms);
        Some(averages)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::string::String;

    use super::*;

    fn snapshot(don_left: u16, ka_left: u16, don_right: u16, ka_right: u16) -> InputSnapshot {
        InputSnapshot {
            don_left,
            ka_left,
            don_right,
            ka_right,
        }
    }

    #[test]
    fn test_no_emission_before_interval() {
        let mut acc = StreamAccumulator::start(100);
        acc.push(&snapshot(1, 2, 3, 4));
        assert_eq!(acc.poll(100 + STREAM_INTERVAL_MS - 1, STREAM_INTERVAL_MS), None);
        assert_eq!(acc.samples(), 1);
    }

    #[test]
    fn test_emits_means_and_resets() {
        let mut acc = StreamAccumulator::start(0);
        acc.push(&snapshot(100, 10, 1000, 0));
        acc.push(&snapshot(200, 20, 3000, 1));
        acc.push(&snapshot(600, 30, 2000, 1));

        let avg = acc.poll(STREAM_INTERVAL_MS, STREAM_INTERVAL_MS).unwrap();
        assert_eq!(
            avg,
            SensorAverages {
                don_left: 300,
                ka_left: 20,
                don_right: 2000,
                ka_right: 0,
            }
        );
        assert_eq!(acc, StreamAccumulator::start(STREAM_INTERVAL_MS));
    }

    #[test]
    fn test_empty_window_is_skipped() {
        let mut acc = StreamAccumulator::start(0);
        assert_eq!(acc.poll(1000, STREAM_INTERVAL_MS), None);
    }

    #[test]
    fn test_clock_going_backwards_does_not_emit() {
        let mut acc = StreamAccumulator::start(500);
        acc.push(&snapshot(1, 1, 1, 1));
        assert_eq!(acc.poll(10, STREAM_INTERVAL_MS), None);
    }

    #[test]
    fn test_csv_column_order() {
        let avg = SensorAverages {
            don_left: 1,
            ka_left: 2,
            don_right: 3,
            ka_right: 4,
        };
        let mut out = String::new();
        avg.write_csv(&mut out).unwrap();
        assert_eq!(out, "2,1,3,4\n");
    }
}
