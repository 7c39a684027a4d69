use crate::config::ConfigError;

/// Evenly spaced time points from `start` to `stop`.
///
/// Point `i` is `start + i * interval`, except the last point, which is
/// `stop` exactly. When the span is not a whole number of intervals the
/// last interval is shorter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputGrid {
    start: f64,
    stop: f64,
    interval: f64,
    intervals: usize,
}

impl OutputGrid {
    /// # Errors
    ///
    /// Returns an error if `stop` is not after `start` or `interval` is not
    /// positive.
    pub fn new(start: f64, stop: f64, interval: f64) -> Result<Self, ConfigError> {
        if !start.is_finite() {
            return Err(ConfigError::StartTime);
        }
        if !stop.is_finite() || stop <= start {
            return Err(ConfigError::StopTime);
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(ConfigError::OutputInterval);
        }

        // Absorb rounding in the ratio so that 5.0 / 0.01 yields 500 intervals.
        let ratio = (stop - start) / interval;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let intervals = ((ratio - 1e-9 * ratio.max(1.0)).ceil() as usize).max(1);

        Ok(Self {
            start,
            stop,
            interval,
            intervals,
        })
    }

    /// Number of points, both ends included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.intervals + 1
    }

    /// A grid always has at least its two end points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn interval(&self) -> f64 {
        self.interval
    }

    #[must_use]
    pub fn start(&self) -> f64 {
        self.start
    }

    #[must_use]
    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Time of point `index`, clamped to the last point.
    #[must_use]
    pub fn time(&self, index: usize) -> f64 {
        if index >= self.intervals {
            self.stop
        } else {
            #[allow(clippy::cast_precision_loss)]
            let offset = index as f64 * self.interval;
            self.start + offset
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(|i| self.time(i))
    }

    /// Tolerance below which two grid times are the same point.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        1e-9 * self.interval.min(1.0)
    }
}
