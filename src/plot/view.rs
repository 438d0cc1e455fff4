use crate::media::TimeRange;

/// Visible slice of the time axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub time_min_sec: f64,
    pub time_max_sec: f64,
    /// End of the data; the window never scrolls past it.
    pub data_max_sec: f64,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            time_min_sec: 0.0,
            time_max_sec: 10.0,
            data_max_sec: 0.0,
        }
    }
}

impl TimeWindow {
    pub fn width(&self) -> f64 {
        self.time_max_sec - self.time_min_sec
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.time_min_sec, self.time_max_sec)
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.time_min_sec && time <= self.time_max_sec
    }

    /// Map a normalized x (0..1) to time in seconds
    pub fn x_to_time(&self, x: f64) -> f64 {
        self.time_min_sec + self.width() * x
    }

    /// Map a time in seconds to normalized x (0..1)
    pub fn time_to_x(&self, time: f64) -> f64 {
        let width = self.width();
        if width <= 0.0 {
            return 0.0;
        }
        (time - self.time_min_sec) / width
    }

    pub fn center_on(&mut self, time: f64, width: f64) {
        self.time_min_sec = time - width / 2.0;
        self.time_max_sec = time + width / 2.0;
        self.clamp();
    }

    pub fn pan(&mut self, delta_secs: f64) {
        self.time_min_sec += delta_secs;
        self.time_max_sec += delta_secs;
        self.clamp();
    }

    /// Scale the width around `anchor`; factors below 1 zoom in.
    pub fn zoom(&mut self, factor: f64, anchor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let x = self.time_to_x(anchor);
        let width = (self.width() * factor).max(1e-3);
        self.time_min_sec = anchor - width * x;
        self.time_max_sec = self.time_min_sec + width;
        self.clamp();
    }

    /// `range` grown to `multiplier` times its width around its centre.
    pub fn buffered(&self, multiplier: f64) -> TimeRange {
        let centre = (self.time_min_sec + self.time_max_sec) / 2.0;
        let half = self.width() * multiplier.max(1.0) / 2.0;
        let end = if self.data_max_sec > 0.0 {
            (centre + half).min(self.data_max_sec)
        } else {
            centre + half
        };
        TimeRange::new((centre - half).max(0.0), end)
    }

    fn clamp(&mut self) {
        let width = self.width();
        if self.time_min_sec < 0.0 {
            self.time_min_sec = 0.0;
            self.time_max_sec = width;
        }
        if self.data_max_sec > width && self.time_max_sec > self.data_max_sec {
            self.time_max_sec = self.data_max_sec;
            self.time_min_sec = self.data_max_sec - width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> TimeWindow {
        TimeWindow {
            time_min_sec: 0.0,
            time_max_sec: 10.0,
            data_max_sec: 60.0,
        }
    }

    #[test]
    fn x_round_trips_through_time() {
        let mut w = window();
        w.pan(5.0);
        assert!((w.x_to_time(0.5) - 10.0).abs() < 1e-9);
        assert!((w.time_to_x(10.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn centering_respects_data_bounds() {
        let mut w = window();
        w.center_on(1.0, 10.0);
        assert_eq!((w.time_min_sec, w.time_max_sec), (0.0, 10.0));
        w.center_on(58.0, 10.0);
        assert_eq!((w.time_min_sec, w.time_max_sec), (50.0, 60.0));
    }

    #[test]
    fn zoom_keeps_anchor_in_place() {
        let mut w = window();
        w.pan(10.0);
        w.zoom(0.5, 12.0);
        assert!((w.time_to_x(12.0) - 0.2).abs() < 1e-9);
        assert!((w.width() - 5.0).abs() < 1e-9);
    }
}
