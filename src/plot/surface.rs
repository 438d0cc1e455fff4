use serde::Serialize;

use super::settings::PlotSettings;
use super::view::TimeWindow;
use crate::dataset::{frame_to_time, label_runs, DimensionKind, TrialId};
use crate::events::{AppEvent, CursorSource, StateField};
use crate::media::{MediaUnit, SpectrogramBlock, TimeRange};
use crate::motifs::{MotifId, MotifLibrary, Rgb};

const UNKNOWN_MOTIF_COLOR: Rgb = Rgb {
    r: 128,
    g: 128,
    b: 128,
};

/// Coloured span drawn over the line plot for one labeled run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotifOverlay {
    pub start_time: f64,
    pub end_time: f64,
    pub motif_id: MotifId,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrogramImage {
    pub range: TimeRange,
    pub block: SpectrogramBlock,
}

/// What the surface needs re-read from the dataset before the next draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Refresh {
    pub series: bool,
    pub overlays: bool,
    pub spectrogram: bool,
}

impl Refresh {
    pub fn any(&self) -> bool {
        self.series || self.overlays || self.spectrogram
    }
}

/// Render model for the time-series panel: series, motif overlays,
/// spectrogram, cursor and the latest video frame.
///
/// It reacts to events by marking what is stale; the owner re-reads the
/// dataset and feeds the results back in.
#[derive(Debug, Default)]
pub struct PlotSurface {
    settings: PlotSettings,
    window: TimeWindow,
    trial: Option<TrialId>,
    cursor: f64,
    fps: f64,
    series: Vec<f64>,
    overlays: Vec<MotifOverlay>,
    pending_start: Option<f64>,
    spectrogram: Option<SpectrogramImage>,
    frame: Option<MediaUnit>,
    decode_error: Option<String>,
    stale: Refresh,
    redraw: bool,
}

impl PlotSurface {
    pub fn new(settings: PlotSettings) -> Self {
        let mut surface = Self::default();
        surface.apply_settings(settings);
        surface
    }

    pub fn settings(&self) -> &PlotSettings {
        &self.settings
    }

    pub fn apply_settings(&mut self, settings: PlotSettings) {
        let width = settings.window_secs;
        let centre = self.cursor;
        self.settings = settings;
        self.window.center_on(centre, width);
        self.stale.spectrogram = self.settings.show_spectrogram;
        if !self.settings.show_spectrogram {
            self.spectrogram = None;
        }
        self.redraw = true;
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn trial(&self) -> Option<TrialId> {
        self.trial
    }

    pub fn series(&self) -> &[f64] {
        &self.series
    }

    pub fn overlays(&self) -> &[MotifOverlay] {
        &self.overlays
    }

    pub fn overlay_at(&self, time: f64) -> Option<&MotifOverlay> {
        self.overlays
            .iter()
            .find(|o| time >= o.start_time && time < o.end_time)
    }

    pub fn pending_start(&self) -> Option<f64> {
        self.pending_start
    }

    pub fn spectrogram(&self) -> Option<&SpectrogramImage> {
        self.spectrogram.as_ref()
    }

    pub fn frame(&self) -> Option<&MediaUnit> {
        self.frame.as_ref()
    }

    pub fn decode_error(&self) -> Option<&str> {
        self.decode_error.as_deref()
    }

    pub fn stale(&self) -> Refresh {
        self.stale
    }

    /// Returns and clears the redraw request.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    /// The y range to draw: configured limits where set, data bounds elsewhere.
    pub fn y_limits(&self) -> Option<(f64, f64)> {
        let finite = self.series.iter().copied().filter(|v| v.is_finite());
        let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let lo = self.settings.ymin.unwrap_or(lo);
        let hi = self.settings.ymax.unwrap_or(hi);
        (lo.is_finite() && hi.is_finite() && lo <= hi).then_some((lo, hi))
    }

    /// Range the spectrogram should be computed for around the view.
    pub fn spectrogram_request(&self) -> Option<TimeRange> {
        self.settings
            .show_spectrogram
            .then(|| self.window.buffered(self.settings.buffer_multiplier))
    }

    pub fn handle_event(&mut self, event: &AppEvent) {
        match event {
            AppEvent::CursorMoved {
                trial,
                time,
                source,
            } => {
                if self.trial == Some(*trial) {
                    self.move_cursor(*time, *source);
                }
            }
            AppEvent::LabelsUpdated { trial, .. } => {
                if self.trial == Some(*trial) {
                    self.stale.overlays = true;
                }
            }
            AppEvent::StateChanged { field } => match field {
                StateField::Selection { kind, .. } => {
                    self.stale.series = true;
                    self.stale.overlays = true;
                    if *kind == DimensionKind::Trial || *kind == DimensionKind::Mic {
                        self.spectrogram = None;
                        self.stale.spectrogram = self.settings.show_spectrogram;
                    }
                }
                StateField::PlotSettings => self.redraw = true,
                _ => {}
            },
            AppEvent::DatasetLoaded { trial } => {
                self.trial = *trial;
                self.series.clear();
                self.overlays.clear();
                self.spectrogram = None;
                self.frame = None;
                self.pending_start = None;
                self.cursor = 0.0;
                self.window.center_on(0.0, self.settings.window_secs);
                self.stale = Refresh {
                    series: true,
                    overlays: true,
                    spectrogram: self.settings.show_spectrogram,
                };
                self.redraw = true;
            }
            AppEvent::PlaybackChanged { .. } | AppEvent::UserMessage { .. } => {}
        }
    }

    /// Switch to `trial`, starting at `cursor`.
    pub fn set_trial(&mut self, trial: TrialId, cursor: f64) {
        if self.trial != Some(trial) {
            self.trial = Some(trial);
            self.frame = None;
            self.decode_error = None;
            self.pending_start = None;
        }
        self.cursor = cursor;
        self.window.center_on(cursor, self.settings.window_secs);
        self.redraw = true;
    }

    pub fn set_series(&mut self, series: Vec<f64>, fps: f64) {
        self.fps = fps;
        self.window.data_max_sec = frame_to_time(series.len(), fps);
        self.series = series;
        self.window.center_on(self.cursor, self.settings.window_secs);
        self.stale.series = false;
        self.redraw = true;
    }

    pub fn set_overlays(&mut self, labels: &[MotifId], fps: f64, motifs: &MotifLibrary) {
        self.overlays = label_runs(labels)
            .into_iter()
            .map(|run| MotifOverlay {
                start_time: frame_to_time(run.start, fps),
                end_time: frame_to_time(run.end, fps),
                motif_id: run.motif_id,
                color: motifs.color_of(run.motif_id).unwrap_or(UNKNOWN_MOTIF_COLOR),
            })
            .collect();
        self.stale.overlays = false;
        self.redraw = true;
    }

    pub fn set_pending_start(&mut self, start: Option<f64>) {
        if self.pending_start != start {
            self.pending_start = start;
            self.redraw = true;
        }
    }

    pub fn set_spectrogram(&mut self, range: TimeRange, block: SpectrogramBlock) {
        self.spectrogram = Some(SpectrogramImage { range, block });
        self.stale.spectrogram = false;
        self.redraw = true;
    }

    /// Stop asking for a spectrogram until the view or settings change.
    pub fn spectrogram_unavailable(&mut self) {
        self.spectrogram = None;
        self.stale.spectrogram = false;
        self.redraw = true;
    }

    pub fn spectrogram_covers(&self, range: &TimeRange) -> bool {
        self.spectrogram
            .as_ref()
            .is_some_and(|s| s.range.start <= range.start && s.range.end >= range.end)
    }

    pub fn show_frame(&mut self, unit: MediaUnit) {
        self.frame = Some(unit);
        self.decode_error = None;
        self.redraw = true;
    }

    /// The previous frame stays on screen.
    pub fn decode_failed(&mut self, message: impl Into<String>) {
        self.decode_error = Some(message.into());
        self.redraw = true;
    }

    pub fn zoom(&mut self, factor: f64, anchor: f64) {
        self.window.zoom(factor, anchor);
        self.after_view_change();
    }

    pub fn pan(&mut self, delta_secs: f64) {
        self.window.pan(delta_secs);
        self.after_view_change();
    }

    fn after_view_change(&mut self) {
        if self.settings.show_spectrogram && !self.spectrogram_covers(&self.window.range()) {
            self.stale.spectrogram = true;
        }
        self.redraw = true;
    }

    fn move_cursor(&mut self, time: f64, source: CursorSource) {
        self.cursor = time;
        let follow = matches!(source, CursorSource::Video | CursorSource::Stream);
        if follow || !self.window.contains(time) {
            self.window.center_on(time, self.settings.window_secs);
            if self.settings.show_spectrogram && !self.spectrogram_covers(&self.window.range()) {
                self.stale.spectrogram = true;
            }
        }
        self.redraw = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> PlotSurface {
        let mut surface = PlotSurface::new(PlotSettings::default());
        surface.handle_event(&AppEvent::DatasetLoaded { trial: Some(1) });
        surface.set_series(vec![0.0; 600], 10.0);
        surface
    }

    #[test]
    fn overlays_follow_label_runs() {
        let motifs = MotifLibrary::parse("1 beakTip 255 102 178\n").0;
        let mut labels = vec![0u16; 100];
        labels[20..50].fill(1);
        labels[60..70].fill(9);

        let mut surface = surface();
        surface.set_overlays(&labels, 10.0, &motifs);
        let overlays = surface.overlays();
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].start_time, 2.0);
        assert_eq!(overlays[0].end_time, 5.0);
        assert_eq!(overlays[0].color, Rgb { r: 255, g: 102, b: 178 });
        assert_eq!(overlays[1].color, UNKNOWN_MOTIF_COLOR);
        assert_eq!(surface.overlay_at(4.9).map(|o| o.motif_id), Some(1));
        assert!(surface.overlay_at(5.0).is_none());
    }

    #[test]
    fn video_cursor_recentres_window() {
        let mut surface = surface();
        surface.handle_event(&AppEvent::CursorMoved {
            trial: 1,
            time: 30.0,
            source: CursorSource::Video,
        });
        assert_eq!(surface.window().time_min_sec, 25.0);
        assert_eq!(surface.cursor(), 30.0);
    }

    #[test]
    fn plot_cursor_inside_window_does_not_scroll() {
        let mut surface = surface();
        surface.handle_event(&AppEvent::CursorMoved {
            trial: 1,
            time: 3.0,
            source: CursorSource::Plot,
        });
        assert_eq!(surface.window().time_min_sec, 0.0);
    }

    #[test]
    fn other_trial_events_are_ignored() {
        let mut surface = surface();
        surface.handle_event(&AppEvent::CursorMoved {
            trial: 2,
            time: 30.0,
            source: CursorSource::Video,
        });
        assert_eq!(surface.cursor(), 0.0);
        surface.handle_event(&AppEvent::LabelsUpdated {
            trial: 2,
            keypoint: "beak".into(),
            start_frame: 0,
            end_frame: 1,
        });
        assert!(!surface.stale().overlays);
    }

    #[test]
    fn decode_failure_keeps_last_frame() {
        use crate::media::UnitData;

        let mut surface = surface();
        surface.show_frame(MediaUnit {
            time: 1.0,
            data: UnitData::Frame {
                index: 10,
                width: 0,
                height: 0,
                rgb: Vec::new(),
            },
        });
        surface.decode_failed("corrupt packet");
        assert_eq!(surface.frame().and_then(MediaUnit::frame_index), Some(10));
        assert_eq!(surface.decode_error(), Some("corrupt packet"));
    }
}
