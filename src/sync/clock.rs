use std::collections::HashMap;
use std::time::Duration;

use super::driver::MediaDriver;
use super::mode::{DriverSlot, SyncMode};
use crate::dataset::TrialId;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::events::{AppEvent, CursorSource, EventBus};
use crate::media::MediaUnit;

use crate::{log_error, log_info};

pub const DEFAULT_FPS_PLAYBACK: f64 = 30.0;
const TIME_EPSILON: f64 = 1e-9;

/// Single writer of the per-trial time cursor.
///
/// Exactly one driver is authoritative for the active [`SyncMode`]; events
/// from the others are ignored. At most one driver plays at a time.
pub struct TimeSync {
    mode: SyncMode,
    trial: Option<TrialId>,
    cursors: HashMap<TrialId, f64>,
    video: Option<Box<dyn MediaDriver>>,
    stream: Option<Box<dyn MediaDriver>>,
    segment_end: Option<f64>,
    fps_playback: f64,
    latest: Option<MediaUnit>,
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new(SyncMode::default())
    }
}

impl TimeSync {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            trial: None,
            cursors: HashMap::new(),
            video: None,
            stream: None,
            segment_end: None,
            fps_playback: DEFAULT_FPS_PLAYBACK,
            latest: None,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn trial(&self) -> Option<TrialId> {
        self.trial
    }

    /// Cursor of the active trial, 0 before any trial is selected.
    pub fn cursor(&self) -> f64 {
        self.trial
            .and_then(|t| self.cursors.get(&t).copied())
            .unwrap_or(0.0)
    }

    pub fn cursor_for(&self, trial: TrialId) -> Option<f64> {
        self.cursors.get(&trial).copied()
    }

    pub fn fps_playback(&self) -> f64 {
        self.fps_playback
    }

    pub fn set_fps_playback(&mut self, fps: f64) -> AnnotatorResult<()> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(AnnotatorError::validation(format!(
                "playback fps must be positive, got {fps}"
            )));
        }
        self.fps_playback = fps;
        Ok(())
    }

    /// How often the host should call [`TimeSync::pump`] while playing.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps_playback)
    }

    pub fn attach(&mut self, slot: DriverSlot, driver: Box<dyn MediaDriver>) {
        if let Some(mut old) = self.slot_mut(slot).replace(driver) {
            old.stop();
        }
    }

    pub fn detach(&mut self, slot: DriverSlot) -> Option<Box<dyn MediaDriver>> {
        let mut driver = self.slot_mut(slot).take()?;
        driver.stop();
        Some(driver)
    }

    pub fn driver(&self, slot: DriverSlot) -> Option<&dyn MediaDriver> {
        match slot {
            DriverSlot::Video => self.video.as_deref(),
            DriverSlot::Stream => self.stream.as_deref(),
        }
    }

    pub fn driver_mut(&mut self, slot: DriverSlot) -> Option<&mut (dyn MediaDriver + 'static)> {
        self.slot_mut(slot).as_deref_mut()
    }

    pub fn playing_drivers(&self) -> usize {
        [&self.video, &self.stream]
            .into_iter()
            .flatten()
            .filter(|d| d.is_playing())
            .count()
    }

    pub fn is_playing(&self) -> bool {
        self.driver(self.mode.authoritative_slot())
            .is_some_and(|d| d.is_playing())
    }

    /// Activate `trial`. Playback stops; a trial seen before resumes at its
    /// previous cursor, a new one starts at zero.
    pub fn set_trial(&mut self, trial: TrialId, bus: &EventBus) {
        if self.trial == Some(trial) {
            return;
        }
        let was_playing = self.playing_drivers() > 0;
        self.stop_all();
        self.segment_end = None;
        self.latest = None;
        self.trial = Some(trial);
        self.cursors.entry(trial).or_insert(0.0);
        if was_playing {
            bus.emit(AppEvent::PlaybackChanged { playing: false });
        }
    }

    /// Hand the clock to another driver. The outgoing driver is stopped before
    /// the incoming one is positioned at the unchanged cursor.
    pub fn set_mode(&mut self, mode: SyncMode, bus: &EventBus) -> AnnotatorResult<()> {
        if mode == self.mode {
            return Ok(());
        }
        let was_playing = self.is_playing();
        self.stop_all();
        self.segment_end = None;

        let from = self.mode;
        self.mode = mode;
        log_info!("sync mode {} -> {}", from, mode);

        let cursor = self.cursor();
        if let Some(driver) = self.slot_mut(mode.authoritative_slot()).as_mut() {
            driver.seek(cursor)?;
            if was_playing {
                driver.play()?;
            }
        } else if was_playing {
            bus.emit(AppEvent::PlaybackChanged { playing: false });
        }
        self.check_consistency();
        Ok(())
    }

    /// Navigation that is not a plot click: stepping, sliders, trial restore.
    pub fn seek(&mut self, time: f64, bus: &EventBus) -> AnnotatorResult<()> {
        let time = time.max(0.0);
        let slot = self.mode.authoritative_slot();
        let optimistic = self.mode == SyncMode::PlotDrivesVideo;
        match self.slot_mut(slot).as_mut() {
            Some(driver) => {
                driver.seek(time)?;
                if optimistic {
                    self.move_cursor(time, CursorSource::Plot, bus);
                }
            }
            None => {
                self.move_cursor(time, CursorSource::Plot, bus);
            }
        }
        Ok(())
    }

    /// Returns whether the click moved the clock. Only honoured while the
    /// plot drives the video.
    pub fn on_plot_click(&mut self, time: f64, bus: &EventBus) -> AnnotatorResult<bool> {
        if self.mode != SyncMode::PlotDrivesVideo {
            return Ok(false);
        }
        self.seek(time, bus)?;
        Ok(true)
    }

    pub fn play(&mut self, bus: &EventBus) -> AnnotatorResult<()> {
        let slot = self.mode.authoritative_slot();
        let driver = self
            .slot_mut(slot)
            .as_mut()
            .ok_or_else(|| AnnotatorError::validation(format!("no {slot:?} driver to play")))?;
        if driver.is_playing() {
            return Ok(());
        }
        driver.play()?;
        self.check_consistency();
        bus.emit(AppEvent::PlaybackChanged { playing: true });
        Ok(())
    }

    pub fn stop(&mut self, bus: &EventBus) {
        self.segment_end = None;
        if self.playing_drivers() > 0 {
            self.stop_all();
            bus.emit(AppEvent::PlaybackChanged { playing: false });
        }
    }

    pub fn toggle_play(&mut self, bus: &EventBus) -> AnnotatorResult<()> {
        if self.is_playing() {
            self.stop(bus);
            Ok(())
        } else {
            self.play(bus)
        }
    }

    /// Play `[start, end)` on the video and stop automatically at `end`.
    pub fn play_segment(&mut self, start: f64, end: f64, bus: &EventBus) -> AnnotatorResult<()> {
        if self.mode != SyncMode::PlotDrivesVideo {
            return Err(AnnotatorError::validation(format!(
                "segment playback needs {} mode",
                SyncMode::PlotDrivesVideo
            )));
        }
        if end <= start {
            return Err(AnnotatorError::validation("segment end must follow its start"));
        }
        self.seek(start, bus)?;
        self.play(bus)?;
        self.segment_end = Some(end);
        Ok(())
    }

    /// Take at most one unit from the authoritative driver and apply it.
    /// Returns the cursor when it moved.
    pub fn pump(&mut self, bus: &EventBus) -> AnnotatorResult<Option<f64>> {
        self.check_consistency();
        let slot = self.mode.authoritative_slot();
        let Some(driver) = self.slot_mut(slot).as_mut() else {
            return Ok(None);
        };
        let Some(decoded) = driver.next_unit()? else {
            return Ok(None);
        };
        let time = decoded.unit.time;
        let after_seek = decoded.after_seek;

        if let Some(end) = self.segment_end {
            if !after_seek && time >= end - TIME_EPSILON {
                self.segment_end = None;
                self.stop(bus);
                return Ok(None);
            }
        }

        let moved = match self.mode {
            SyncMode::VideoDrivesPlot => self.move_cursor(time, CursorSource::Video, bus),
            SyncMode::PlotDrivesVideo => {
                let source = if after_seek {
                    CursorSource::SeekLanded
                } else {
                    CursorSource::Video
                };
                self.move_cursor(time, source, bus)
            }
            SyncMode::StreamDrivesPlot => {
                let next = if after_seek {
                    time
                } else {
                    time.max(self.cursor())
                };
                self.move_cursor(next, CursorSource::Stream, bus)
            }
        };
        self.latest = Some(decoded.unit);
        Ok(moved.then(|| self.cursor()))
    }

    /// The unit applied by the last [`TimeSync::pump`], for display.
    pub fn take_unit(&mut self) -> Option<MediaUnit> {
        self.latest.take()
    }

    /// Two playing drivers is a broken invariant: fatal in debug builds,
    /// otherwise the non-authoritative drivers are stopped.
    pub fn check_consistency(&mut self) {
        if self.playing_drivers() <= 1 {
            return;
        }
        let violation =
            AnnotatorError::Consistency("more than one media driver playing at once".to_string());
        if cfg!(debug_assertions) {
            panic!("{violation}");
        }
        log_error!("{violation}; stopping non-authoritative drivers");
        let keep = self.mode.authoritative_slot();
        for slot in [DriverSlot::Video, DriverSlot::Stream] {
            if slot != keep {
                if let Some(driver) = self.slot_mut(slot).as_mut() {
                    driver.stop();
                }
            }
        }
    }

    fn move_cursor(&mut self, time: f64, source: CursorSource, bus: &EventBus) -> bool {
        let Some(trial) = self.trial else {
            return false;
        };
        let cursor = self.cursors.entry(trial).or_insert(0.0);
        if (*cursor - time).abs() <= TIME_EPSILON {
            return false;
        }
        *cursor = time;
        bus.emit(AppEvent::CursorMoved {
            trial,
            time,
            source,
        });
        true
    }

    fn stop_all(&mut self) {
        for driver in [&mut self.video, &mut self.stream].into_iter().flatten() {
            driver.stop();
        }
    }

    fn slot_mut(&mut self, slot: DriverSlot) -> &mut Option<Box<dyn MediaDriver>> {
        match slot {
            DriverSlot::Video => &mut self.video,
            DriverSlot::Stream => &mut self.stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    use super::*;
    use crate::media::SyntheticVideoDecoder;
    use crate::sync::BufferedDriver;

    fn video(fps: f64, n_frames: u64) -> Box<dyn MediaDriver> {
        let mut driver = BufferedDriver::new(Box::new(SyntheticVideoDecoder::new(fps, n_frames)));
        driver.open(Path::new("trial.mp4")).unwrap();
        Box::new(driver)
    }

    fn clock(mode: SyncMode) -> (TimeSync, EventBus) {
        let bus = EventBus::new();
        let mut sync = TimeSync::new(mode);
        sync.attach(DriverSlot::Video, video(10.0, 200));
        sync.attach(DriverSlot::Stream, video(10.0, 200));
        sync.set_trial(1, &bus);
        (sync, bus)
    }

    fn drain(sync: &mut TimeSync, bus: &EventBus) {
        for _ in 0..4 {
            sync.pump(bus).unwrap();
        }
    }

    #[test]
    fn plot_click_ignored_while_video_drives() {
        let (mut sync, bus) = clock(SyncMode::VideoDrivesPlot);
        assert!(!sync.on_plot_click(3.0, &bus).unwrap());
        drain(&mut sync, &bus);
        assert_eq!(sync.cursor(), 0.0);
    }

    #[test]
    fn plot_click_reconciles_to_landed_frame() {
        let (mut sync, bus) = clock(SyncMode::PlotDrivesVideo);
        let sources = Rc::new(RefCell::new(Vec::new()));
        {
            let sources = sources.clone();
            bus.subscribe(move |event| {
                if let AppEvent::CursorMoved { source, .. } = event {
                    sources.borrow_mut().push(*source);
                }
            });
        }

        assert!(sync.on_plot_click(2.04, &bus).unwrap());
        assert!((sync.cursor() - 2.04).abs() < 1e-12);
        assert_eq!(sync.pump(&bus).unwrap(), Some(2.0));
        assert_eq!(sync.take_unit().and_then(|u| u.frame_index()), Some(20));
        assert!(sync.take_unit().is_none());
        assert_eq!(
            *sources.borrow(),
            vec![CursorSource::Plot, CursorSource::SeekLanded]
        );
    }

    #[test]
    fn video_frames_move_the_cursor() {
        let (mut sync, bus) = clock(SyncMode::VideoDrivesPlot);
        sync.seek(1.0, &bus).unwrap();
        sync.play(&bus).unwrap();
        sync.pump(&bus).unwrap();
        sync.pump(&bus).unwrap();
        assert!((sync.cursor() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn stream_cursor_is_monotonic_between_seeks() {
        let (mut sync, bus) = clock(SyncMode::StreamDrivesPlot);
        sync.seek(5.0, &bus).unwrap();
        sync.pump(&bus).unwrap();
        assert!((sync.cursor() - 5.0).abs() < 1e-9);

        sync.seek(1.0, &bus).unwrap();
        sync.pump(&bus).unwrap();
        assert!((sync.cursor() - 1.0).abs() < 1e-9);
        sync.play(&bus).unwrap();
        sync.pump(&bus).unwrap();
        assert!((sync.cursor() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn mode_switch_keeps_cursor_and_one_driver() {
        for from in SyncMode::ALL {
            for to in SyncMode::ALL {
                let (mut sync, bus) = clock(from);
                sync.seek(4.0, &bus).unwrap();
                drain(&mut sync, &bus);
                sync.play(&bus).unwrap();
                let before = sync.cursor();

                sync.set_mode(to, &bus).unwrap();
                assert_eq!(sync.cursor(), before, "{from} -> {to}");
                assert_eq!(sync.playing_drivers(), 1, "{from} -> {to}");
                assert!(sync
                    .driver(to.authoritative_slot())
                    .is_some_and(|d| d.is_playing()));
            }
        }
    }

    #[test]
    fn segment_playback_stops_at_end() {
        let (mut sync, bus) = clock(SyncMode::PlotDrivesVideo);
        sync.play_segment(1.0, 1.3, &bus).unwrap();
        for _ in 0..10 {
            sync.pump(&bus).unwrap();
        }
        assert!(!sync.is_playing());
        assert!((sync.cursor() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn segment_playback_needs_plot_mode() {
        let (mut sync, bus) = clock(SyncMode::VideoDrivesPlot);
        let err = sync.play_segment(1.0, 2.0, &bus).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn trials_keep_their_own_cursor() {
        let (mut sync, bus) = clock(SyncMode::PlotDrivesVideo);
        sync.on_plot_click(3.0, &bus).unwrap();
        sync.set_trial(2, &bus);
        assert_eq!(sync.cursor(), 0.0);
        sync.set_trial(1, &bus);
        assert_eq!(sync.cursor(), 3.0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "more than one media driver")]
    fn two_playing_drivers_panic_in_debug() {
        let (mut sync, bus) = clock(SyncMode::VideoDrivesPlot);
        sync.driver_mut(DriverSlot::Stream).unwrap().play().unwrap();
        sync.play(&bus).unwrap();
    }
}
