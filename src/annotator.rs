use std::cell::{Ref, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::config::AnnotatorConfig;
use crate::dataset::{Coord, Dataset, DimensionKind, TrialId};
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::events::{AppEvent, EventBus, MessageLevel, StateField, SubscriptionId};
use crate::labels::{ClickOutcome, LabelEditor};
use crate::media::{
    AudioSource, AudioStream, CacheRequest, ComputeParams, MediaCache, MediaDecoder, Payload,
    RequestId, SegmentSource, SpectrogramSource, StreamKind, TimeRange, UnitData,
};
use crate::motifs::{KeyAction, KeyBindings, MotifId, MotifLibrary, NavAction};
use crate::plot::{PlotSettings, PlotSurface};
use crate::state::{AppState, Autosaver, SessionDocument, SessionStore};
use crate::sync::{make_driver, DriverSlot, MediaDriver, StreamingDriver, SyncMode, TimeSync};

const SCROLL_ZOOM_STEP: f64 = 1.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

/// Input forwarded by the host, already mapped to data coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum UiEvent {
    Click {
        time: f64,
        value: Option<f64>,
        button: MouseButton,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Drag {
        time: f64,
    },
    /// Positive `delta` zooms in around `time`.
    Scroll {
        time: f64,
        delta: f64,
    },
    Key {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
    },
}

/// Host hook that turns a media path into a decoder.
pub trait DecoderFactory {
    fn decoder(&self, kind: StreamKind, path: &Path) -> Option<Box<dyn MediaDecoder>>;
}

/// Owns the session and routes host input to the components.
///
/// Components never call each other: state changes reach them as bus events
/// and the annotator re-reads the dataset into the plot after each operation.
/// Everything here runs on the host's dispatch thread.
pub struct Annotator {
    config: AnnotatorConfig,
    bus: Rc<EventBus>,
    state: AppState,
    motifs: MotifLibrary,
    bindings: KeyBindings,
    editor: Rc<RefCell<LabelEditor>>,
    surface: Rc<RefCell<PlotSurface>>,
    clock: Rc<RefCell<TimeSync>>,
    cache: Rc<RefCell<MediaCache>>,
    store: Option<Arc<SessionStore>>,
    decoders: Option<Box<dyn DecoderFactory>>,
    audio: Option<Arc<AudioSource>>,
    media_trial: Option<TrialId>,
    spectrogram_pending: Option<(RequestId, TimeRange)>,
    subscriptions: Vec<SubscriptionId>,
}

impl Annotator {
    pub fn new(config: AnnotatorConfig, motifs: MotifLibrary) -> AnnotatorResult<Self> {
        crate::utils::set_verbose(config.debug);
        let bus = Rc::new(EventBus::new());
        let mut state = AppState::new(bus.clone());
        state.set_plot_settings(config.plot.clone())?;

        let mut clock = TimeSync::new(state.sync_mode());
        clock.set_fps_playback(state.fps_playback())?;

        let mut annotator = Self {
            bindings: config.key_bindings.clone(),
            editor: Rc::new(RefCell::new(LabelEditor::new(config.editor))),
            surface: Rc::new(RefCell::new(PlotSurface::new(config.plot.clone()))),
            clock: Rc::new(RefCell::new(clock)),
            cache: Rc::new(RefCell::new(MediaCache::new(config.cache_max_bytes)?)),
            config,
            bus,
            state,
            motifs,
            store: None,
            decoders: None,
            audio: None,
            media_trial: None,
            spectrogram_pending: None,
            subscriptions: Vec::new(),
        };
        annotator.wire();
        Ok(annotator)
    }

    /// Load the motif file and restore the previous session named by `config`.
    pub fn open(config: AnnotatorConfig) -> anyhow::Result<Self> {
        let motifs = match &config.motif_file {
            Some(path) => {
                let (motifs, report) = MotifLibrary::load(path)
                    .with_context(|| format!("Failed to load motifs from {}", path.display()))?;
                for skipped in &report.skipped {
                    warn!(
                        "motif line {} skipped: {}",
                        skipped.line_no, skipped.reason
                    );
                }
                motifs
            }
            None => MotifLibrary::default(),
        };

        let store = Arc::new(
            SessionStore::new(config.session_path.clone()).context("Failed to open session store")?,
        );
        let mut annotator = Self::new(config, motifs)?;
        if let Some(message) = store.load_warning() {
            annotator.bus.emit(AppEvent::message(MessageLevel::Error, message));
        }
        annotator.restore_session(&store.document());
        annotator.store = Some(store);
        Ok(annotator)
    }

    fn wire(&mut self) {
        let weak_bus = Rc::downgrade(&self.bus);
        let clock = self.clock.clone();
        self.subscriptions.push(self.bus.subscribe(move |event| {
            let Some(bus) = weak_bus.upgrade() else {
                return;
            };
            let result = match event {
                AppEvent::StateChanged {
                    field: StateField::SyncMode { to, .. },
                } => clock.borrow_mut().set_mode(*to, &bus),
                AppEvent::StateChanged {
                    field:
                        StateField::Selection {
                            kind: DimensionKind::Trial,
                            value,
                            ..
                        },
                } => {
                    if let Some(trial) = trial_of(value) {
                        clock.borrow_mut().set_trial(trial, &bus);
                    }
                    Ok(())
                }
                AppEvent::DatasetLoaded { trial: Some(trial) } => {
                    clock.borrow_mut().set_trial(*trial, &bus);
                    Ok(())
                }
                _ => Ok(()),
            };
            if let Err(err) = result {
                error!("time sync could not follow {event:?}: {err}");
                bus.emit(AppEvent::message(MessageLevel::Error, err.to_string()));
            }
        }));

        let editor = self.editor.clone();
        self.subscriptions.push(self.bus.subscribe(move |event| {
            let resets = match event {
                AppEvent::StateChanged {
                    field: StateField::Selection { kind, .. },
                } => matches!(kind, DimensionKind::Trial | DimensionKind::Keypoint),
                AppEvent::DatasetLoaded { .. } => true,
                _ => false,
            };
            if resets {
                editor.borrow_mut().on_trial_changed();
            }
        }));

        let cache = self.cache.clone();
        self.subscriptions.push(self.bus.subscribe(move |event| match event {
            AppEvent::StateChanged {
                field: StateField::Selection { kind, value, .. },
            } => match kind {
                DimensionKind::Trial => {
                    if let Some(trial) = trial_of(value) {
                        cache.borrow_mut().switch_trial(trial);
                    }
                }
                DimensionKind::Mic => cache.borrow_mut().clear(),
                _ => {}
            },
            AppEvent::DatasetLoaded { .. } => cache.borrow_mut().clear(),
            _ => {}
        }));

        let surface = self.surface.clone();
        self.subscriptions.push(
            self.bus
                .subscribe(move |event| surface.borrow_mut().handle_event(event)),
        );
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn motifs(&self) -> &MotifLibrary {
        &self.motifs
    }

    pub fn key_bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn editor(&self) -> Ref<'_, LabelEditor> {
        self.editor.borrow()
    }

    pub fn surface(&self) -> Ref<'_, PlotSurface> {
        self.surface.borrow()
    }

    pub fn clock(&self) -> Ref<'_, TimeSync> {
        self.clock.borrow()
    }

    pub fn cache(&self) -> Ref<'_, MediaCache> {
        self.cache.borrow()
    }

    pub fn cursor(&self) -> f64 {
        self.clock.borrow().cursor()
    }

    pub fn set_decoders(&mut self, decoders: Box<dyn DecoderFactory>) {
        self.decoders = Some(decoders);
        self.media_trial = None;
        self.sync_views();
    }

    pub fn load_dataset(&mut self, dataset: Box<dyn Dataset>) {
        self.audio = None;
        self.media_trial = None;
        self.spectrogram_pending = None;
        self.state.load_dataset(dataset);
        if let Some(trial) = self.state.trial() {
            let cursor = self.cursor();
            self.surface.borrow_mut().set_trial(trial, cursor);
        }
        self.sync_views();
    }

    /// Apply a saved session through the state setters. Problems are reported
    /// as warnings and the rest of the document still applies.
    pub fn restore_session(&mut self, doc: &SessionDocument) {
        for warning in self.state.restore(doc) {
            self.bus.emit(AppEvent::message(MessageLevel::Warning, warning));
        }
        if let Err(err) = self
            .clock
            .borrow_mut()
            .set_fps_playback(self.state.fps_playback())
        {
            warn!("restored playback fps rejected: {err}");
        }
        self.surface
            .borrow_mut()
            .apply_settings(self.state.plot_settings().clone());
        self.sync_views();
    }

    /// Publish state snapshots to a background writer. Needs a tokio runtime.
    pub fn start_autosave(&mut self) -> Option<Autosaver> {
        let store = self.store.clone()?;
        let snapshots = self.state.attach_persistence();
        Some(Autosaver::spawn(
            store,
            snapshots,
            self.config.autosave_interval(),
        ))
    }

    pub fn set_selection(&mut self, dimension: &str, value: Coord) -> AnnotatorResult<bool> {
        let changed = self.state.set_selection(dimension, value)?;
        self.sync_views();
        Ok(changed)
    }

    pub fn set_sync_mode(&mut self, mode: SyncMode) {
        if self.state.set_sync_mode(mode) {
            self.sync_views();
        }
    }

    pub fn set_plot_settings(&mut self, settings: PlotSettings) -> AnnotatorResult<bool> {
        let changed = self.state.set_plot_settings(settings)?;
        if changed {
            self.spectrogram_pending = None;
            self.surface
                .borrow_mut()
                .apply_settings(self.state.plot_settings().clone());
            self.sync_views();
        }
        Ok(changed)
    }

    pub fn set_fps_playback(&mut self, fps: f64) -> AnnotatorResult<bool> {
        let changed = self.state.set_fps_playback(fps)?;
        self.clock.borrow_mut().set_fps_playback(fps)?;
        Ok(changed)
    }

    /// Route one input event. Failures are reported on the bus.
    pub fn handle_ui(&mut self, event: UiEvent) {
        let result = match event {
            UiEvent::Click {
                time,
                button: MouseButton::Left,
                ..
            } => self.left_click(time).map(drop),
            UiEvent::Click {
                time,
                button: MouseButton::Right,
                ..
            } => self.right_click(time),
            UiEvent::Click { .. } => Ok(()),
            UiEvent::Drag { time } => self
                .clock
                .borrow_mut()
                .on_plot_click(time, &self.bus)
                .map(drop),
            UiEvent::Scroll { time, delta } => {
                self.surface
                    .borrow_mut()
                    .zoom(SCROLL_ZOOM_STEP.powf(-delta), time);
                Ok(())
            }
            UiEvent::Key { key, modifiers } => self.key(&key, modifiers),
        };
        if let Err(err) = result {
            self.report(&err);
        }
        self.sync_views();
    }

    /// Plot click. Armed, it feeds the label editor; otherwise it selects the
    /// run under the click and, when the plot drives the video, seeks.
    pub fn left_click(&mut self, time: f64) -> AnnotatorResult<ClickOutcome> {
        let outcome = {
            let mut ctx = self
                .state
                .edit_context()
                .ok_or_else(|| AnnotatorError::validation("no dataset loaded"))?;
            self.editor.borrow_mut().on_click(time, &mut ctx)?
        };
        if matches!(
            outcome,
            ClickOutcome::RunSelected(_) | ClickOutcome::SelectionCleared
        ) {
            self.clock.borrow_mut().on_plot_click(time, &self.bus)?;
        }
        self.sync_views();
        Ok(outcome)
    }

    /// Select the run under the click and play it.
    pub fn right_click(&mut self, time: f64) -> AnnotatorResult<()> {
        let outcome = {
            let mut ctx = self
                .state
                .edit_context()
                .ok_or_else(|| AnnotatorError::validation("no dataset loaded"))?;
            self.editor.borrow_mut().select_at(time, &mut ctx)?
        };
        if matches!(outcome, ClickOutcome::RunSelected(_)) {
            self.play_selected()?;
        }
        Ok(())
    }

    pub fn activate_motif(&mut self, id: MotifId) -> AnnotatorResult<()> {
        self.editor.borrow_mut().activate_motif(id, &self.motifs)
    }

    pub fn set_label_mode(&mut self, enabled: bool) {
        self.editor.borrow_mut().set_label_mode(enabled);
        self.sync_views();
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.editor.borrow_mut().set_snap_enabled(enabled);
    }

    /// Delete the selected run, or the run under the cursor when nothing is
    /// selected.
    pub fn delete(&mut self) -> AnnotatorResult<()> {
        let cursor = self.cursor();
        {
            let mut ctx = self
                .state
                .edit_context()
                .ok_or_else(|| AnnotatorError::validation("no dataset loaded"))?;
            let mut editor = self.editor.borrow_mut();
            if editor.state().selected_run.is_some() {
                editor.delete_selected(&mut ctx)?;
            } else {
                editor.delete_at(cursor, &mut ctx)?;
            }
        }
        self.sync_views();
        Ok(())
    }

    pub fn remove_short_runs(&mut self, min_len: usize) -> AnnotatorResult<usize> {
        let removed = {
            let mut ctx = self
                .state
                .edit_context()
                .ok_or_else(|| AnnotatorError::validation("no dataset loaded"))?;
            self.editor.borrow_mut().remove_short_runs(min_len, &mut ctx)?
        };
        self.sync_views();
        Ok(removed)
    }

    pub fn play_selected(&mut self) -> AnnotatorResult<()> {
        let fps = self.fps()?;
        let (start, end) = self
            .editor
            .borrow()
            .selected_range(fps)
            .ok_or_else(|| AnnotatorError::validation("no labeled segment selected"))?;
        self.clock.borrow_mut().play_segment(start, end, &self.bus)
    }

    pub fn toggle_play(&mut self) -> AnnotatorResult<()> {
        self.clock.borrow_mut().toggle_play(&self.bus)
    }

    pub fn seek(&mut self, time: f64) -> AnnotatorResult<()> {
        self.clock.borrow_mut().seek(time, &self.bus)?;
        self.sync_views();
        Ok(())
    }

    /// Step to the neighbouring trial; stays put at either end.
    pub fn step_trial(&mut self, forward: bool) -> AnnotatorResult<bool> {
        let (name, next) = {
            let dataset = self
                .state
                .dataset()
                .ok_or_else(|| AnnotatorError::validation("no dataset loaded"))?;
            let dim = dataset
                .schema()
                .by_kind(DimensionKind::Trial)
                .ok_or_else(|| AnnotatorError::validation("dataset has no trial dimension"))?;
            let current = self.state.selection().get(&dim.name);
            let idx = current
                .and_then(|c| dim.coords.iter().position(|x| x == c))
                .unwrap_or(0);
            let next = if forward {
                dim.coords.get(idx + 1)
            } else {
                idx.checked_sub(1).and_then(|i| dim.coords.get(i))
            };
            (dim.name.clone(), next.cloned())
        };
        match next {
            Some(coord) => self.set_selection(&name, coord),
            None => Ok(false),
        }
    }

    /// Advance playback by one tick: apply at most one decoded unit, merge
    /// finished cache work and refresh the plot. Call every
    /// [`TimeSync::tick_interval`].
    pub fn tick(&mut self) {
        let pumped = self.clock.borrow_mut().pump(&self.bus);
        match pumped {
            Ok(_) => {
                let unit = self.clock.borrow_mut().take_unit();
                if let Some(unit) = unit {
                    if matches!(unit.data, UnitData::Frame { .. }) {
                        self.surface.borrow_mut().show_frame(unit);
                    }
                }
            }
            Err(err) => {
                if matches!(err, AnnotatorError::Decode(_)) {
                    self.surface.borrow_mut().decode_failed(err.to_string());
                }
                self.report(&err);
            }
        }
        self.poll_spectrogram();
        self.sync_views();
    }

    /// Audio samples for `range` of the active trial through the cache.
    pub fn audio_range(&mut self, range: TimeRange) -> AnnotatorResult<Vec<f32>> {
        let trial = self.active_trial()?;
        let audio = self
            .audio
            .clone()
            .ok_or_else(|| AnnotatorError::validation("no audio loaded for this trial"))?;
        let params = ComputeParams::audio(audio.sample_rate());
        let payload = self
            .cache
            .borrow_mut()
            .get_or_compute(trial, range, params, audio)?;
        match payload {
            Payload::Audio(block) => Ok(block.samples),
            Payload::Spectrogram(_) => Err(AnnotatorError::Consistency(
                "audio request returned a spectrogram".to_string(),
            )),
        }
    }

    pub fn audio_sample_rate(&self) -> Option<u32> {
        self.audio.as_ref().map(|a| a.sample_rate())
    }

    fn key(&mut self, key: &str, modifiers: Modifiers) -> AnnotatorResult<()> {
        let Some(action) = self.bindings.resolve(key) else {
            debug!("unbound key {key:?}");
            return Ok(());
        };
        match action {
            KeyAction::Motif(id) => self.activate_motif(id),
            KeyAction::Nav(NavAction::NextTrial) => self.step_trial(true).map(drop),
            KeyAction::Nav(NavAction::PrevTrial) => self.step_trial(false).map(drop),
            KeyAction::Nav(NavAction::StepForward) => self.step_time(1.0, modifiers),
            KeyAction::Nav(NavAction::StepBackward) => self.step_time(-1.0, modifiers),
            KeyAction::Nav(NavAction::Delete) => self.delete(),
            KeyAction::Nav(NavAction::Edit) => self.editor.borrow_mut().begin_edit(),
            KeyAction::Nav(NavAction::Cancel) => {
                let mut editor = self.editor.borrow_mut();
                if !editor.cancel() {
                    editor.set_label_mode(false);
                    editor.clear_selected_run();
                }
                Ok(())
            }
            KeyAction::Nav(NavAction::PlaySelected) => {
                if self.editor.borrow().state().selected_run.is_some() {
                    self.play_selected()
                } else {
                    self.toggle_play()
                }
            }
        }
    }

    /// One frame per step, one second with shift.
    fn step_time(&mut self, direction: f64, modifiers: Modifiers) -> AnnotatorResult<()> {
        let step = if modifiers.shift { 1.0 } else { 1.0 / self.fps()? };
        let target = (self.cursor() + direction * step).max(0.0);
        self.seek(target)
    }

    fn fps(&self) -> AnnotatorResult<f64> {
        self.state
            .dataset()
            .map(|d| d.fps())
            .ok_or_else(|| AnnotatorError::validation("no dataset loaded"))
    }

    fn active_trial(&self) -> AnnotatorResult<TrialId> {
        self.state
            .trial()
            .ok_or_else(|| AnnotatorError::validation("no trial selected"))
    }

    /// Bring the plot up to date with the dataset and media for the active
    /// trial. Never called while a component is borrowed.
    fn sync_views(&mut self) {
        let Some(trial) = self.state.trial() else {
            return;
        };
        if self.media_trial != Some(trial) {
            if let Err(err) = self.open_trial_media(trial) {
                self.report(&err);
            }
        }

        let cursor = self.clock.borrow().cursor();
        let pending_start = self.editor.borrow().state().pending_start;
        let mut problems = Vec::new();
        {
            let mut surface = self.surface.borrow_mut();
            if surface.trial() != Some(trial) {
                surface.set_trial(trial, cursor);
            }
            surface.set_pending_start(pending_start);

            if let Some(dataset) = self.state.dataset() {
                let stale = surface.stale();
                if stale.series {
                    match dataset.feature_series(self.state.selection()) {
                        Ok(series) => surface.set_series(series, dataset.fps()),
                        Err(err) => {
                            surface.set_series(Vec::new(), dataset.fps());
                            problems.push(err);
                        }
                    }
                }
                if stale.overlays {
                    if let Some(keypoint) = self.state.selection().keypoint() {
                        match dataset.labels(trial, &keypoint) {
                            Ok(labels) => surface.set_overlays(labels, dataset.fps(), &self.motifs),
                            Err(err) => {
                                surface.set_overlays(&[], dataset.fps(), &self.motifs);
                                problems.push(err);
                            }
                        }
                    }
                }
            }
        }
        for err in problems {
            self.report(&err);
        }

        if let Err(err) = self.request_spectrogram(trial) {
            self.surface.borrow_mut().spectrogram_unavailable();
            self.report(&err);
        }
    }

    fn open_trial_media(&mut self, trial: TrialId) -> AnnotatorResult<()> {
        self.media_trial = Some(trial);
        self.audio = None;
        self.spectrogram_pending = None;
        let Some(decoders) = &self.decoders else {
            return Ok(());
        };
        let media = self.state.media_for(trial);

        let mut clock = self.clock.borrow_mut();
        clock.detach(DriverSlot::Video);
        clock.detach(DriverSlot::Stream);

        if let Some(path) = &media.video {
            if let Some(decoder) = decoders.decoder(StreamKind::Video, path) {
                let mut driver =
                    make_driver(self.config.driver_kind, decoder, self.config.video_queue_capacity);
                driver.open(path)?;
                clock.attach(DriverSlot::Video, driver);
            }
        }
        if let Some(path) = &media.audio {
            if let Some(decoder) = decoders.decoder(StreamKind::Audio, path) {
                // One decoder per trial, shared by the cache and the stream driver.
                let audio = Arc::new(AudioSource::open(decoder, path)?);
                let stream = AudioStream::new(Arc::clone(&audio));
                let mut driver =
                    StreamingDriver::new(Box::new(stream), self.config.audio_queue_capacity)
                        .named("audio");
                driver.open(path)?;
                clock.attach(DriverSlot::Stream, Box::new(driver));
                self.audio = Some(audio);
            }
        }

        let cursor = clock.cursor();
        clock.seek(cursor, &self.bus)
    }

    fn request_spectrogram(&mut self, trial: TrialId) -> AnnotatorResult<()> {
        if self.spectrogram_pending.is_some() {
            return Ok(());
        }
        let range = {
            let surface = self.surface.borrow();
            if !surface.stale().spectrogram {
                return Ok(());
            }
            match surface.spectrogram_request() {
                Some(range) => range,
                None => return Ok(()),
            }
        };
        let Some(audio) = self.audio.clone() else {
            self.surface.borrow_mut().spectrogram_unavailable();
            return Ok(());
        };

        let range = TimeRange::new(range.start.max(0.0), range.end.min(audio.duration_secs()));
        let params = self
            .state
            .plot_settings()
            .spectrogram_params(audio.sample_rate());
        let source: Arc<dyn SegmentSource> = Arc::new(SpectrogramSource::new(audio));
        let request = self.cache.borrow_mut().request(trial, range, params, source)?;
        match request {
            CacheRequest::Ready(payload) => self.apply_spectrogram(range, payload),
            CacheRequest::Pending(id) => {
                self.spectrogram_pending = Some((id, range));
                Ok(())
            }
        }
    }

    fn poll_spectrogram(&mut self) {
        let Some((id, range)) = self.spectrogram_pending else {
            self.cache.borrow_mut().pump();
            return;
        };
        let polled = self.cache.borrow_mut().poll(id);
        let Some(result) = polled else {
            return;
        };
        self.spectrogram_pending = None;
        let applied = result.and_then(|payload| self.apply_spectrogram(range, payload));
        match applied {
            Ok(()) => {}
            Err(AnnotatorError::Cancelled) => debug!("spectrogram request cancelled"),
            Err(err) => {
                self.surface.borrow_mut().spectrogram_unavailable();
                self.report(&err);
            }
        }
    }

    fn apply_spectrogram(&mut self, range: TimeRange, payload: Payload) -> AnnotatorResult<()> {
        match payload {
            Payload::Spectrogram(block) => {
                self.surface.borrow_mut().set_spectrogram(range, block);
                Ok(())
            }
            Payload::Audio(_) => Err(AnnotatorError::Consistency(
                "spectrogram request returned audio".to_string(),
            )),
        }
    }

    /// Surface a failure to the user. Validation problems are warnings.
    fn report(&self, err: &AnnotatorError) {
        let level = match err {
            AnnotatorError::Validation(_) => {
                warn!("{err}");
                MessageLevel::Warning
            }
            AnnotatorError::Cancelled => {
                debug!("{err}");
                return;
            }
            _ => {
                error!("{err}");
                MessageLevel::Error
            }
        };
        self.bus.emit(AppEvent::message(level, err.to_string()));
    }
}

impl Drop for Annotator {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

fn trial_of(value: &Coord) -> Option<TrialId> {
    value.as_int().and_then(|v| TrialId::try_from(v).ok())
}
