use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, warn};
use serde_json::Value;
use tokio::sync::watch;

use super::selection::Selection;
use super::session::SessionDocument;
use super::value::{float_to_json, path_to_string, StateValue};
use crate::dataset::{Coord, Dataset, DimensionKind, TrialId, TrialMedia};
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::events::{AppEvent, EventBus, StateField};
use crate::labels::EditContext;
use crate::plot::PlotSettings;
use crate::sync::{SyncMode, DEFAULT_FPS_PLAYBACK};

const KEY_FILE_PATH: &str = "filePath";
const KEY_VIDEO_FOLDER: &str = "videoFolder";
const KEY_AUDIO_FOLDER: &str = "audioFolder";
const KEY_SELECTION: &str = "selection";
const KEY_SYNC_MODE: &str = "syncMode";
const KEY_PLOT_SETTINGS: &str = "plotSettings";
const KEY_FPS_PLAYBACK: &str = "fpsPlayback";
const KEY_EXTRAS: &str = "extras";

/// Reactive container for everything the session tracks.
///
/// Every setter that changes a value emits one `StateChanged` on the bus
/// before returning and republishes the saveable snapshot for the autosaver.
/// Setting an identical value is a no-op.
pub struct AppState {
    bus: Rc<EventBus>,
    dataset: Option<Box<dyn Dataset>>,
    selection: Selection,
    restored_selection: Option<Selection>,
    sync_mode: SyncMode,
    plot_settings: PlotSettings,
    file_path: Option<PathBuf>,
    video_folder: Option<PathBuf>,
    audio_folder: Option<PathBuf>,
    fps_playback: f64,
    extras: BTreeMap<String, StateValue>,
    snapshots: Option<watch::Sender<SessionDocument>>,
}

impl AppState {
    pub fn new(bus: Rc<EventBus>) -> Self {
        Self {
            bus,
            dataset: None,
            selection: Selection::default(),
            restored_selection: None,
            sync_mode: SyncMode::default(),
            plot_settings: PlotSettings::default(),
            file_path: None,
            video_folder: None,
            audio_folder: None,
            fps_playback: DEFAULT_FPS_PLAYBACK,
            extras: BTreeMap::new(),
            snapshots: None,
        }
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn dataset(&self) -> Option<&dyn Dataset> {
        self.dataset.as_deref()
    }

    pub fn dataset_mut(&mut self) -> Option<&mut (dyn Dataset + 'static)> {
        self.dataset.as_deref_mut()
    }

    /// What the label editor borrows to mutate the active labels.
    pub fn edit_context(&mut self) -> Option<EditContext<'_>> {
        let dataset = self.dataset.as_deref_mut()?;
        Some(EditContext {
            dataset,
            selection: &self.selection,
            bus: &self.bus,
        })
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn trial(&self) -> Option<TrialId> {
        self.selection.trial()
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn plot_settings(&self) -> &PlotSettings {
        &self.plot_settings
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn video_folder(&self) -> Option<&Path> {
        self.video_folder.as_deref()
    }

    pub fn audio_folder(&self) -> Option<&Path> {
        self.audio_folder.as_deref()
    }

    pub fn fps_playback(&self) -> f64 {
        self.fps_playback
    }

    pub fn extra(&self, key: &str) -> Option<&StateValue> {
        self.extras.get(key)
    }

    /// Replace the dataset. The selection resets to the first coordinate of
    /// every dimension, except on the first load after a restore where saved
    /// values that still exist are kept.
    pub fn load_dataset(&mut self, dataset: Box<dyn Dataset>) {
        let selection = match self.restored_selection.take() {
            Some(restored) => restored.reconciled_with(dataset.schema()),
            None => Selection::default_for(dataset.schema()),
        };
        self.selection = selection;
        self.dataset = Some(dataset);
        debug!("dataset loaded, trial {:?}", self.selection.trial());
        self.publish();
        self.bus.emit(AppEvent::DatasetLoaded {
            trial: self.selection.trial(),
        });
    }

    /// Set one selection dimension. With a dataset loaded the dimension and
    /// value must exist in its schema.
    pub fn set_selection(&mut self, dimension: &str, value: Coord) -> AnnotatorResult<bool> {
        if let Some(dataset) = &self.dataset {
            let dim = dataset.schema().get(dimension).ok_or_else(|| {
                AnnotatorError::validation(format!("unknown dimension {dimension:?}"))
            })?;
            if !dim.coords.contains(&value) {
                return Err(AnnotatorError::validation(format!(
                    "{value} is not a coordinate of {dimension}"
                )));
            }
        }
        if !self.selection.set(dimension, value.clone()) {
            return Ok(false);
        }
        if self.dataset.is_none() {
            self.restored_selection = Some(self.selection.clone());
        }
        let kind = self
            .selection
            .kind_of(dimension)
            .unwrap_or_else(|| DimensionKind::from_name(dimension));
        self.changed(StateField::Selection {
            dimension: dimension.to_string(),
            kind,
            value,
        });
        Ok(true)
    }

    pub fn set_sync_mode(&mut self, mode: SyncMode) -> bool {
        if self.sync_mode == mode {
            return false;
        }
        let from = std::mem::replace(&mut self.sync_mode, mode);
        self.changed(StateField::SyncMode { from, to: mode });
        true
    }

    pub fn set_plot_settings(&mut self, settings: PlotSettings) -> AnnotatorResult<bool> {
        settings.validate()?;
        if self.plot_settings == settings {
            return Ok(false);
        }
        self.plot_settings = settings;
        self.changed(StateField::PlotSettings);
        Ok(true)
    }

    pub fn set_fps_playback(&mut self, fps: f64) -> AnnotatorResult<bool> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(AnnotatorError::validation(format!(
                "playback fps must be positive, got {fps}"
            )));
        }
        if self.fps_playback == fps {
            return Ok(false);
        }
        self.fps_playback = fps;
        self.changed(StateField::FpsPlayback);
        Ok(true)
    }

    /// The path is kept even when it cannot be saved; the error reports that
    /// it will be missing from the session file.
    pub fn set_file_path(&mut self, path: Option<PathBuf>) -> AnnotatorResult<bool> {
        let changed = replace_if_changed(&mut self.file_path, path);
        if changed {
            self.changed(StateField::FilePath);
        }
        check_saveable(self.file_path.as_deref())?;
        Ok(changed)
    }

    pub fn set_video_folder(&mut self, path: Option<PathBuf>) -> AnnotatorResult<bool> {
        let changed = replace_if_changed(&mut self.video_folder, path);
        if changed {
            self.changed(StateField::VideoFolder);
        }
        check_saveable(self.video_folder.as_deref())?;
        Ok(changed)
    }

    pub fn set_audio_folder(&mut self, path: Option<PathBuf>) -> AnnotatorResult<bool> {
        let changed = replace_if_changed(&mut self.audio_folder, path);
        if changed {
            self.changed(StateField::AudioFolder);
        }
        check_saveable(self.audio_folder.as_deref())?;
        Ok(changed)
    }

    pub fn set_extra(&mut self, key: &str, value: StateValue) -> AnnotatorResult<bool> {
        let changed = self.extras.get(key) != Some(&value);
        if changed {
            self.extras.insert(key.to_string(), value);
            self.changed(StateField::Extra {
                key: key.to_string(),
            });
        }
        match self.extras.get(key) {
            Some(value) => value.to_json().map(|_| changed),
            None => Ok(changed),
        }
    }

    /// Media paths for `trial`, with relative names resolved against the
    /// configured folders.
    pub fn media_for(&self, trial: TrialId) -> TrialMedia {
        let media = self
            .dataset
            .as_ref()
            .map(|d| d.media(trial))
            .unwrap_or_default();
        TrialMedia {
            video: media
                .video
                .map(|p| resolve(p, self.video_folder.as_deref())),
            audio: media
                .audio
                .map(|p| resolve(p, self.audio_folder.as_deref())),
        }
    }

    /// Saveable fields as a session document. Values that cannot be coerced
    /// are left out with a warning.
    pub fn snapshot(&self) -> SessionDocument {
        let mut doc = SessionDocument::default();
        for (key, path) in [
            (KEY_FILE_PATH, &self.file_path),
            (KEY_VIDEO_FOLDER, &self.video_folder),
            (KEY_AUDIO_FOLDER, &self.audio_folder),
        ] {
            if let Some(path) = path {
                match path_to_string(path) {
                    Ok(text) => doc.insert(key, Value::String(text)),
                    Err(err) => warn!("not saving {key}: {err}"),
                }
            }
        }

        let selection: serde_json::Map<String, Value> = self
            .selection
            .iter()
            .filter_map(|(dim, coord)| {
                serde_json::to_value(coord)
                    .ok()
                    .map(|value| (dim.clone(), value))
            })
            .collect();
        doc.insert(KEY_SELECTION, Value::Object(selection));
        doc.insert(KEY_SYNC_MODE, Value::String(self.sync_mode.as_str().into()));
        match serde_json::to_value(&self.plot_settings) {
            Ok(value) => doc.insert(KEY_PLOT_SETTINGS, value),
            Err(err) => warn!("not saving plot settings: {err}"),
        }
        doc.insert(KEY_FPS_PLAYBACK, float_to_json(self.fps_playback));

        let mut extras = serde_json::Map::new();
        for (key, value) in &self.extras {
            match value.to_json() {
                Ok(json) => {
                    extras.insert(key.clone(), json);
                }
                Err(err) => warn!("not saving extra {key:?}: {err}"),
            }
        }
        if !extras.is_empty() {
            doc.insert(KEY_EXTRAS, Value::Object(extras));
        }
        doc
    }

    /// Apply a saved document through the regular setters. Returns one
    /// warning per key that was unknown or could not be applied.
    pub fn restore(&mut self, doc: &SessionDocument) -> Vec<String> {
        let mut warnings = Vec::new();
        for (key, value) in &doc.values {
            if let Err(err) = self.restore_key(key, value) {
                let message = format!("session key {key:?} ignored: {err}");
                warn!("{message}");
                warnings.push(message);
            }
        }
        warnings
    }

    /// Start publishing snapshots; the receiver feeds an `Autosaver`.
    pub fn attach_persistence(&mut self) -> watch::Receiver<SessionDocument> {
        let (tx, rx) = watch::channel(self.snapshot());
        self.snapshots = Some(tx);
        rx
    }

    fn restore_key(&mut self, key: &str, value: &Value) -> AnnotatorResult<()> {
        match key {
            KEY_FILE_PATH => self.set_file_path(json_path(value)?).map(drop),
            KEY_VIDEO_FOLDER => self.set_video_folder(json_path(value)?).map(drop),
            KEY_AUDIO_FOLDER => self.set_audio_folder(json_path(value)?).map(drop),
            KEY_SYNC_MODE => {
                let text = value
                    .as_str()
                    .ok_or_else(|| AnnotatorError::validation("expected a string"))?;
                self.set_sync_mode(text.parse()?);
                Ok(())
            }
            KEY_PLOT_SETTINGS => {
                let settings: PlotSettings = serde_json::from_value(value.clone())
                    .map_err(|e| AnnotatorError::validation(e.to_string()))?;
                self.set_plot_settings(settings).map(drop)
            }
            KEY_FPS_PLAYBACK => {
                let fps = StateValue::from_json(value)
                    .as_f64()
                    .ok_or_else(|| AnnotatorError::validation("expected a number"))?;
                self.set_fps_playback(fps).map(drop)
            }
            KEY_SELECTION => {
                let map = value
                    .as_object()
                    .ok_or_else(|| AnnotatorError::validation("expected an object"))?;
                for (dim, coord) in map {
                    let coord: Coord = serde_json::from_value(coord.clone())
                        .map_err(|e| AnnotatorError::validation(e.to_string()))?;
                    self.set_selection(dim, coord)?;
                }
                Ok(())
            }
            KEY_EXTRAS => {
                let map = value
                    .as_object()
                    .ok_or_else(|| AnnotatorError::validation("expected an object"))?;
                for (extra, json) in map {
                    self.set_extra(extra, StateValue::from_json(json))?;
                }
                Ok(())
            }
            _ => Err(AnnotatorError::validation("unknown key")),
        }
    }

    fn changed(&mut self, field: StateField) {
        debug!("state changed: {field:?}");
        self.publish();
        self.bus.emit(AppEvent::StateChanged { field });
    }

    fn publish(&self) {
        if let Some(tx) = &self.snapshots {
            tx.send_replace(self.snapshot());
        }
    }
}

fn replace_if_changed(slot: &mut Option<PathBuf>, value: Option<PathBuf>) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn check_saveable(path: Option<&Path>) -> AnnotatorResult<()> {
    match path {
        Some(path) => path_to_string(path).map(drop),
        None => Ok(()),
    }
}

fn json_path(value: &Value) -> AnnotatorResult<Option<PathBuf>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(PathBuf::from(s))),
        _ => Err(AnnotatorError::validation("expected a path string")),
    }
}

fn resolve(path: PathBuf, folder: Option<&Path>) -> PathBuf {
    match folder {
        Some(folder) if path.is_relative() => folder.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::dataset::InMemoryDataset;

    fn recorded(bus: &Rc<EventBus>) -> Rc<RefCell<Vec<AppEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    fn dataset() -> Box<dyn Dataset> {
        Box::new(
            InMemoryDataset::new(10.0)
                .with_trial(1, 100, &["beak", "tail"])
                .with_trial(2, 80, &["beak", "tail"]),
        )
    }

    #[test]
    fn identical_set_emits_nothing() {
        let bus = Rc::new(EventBus::new());
        let events = recorded(&bus);
        let mut state = AppState::new(bus);

        assert!(state.set_sync_mode(SyncMode::PlotDrivesVideo));
        assert!(!state.set_sync_mode(SyncMode::PlotDrivesVideo));
        assert!(!state.set_fps_playback(DEFAULT_FPS_PLAYBACK).unwrap());
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(
            events.borrow()[0],
            AppEvent::StateChanged {
                field: StateField::SyncMode {
                    from: SyncMode::VideoDrivesPlot,
                    to: SyncMode::PlotDrivesVideo,
                }
            }
        );
    }

    #[test]
    fn loading_resets_selection_and_notifies() {
        let bus = Rc::new(EventBus::new());
        let events = recorded(&bus);
        let mut state = AppState::new(bus);
        state.load_dataset(dataset());
        state.set_selection("trials", Coord::Int(2)).unwrap();
        state.load_dataset(dataset());

        assert_eq!(state.trial(), Some(1));
        assert_eq!(state.selection().keypoint(), Some("beak".to_string()));
        let loads = events
            .borrow()
            .iter()
            .filter(|e| matches!(e, AppEvent::DatasetLoaded { .. }))
            .count();
        assert_eq!(loads, 2);
    }

    #[test]
    fn selection_is_checked_against_schema() {
        let bus = Rc::new(EventBus::new());
        let events = recorded(&bus);
        let mut state = AppState::new(bus);
        state.load_dataset(dataset());
        events.borrow_mut().clear();

        let err = state.set_selection("trials", Coord::Int(7)).unwrap_err();
        assert!(err.is_validation());
        assert!(state.set_selection("wings", Coord::Int(1)).is_err());
        assert!(events.borrow().is_empty());

        assert!(state.set_selection("keypoints", "tail".into()).unwrap());
        assert_eq!(
            events.borrow()[0],
            AppEvent::StateChanged {
                field: StateField::Selection {
                    dimension: "keypoints".into(),
                    kind: DimensionKind::Keypoint,
                    value: "tail".into(),
                }
            }
        );
    }

    #[test]
    fn snapshot_restores_into_fresh_state() {
        let bus = Rc::new(EventBus::new());
        let mut state = AppState::new(bus.clone());
        state.load_dataset(dataset());
        state.set_selection("trials", Coord::Int(2)).unwrap();
        state.set_sync_mode(SyncMode::StreamDrivesPlot);
        state.set_fps_playback(60.0).unwrap();
        state.set_video_folder(Some("/data/video".into())).unwrap();
        state.set_extra("threshold", f64::INFINITY.into()).unwrap();
        let doc = state.snapshot();
        assert_eq!(doc.get("extras"), Some(&serde_json::json!({"threshold": "inf"})));

        let mut restored = AppState::new(bus);
        let warnings = restored.restore(&doc);
        assert!(warnings.is_empty(), "{warnings:?}");
        restored.load_dataset(dataset());
        assert_eq!(restored.trial(), Some(2));
        assert_eq!(restored.sync_mode(), SyncMode::StreamDrivesPlot);
        assert_eq!(restored.fps_playback(), 60.0);
        assert_eq!(restored.video_folder(), Some(Path::new("/data/video")));
        assert_eq!(
            restored.extra("threshold").and_then(StateValue::as_f64),
            Some(f64::INFINITY)
        );
    }

    #[test]
    fn unknown_keys_are_reported() {
        let mut doc = SessionDocument::default();
        doc.insert("colourScheme", serde_json::json!("dark"));
        doc.insert("fpsPlayback", serde_json::json!(-1.0));
        let mut state = AppState::new(Rc::new(EventBus::new()));
        let warnings = state.restore(&doc);
        assert_eq!(warnings.len(), 2);
        assert_eq!(state.fps_playback(), DEFAULT_FPS_PLAYBACK);
    }

    #[test]
    fn setters_publish_snapshots() {
        let mut state = AppState::new(Rc::new(EventBus::new()));
        let mut rx = state.attach_persistence();
        assert!(!rx.has_changed().unwrap());
        state.set_fps_playback(24.0).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().get("fpsPlayback"),
            Some(&serde_json::json!(24.0))
        );
    }

    #[cfg(unix)]
    #[test]
    fn unsaveable_path_stays_in_memory() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut state = AppState::new(Rc::new(EventBus::new()));
        let path = PathBuf::from(OsStr::from_bytes(b"/data/\xff"));
        let err = state.set_audio_folder(Some(path.clone())).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(state.audio_folder(), Some(path.as_path()));
        assert!(state.snapshot().get("audioFolder").is_none());
    }

    #[test]
    fn relative_media_resolves_against_folders() {
        let mut data = InMemoryDataset::new(10.0).with_trial(1, 10, &["beak"]);
        data.set_media(
            1,
            TrialMedia {
                video: Some("t1.mp4".into()),
                audio: Some("/abs/t1.wav".into()),
            },
        )
        .unwrap();
        let mut state = AppState::new(Rc::new(EventBus::new()));
        state.load_dataset(Box::new(data));
        state.set_video_folder(Some("/videos".into())).unwrap();
        state.set_audio_folder(Some("/audio".into())).unwrap();

        let media = state.media_for(1);
        assert_eq!(media.video, Some(PathBuf::from("/videos/t1.mp4")));
        assert_eq!(media.audio, Some(PathBuf::from("/abs/t1.wav")));
    }
}
