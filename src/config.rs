use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::labels::EditorConfig;
use crate::media::{DEFAULT_MAX_BYTES, DEFAULT_QUEUE_CAPACITY};
use crate::motifs::KeyBindings;
use crate::plot::PlotSettings;
use crate::state::DEFAULT_AUTOSAVE_INTERVAL;
use crate::sync::DriverKind;

pub const DEBUG_ENV: &str = "MOTIF_ANNOTATOR_DEBUG";
pub const STATE_PATH_ENV: &str = "MOTIF_ANNOTATOR_STATE";

/// Static configuration read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotatorConfig {
    pub motif_file: Option<PathBuf>,
    pub session_path: PathBuf,
    pub autosave_interval_secs: u64,
    pub editor: EditorConfig,
    pub cache_max_bytes: usize,
    pub video_queue_capacity: usize,
    pub audio_queue_capacity: usize,
    pub driver_kind: DriverKind,
    pub plot: PlotSettings,
    pub key_bindings: KeyBindings,
    /// Verbose logging, set from the environment only.
    #[serde(skip)]
    pub debug: bool,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            motif_file: None,
            session_path: PathBuf::from("motif-annotator-session.json"),
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL.as_secs(),
            editor: EditorConfig::default(),
            cache_max_bytes: DEFAULT_MAX_BYTES,
            video_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            audio_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            driver_kind: DriverKind::default(),
            plot: PlotSettings::default(),
            key_bindings: KeyBindings::default(),
            debug: false,
        }
    }
}

impl AnnotatorConfig {
    /// Read `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config in {}", path.display()))?
        } else {
            AnnotatorConfig::default()
        };
        config.validated()
    }

    /// Apply `MOTIF_ANNOTATOR_DEBUG` and `MOTIF_ANNOTATOR_STATE`.
    pub fn with_env_overrides(mut self) -> Self {
        let debug_mode = std::env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.debug = true;
            self.autosave_interval_secs = 1;
        }
        if let Ok(path) = std::env::var(STATE_PATH_ENV) {
            if !path.is_empty() {
                self.session_path = PathBuf::from(path);
            }
        }
        self
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    fn validated(self) -> Result<Self> {
        let config = self.with_env_overrides();
        config.plot.validate().context("Invalid plot settings")?;
        anyhow::ensure!(
            config.editor.snap_window_secs.is_finite() && config.editor.snap_window_secs >= 0.0,
            "snap window must be a non-negative number of seconds"
        );
        anyhow::ensure!(
            config.video_queue_capacity > 0 && config.audio_queue_capacity > 0,
            "decode queue capacities must be positive"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motifs::KeyAction;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnnotatorConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.plot, PlotSettings::default());
        assert_eq!(config.driver_kind, DriverKind::Buffered);
        assert!(config.editor.snap_enabled);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "driverKind": "streaming",
                "editor": { "snapEnabled": false },
                "plot": { "nfft": 512 },
                "keyBindings": { "motifs": { "q": 3 } }
            }"#,
        )
        .unwrap();

        let config = AnnotatorConfig::load(&path).unwrap();
        assert_eq!(config.driver_kind, DriverKind::Streaming);
        assert!(!config.editor.snap_enabled);
        assert_eq!(config.editor.snap_window_secs, 0.2);
        assert_eq!(config.plot.nfft, 512);
        assert_eq!(config.plot.hop_frac, 0.5);
        assert_eq!(config.key_bindings.resolve("q"), Some(KeyAction::Motif(3)));
    }

    #[test]
    fn invalid_plot_settings_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "plot": { "hopFrac": 1.5 } }"#).unwrap();
        assert!(AnnotatorConfig::load(&path).is_err());
    }
}
