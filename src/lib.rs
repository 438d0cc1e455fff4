pub mod annotator;
#[cfg(feature = "playback")]
pub mod audio;
pub mod config;
pub mod dataset;
pub mod error;
pub mod events;
pub mod labels;
pub mod media;
pub mod motifs;
pub mod plot;
pub mod state;
pub mod sync;
pub mod utils;

use std::path::Path;

use anyhow::Context;
use log::info;

pub use annotator::{Annotator, DecoderFactory, Modifiers, MouseButton, UiEvent};
#[cfg(feature = "playback")]
pub use audio::AudioOutputHandle;
pub use config::AnnotatorConfig;
pub use dataset::{Coord, Dataset, DimensionKind, InMemoryDataset, TrialId};
pub use error::{AnnotatorError, AnnotatorResult};
pub use events::{AppEvent, EventBus};
pub use motifs::{KeyBindings, MotifId, MotifLibrary};
pub use sync::SyncMode;

/// Read the configuration at `config_path`, start logging and open the
/// annotator with its restored session.
pub fn start(config_path: &Path) -> anyhow::Result<Annotator> {
    let config = AnnotatorConfig::load(config_path)
        .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;
    utils::init_logging(config.debug);
    info!(
        "motif annotator starting; session file {}",
        config.session_path.display()
    );
    Annotator::open(config)
}
