pub mod memory;
pub mod runs;
pub mod schema;

use std::path::PathBuf;

pub use memory::InMemoryDataset;
pub use runs::{label_runs, remove_short_runs, run_at, LabelRun};
pub use schema::{Coord, DatasetSchema, Dimension, DimensionKind, TrialId};

use crate::error::AnnotatorResult;
use crate::motifs::MotifId;
use crate::state::Selection;

/// Media files recorded alongside one trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialMedia {
    pub video: Option<PathBuf>,
    pub audio: Option<PathBuf>,
}

/// The externally owned array store the annotator works on.
///
/// Labels and changepoints are indexed by frame and share the shape of the
/// trial's time axis. The core never persists a dataset; it only mutates the
/// in-memory label arrays.
pub trait Dataset {
    fn fps(&self) -> f64;

    fn schema(&self) -> &DatasetSchema;

    fn n_frames(&self, trial: TrialId) -> AnnotatorResult<usize>;

    fn feature_series(&self, selection: &Selection) -> AnnotatorResult<Vec<f64>>;

    fn labels(&self, trial: TrialId, keypoint: &str) -> AnnotatorResult<&[MotifId]>;

    fn labels_mut(&mut self, trial: TrialId, keypoint: &str) -> AnnotatorResult<&mut [MotifId]>;

    fn changepoints(&self, trial: TrialId, keypoint: &str) -> AnnotatorResult<&[bool]>;

    fn media(&self, _trial: TrialId) -> TrialMedia {
        TrialMedia::default()
    }
}

/// Nearest frame index for a time in seconds. May be negative or past the end;
/// callers range-check.
pub fn time_to_frame(time_secs: f64, fps: f64) -> i64 {
    (time_secs * fps).round() as i64
}

pub fn frame_to_time(frame: usize, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    frame as f64 / fps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_conversion_rounds_to_nearest() {
        assert_eq!(time_to_frame(2.0, 10.0), 20);
        assert_eq!(time_to_frame(5.1, 10.0), 51);
        assert_eq!(time_to_frame(1.9, 10.0), 19);
        assert_eq!(time_to_frame(-0.04, 10.0), 0);
        assert_eq!(time_to_frame(-0.06, 10.0), -1);
        assert!((frame_to_time(51, 10.0) - 5.1).abs() < 1e-9);
    }
}
