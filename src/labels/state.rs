use serde::{Deserialize, Serialize};

use crate::dataset::{frame_to_time, TrialId};
use crate::motifs::MotifId;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EditorStatus {
    #[default]
    Idle,
    /// A start time has been chosen; the next click ends the segment.
    AwaitingEnd,
    /// Transient while a segment is validated and written.
    Committing,
}

/// A labeled run picked by clicking on it, target of delete, edit and play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedRun {
    pub trial: TrialId,
    pub keypoint: String,
    pub start_frame: usize,
    pub end_frame: usize,
    pub motif_id: MotifId,
}

impl SelectedRun {
    pub fn start_time(&self, fps: f64) -> f64 {
        frame_to_time(self.start_frame, fps)
    }

    pub fn end_time(&self, fps: f64) -> f64 {
        frame_to_time(self.end_frame, fps)
    }
}

/// A segment as written to the label array, `[start_frame, end_frame)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedSegment {
    pub trial: TrialId,
    pub keypoint: String,
    pub start_time: f64,
    pub end_time: f64,
    pub start_frame: usize,
    pub end_frame: usize,
    pub motif_id: MotifId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    pub status: EditorStatus,
    pub label_mode: bool,
    pub selected_motif: Option<MotifId>,
    pub pending_start: Option<f64>,
    pub selected_run: Option<SelectedRun>,
    /// Set while the selected run is being replaced by a new range.
    pub editing: bool,
}

impl EditorState {
    pub fn is_armed(&self) -> bool {
        self.label_mode && self.selected_motif.is_some()
    }
}
