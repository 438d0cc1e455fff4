pub mod editor;
pub mod snap;
pub mod state;

pub use editor::{ClickOutcome, EditContext, EditorConfig, LabelEditor, DEFAULT_SNAP_WINDOW_SECS};
pub use snap::snap_to_changepoint;
pub use state::{CommittedSegment, EditorState, EditorStatus, SelectedRun};
