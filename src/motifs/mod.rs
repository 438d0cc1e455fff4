pub mod library;
pub mod shortcuts;

pub use library::{LoadReport, MotifDefinition, MotifId, MotifLibrary, Rgb, BACKGROUND_MOTIF};
pub use shortcuts::{KeyAction, KeyBindings, NavAction};
