pub mod app_state;
pub mod autosave;
pub mod selection;
pub mod session;
pub mod value;

pub use app_state::AppState;
pub use autosave::{Autosaver, DEFAULT_AUTOSAVE_INTERVAL};
pub use selection::Selection;
pub use session::{SessionDocument, SessionStore};
pub use value::StateValue;
