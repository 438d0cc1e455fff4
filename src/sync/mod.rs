pub mod buffered;
pub mod clock;
pub mod driver;
pub mod mode;
pub mod streaming;

pub use buffered::BufferedDriver;
pub use clock::{TimeSync, DEFAULT_FPS_PLAYBACK};
pub use driver::{make_driver, DriverKind, MediaDriver};
pub use mode::{DriverSlot, SyncMode};
pub use streaming::StreamingDriver;
