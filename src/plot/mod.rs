pub mod settings;
pub mod surface;
pub mod view;

pub use settings::PlotSettings;
pub use surface::{MotifOverlay, PlotSurface, Refresh, SpectrogramImage};
pub use view::TimeWindow;
