pub mod logging;

pub use logging::{init_logging, set_verbose};
