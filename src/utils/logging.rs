//! Logging macros for the chattier modules (decode worker, cache, clock,
//! autosave).
//!
//! `log_info!` is progress chatter and only fires in verbose mode, which
//! follows `AnnotatorConfig::debug`. `log_warn!` and `log_error!` report
//! failures and always pass through to `log`.
//!
//! ```ignore
//! use crate::{log_error, log_info, log_warn};
//!
//! log_info!("decode worker started for {}", path.display());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Turn `log_info!` output on or off for the whole crate.
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Info logging, verbose mode only.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::utils::logging::verbose() {
            ::log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        ::log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        ::log::error!($($arg)*)
    };
}

/// Initialise `env_logger` once, honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_logging(debug: bool) {
    set_verbose(debug);
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // RUST_LOG is parsed last so it wins over the default level.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}
