//! Conditional logging macros keyed on module-level switches.
//!
//! A module opts in by declaring both constants:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "journey";
//!
//! use crate::{log_info, log_warn};
//! log_info!("recorded {} samples", 3);
//! ```
//! Records are emitted on `LOG_TARGET`, so `RUST_LOG=journey=warn` narrows a
//! single module without touching the rest.

/// Info record on the calling module's `LOG_TARGET`, gated by `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Warn record on the calling module's `LOG_TARGET`, gated by `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Debug record on the calling module's `LOG_TARGET`, gated by `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Error record on the calling module's `LOG_TARGET`, gated by `ENABLE_LOGS`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!(target: LOG_TARGET, $($arg)*);
        }
    };
}
