//! Logging setup for rvoip binaries

mod setup;

pub use setup::{LoggingConfig, log_welcome, parse_log_level, setup_logging};
