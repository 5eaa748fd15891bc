//! Common infrastructure for the rvoip call-control workspace
//!
//! Binaries built on top of `rvoip-call-control` share one way of initialising
//! `tracing` output. This crate holds that setup together with the small error
//! type it reports through.

pub mod errors;
pub mod logging;

pub use errors::{Error, Result};
pub use logging::{LoggingConfig, log_welcome, parse_log_level, setup_logging};
