//! Test support for `rvoip-call-control`
//!
//! - [`MockCore`]: a [`TelephonyCore`](rvoip_call_control::telephony::TelephonyCore)
//!   that records every command and can be told to fail specific ones
//! - [`MockAudioPort`]: an audio output that records route switches, volume
//!   changes and ring tone toggles
//! - [`TestHarness`]: drives a [`Coordinator`](rvoip_call_control::coordinator::Coordinator)
//!   one message at a time, without spawning the actor
//! - [`fixtures`]: ready-made configs and core events

pub mod fixtures;
pub mod harness;
pub mod mock_audio;
pub mod mock_core;

pub use harness::TestHarness;
pub use mock_audio::MockAudioPort;
pub use mock_core::{CoreCommand, MockCore};
