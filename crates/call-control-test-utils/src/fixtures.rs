//! Canned configuration and core events

use rvoip_call_control::audio::DeviceCapabilitySnapshot;
use rvoip_call_control::config::CoordinatorConfig;
use rvoip_call_control::coordinator::DeviceEvent;
use rvoip_call_control::session::CoreCallState;
use rvoip_call_control::telephony::CallStateEvent;
use rvoip_call_control::types::{MediaParams, Reason};

pub const ALICE: &str = "sip:alice@example.com";
pub const BOB: &str = "sip:bob@example.com";
pub const CAROL: &str = "sip:carol@example.com";

/// Default config with periodic statistics turned off
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::new().with_stats_interval(None)
}

pub fn state(session_id: &str, state: CoreCallState) -> CallStateEvent {
    CallStateEvent::new(session_id, state)
}

pub fn incoming(session_id: &str, remote_address: &str) -> CallStateEvent {
    CallStateEvent::new(session_id, CoreCallState::IncomingReceived)
        .with_remote_address(remote_address)
        .with_remote_params(MediaParams::audio())
}

/// The remote party re-invites asking for video
pub fn video_offer(session_id: &str) -> CallStateEvent {
    CallStateEvent::new(session_id, CoreCallState::UpdatedByRemote)
        .with_remote_params(MediaParams::video())
}

pub fn ended(session_id: &str, reason: Reason) -> CallStateEvent {
    CallStateEvent::new(session_id, CoreCallState::End).with_reason(reason)
}

pub fn bluetooth(connected: bool) -> DeviceEvent {
    DeviceEvent::Bluetooth {
        connected,
        playback_capable: true,
    }
}

pub fn tablet() -> DeviceCapabilitySnapshot {
    DeviceCapabilitySnapshot {
        is_tablet: true,
        ..DeviceCapabilitySnapshot::default()
    }
}
