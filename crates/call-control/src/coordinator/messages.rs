//! Coordinator mailbox messages
//!
//! Core events, timer expiries, device signals and user actions all travel
//! through the same mailbox, so the coordinator applies them strictly one at
//! a time. User actions carry a `respond_to` channel for the result.

use crate::audio::{AudioRoute, DeviceCapabilitySnapshot};
use crate::conference::ConferenceId;
use crate::error::CallControlResult;
use crate::events::Permission;
use crate::negotiator::UpdateToken;
use crate::telephony::CoreEvent;
use crate::types::{Reason, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Reply channel for a user action
pub type Reply<T> = oneshot::Sender<CallControlResult<T>>;

/// Which calls a hang-up applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HangUpTarget {
    Session(SessionId),
    /// The current call, else the conference, else every call
    Current,
    All,
}

#[derive(Debug)]
pub enum CoordinatorMessage {
    Core(CoreEvent),
    Timer(TimerEvent),
    Device(DeviceEvent),

    PlaceCall {
        address: String,
        respond_to: Reply<SessionId>,
    },
    AcceptCall {
        session_id: SessionId,
        respond_to: Reply<()>,
    },
    DeclineCall {
        session_id: SessionId,
        reason: Reason,
        respond_to: Reply<()>,
    },
    PauseOrResume {
        session_id: SessionId,
        respond_to: Reply<()>,
    },
    HangUp {
        target: HangUpTarget,
        respond_to: Reply<()>,
    },
    AddVideo {
        session_id: SessionId,
        respond_to: Reply<()>,
    },
    RemoveVideo {
        session_id: SessionId,
        respond_to: Reply<()>,
    },
    /// Answer an open call update prompt; `None` targets the current call
    ResolveCallUpdate {
        session_id: Option<SessionId>,
        accept: bool,
        respond_to: Reply<()>,
    },
    /// Returns the new muted state
    ToggleMicro {
        respond_to: Reply<bool>,
    },
    ToggleSpeaker {
        respond_to: Reply<AudioRoute>,
    },
    SelectAudioRoute {
        route: AudioRoute,
        respond_to: Reply<AudioRoute>,
    },
    AdjustVolume {
        delta: i32,
        respond_to: Reply<()>,
    },
    EnterConference {
        respond_to: Reply<ConferenceId>,
    },
    LeaveConference {
        respond_to: Reply<()>,
    },
    RemoveFromConference {
        session_id: SessionId,
        respond_to: Reply<()>,
    },
    /// Returns whether the current call is now recording
    ToggleRecording {
        respond_to: Reply<bool>,
    },
    SetAuthenticationTokenVerified {
        session_id: SessionId,
        verified: bool,
        respond_to: Reply<()>,
    },
    SetBandwidthRestriction {
        limited: bool,
        respond_to: Reply<()>,
    },
    /// Returns the camera now capturing
    SwitchCamera {
        respond_to: Reply<String>,
    },
    SendDtmf {
        digit: char,
        respond_to: Reply<()>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Scheduled work coming back into the mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    CallUpdateDeadline {
        session_id: SessionId,
        token: UpdateToken,
    },
    AutoAnswer {
        session_id: SessionId,
    },
    StatsTick,
}

/// Platform signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    Bluetooth {
        connected: bool,
        playback_capable: bool,
    },
    WiredHeadset {
        connected: bool,
    },
    Snapshot(DeviceCapabilitySnapshot),
    /// Network quality changed
    Connectivity {
        high_bandwidth: bool,
    },
    /// A call outside this application (e.g. cellular) started or ended
    ExternalCall {
        active: bool,
    },
    PermissionChanged {
        permission: Permission,
        granted: bool,
    },
}
