//! Boundary to the telephony core
//!
//! The core is the SIP/media engine. It is driven through the
//! [`TelephonyCore`] command trait and reports back asynchronously with
//! [`CoreEvent`]s, delivered in order on a single stream.

use crate::error::CoreError;
use crate::session::CoreCallState;
use crate::types::{MediaEncryption, MediaParams, Reason, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Commands the coordinator issues to the telephony core
#[async_trait]
pub trait TelephonyCore: Send + Sync {
    /// Default parameters for a new call, or for answering `session`
    async fn create_params(&self, session: Option<&SessionId>) -> Result<MediaParams, CoreError>;

    async fn invite(&self, address: &str, params: MediaParams) -> Result<SessionId, CoreError>;

    async fn accept_with_params(
        &self,
        session: &SessionId,
        params: MediaParams,
    ) -> Result<(), CoreError>;

    async fn decline(&self, session: &SessionId, reason: Reason) -> Result<(), CoreError>;

    /// Locally initiated re-invite
    async fn update(&self, session: &SessionId, params: MediaParams) -> Result<(), CoreError>;

    /// Answer a remote re-invite
    async fn accept_update(&self, session: &SessionId, params: MediaParams)
    -> Result<(), CoreError>;

    async fn pause(&self, session: &SessionId) -> Result<(), CoreError>;

    async fn resume(&self, session: &SessionId) -> Result<(), CoreError>;

    async fn terminate(&self, session: &SessionId) -> Result<(), CoreError>;

    async fn enter_conference(&self, sessions: &[SessionId]) -> Result<(), CoreError>;

    async fn leave_conference(&self) -> Result<(), CoreError>;

    async fn remove_from_conference(&self, session: &SessionId) -> Result<(), CoreError>;

    async fn enable_mic(&self, enabled: bool) -> Result<(), CoreError>;

    async fn enable_video_capture(&self, enabled: bool) -> Result<(), CoreError>;

    async fn enable_video_display(&self, enabled: bool) -> Result<(), CoreError>;

    async fn start_recording(&self, session: &SessionId) -> Result<(), CoreError>;

    async fn stop_recording(&self, session: &SessionId) -> Result<(), CoreError>;

    async fn set_authentication_token_verified(
        &self,
        session: &SessionId,
        verified: bool,
    ) -> Result<(), CoreError>;

    async fn call_stats(&self, session: &SessionId) -> Result<CallStats, CoreError>;

    async fn video_devices(&self) -> Result<VideoDevices, CoreError>;

    async fn set_video_device(&self, device: &str) -> Result<(), CoreError>;

    /// Send a DTMF digit on `session`; local key feedback is up to the core
    async fn send_dtmf(&self, session: &SessionId, digit: char) -> Result<(), CoreError>;
}

/// Placeholder capture device some platforms list next to real cameras
pub const STATIC_PICTURE_DEVICE: &str = "StaticImage: Static picture";

/// Video capture devices known to the core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDevices {
    pub available: Vec<String>,
    pub current: Option<String>,
}

impl VideoDevices {
    /// First real camera other than the one in use
    pub fn next_camera(&self) -> Option<&str> {
        self.available
            .iter()
            .map(String::as_str)
            .find(|device| {
                *device != STATIC_PICTURE_DEVICE && Some(*device) != self.current.as_deref()
            })
    }
}

/// Event reported by the telephony core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreEvent {
    CallState(CallStateEvent),
    Registration(RegistrationEvent),
    EncryptionChanged(EncryptionEvent),
}

/// A call changed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStateEvent {
    pub session_id: SessionId,
    pub state: CoreCallState,
    #[serde(default)]
    pub reason: Option<Reason>,
    #[serde(default)]
    pub remote_address: Option<String>,
    /// Media the remote party offers
    #[serde(default)]
    pub remote_params: Option<MediaParams>,
    /// Media currently negotiated
    #[serde(default)]
    pub current_params: Option<MediaParams>,
}

impl CallStateEvent {
    pub fn new(session_id: impl Into<SessionId>, state: CoreCallState) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            reason: None,
            remote_address: None,
            remote_params: None,
            current_params: None,
        }
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    pub fn with_remote_params(mut self, params: MediaParams) -> Self {
        self.remote_params = Some(params);
        self
    }

    pub fn with_current_params(mut self, params: MediaParams) -> Self {
        self.current_params = Some(params);
        self
    }
}

impl From<CallStateEvent> for CoreEvent {
    fn from(event: CallStateEvent) -> Self {
        CoreEvent::CallState(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    None,
    Progress,
    Ok,
    Cleared,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationEvent {
    pub account_id: String,
    pub state: RegistrationState,
    #[serde(default)]
    pub message: Option<String>,
}

/// Media encryption was (re)negotiated for a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionEvent {
    pub session_id: SessionId,
    pub encryption: MediaEncryption,
    /// ZRTP short authentication string
    #[serde(default)]
    pub authentication_token: Option<String>,
    #[serde(default)]
    pub token_verified: bool,
}

/// Quality figures for a running call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
    pub session_id: SessionId,
    pub download_bandwidth_kbps: f32,
    pub upload_bandwidth_kbps: f32,
    pub packet_loss_percent: f32,
    pub jitter_ms: f32,
    pub round_trip_ms: Option<u32>,
}
