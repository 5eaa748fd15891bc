//! Recording telephony core

use async_trait::async_trait;
use parking_lot::Mutex;
use rvoip_call_control::error::CoreError;
use rvoip_call_control::telephony::{CallStats, TelephonyCore, VideoDevices};
use rvoip_call_control::types::{MediaParams, Reason, SessionId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A command received by [`MockCore`]
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    CreateParams(Option<SessionId>),
    Invite {
        address: String,
        params: MediaParams,
    },
    Accept {
        session_id: SessionId,
        params: MediaParams,
    },
    Decline {
        session_id: SessionId,
        reason: Reason,
    },
    Update {
        session_id: SessionId,
        params: MediaParams,
    },
    AcceptUpdate {
        session_id: SessionId,
        params: MediaParams,
    },
    Pause(SessionId),
    Resume(SessionId),
    Terminate(SessionId),
    EnterConference(Vec<SessionId>),
    LeaveConference,
    RemoveFromConference(SessionId),
    EnableMic(bool),
    EnableVideoCapture(bool),
    EnableVideoDisplay(bool),
    StartRecording(SessionId),
    StopRecording(SessionId),
    SetAuthenticationTokenVerified {
        session_id: SessionId,
        verified: bool,
    },
    CallStats(SessionId),
    VideoDevices,
    SetVideoDevice(String),
    SendDtmf {
        session_id: SessionId,
        digit: char,
    },
}

impl CoreCommand {
    /// Name of the [`TelephonyCore`] method that produced this command
    pub fn name(&self) -> &'static str {
        match self {
            CoreCommand::CreateParams(_) => "create_params",
            CoreCommand::Invite { .. } => "invite",
            CoreCommand::Accept { .. } => "accept_with_params",
            CoreCommand::Decline { .. } => "decline",
            CoreCommand::Update { .. } => "update",
            CoreCommand::AcceptUpdate { .. } => "accept_update",
            CoreCommand::Pause(_) => "pause",
            CoreCommand::Resume(_) => "resume",
            CoreCommand::Terminate(_) => "terminate",
            CoreCommand::EnterConference(_) => "enter_conference",
            CoreCommand::LeaveConference => "leave_conference",
            CoreCommand::RemoveFromConference(_) => "remove_from_conference",
            CoreCommand::EnableMic(_) => "enable_mic",
            CoreCommand::EnableVideoCapture(_) => "enable_video_capture",
            CoreCommand::EnableVideoDisplay(_) => "enable_video_display",
            CoreCommand::StartRecording(_) => "start_recording",
            CoreCommand::StopRecording(_) => "stop_recording",
            CoreCommand::SetAuthenticationTokenVerified { .. } => {
                "set_authentication_token_verified"
            }
            CoreCommand::CallStats(_) => "call_stats",
            CoreCommand::VideoDevices => "video_devices",
            CoreCommand::SetVideoDevice(_) => "set_video_device",
            CoreCommand::SendDtmf { .. } => "send_dtmf",
        }
    }
}

/// Telephony core that only records what it is asked to do
///
/// Commands never produce events; tests report call states themselves.
/// `invite` hands out `call-1`, `call-2`, ...
#[derive(Debug, Default)]
pub struct MockCore {
    commands: Mutex<Vec<CoreCommand>>,
    failing: Mutex<HashSet<&'static str>>,
    default_params: Mutex<MediaParams>,
    video_devices: Mutex<VideoDevices>,
    next_call: AtomicU64,
}

impl MockCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters returned by `create_params`
    pub fn with_default_params(self, params: MediaParams) -> Self {
        *self.default_params.lock() = params;
        self
    }

    /// Cameras reported by `video_devices`; `set_video_device` moves `current`
    pub fn with_video_devices(self, available: &[&str], current: Option<&str>) -> Self {
        *self.video_devices.lock() = VideoDevices {
            available: available.iter().map(|device| device.to_string()).collect(),
            current: current.map(str::to_string),
        };
        self
    }

    pub fn video_device(&self) -> Option<String> {
        self.video_devices.lock().current.clone()
    }

    /// Make every later call to the named command fail
    pub fn fail(&self, command: &'static str) {
        self.failing.lock().insert(command);
    }

    pub fn succeed(&self, command: &'static str) {
        self.failing.lock().remove(command);
    }

    pub fn commands(&self) -> Vec<CoreCommand> {
        self.commands.lock().clone()
    }

    /// Return the recorded commands and start a fresh log
    pub fn take_commands(&self) -> Vec<CoreCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Names of the recorded commands, in order
    pub fn command_names(&self) -> Vec<&'static str> {
        self.commands.lock().iter().map(CoreCommand::name).collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|recorded| recorded.name() == command)
            .count()
    }

    pub fn last(&self, command: &str) -> Option<CoreCommand> {
        self.commands
            .lock()
            .iter()
            .rev()
            .find(|recorded| recorded.name() == command)
            .cloned()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }

    fn record(&self, command: CoreCommand) -> Result<(), CoreError> {
        let name = command.name();
        debug!(?command, "MockCore received command");
        self.commands.lock().push(command);
        if self.failing.lock().contains(name) {
            return Err(CoreError::Rejected(format!("{name} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl TelephonyCore for MockCore {
    async fn create_params(&self, session: Option<&SessionId>) -> Result<MediaParams, CoreError> {
        self.record(CoreCommand::CreateParams(session.cloned()))?;
        Ok(self.default_params.lock().clone())
    }

    async fn invite(&self, address: &str, params: MediaParams) -> Result<SessionId, CoreError> {
        self.record(CoreCommand::Invite {
            address: address.to_string(),
            params,
        })?;
        let n = self.next_call.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionId::new(format!("call-{n}")))
    }

    async fn accept_with_params(
        &self,
        session: &SessionId,
        params: MediaParams,
    ) -> Result<(), CoreError> {
        self.record(CoreCommand::Accept {
            session_id: session.clone(),
            params,
        })
    }

    async fn decline(&self, session: &SessionId, reason: Reason) -> Result<(), CoreError> {
        self.record(CoreCommand::Decline {
            session_id: session.clone(),
            reason,
        })
    }

    async fn update(&self, session: &SessionId, params: MediaParams) -> Result<(), CoreError> {
        self.record(CoreCommand::Update {
            session_id: session.clone(),
            params,
        })
    }

    async fn accept_update(
        &self,
        session: &SessionId,
        params: MediaParams,
    ) -> Result<(), CoreError> {
        self.record(CoreCommand::AcceptUpdate {
            session_id: session.clone(),
            params,
        })
    }

    async fn pause(&self, session: &SessionId) -> Result<(), CoreError> {
        self.record(CoreCommand::Pause(session.clone()))
    }

    async fn resume(&self, session: &SessionId) -> Result<(), CoreError> {
        self.record(CoreCommand::Resume(session.clone()))
    }

    async fn terminate(&self, session: &SessionId) -> Result<(), CoreError> {
        self.record(CoreCommand::Terminate(session.clone()))
    }

    async fn enter_conference(&self, sessions: &[SessionId]) -> Result<(), CoreError> {
        self.record(CoreCommand::EnterConference(sessions.to_vec()))
    }

    async fn leave_conference(&self) -> Result<(), CoreError> {
        self.record(CoreCommand::LeaveConference)
    }

    async fn remove_from_conference(&self, session: &SessionId) -> Result<(), CoreError> {
        self.record(CoreCommand::RemoveFromConference(session.clone()))
    }

    async fn enable_mic(&self, enabled: bool) -> Result<(), CoreError> {
        self.record(CoreCommand::EnableMic(enabled))
    }

    async fn enable_video_capture(&self, enabled: bool) -> Result<(), CoreError> {
        self.record(CoreCommand::EnableVideoCapture(enabled))
    }

    async fn enable_video_display(&self, enabled: bool) -> Result<(), CoreError> {
        self.record(CoreCommand::EnableVideoDisplay(enabled))
    }

    async fn start_recording(&self, session: &SessionId) -> Result<(), CoreError> {
        self.record(CoreCommand::StartRecording(session.clone()))
    }

    async fn stop_recording(&self, session: &SessionId) -> Result<(), CoreError> {
        self.record(CoreCommand::StopRecording(session.clone()))
    }

    async fn set_authentication_token_verified(
        &self,
        session: &SessionId,
        verified: bool,
    ) -> Result<(), CoreError> {
        self.record(CoreCommand::SetAuthenticationTokenVerified {
            session_id: session.clone(),
            verified,
        })
    }

    async fn call_stats(&self, session: &SessionId) -> Result<CallStats, CoreError> {
        self.record(CoreCommand::CallStats(session.clone()))?;
        Ok(CallStats {
            session_id: session.clone(),
            download_bandwidth_kbps: 64.0,
            upload_bandwidth_kbps: 64.0,
            packet_loss_percent: 0.0,
            jitter_ms: 2.5,
            round_trip_ms: Some(40),
        })
    }

    async fn video_devices(&self) -> Result<VideoDevices, CoreError> {
        self.record(CoreCommand::VideoDevices)?;
        Ok(self.video_devices.lock().clone())
    }

    async fn set_video_device(&self, device: &str) -> Result<(), CoreError> {
        self.record(CoreCommand::SetVideoDevice(device.to_string()))?;
        self.video_devices.lock().current = Some(device.to_string());
        Ok(())
    }

    async fn send_dtmf(&self, session: &SessionId, digit: char) -> Result<(), CoreError> {
        self.record(CoreCommand::SendDtmf {
            session_id: session.clone(),
            digit,
        })
    }
}
