//! In-process stand-ins for the telephony core and the audio platform
//!
//! [`LoopbackCore`] plays the remote party: every command is answered with the
//! call state reports a well-behaved SIP peer would produce, pushed onto the
//! same event stream the coordinator consumes.

use async_trait::async_trait;
use parking_lot::Mutex;
use rvoip_call_control::audio::{AudioOutputPort, DeviceRef, VolumeStream};
use rvoip_call_control::error::{AudioRouteError, CoreError};
use rvoip_call_control::session::CoreCallState;
use rvoip_call_control::telephony::{
    CallStateEvent, CallStats, CoreEvent, STATIC_PICTURE_DEVICE, TelephonyCore, VideoDevices,
};
use rvoip_call_control::types::{MediaParams, Reason, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct LoopbackCore {
    events: mpsc::UnboundedSender<CoreEvent>,
    /// Negotiated media per live call
    calls: Mutex<HashMap<SessionId, MediaParams>>,
    next_call: AtomicU64,
    remote_auto_answer: bool,
    camera: Mutex<Option<String>>,
}

const CAMERAS: [&str; 3] = ["front", STATIC_PICTURE_DEVICE, "back"];

impl LoopbackCore {
    /// Create the core together with the event stream it reports on
    pub fn new(remote_auto_answer: bool) -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let core = Self {
            events,
            calls: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(1),
            remote_auto_answer,
            camera: Mutex::new(Some(CAMERAS[0].to_string())),
        };
        (core, rx)
    }

    /// Report an event as if it came from the network
    pub fn inject(&self, event: impl Into<CoreEvent>) {
        let event = event.into();
        if let CoreEvent::CallState(report) = &event {
            self.track(report);
        }
        if self.events.send(event).is_err() {
            debug!("Coordinator no longer listens to core events");
        }
    }

    fn emit(&self, session: &SessionId, state: CoreCallState) {
        self.inject(CallStateEvent::new(session.clone(), state));
    }

    fn emit_running(&self, session: &SessionId, params: MediaParams) {
        self.inject(
            CallStateEvent::new(session.clone(), CoreCallState::StreamsRunning)
                .with_current_params(params),
        );
    }

    fn end(&self, session: &SessionId, reason: Reason) {
        self.inject(CallStateEvent::new(session.clone(), CoreCallState::End).with_reason(reason));
        self.emit(session, CoreCallState::Released);
    }

    fn track(&self, report: &CallStateEvent) {
        let mut calls = self.calls.lock();
        match report.state {
            CoreCallState::End | CoreCallState::Error | CoreCallState::Released => {
                calls.remove(&report.session_id);
            }
            _ => {
                let params = calls.entry(report.session_id.clone()).or_default();
                if let Some(current) = &report.current_params {
                    *params = current.clone();
                }
            }
        }
    }

    fn params_of(&self, session: &SessionId) -> Result<MediaParams, CoreError> {
        self.calls
            .lock()
            .get(session)
            .cloned()
            .ok_or_else(|| CoreError::UnknownSession(session.clone()))
    }
}

#[async_trait]
impl TelephonyCore for LoopbackCore {
    async fn create_params(&self, session: Option<&SessionId>) -> Result<MediaParams, CoreError> {
        match session {
            Some(session) => self.params_of(session),
            None => Ok(MediaParams::audio()),
        }
    }

    async fn invite(&self, address: &str, params: MediaParams) -> Result<SessionId, CoreError> {
        let n = self.next_call.fetch_add(1, Ordering::Relaxed);
        let session = SessionId::new(format!("out-{}", n));
        info!(session_id = %session, %address, video = params.video_enabled, "Inviting");

        self.emit(&session, CoreCallState::OutgoingInit);
        self.emit(&session, CoreCallState::OutgoingRinging);
        if self.remote_auto_answer {
            self.emit(&session, CoreCallState::Connected);
            self.emit_running(&session, params);
        }
        Ok(session)
    }

    async fn accept_with_params(
        &self,
        session: &SessionId,
        params: MediaParams,
    ) -> Result<(), CoreError> {
        self.params_of(session)?;
        self.emit(session, CoreCallState::Connected);
        self.emit_running(session, params);
        Ok(())
    }

    async fn decline(&self, session: &SessionId, reason: Reason) -> Result<(), CoreError> {
        self.params_of(session)?;
        self.end(session, reason);
        Ok(())
    }

    async fn update(&self, session: &SessionId, params: MediaParams) -> Result<(), CoreError> {
        self.params_of(session)?;
        self.emit(session, CoreCallState::Updating);
        self.emit_running(session, params);
        Ok(())
    }

    async fn accept_update(
        &self,
        session: &SessionId,
        params: MediaParams,
    ) -> Result<(), CoreError> {
        self.params_of(session)?;
        self.emit_running(session, params);
        Ok(())
    }

    async fn pause(&self, session: &SessionId) -> Result<(), CoreError> {
        self.params_of(session)?;
        self.emit(session, CoreCallState::Pausing);
        self.emit(session, CoreCallState::Paused);
        Ok(())
    }

    async fn resume(&self, session: &SessionId) -> Result<(), CoreError> {
        let params = self.params_of(session)?;
        self.emit(session, CoreCallState::Resuming);
        self.emit_running(session, params);
        Ok(())
    }

    async fn terminate(&self, session: &SessionId) -> Result<(), CoreError> {
        self.params_of(session)?;
        self.end(session, Reason::Normal);
        Ok(())
    }

    async fn enter_conference(&self, sessions: &[SessionId]) -> Result<(), CoreError> {
        info!(members = sessions.len(), "Mixing calls into the conference");
        Ok(())
    }

    async fn leave_conference(&self) -> Result<(), CoreError> {
        info!("Conference mixer stopped");
        Ok(())
    }

    async fn remove_from_conference(&self, session: &SessionId) -> Result<(), CoreError> {
        info!(session_id = %session, "Removed from the conference mixer");
        Ok(())
    }

    async fn enable_mic(&self, enabled: bool) -> Result<(), CoreError> {
        debug!(enabled, "Microphone");
        Ok(())
    }

    async fn enable_video_capture(&self, enabled: bool) -> Result<(), CoreError> {
        debug!(enabled, "Video capture");
        Ok(())
    }

    async fn enable_video_display(&self, enabled: bool) -> Result<(), CoreError> {
        debug!(enabled, "Video display");
        Ok(())
    }

    async fn start_recording(&self, session: &SessionId) -> Result<(), CoreError> {
        let params = self.params_of(session)?;
        info!(session_id = %session, file = ?params.record_file, "Recording started");
        Ok(())
    }

    async fn stop_recording(&self, session: &SessionId) -> Result<(), CoreError> {
        info!(session_id = %session, "Recording stopped");
        Ok(())
    }

    async fn set_authentication_token_verified(
        &self,
        session: &SessionId,
        verified: bool,
    ) -> Result<(), CoreError> {
        info!(session_id = %session, verified, "Authentication token checked");
        Ok(())
    }

    async fn call_stats(&self, session: &SessionId) -> Result<CallStats, CoreError> {
        let params = self.params_of(session)?;
        let kbps = params.audio_bandwidth_kbps.map_or(64.0, |kbps| kbps as f32);
        Ok(CallStats {
            session_id: session.clone(),
            download_bandwidth_kbps: kbps,
            upload_bandwidth_kbps: kbps,
            packet_loss_percent: 0.0,
            jitter_ms: 2.5,
            round_trip_ms: Some(40),
        })
    }

    async fn video_devices(&self) -> Result<VideoDevices, CoreError> {
        Ok(VideoDevices {
            available: CAMERAS.iter().map(|device| device.to_string()).collect(),
            current: self.camera.lock().clone(),
        })
    }

    async fn set_video_device(&self, device: &str) -> Result<(), CoreError> {
        if !CAMERAS.contains(&device) {
            return Err(CoreError::Rejected(format!("no camera named {}", device)));
        }
        info!(device, "Camera selected");
        *self.camera.lock() = Some(device.to_string());
        Ok(())
    }

    async fn send_dtmf(&self, session: &SessionId, digit: char) -> Result<(), CoreError> {
        self.params_of(session)?;
        info!(session_id = %session, %digit, "DTMF sent");
        Ok(())
    }
}

/// Audio platform that only logs what it is asked to do
#[derive(Debug, Default)]
pub struct LoggingAudioPort {
    device: Option<DeviceRef>,
}

impl AudioOutputPort for LoggingAudioPort {
    fn set_output_device(
        &mut self,
        session: Option<&SessionId>,
        device: DeviceRef,
    ) -> Result<(), AudioRouteError> {
        info!(session_id = ?session, from = ?self.device, to = ?device, "Audio output switched");
        self.device = Some(device);
        Ok(())
    }

    fn adjust_stream_volume(
        &mut self,
        stream: VolumeStream,
        delta: i32,
    ) -> Result<(), AudioRouteError> {
        info!(?stream, delta, "Volume adjusted");
        Ok(())
    }

    fn is_volume_fixed(&self) -> bool {
        false
    }

    fn set_ringing(&mut self, ringing: bool) -> Result<(), AudioRouteError> {
        info!(ringing, "Ring tone");
        Ok(())
    }
}
