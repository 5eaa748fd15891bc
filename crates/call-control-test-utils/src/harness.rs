//! Step-by-step coordinator driver
//!
//! The harness owns a [`Coordinator`] and its mailbox instead of spawning the
//! actor, so a test decides exactly when each message is applied. Timers
//! still post into the mailbox; [`TestHarness::run_timers_for`] lets them
//! fire and applies whatever they deliver. Use it with
//! `#[tokio::test(start_paused = true)]` so waiting costs no wall time.

use crate::fixtures;
use crate::mock_core::MockCore;
use rvoip_call_control::audio::{AudioRoute, RouteCommand};
use rvoip_call_control::conference::ConferenceId;
use rvoip_call_control::config::CoordinatorConfig;
use rvoip_call_control::coordinator::{
    Coordinator, CoordinatorMessage, DeviceEvent, HangUpTarget, Reply,
};
use rvoip_call_control::error::{CallControlError, CallControlResult};
use rvoip_call_control::events::UiEvent;
use rvoip_call_control::projector::UiSnapshot;
use rvoip_call_control::session::CoreCallState;
use rvoip_call_control::telephony::{CallStateEvent, CoreEvent};
use rvoip_call_control::types::{Reason, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

const MAILBOX_CAPACITY: usize = 64;

pub struct TestHarness {
    pub coordinator: Coordinator,
    pub core: Arc<MockCore>,
    mailbox: mpsc::Receiver<CoordinatorMessage>,
    // Keeps the mailbox open for timers, which only hold weak senders
    _sender: mpsc::Sender<CoordinatorMessage>,
    routes: mpsc::UnboundedReceiver<RouteCommand>,
    snapshots: watch::Receiver<UiSnapshot>,
    ui_events: broadcast::Receiver<UiEvent>,
}

impl TestHarness {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_core(config, Arc::new(MockCore::new()))
    }

    pub fn with_core(config: CoordinatorConfig, core: Arc<MockCore>) -> Self {
        let (sender, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (route_tx, routes) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(config, core.clone(), &sender, route_tx)
            .expect("test config is valid");
        let snapshots = coordinator.subscribe_snapshots();
        let ui_events = coordinator.subscribe_ui_events();

        Self {
            coordinator,
            core,
            mailbox,
            _sender: sender,
            routes,
            snapshots,
            ui_events,
        }
    }

    /// Harness with [`fixtures::test_config`]
    pub fn default_config() -> Self {
        Self::new(fixtures::test_config())
    }

    pub async fn report(&mut self, event: CallStateEvent) {
        self.core_event(event.into()).await;
    }

    pub async fn report_state(&mut self, session_id: &str, state: CoreCallState) {
        self.report(fixtures::state(session_id, state)).await;
    }

    pub async fn core_event(&mut self, event: CoreEvent) {
        let _ = self.coordinator.handle(CoordinatorMessage::Core(event)).await;
    }

    pub async fn device(&mut self, event: DeviceEvent) {
        let _ = self.coordinator.handle(CoordinatorMessage::Device(event)).await;
    }

    /// Apply a user action and return its reply
    pub async fn request<T>(
        &mut self,
        build: impl FnOnce(Reply<T>) -> CoordinatorMessage,
    ) -> CallControlResult<T> {
        let (respond_to, response) = oneshot::channel();
        let _ = self.coordinator.handle(build(respond_to)).await;
        response
            .await
            .unwrap_or(Err(CallControlError::CoordinatorStopped))
    }

    /// Let timers fire for `duration` of (paused) time, applying what they deliver.
    ///
    /// Returns the number of messages applied.
    pub async fn run_timers_for(&mut self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut applied = 0;
        while let Ok(Some(message)) = tokio::time::timeout_at(deadline, self.mailbox.recv()).await
        {
            let _ = self.coordinator.handle(message).await;
            applied += 1;
        }
        applied
    }

    /// Latest snapshot published on the watch channel
    pub fn snapshot(&self) -> UiSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn current(&self) -> Option<SessionId> {
        self.snapshot().current_session_id
    }

    /// Route commands sent to the audio worker since the last drain
    pub fn drain_routes(&mut self) -> Vec<RouteCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.routes.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Only the routes of the drained `Apply` commands
    pub fn drain_applied_routes(&mut self) -> Vec<AudioRoute> {
        self.drain_routes()
            .into_iter()
            .filter_map(|command| match command {
                RouteCommand::Apply { route, .. } => Some(route),
                _ => None,
            })
            .collect()
    }

    pub fn drain_ui_events(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        loop {
            match self.ui_events.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    /// Incoming call answered by the user and running
    pub async fn establish_incoming(&mut self, session_id: &str, remote: &str) -> SessionId {
        let id = SessionId::from(session_id);
        self.report(fixtures::incoming(session_id, remote)).await;
        self.accept_call(&id).await.expect("incoming call can be answered");
        self.report_state(session_id, CoreCallState::Connected).await;
        self.report_state(session_id, CoreCallState::StreamsRunning)
            .await;
        id
    }

    /// Outgoing call placed and answered by the remote party
    pub async fn establish_outgoing(&mut self, remote: &str) -> SessionId {
        let id = self.place_call(remote).await.expect("call can be placed");
        for state in [
            CoreCallState::OutgoingRinging,
            CoreCallState::Connected,
            CoreCallState::StreamsRunning,
        ] {
            self.report_state(id.as_str(), state).await;
        }
        id
    }

    pub async fn place_call(&mut self, address: &str) -> CallControlResult<SessionId> {
        let address = address.to_string();
        self.request(|respond_to| CoordinatorMessage::PlaceCall {
            address,
            respond_to,
        })
        .await
    }

    pub async fn accept_call(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::AcceptCall {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn decline_call(
        &mut self,
        session_id: &SessionId,
        reason: Reason,
    ) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::DeclineCall {
            session_id,
            reason,
            respond_to,
        })
        .await
    }

    pub async fn pause_or_resume(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::PauseOrResume {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn hang_up(&mut self, target: HangUpTarget) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::HangUp { target, respond_to })
            .await
    }

    pub async fn add_video(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::AddVideo {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn remove_video(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::RemoveVideo {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn resolve_call_update(
        &mut self,
        session_id: Option<&SessionId>,
        accept: bool,
    ) -> CallControlResult<()> {
        let session_id = session_id.cloned();
        self.request(|respond_to| CoordinatorMessage::ResolveCallUpdate {
            session_id,
            accept,
            respond_to,
        })
        .await
    }

    pub async fn toggle_micro(&mut self) -> CallControlResult<bool> {
        self.request(|respond_to| CoordinatorMessage::ToggleMicro { respond_to })
            .await
    }

    pub async fn toggle_speaker(&mut self) -> CallControlResult<AudioRoute> {
        self.request(|respond_to| CoordinatorMessage::ToggleSpeaker { respond_to })
            .await
    }

    pub async fn select_audio_route(&mut self, route: AudioRoute) -> CallControlResult<AudioRoute> {
        self.request(|respond_to| CoordinatorMessage::SelectAudioRoute { route, respond_to })
            .await
    }

    pub async fn adjust_volume(&mut self, delta: i32) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::AdjustVolume { delta, respond_to })
            .await
    }

    pub async fn enter_conference(&mut self) -> CallControlResult<ConferenceId> {
        self.request(|respond_to| CoordinatorMessage::EnterConference { respond_to })
            .await
    }

    pub async fn leave_conference(&mut self) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::LeaveConference { respond_to })
            .await
    }

    pub async fn remove_from_conference(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::RemoveFromConference {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn toggle_recording(&mut self) -> CallControlResult<bool> {
        self.request(|respond_to| CoordinatorMessage::ToggleRecording { respond_to })
            .await
    }

    pub async fn set_authentication_token_verified(
        &mut self,
        session_id: &SessionId,
        verified: bool,
    ) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::SetAuthenticationTokenVerified {
            session_id,
            verified,
            respond_to,
        })
        .await
    }

    pub async fn set_bandwidth_restriction(&mut self, limited: bool) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::SetBandwidthRestriction {
            limited,
            respond_to,
        })
        .await
    }

    pub async fn switch_camera(&mut self) -> CallControlResult<String> {
        self.request(|respond_to| CoordinatorMessage::SwitchCamera { respond_to })
            .await
    }

    pub async fn send_dtmf(&mut self, digit: char) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::SendDtmf { digit, respond_to })
            .await
    }
}
