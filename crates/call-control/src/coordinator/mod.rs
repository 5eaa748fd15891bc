//! Call session coordinator
//!
//! The coordinator owns every [`CallSession`], the conference registry, the
//! audio routing policy and the call update negotiator. It runs as a single
//! actor task: core events, timer expiries, device signals and user actions
//! all arrive as [`CoordinatorMessage`]s on one mailbox and are applied one at
//! a time, so no two mutations of call state ever interleave.
//!
//! # Architecture
//!
//! ```text
//!  TelephonyCore events ──▶ forwarder ──┐
//!  CoordinatorHandle actions ───────────┼──▶ mailbox ──▶ Coordinator::handle()
//!  Scheduler timers ────────────────────┘                      │
//!                                    ┌─────────────────────────┼──────────────────┐
//!                                    ▼                         ▼                  ▼
//!                           TelephonyCore commands     RouteCommand queue   UiSnapshot / UiEvent
//!                                                      (audio worker)
//! ```
//!
//! After every message the foreground ("current") call is recomputed, the
//! ring tone and statistics timer are brought in line with the session set,
//! and a fresh [`UiSnapshot`] is published.
//!
//! # Current call
//!
//! The current call is the live session with the highest activity rank
//! (running or outgoing, then ringing incoming, then locally paused), ties
//! broken by the most recent activation. A session is activated when it is
//! created, when it (re)enters a running state and when it joins a conference.

mod actions;
mod core_events;
mod handle;
mod messages;
mod signals;

pub use handle::{CoordinatorHandle, CoordinatorTasks};
pub use messages::{CoordinatorMessage, DeviceEvent, HangUpTarget, Reply, TimerEvent};

use crate::audio::{AudioRoute, AudioRoutePolicy, RouteCommand};
use crate::bandwidth::BandwidthPolicy;
use crate::conference::ConferenceRegistry;
use crate::config::CoordinatorConfig;
use crate::error::CallControlResult;
use crate::events::{Notification, NotificationKind, Permission, UiEvent};
use crate::negotiator::CallUpdateNegotiator;
use crate::projector::{CallSummary, PendingPrompt, UiSnapshot, UiStateProjector};
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::session::CallSession;
use crate::telephony::TelephonyCore;
use crate::types::SessionId;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

const UI_EVENT_CAPACITY: usize = 64;

/// Action parked until a permission is granted
#[derive(Debug, Clone, PartialEq, Eq)]
enum DeferredAction {
    PlaceCall { address: String },
    AddVideo { session_id: SessionId },
    AcceptCallUpdate { session_id: SessionId },
}

impl DeferredAction {
    fn permission(&self) -> Permission {
        match self {
            DeferredAction::PlaceCall { .. }
            | DeferredAction::AddVideo { .. }
            | DeferredAction::AcceptCallUpdate { .. } => Permission::Camera,
        }
    }

    /// User-facing text for a cancelled action
    fn describe(&self) -> &'static str {
        match self {
            DeferredAction::PlaceCall { .. } => "Video call cancelled, camera permission denied",
            DeferredAction::AddVideo { .. } => "Video not added, camera permission denied",
            DeferredAction::AcceptCallUpdate { .. } => {
                "Video not accepted, camera permission denied"
            }
        }
    }

    fn session_id(&self) -> Option<&SessionId> {
        match self {
            DeferredAction::PlaceCall { .. } => None,
            DeferredAction::AddVideo { session_id }
            | DeferredAction::AcceptCallUpdate { session_id } => Some(session_id),
        }
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    core: Arc<dyn TelephonyCore>,
    sessions: BTreeMap<SessionId, CallSession>,
    current: Option<SessionId>,
    next_activation: u64,
    conference: ConferenceRegistry,
    audio: AudioRoutePolicy,
    bandwidth: BandwidthPolicy,
    negotiator: CallUpdateNegotiator,
    scheduler: Scheduler<CoordinatorMessage>,
    routes: mpsc::UnboundedSender<RouteCommand>,
    projector: UiStateProjector,
    ui_events: broadcast::Sender<UiEvent>,
    mic_muted: bool,
    permissions: BTreeSet<Permission>,
    deferred: Vec<DeferredAction>,
    external_call_active: bool,
    high_bandwidth_connection: bool,
    ringing: bool,
    auto_answer: BTreeMap<SessionId, ScheduledTask>,
    stats_task: Option<ScheduledTask>,
}

impl Coordinator {
    /// Build a coordinator that schedules its timers into `mailbox` and
    /// sends route work to `routes`.
    pub fn new(
        config: CoordinatorConfig,
        core: Arc<dyn TelephonyCore>,
        mailbox: &mpsc::Sender<CoordinatorMessage>,
        routes: mpsc::UnboundedSender<RouteCommand>,
    ) -> CallControlResult<Self> {
        config.validate()?;
        let (ui_events, _) = broadcast::channel(UI_EVENT_CAPACITY);

        Ok(Self {
            audio: AudioRoutePolicy::new(config.device),
            bandwidth: BandwidthPolicy::new(config.bandwidth_profile),
            negotiator: CallUpdateNegotiator::new(
                config.video_enabled,
                config.auto_accept_video,
                config.call_update_timeout(),
            ),
            permissions: config.granted_permissions.iter().copied().collect(),
            config,
            core,
            sessions: BTreeMap::new(),
            current: None,
            next_activation: 0,
            conference: ConferenceRegistry::new(),
            scheduler: Scheduler::new(mailbox),
            routes,
            projector: UiStateProjector::new(),
            ui_events,
            mic_muted: false,
            deferred: Vec::new(),
            external_call_active: false,
            high_bandwidth_connection: true,
            ringing: false,
            auto_answer: BTreeMap::new(),
            stats_task: None,
        })
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<UiSnapshot> {
        self.projector.subscribe()
    }

    pub fn subscribe_ui_events(&self) -> broadcast::Receiver<UiEvent> {
        self.ui_events.subscribe()
    }

    pub fn ui_event_sender(&self) -> broadcast::Sender<UiEvent> {
        self.ui_events.clone()
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&CallSession> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &CallSession> {
        self.sessions.values()
    }

    pub fn current_session_id(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    pub fn conference(&self) -> &ConferenceRegistry {
        &self.conference
    }

    pub fn negotiator(&self) -> &CallUpdateNegotiator {
        &self.negotiator
    }

    pub fn route(&self) -> AudioRoute {
        self.audio.current()
    }

    /// Drain the mailbox until shutdown or until every sender is gone
    pub async fn run(mut self, mut mailbox: mpsc::Receiver<CoordinatorMessage>) {
        info!("Call coordinator started");
        while let Some(message) = mailbox.recv().await {
            if self.handle(message).await.is_break() {
                break;
            }
        }
        self.stop();
        info!("Call coordinator stopped");
    }

    /// Apply one message and republish the UI snapshot.
    ///
    /// Replies to user actions are sent after the snapshot is published, so a
    /// caller that awaited the reply already sees the resulting state.
    pub async fn handle(&mut self, message: CoordinatorMessage) -> ControlFlow<()> {
        match message {
            CoordinatorMessage::Core(event) => self.on_core_event(event).await,
            CoordinatorMessage::Timer(timer) => self.on_timer(timer).await,
            CoordinatorMessage::Device(event) => self.on_device_event(event).await,
            CoordinatorMessage::PlaceCall { address, respond_to } => {
                let result = self.place_call(address).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::AcceptCall {
                session_id,
                respond_to,
            } => {
                let result = self.accept_call(&session_id).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::DeclineCall {
                session_id,
                reason,
                respond_to,
            } => {
                let result = self.decline_call(&session_id, reason).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::PauseOrResume {
                session_id,
                respond_to,
            } => {
                let result = self.pause_or_resume(&session_id).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::HangUp { target, respond_to } => {
                let result = self.hang_up(target).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::AddVideo {
                session_id,
                respond_to,
            } => {
                let result = self.add_video(&session_id).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::RemoveVideo {
                session_id,
                respond_to,
            } => {
                let result = self.remove_video(&session_id).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::ResolveCallUpdate {
                session_id,
                accept,
                respond_to,
            } => {
                let result = self.resolve_call_update(session_id, accept).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::ToggleMicro { respond_to } => {
                let result = self.toggle_micro().await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::ToggleSpeaker { respond_to } => {
                let result = self.toggle_speaker();
                self.respond(respond_to, result);
            }
            CoordinatorMessage::SelectAudioRoute { route, respond_to } => {
                let result = self.select_audio_route(route);
                self.respond(respond_to, result);
            }
            CoordinatorMessage::AdjustVolume { delta, respond_to } => {
                let result = self.adjust_volume(delta);
                self.respond(respond_to, result);
            }
            CoordinatorMessage::EnterConference { respond_to } => {
                let result = self.enter_conference().await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::LeaveConference { respond_to } => {
                let result = self.leave_conference().await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::RemoveFromConference {
                session_id,
                respond_to,
            } => {
                let result = self.remove_from_conference(&session_id).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::ToggleRecording { respond_to } => {
                let result = self.toggle_recording().await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::SetAuthenticationTokenVerified {
                session_id,
                verified,
                respond_to,
            } => {
                let result = self
                    .set_authentication_token_verified(&session_id, verified)
                    .await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::SetBandwidthRestriction {
                limited,
                respond_to,
            } => {
                let result = self.set_bandwidth_restriction(limited);
                self.respond(respond_to, result);
            }
            CoordinatorMessage::SwitchCamera { respond_to } => {
                let result = self.switch_camera().await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::SendDtmf { digit, respond_to } => {
                let result = self.send_dtmf(digit).await;
                self.respond(respond_to, result);
            }
            CoordinatorMessage::Shutdown { respond_to } => {
                self.stop();
                let _ = respond_to.send(());
                return ControlFlow::Break(());
            }
        }

        self.settle();
        ControlFlow::Continue(())
    }

    /// Snapshot of the current state, as it would be published
    pub fn snapshot(&self) -> UiSnapshot {
        let current = self.current_session();
        let pending_update_prompt = current
            .and_then(|session| self.negotiator.pending(&session.id))
            .or_else(|| self.negotiator.iter().next())
            .map(|pending| PendingPrompt {
                session_id: pending.session_id.clone(),
                expires_at: pending.expires_at,
            });

        UiSnapshot {
            current_session_id: self.current.clone(),
            route: self.audio.current(),
            mic_muted: self.mic_muted,
            video_enabled: current.is_some_and(|session| session.media.video_enabled),
            is_recording: current.is_some_and(|session| session.recording),
            conference_size: self.conference.size(),
            pending_update_prompt,
            calls: self
                .sessions
                .values()
                .filter(|session| !session.declined)
                .map(|session| CallSummary {
                    session_id: session.id.clone(),
                    remote_address: session.remote_address.clone(),
                    direction: session.direction,
                    state: session.state,
                    video_enabled: session.media.video_enabled,
                    in_conference: session.conference.is_some(),
                    recording: session.recording,
                    authentication_token_verified: session.authentication_token_verified,
                })
                .collect(),
        }
    }

    fn settle(&mut self) {
        if self.refresh_current() {
            self.evaluate_route();
        }
        self.update_ringing();
        self.ensure_stats_timer();
        self.projector.publish(self.snapshot());
    }

    fn stop(&mut self) {
        self.auto_answer.clear();
        self.stats_task = None;
        if self.ringing {
            self.ringing = false;
            self.send_route(RouteCommand::Ringing(false));
        }
    }

    fn current_session(&self) -> Option<&CallSession> {
        self.current.as_ref().and_then(|id| self.sessions.get(id))
    }

    /// Recompute the current call, returns `true` if it changed
    fn refresh_current(&mut self) -> bool {
        let next = self
            .sessions
            .values()
            .filter(|session| session.is_live())
            .max_by_key(|session| (session.activity_rank(), session.activation_seq))
            .map(|session| session.id.clone());

        if next == self.current {
            return false;
        }
        debug!(from = ?self.current, to = ?next, "Current call changed");
        self.current = next;
        self.current.is_some()
    }

    fn activate(&mut self, session_id: &SessionId) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            self.next_activation += 1;
            session.activation_seq = self.next_activation;
        }
    }

    fn evaluate_route(&mut self) {
        let session = self.current.as_ref().and_then(|id| self.sessions.get(id));
        let route = self.audio.evaluate(session);
        self.push_route(route);
    }

    fn push_route(&self, route: AudioRoute) {
        self.send_route(RouteCommand::Apply {
            session_id: self.current.clone(),
            route,
        });
    }

    fn send_route(&self, command: RouteCommand) {
        if self.routes.send(command).is_err() {
            warn!("Audio route worker is gone");
        }
    }

    fn update_ringing(&mut self) {
        let mut live = self.sessions.values().filter(|session| !session.declined);
        let should_ring = match (live.next(), live.next()) {
            (Some(only), None) => only.is_ringing_incoming(),
            _ => false,
        };
        if should_ring != self.ringing {
            self.ringing = should_ring;
            self.send_route(RouteCommand::Ringing(should_ring));
        }
    }

    fn ensure_stats_timer(&mut self) {
        match self.config.stats_interval() {
            Some(period) if !self.sessions.is_empty() => {
                if self.stats_task.is_none() {
                    self.stats_task = Some(self.scheduler.schedule_every(period, || {
                        CoordinatorMessage::Timer(TimerEvent::StatsTick)
                    }));
                }
            }
            _ => self.stats_task = None,
        }
    }

    fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    fn emit(&self, event: UiEvent) {
        // No subscriber is not an error
        let _ = self.ui_events.send(event);
    }

    fn notify(&self, kind: NotificationKind, session_id: Option<SessionId>, message: &str) {
        self.emit(UiEvent::Notification(Notification::new(kind, session_id, message)));
    }

    /// Publish the outcome of a user action, then answer it
    fn respond<T>(&mut self, respond_to: Reply<T>, result: CallControlResult<T>) {
        self.settle();
        if let Err(e) = &result {
            debug!(error = %e, "Action rejected");
        }
        let _ = respond_to.send(result);
    }
}
