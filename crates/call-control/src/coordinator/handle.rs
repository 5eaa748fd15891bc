use super::{Coordinator, CoordinatorMessage, DeviceEvent, HangUpTarget, Reply};
use crate::audio::{AudioOutputPort, AudioRoute, RouteApplier, spawn_route_worker};
use crate::conference::ConferenceId;
use crate::config::CoordinatorConfig;
use crate::error::{CallControlError, CallControlResult};
use crate::events::UiEvent;
use crate::projector::UiSnapshot;
use crate::telephony::{CoreEvent, TelephonyCore};
use crate::types::{Reason, SessionId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Cloneable entry point for presentation code
///
/// Every action is marshalled into the coordinator mailbox and answered once
/// the coordinator has applied it.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    snapshots: watch::Receiver<UiSnapshot>,
    ui_events: broadcast::Sender<UiEvent>,
}

/// Background work started by [`CoordinatorHandle::spawn`]
pub struct CoordinatorTasks<P> {
    pub actor: JoinHandle<()>,
    pub forwarder: JoinHandle<()>,
    pub audio_worker: std::thread::JoinHandle<RouteApplier<P>>,
}

impl<P: AudioOutputPort> CoordinatorTasks<P> {
    /// Wait for the coordinator to stop, then for the audio worker to drain
    pub async fn join(self) -> CallControlResult<RouteApplier<P>> {
        let Self {
            actor,
            forwarder,
            audio_worker,
        } = self;

        if actor.await.is_err() {
            debug!("Coordinator task ended abnormally");
        }
        forwarder.abort();
        tokio::task::spawn_blocking(move || audio_worker.join())
            .await
            .ok()
            .and_then(Result::ok)
            .ok_or_else(|| CallControlError::AudioDevice {
                message: "audio worker panicked".to_string(),
            })
    }
}

impl CoordinatorHandle {
    /// Start the coordinator actor, the core event forwarder and the audio worker
    pub fn spawn<P, S>(
        config: CoordinatorConfig,
        core: Arc<dyn TelephonyCore>,
        audio_port: P,
        core_events: S,
    ) -> CallControlResult<(Self, CoordinatorTasks<P>)>
    where
        P: AudioOutputPort,
        S: Stream<Item = CoreEvent> + Send + Unpin + 'static,
    {
        config.validate()?;
        let (sender, mailbox) = mpsc::channel(config.mailbox_capacity);
        let (route_tx, route_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator::new(config, core, &sender, route_tx)?;
        let audio_worker = spawn_route_worker(RouteApplier::new(audio_port), route_rx).map_err(
            |e| CallControlError::AudioDevice {
                message: e.to_string(),
            },
        )?;

        let handle = Self {
            sender: sender.clone(),
            snapshots: coordinator.subscribe_snapshots(),
            ui_events: coordinator.ui_event_sender(),
        };
        let actor = tokio::spawn(coordinator.run(mailbox));
        let forwarder = tokio::spawn(forward_core_events(core_events, sender));

        Ok((
            handle,
            CoordinatorTasks {
                actor,
                forwarder,
                audio_worker,
            },
        ))
    }

    pub fn snapshot(&self) -> UiSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<UiSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot_stream(&self) -> WatchStream<UiSnapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    pub fn ui_events(&self) -> BroadcastStream<UiEvent> {
        BroadcastStream::new(self.ui_events.subscribe())
    }

    pub fn subscribe_ui_events(&self) -> broadcast::Receiver<UiEvent> {
        self.ui_events.subscribe()
    }

    /// Forward a platform signal
    pub async fn device_changed(&self, event: DeviceEvent) -> CallControlResult<()> {
        self.sender
            .send(CoordinatorMessage::Device(event))
            .await
            .map_err(|_| CallControlError::CoordinatorStopped)
    }

    pub async fn place_call(&self, address: impl Into<String>) -> CallControlResult<SessionId> {
        let address = address.into();
        self.request(|respond_to| CoordinatorMessage::PlaceCall {
            address,
            respond_to,
        })
        .await
    }

    pub async fn accept_call(&self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::AcceptCall {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn decline_call(&self, session_id: &SessionId, reason: Reason) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::DeclineCall {
            session_id,
            reason,
            respond_to,
        })
        .await
    }

    pub async fn pause_or_resume(&self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::PauseOrResume {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn hang_up(&self, target: HangUpTarget) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::HangUp { target, respond_to })
            .await
    }

    pub async fn add_video(&self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::AddVideo {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn remove_video(&self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::RemoveVideo {
            session_id,
            respond_to,
        })
        .await
    }

    /// Answer the call update prompt shown for the current call
    pub async fn accept_call_update(&self, accept: bool) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::ResolveCallUpdate {
            session_id: None,
            accept,
            respond_to,
        })
        .await
    }

    pub async fn resolve_call_update(
        &self,
        session_id: &SessionId,
        accept: bool,
    ) -> CallControlResult<()> {
        let session_id = Some(session_id.clone());
        self.request(|respond_to| CoordinatorMessage::ResolveCallUpdate {
            session_id,
            accept,
            respond_to,
        })
        .await
    }

    /// Returns the new muted state
    pub async fn toggle_micro(&self) -> CallControlResult<bool> {
        self.request(|respond_to| CoordinatorMessage::ToggleMicro { respond_to })
            .await
    }

    pub async fn toggle_speaker(&self) -> CallControlResult<AudioRoute> {
        self.request(|respond_to| CoordinatorMessage::ToggleSpeaker { respond_to })
            .await
    }

    pub async fn select_audio_route(&self, route: AudioRoute) -> CallControlResult<AudioRoute> {
        self.request(|respond_to| CoordinatorMessage::SelectAudioRoute { route, respond_to })
            .await
    }

    pub async fn adjust_volume(&self, delta: i32) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::AdjustVolume { delta, respond_to })
            .await
    }

    pub async fn enter_conference(&self) -> CallControlResult<ConferenceId> {
        self.request(|respond_to| CoordinatorMessage::EnterConference { respond_to })
            .await
    }

    pub async fn leave_conference(&self) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::LeaveConference { respond_to })
            .await
    }

    pub async fn remove_from_conference(&self, session_id: &SessionId) -> CallControlResult<()> {
        let session_id = session_id.clone();
        self.request(|respond_to| CoordinatorMessage::RemoveFromConference {
            session_id,
            respond_to,
        })
        .await
    }

    /// Returns whether the current call is now being recorded
    pub async fn toggle_recording(&self) -> CallControlResult<bool> {
        self.request(|respond_to| CoordinatorMessage::ToggleRecording { respond_to })
            .await
    }

    pub async fn set_authentication_token_verified(
        &self,
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

    pub async fn set_bandwidth_restriction(&self, limited: bool) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::SetBandwidthRestriction {
            limited,
            respond_to,
        })
        .await
    }

    pub async fn switch_camera(&self) -> CallControlResult<String> {
        self.request(|respond_to| CoordinatorMessage::SwitchCamera { respond_to })
            .await
    }

    pub async fn send_dtmf(&self, digit: char) -> CallControlResult<()> {
        self.request(|respond_to| CoordinatorMessage::SendDtmf { digit, respond_to })
            .await
    }

    /// Stop the coordinator; pending timers are cancelled
    pub async fn shutdown(&self) -> CallControlResult<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CoordinatorMessage::Shutdown { respond_to })
            .await
            .map_err(|_| CallControlError::CoordinatorStopped)?;
        response.await.map_err(|_| CallControlError::CoordinatorStopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> CoordinatorMessage,
    ) -> CallControlResult<T> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| CallControlError::CoordinatorStopped)?;
        response
            .await
            .map_err(|_| CallControlError::CoordinatorStopped)?
    }
}

async fn forward_core_events<S>(mut events: S, mailbox: mpsc::Sender<CoordinatorMessage>)
where
    S: Stream<Item = CoreEvent> + Unpin,
{
    while let Some(event) = events.next().await {
        if mailbox.send(CoordinatorMessage::Core(event)).await.is_err() {
            break;
        }
    }
    debug!("Core event stream closed");
}
