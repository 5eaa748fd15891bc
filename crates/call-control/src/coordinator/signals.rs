use super::{Coordinator, DeferredAction, DeviceEvent, TimerEvent};
use crate::audio::DeviceCapabilitySnapshot;
use crate::events::{NotificationKind, Permission, UiEvent};
use crate::negotiator::{CallUpdateNegotiator, UpdateToken};
use crate::session::{CallState, HoldRequest};
use crate::types::SessionId;
use tracing::{debug, info, warn};

impl Coordinator {
    pub(super) async fn on_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::CallUpdateDeadline { session_id, token } => {
                self.on_call_update_deadline(session_id, token).await;
            }
            TimerEvent::AutoAnswer { session_id } => {
                if self.auto_answer.remove(&session_id).is_none() {
                    debug!(%session_id, "Ignoring stale auto-answer timer");
                    return;
                }
                info!(%session_id, "Auto-answering incoming call");
                if let Err(e) = self.accept_call(&session_id).await {
                    warn!(%session_id, error = %e, "Auto-answer failed");
                }
            }
            TimerEvent::StatsTick => {
                let Some(session_id) = self.current.clone() else {
                    return;
                };
                match self.core.call_stats(&session_id).await {
                    Ok(stats) => self.emit(UiEvent::CallStats(stats)),
                    Err(e) => debug!(%session_id, error = %e, "Call statistics unavailable"),
                }
            }
        }
    }

    async fn on_call_update_deadline(&mut self, session_id: SessionId, token: UpdateToken) {
        if self.negotiator.take_expired(&session_id, token).is_none() {
            return;
        }
        let Some(local) = self.sessions.get(&session_id).map(|session| session.media.clone()) else {
            return;
        };
        info!(%session_id, "Call update not answered in time, declining video");

        let params = CallUpdateNegotiator::answer_params(&local, false, &self.bandwidth);
        if let Err(e) = self.answer_update(&session_id, params).await {
            warn!(%session_id, error = %e, "Failed to decline expired call update");
        }
        self.notify(
            NotificationKind::CallUpdateExpired,
            Some(session_id),
            "Video request expired",
        );
    }

    pub(super) async fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Bluetooth {
                connected,
                playback_capable,
            } => {
                let device = DeviceCapabilitySnapshot {
                    bluetooth_connected: connected,
                    bluetooth_playback_capable: connected && playback_capable,
                    ..*self.audio.device()
                };
                self.apply_device(device);
            }
            DeviceEvent::WiredHeadset { connected } => {
                let device = DeviceCapabilitySnapshot {
                    wired_headset_connected: connected,
                    ..*self.audio.device()
                };
                self.apply_device(device);
            }
            DeviceEvent::Snapshot(device) => self.apply_device(device),
            DeviceEvent::Connectivity { high_bandwidth } => {
                debug!(high_bandwidth, "Connectivity changed");
                self.high_bandwidth_connection = high_bandwidth;
            }
            DeviceEvent::ExternalCall { active } => {
                info!(active, "External call state changed");
                self.external_call_active = active;
                if active {
                    self.pause_for_external_call().await;
                }
            }
            DeviceEvent::PermissionChanged {
                permission,
                granted,
            } => {
                info!(?permission, granted, "Permission changed");
                if granted {
                    self.permissions.insert(permission);
                    self.replay_deferred(permission).await;
                } else {
                    self.permissions.remove(&permission);
                    self.drop_deferred(permission);
                }
            }
        }
    }

    fn apply_device(&mut self, device: DeviceCapabilitySnapshot) {
        let session = self.current.as_ref().and_then(|id| self.sessions.get(id));
        let route = self.audio.update_device(session, device);
        info!(?device, %route, "Device capabilities changed");
        if !self.sessions.is_empty() {
            self.push_route(route);
        }
    }

    async fn pause_for_external_call(&mut self) {
        let running: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|session| {
                session.state == CallState::StreamsRunning && session.pending_hold.is_none()
            })
            .map(|session| session.id.clone())
            .collect();

        for session_id in running {
            match self.core.pause(&session_id).await {
                Ok(()) => {
                    if let Some(session) = self.sessions.get_mut(&session_id) {
                        session.pending_hold = Some(HoldRequest::Pause);
                    }
                    info!(%session_id, "Call paused for external call");
                }
                Err(e) => warn!(%session_id, error = %e, "Failed to pause call"),
            }
        }
    }

    fn take_deferred(&mut self, permission: Permission) -> Vec<DeferredAction> {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|action| action.permission() == permission);
        self.deferred = waiting;
        ready
    }

    /// A refusal cancels everything that was waiting on the permission
    fn drop_deferred(&mut self, permission: Permission) {
        for action in self.take_deferred(permission) {
            info!(?action, ?permission, "Deferred action cancelled, permission denied");
            self.notify(
                NotificationKind::PermissionDenied(permission),
                action.session_id().cloned(),
                action.describe(),
            );
        }
    }

    async fn replay_deferred(&mut self, permission: Permission) {
        for action in self.take_deferred(permission) {
            debug!(?action, "Replaying deferred action");
            let result = match action {
                DeferredAction::PlaceCall { address } => self.place_call(address).await.map(|_| ()),
                DeferredAction::AddVideo { session_id } => self.add_video(&session_id).await,
                DeferredAction::AcceptCallUpdate { session_id } => {
                    self.resolve_call_update(Some(session_id), true).await
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "Deferred action failed");
            }
        }
    }
}
