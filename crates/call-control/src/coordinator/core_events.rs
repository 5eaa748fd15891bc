use super::{Coordinator, CoordinatorMessage, TimerEvent};
use crate::conference::ConferenceChange;
use crate::error::{CallControlError, CallControlResult};
use crate::events::{Notification, NotificationKind, Permission, UiEvent};
use crate::negotiator::{CallUpdateNegotiator, OfferDecision};
use crate::session::{CallSession, CallState, CoreCallState, Transition};
use crate::telephony::{CallStateEvent, CoreEvent, EncryptionEvent, RegistrationEvent};
use crate::types::{CallDirection, FailureCategory, MediaEncryption, MediaParams, Reason, SessionId};
use tracing::{debug, info, warn};

/// Entering `next` from `previous` makes the session the most recently active
fn reactivates(previous: CallState, next: CallState) -> bool {
    matches!(
        next,
        CallState::Connected | CallState::Resuming | CallState::StreamsRunning
    ) && !previous.is_running()
}

impl Coordinator {
    pub(super) async fn on_core_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::CallState(event) => self.on_call_state(event).await,
            CoreEvent::Registration(event) => self.on_registration(event),
            CoreEvent::EncryptionChanged(event) => self.on_encryption_changed(event),
        }
    }

    async fn on_call_state(&mut self, event: CallStateEvent) {
        let CallStateEvent {
            session_id,
            state: reported,
            reason,
            remote_address,
            remote_params,
            current_params,
        } = event;

        if !self.sessions.contains_key(&session_id) {
            let direction = match reported {
                CoreCallState::IncomingReceived => CallDirection::Incoming,
                CoreCallState::OutgoingInit => CallDirection::Outgoing,
                _ => {
                    debug!(%session_id, ?reported, "Ignoring event for unknown call");
                    return;
                }
            };
            let session = CallSession::new(
                session_id.clone(),
                direction,
                remote_address.clone().unwrap_or_default(),
            );
            info!(%session_id, ?direction, remote = %session.remote_address, "Call created");
            self.sessions.insert(session_id.clone(), session);
            self.activate(&session_id);
        }

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        let previous = session.state;
        if session.apply(reported) == Transition::Ignore {
            warn!(%session_id, state = %previous, ?reported, "Ignoring unexpected call state");
            return;
        }
        if let Some(address) = remote_address.filter(|address| !address.is_empty()) {
            session.remote_address = address;
        }
        if let Some(params) = current_params {
            session.media = params;
        }
        if let Some(params) = remote_params {
            session.remote_params = Some(params);
        }
        let state = session.state;

        if state == previous {
            return;
        }
        info!(%session_id, from = %previous, to = %state, "Call state changed");

        if state.is_terminal() {
            self.on_session_terminated(&session_id, reason, reported == CoreCallState::Error)
                .await;
            return;
        }

        if reactivates(previous, state) {
            self.activate(&session_id);
        }
        if !state.is_ringing() {
            self.auto_answer.remove(&session_id);
        }
        if state != CallState::UpdatedByRemote && self.negotiator.clear_session(&session_id) {
            debug!(%session_id, "Call update settled by the core, prompt closed");
        }

        match state {
            CallState::IncomingReceived => self.on_incoming(&session_id).await,
            CallState::Connected => self.ensure_microphone_permission(&session_id).await,
            CallState::UpdatedByRemote => self.on_call_update_offer(&session_id).await,
            _ => {}
        }

        if self.sessions.get(&session_id).is_some_and(|session| session.declined) {
            return;
        }
        if self.refresh_current() || state.triggers_route_evaluation() {
            self.evaluate_route();
        }
    }

    async fn on_session_terminated(
        &mut self,
        session_id: &SessionId,
        reason: Option<Reason>,
        errored: bool,
    ) {
        let Some(session) = self.sessions.remove(session_id) else {
            return;
        };
        self.negotiator.clear_session(session_id);
        self.auto_answer.remove(session_id);
        self.deferred
            .retain(|action| action.session_id() != Some(session_id));

        if session.conference.is_some() {
            self.drop_conference_member(session_id).await;
        }

        let failure = match reason.and_then(Reason::failure) {
            Some(category) => Some(category),
            None if errored => Some(FailureCategory::Generic),
            None => None,
        };
        if let Some(category) = failure {
            warn!(%session_id, ?category, "Call failed");
            self.emit(UiEvent::Notification(Notification::call_failed(
                session_id.clone(),
                category,
            )));
        }
        info!(%session_id, remote = %session.remote_address, "Call ended");

        if self.sessions.is_empty() {
            self.current = None;
            let route = self.audio.reset();
            self.push_route(route);
        } else if self.refresh_current() {
            self.evaluate_route();
        }
    }

    /// Remove a call from the conference, leaving it once fewer than two remain
    pub(super) async fn drop_conference_member(&mut self, session_id: &SessionId) -> ConferenceChange {
        let change = self.conference.remove(session_id);
        if let ConferenceChange::Dissolved { remaining } = &change {
            for member in remaining {
                if let Some(session) = self.sessions.get_mut(member) {
                    session.conference = None;
                }
            }
            if let Err(e) = self.core.leave_conference().await {
                warn!(error = %e, "Failed to leave conference");
            }
            info!(?remaining, "Conference dissolved");
        }
        change
    }

    async fn on_incoming(&mut self, session_id: &SessionId) {
        let refusal = if self.external_call_active {
            Some("external call in progress")
        } else if self.sessions.len() > self.config.max_concurrent_calls {
            Some("too many calls")
        } else {
            None
        };

        if let Some(why) = refusal {
            info!(%session_id, why, "Declining incoming call as busy");
            if let Some(session) = self.sessions.get_mut(session_id) {
                session.declined = true;
            }
            if let Err(e) = self.core.decline(session_id, Reason::Busy).await {
                warn!(%session_id, error = %e, "Failed to decline incoming call");
            }
            return;
        }

        if let Some(delay) = self.config.auto_answer_delay() {
            let task = self.scheduler.schedule(
                delay,
                CoordinatorMessage::Timer(TimerEvent::AutoAnswer {
                    session_id: session_id.clone(),
                }),
            );
            self.auto_answer.insert(session_id.clone(), task);
        }
    }

    async fn ensure_microphone_permission(&mut self, session_id: &SessionId) {
        if self.has_permission(Permission::Microphone) || self.mic_muted {
            return;
        }
        self.mic_muted = true;
        if let Err(e) = self.core.enable_mic(false).await {
            warn!(%session_id, error = %e, "Failed to mute microphone");
        }
        info!(%session_id, "Microphone permission missing, call muted");
        self.notify(
            NotificationKind::MicrophoneMuted,
            Some(session_id.clone()),
            "Microphone permission missing, call muted",
        );
        self.emit(UiEvent::PermissionRequired {
            permission: Permission::Microphone,
            session_id: Some(session_id.clone()),
        });
    }

    async fn on_call_update_offer(&mut self, session_id: &SessionId) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        let local = session.media.clone();
        let remote = session
            .remote_params
            .clone()
            .unwrap_or_else(|| local.clone());
        let decision = self.negotiator.evaluate_offer(
            &local,
            &remote,
            session.conference.is_some(),
            &self.bandwidth,
        );

        match decision {
            OfferDecision::Accept(params) => {
                debug!(%session_id, video = params.video_enabled, "Accepting call update");
                if let Err(e) = self.answer_update(session_id, params).await {
                    warn!(%session_id, error = %e, "Failed to accept call update");
                }
            }
            OfferDecision::Deny(reason) => {
                info!(%session_id, ?reason, "Declining video in call update");
                let params = CallUpdateNegotiator::answer_params(&local, false, &self.bandwidth);
                if let Err(e) = self.answer_update(session_id, params).await {
                    warn!(%session_id, error = %e, "Failed to answer call update");
                }
                self.notify(
                    NotificationKind::CallUpdateDenied(reason),
                    Some(session_id.clone()),
                    "Video request declined",
                );
            }
            OfferDecision::Prompt => {
                let scheduler = &self.scheduler;
                let opened = self
                    .negotiator
                    .open_prompt(session_id, remote, |token, timeout| {
                        scheduler.schedule(
                            timeout,
                            CoordinatorMessage::Timer(TimerEvent::CallUpdateDeadline {
                                session_id: session_id.clone(),
                                token,
                            }),
                        )
                    })
                    .map(|pending| pending.expires_at);
                match opened {
                    Ok(expires_at) => {
                        info!(%session_id, %expires_at, "Asking user about video request");
                        self.emit(UiEvent::CallUpdatePrompt {
                            session_id: session_id.clone(),
                            expires_at,
                        });
                    }
                    Err(e) => warn!(%session_id, error = %e, "Call update prompt already open"),
                }
            }
        }
    }

    /// Answer a remote update and record the answered media on the session
    pub(super) async fn answer_update(
        &mut self,
        session_id: &SessionId,
        params: MediaParams,
    ) -> CallControlResult<()> {
        let adds_video = params.video_enabled
            && self
                .sessions
                .get(session_id)
                .is_some_and(|session| !session.media.video_enabled);
        if adds_video {
            if let Err(e) = self.core.enable_video_capture(true).await {
                warn!(%session_id, error = %e, "Failed to enable video capture");
            }
            if let Err(e) = self.core.enable_video_display(true).await {
                warn!(%session_id, error = %e, "Failed to enable video display");
            }
        }

        self.core
            .accept_update(session_id, params.clone())
            .await
            .map_err(CallControlError::core("accept_update"))?;
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.media = params;
        }
        Ok(())
    }

    fn on_encryption_changed(&mut self, event: EncryptionEvent) {
        let Some(session) = self.sessions.get_mut(&event.session_id) else {
            debug!(session_id = %event.session_id, "Encryption change for unknown call");
            return;
        };
        session.media.encryption = event.encryption;
        session.authentication_token = event.authentication_token.clone();
        session.authentication_token_verified = event.token_verified;
        info!(
            session_id = %event.session_id,
            encryption = %event.encryption,
            verified = event.token_verified,
            "Media encryption changed"
        );

        if event.encryption == MediaEncryption::Zrtp && !event.token_verified {
            if let Some(token) = event.authentication_token {
                self.emit(UiEvent::VerifyAuthenticationToken {
                    session_id: event.session_id,
                    token,
                });
            }
        }
    }

    fn on_registration(&mut self, event: RegistrationEvent) {
        info!(account = %event.account_id, state = ?event.state, "Registration state changed");
        self.emit(UiEvent::RegistrationChanged {
            account_id: event.account_id,
            state: event.state,
            message: event.message,
        });
    }
}
