use super::{Coordinator, DeferredAction, HangUpTarget};
use crate::audio::{AudioRoute, RouteCommand};
use crate::conference::ConferenceId;
use crate::error::{CallControlError, CallControlResult};
use crate::events::{Permission, UiEvent};
use crate::negotiator::CallUpdateNegotiator;
use crate::session::{CallSession, CallState, CoreCallState, HoldRequest};
use crate::types::{CallDirection, Reason, SessionId};
use chrono::Utc;
use tracing::{debug, error, info, warn};

impl Coordinator {
    pub(super) async fn place_call(&mut self, address: String) -> CallControlResult<SessionId> {
        let max = self.config.max_concurrent_calls;
        if self.sessions.len() >= max {
            return Err(CallControlError::TooManyCalls { max });
        }

        let mut params = self
            .core
            .create_params(None)
            .await
            .map_err(CallControlError::core("create_params"))?;
        self.bandwidth.apply_to_params(&mut params);
        params.video_enabled = params.video_enabled
            && self.config.video_enabled
            && self.config.initiate_with_video;
        if params.video_enabled && !self.has_permission(Permission::Camera) {
            return Err(self.defer(DeferredAction::PlaceCall { address }));
        }
        params.low_bandwidth = !self.high_bandwidth_connection;
        params.record_file = self.config.recording_path(&address, Utc::now());

        let session_id = self
            .core
            .invite(&address, params.clone())
            .await
            .map_err(CallControlError::core("invite"))?;

        if !self.sessions.contains_key(&session_id) {
            let mut session = CallSession::new(session_id.clone(), CallDirection::Outgoing, &address);
            session.apply(CoreCallState::OutgoingInit);
            session.media = params;
            self.sessions.insert(session_id.clone(), session);
            self.activate(&session_id);
        }
        info!(%session_id, %address, "Outgoing call placed");
        Ok(session_id)
    }

    pub(super) async fn accept_call(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session = self.ringing_incoming(session_id, "answer")?;
        let remote_video = session
            .remote_params
            .as_ref()
            .is_some_and(|params| params.video_enabled);
        let remote_address = session.remote_address.clone();

        let mut params = self
            .core
            .create_params(Some(session_id))
            .await
            .map_err(CallControlError::core("create_params"))?;
        self.bandwidth.apply_to_params(&mut params);
        params.video_enabled = params.video_enabled
            && self.config.video_enabled
            && remote_video
            && self.has_permission(Permission::Camera);
        params.low_bandwidth = !self.high_bandwidth_connection;
        params.record_file = self.config.recording_path(&remote_address, Utc::now());

        self.core
            .accept_with_params(session_id, params.clone())
            .await
            .map_err(CallControlError::core("accept_with_params"))?;
        self.auto_answer.remove(session_id);
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.media = params;
        }
        info!(%session_id, "Incoming call answered");
        Ok(())
    }

    pub(super) async fn decline_call(
        &mut self,
        session_id: &SessionId,
        reason: Reason,
    ) -> CallControlResult<()> {
        self.ringing_incoming(session_id, "decline")?;
        self.core
            .decline(session_id, reason)
            .await
            .map_err(CallControlError::core("decline"))?;
        self.auto_answer.remove(session_id);
        info!(%session_id, ?reason, "Incoming call declined");
        Ok(())
    }

    fn ringing_incoming(
        &self,
        session_id: &SessionId,
        operation: &'static str,
    ) -> CallControlResult<&CallSession> {
        let session = self.existing(session_id)?;
        if !session.is_ringing_incoming() {
            return Err(CallControlError::invalid_state(operation, session.state));
        }
        Ok(session)
    }

    fn existing(&self, session_id: &SessionId) -> CallControlResult<&CallSession> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| CallControlError::session_not_found(session_id))
    }

    /// Pause a running call or resume a paused one
    pub(super) async fn pause_or_resume(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session = self.existing(session_id)?;
        if session.pending_hold.is_some() {
            return Err(CallControlError::Busy {
                session_id: session_id.clone(),
            });
        }
        let request = match session.state {
            CallState::StreamsRunning => HoldRequest::Pause,
            CallState::Paused => HoldRequest::Resume,
            state => return Err(CallControlError::invalid_state("pause or resume", state)),
        };

        match request {
            HoldRequest::Pause => self
                .core
                .pause(session_id)
                .await
                .map_err(CallControlError::core("pause"))?,
            HoldRequest::Resume => self
                .core
                .resume(session_id)
                .await
                .map_err(CallControlError::core("resume"))?,
        }
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.pending_hold = Some(request);
        }
        info!(%session_id, ?request, "Hold request sent");
        Ok(())
    }

    pub(super) async fn hang_up(&mut self, target: HangUpTarget) -> CallControlResult<()> {
        let targets: Vec<SessionId> = match target {
            HangUpTarget::Session(session_id) => {
                self.existing(&session_id)?;
                vec![session_id]
            }
            HangUpTarget::Current => self.current_targets(),
            HangUpTarget::All => self.live_session_ids(),
        };
        if targets.is_empty() {
            return Err(CallControlError::NoCurrentCall);
        }

        let mut first_error = None;
        for session_id in &targets {
            if let Err(e) = self.terminate_session(session_id).await {
                error!(%session_id, error = %e, "Failed to hang up");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The current call, else the whole conference, else every call
    fn current_targets(&self) -> Vec<SessionId> {
        let conference_members = || -> Vec<SessionId> {
            self.conference
                .active()
                .map(|conference| conference.members.iter().cloned().collect())
                .unwrap_or_default()
        };
        match &self.current {
            Some(current) if self.conference.is_member(current) => conference_members(),
            Some(current) => vec![current.clone()],
            None if self.conference.active().is_some() => conference_members(),
            None => self.live_session_ids(),
        }
    }

    /// Every session the user can still act on
    fn live_session_ids(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|session| session.is_live())
            .map(|session| session.id.clone())
            .collect()
    }

    /// Stop any recording before asking the core to terminate
    async fn terminate_session(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let recording = self
            .sessions
            .get(session_id)
            .is_some_and(|session| session.recording);
        if recording {
            match self.core.stop_recording(session_id).await {
                Ok(()) => {
                    if let Some(session) = self.sessions.get_mut(session_id) {
                        session.recording = false;
                    }
                }
                Err(e) => warn!(%session_id, error = %e, "Failed to stop recording"),
            }
        }
        self.core
            .terminate(session_id)
            .await
            .map_err(CallControlError::core("terminate"))?;
        info!(%session_id, "Hang-up requested");
        Ok(())
    }

    pub(super) async fn add_video(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session = self.existing(session_id)?;
        if session.state != CallState::StreamsRunning {
            return Err(CallControlError::invalid_state("add video", session.state));
        }
        if session.media.video_enabled {
            return Ok(());
        }
        if !self.config.video_enabled {
            return Err(CallControlError::video_not_possible("video is disabled"));
        }
        if !self.bandwidth.is_video_possible() {
            return Err(CallControlError::video_not_possible(
                "bandwidth profile does not allow video",
            ));
        }
        if session
            .remote_params
            .as_ref()
            .is_some_and(|params| params.low_bandwidth)
        {
            return Err(CallControlError::video_not_possible(
                "remote party is on a low-bandwidth connection",
            ));
        }

        let mut params = session.media.clone();
        if !self.has_permission(Permission::Camera) {
            return Err(self.defer(DeferredAction::AddVideo {
                session_id: session_id.clone(),
            }));
        }
        self.bandwidth.apply_to_params(&mut params);
        params.video_enabled = true;

        if let Err(e) = self.core.enable_video_capture(true).await {
            warn!(%session_id, error = %e, "Failed to enable video capture");
        }
        self.core
            .update(session_id, params.clone())
            .await
            .map_err(CallControlError::core("update"))?;
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.media = params;
        }
        info!(%session_id, "Video requested");
        Ok(())
    }

    pub(super) async fn remove_video(&mut self, session_id: &SessionId) -> CallControlResult<()> {
        let session = self.existing(session_id)?;
        if session.state != CallState::StreamsRunning {
            return Err(CallControlError::invalid_state("remove video", session.state));
        }
        if !session.media.video_enabled {
            return Ok(());
        }
        let params = session.media.clone().with_video(false);

        self.core
            .update(session_id, params.clone())
            .await
            .map_err(CallControlError::core("update"))?;
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.media = params;
        }
        info!(%session_id, "Video removed");
        Ok(())
    }

    /// Answer an open call update prompt. Without a pending prompt this is a no-op.
    pub(super) async fn resolve_call_update(
        &mut self,
        session_id: Option<SessionId>,
        accept: bool,
    ) -> CallControlResult<()> {
        let session_id = match session_id {
            Some(session_id) => session_id,
            None => self.prompt_target().ok_or(CallControlError::NoCurrentCall)?,
        };
        let Some(pending) = self.negotiator.pending(&session_id) else {
            debug!(%session_id, "No call update pending");
            return Ok(());
        };
        let wants_video = accept && pending.remote_params.video_enabled;
        if wants_video && !self.has_permission(Permission::Camera) {
            return Err(self.defer(DeferredAction::AcceptCallUpdate { session_id }));
        }

        let Some(pending) = self.negotiator.take_for_resolution(&session_id) else {
            return Ok(());
        };
        let Some(local) = self.sessions.get(&session_id).map(|session| session.media.clone()) else {
            return Ok(());
        };
        info!(%session_id, accept, token = ?pending.token, "Call update answered");
        let params = CallUpdateNegotiator::answer_params(&local, wants_video, &self.bandwidth);
        self.answer_update(&session_id, params).await
    }

    fn prompt_target(&self) -> Option<SessionId> {
        self.current
            .as_ref()
            .filter(|current| self.negotiator.has_pending(current))
            .cloned()
            .or_else(|| {
                self.negotiator
                    .iter()
                    .next()
                    .map(|pending| pending.session_id.clone())
            })
            .or_else(|| self.current.clone())
    }

    pub(super) async fn toggle_micro(&mut self) -> CallControlResult<bool> {
        if self.mic_muted && !self.has_permission(Permission::Microphone) {
            self.emit(UiEvent::PermissionRequired {
                permission: Permission::Microphone,
                session_id: self.current.clone(),
            });
            return Err(CallControlError::PermissionRequired {
                permission: Permission::Microphone,
            });
        }
        let muted = !self.mic_muted;
        self.core
            .enable_mic(!muted)
            .await
            .map_err(CallControlError::core("enable_mic"))?;
        self.mic_muted = muted;
        info!(muted, "Microphone toggled");
        Ok(muted)
    }

    pub(super) fn toggle_speaker(&mut self) -> CallControlResult<AudioRoute> {
        let session = self.current.as_ref().and_then(|id| self.sessions.get(id));
        let route = self.audio.toggle_speaker(session);
        self.push_route(route);
        Ok(route)
    }

    pub(super) fn select_audio_route(&mut self, route: AudioRoute) -> CallControlResult<AudioRoute> {
        let session = self.current.as_ref().and_then(|id| self.sessions.get(id));
        let route = self.audio.set_user_override(session, route)?;
        self.push_route(route);
        Ok(route)
    }

    pub(super) fn adjust_volume(&mut self, delta: i32) -> CallControlResult<()> {
        self.send_route(RouteCommand::AdjustVolume { delta });
        Ok(())
    }

    /// Merge every settled, established call into the conference
    pub(super) async fn enter_conference(&mut self) -> CallControlResult<ConferenceId> {
        let candidates: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|session| {
                !self.conference.is_member(&session.id)
                    && session.is_settled_and_established()
                    && !self.negotiator.has_pending(&session.id)
            })
            .map(|session| session.id.clone())
            .collect();
        if candidates.is_empty() || self.conference.size() + candidates.len() < 2 {
            return Err(CallControlError::conference(
                "at least two established calls are required",
            ));
        }

        let mut members: Vec<SessionId> = self
            .conference
            .active()
            .map(|conference| conference.members.iter().cloned().collect())
            .unwrap_or_default();
        members.extend(candidates.iter().cloned());
        self.core
            .enter_conference(&members)
            .await
            .map_err(CallControlError::core("enter_conference"))?;

        let conference = self.conference.merge(candidates)?;
        let conference_id = conference.id;
        let members: Vec<SessionId> = conference.members.iter().cloned().collect();
        for member in &members {
            if let Some(session) = self.sessions.get_mut(member) {
                session.conference = Some(conference_id);
            }
            self.activate(member);
        }
        info!(conference = %conference_id, size = members.len(), "Conference entered");

        self.refresh_current();
        self.evaluate_route();
        Ok(conference_id)
    }

    pub(super) async fn leave_conference(&mut self) -> CallControlResult<()> {
        if self.conference.active().is_none() {
            return Err(CallControlError::conference("no active conference"));
        }
        self.core
            .leave_conference()
            .await
            .map_err(CallControlError::core("leave_conference"))?;
        let members = self.conference.dissolve();
        for member in &members {
            if let Some(session) = self.sessions.get_mut(member) {
                session.conference = None;
            }
        }
        info!(?members, "Conference left");
        Ok(())
    }

    pub(super) async fn remove_from_conference(
        &mut self,
        session_id: &SessionId,
    ) -> CallControlResult<()> {
        if !self.conference.is_member(session_id) {
            return Err(CallControlError::conference(format!(
                "call {session_id} is not in the conference"
            )));
        }
        self.core
            .remove_from_conference(session_id)
            .await
            .map_err(CallControlError::core("remove_from_conference"))?;
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.conference = None;
        }
        let change = self.drop_conference_member(session_id).await;
        info!(%session_id, ?change, "Call removed from conference");
        Ok(())
    }

    /// Start or stop recording the current call
    pub(super) async fn toggle_recording(&mut self) -> CallControlResult<bool> {
        let session_id = self.current.clone().ok_or(CallControlError::NoCurrentCall)?;
        let session = self.existing(&session_id)?;
        if !session.state.is_established() {
            return Err(CallControlError::invalid_state("record", session.state));
        }

        let recording = !session.recording;
        if recording {
            self.core
                .start_recording(&session_id)
                .await
                .map_err(CallControlError::core("start_recording"))?;
        } else {
            self.core
                .stop_recording(&session_id)
                .await
                .map_err(CallControlError::core("stop_recording"))?;
        }
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.recording = recording;
        }
        info!(%session_id, recording, "Recording toggled");
        Ok(recording)
    }

    pub(super) async fn set_authentication_token_verified(
        &mut self,
        session_id: &SessionId,
        verified: bool,
    ) -> CallControlResult<()> {
        self.existing(session_id)?;
        self.core
            .set_authentication_token_verified(session_id, verified)
            .await
            .map_err(CallControlError::core("set_authentication_token_verified"))?;
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.authentication_token_verified = verified;
        }
        Ok(())
    }

    pub(super) fn set_bandwidth_restriction(&mut self, limited: bool) -> CallControlResult<()> {
        self.bandwidth.set_user_restriction(limited);
        Ok(())
    }

    /// Move capture to the next camera and refresh the current video call.
    ///
    /// Returns the device now in use.
    pub(super) async fn switch_camera(&mut self) -> CallControlResult<String> {
        let devices = self
            .core
            .video_devices()
            .await
            .map_err(CallControlError::core("video_devices"))?;
        let next = devices
            .next_camera()
            .map(str::to_string)
            .ok_or_else(|| CallControlError::video_not_possible("no other camera available"))?;
        self.core
            .set_video_device(&next)
            .await
            .map_err(CallControlError::core("set_video_device"))?;
        info!(from = ?devices.current, to = %next, "Camera switched");

        let refresh = self.current_session().and_then(|session| {
            (session.state == CallState::StreamsRunning && session.media.video_enabled)
                .then(|| (session.id.clone(), session.media.clone()))
        });
        match refresh {
            Some((session_id, params)) => self
                .core
                .update(&session_id, params)
                .await
                .map_err(CallControlError::core("update"))?,
            None => debug!("Camera switched outside a video call"),
        }
        Ok(next)
    }

    /// Send a DTMF digit on the current call
    pub(super) async fn send_dtmf(&mut self, digit: char) -> CallControlResult<()> {
        let digit = digit.to_ascii_uppercase();
        if !matches!(digit, '0'..='9' | '*' | '#' | 'A'..='D') {
            return Err(CallControlError::InvalidDtmf { digit });
        }
        let session = self.current_session().ok_or(CallControlError::NoCurrentCall)?;
        if !session.state.is_running() {
            return Err(CallControlError::invalid_state("send DTMF", session.state));
        }
        let session_id = session.id.clone();

        self.core
            .send_dtmf(&session_id, digit)
            .await
            .map_err(CallControlError::core("send_dtmf"))?;
        debug!(%session_id, %digit, "DTMF sent");
        Ok(())
    }

    /// Park `action` until its permission is granted and ask the user for it
    fn defer(&mut self, action: DeferredAction) -> CallControlError {
        let permission = action.permission();
        let session_id = action.session_id().cloned();
        if !self.deferred.contains(&action) {
            self.deferred.push(action);
        }
        info!(?permission, "Action deferred until permission is granted");
        self.emit(UiEvent::PermissionRequired {
            permission,
            session_id,
        });
        CallControlError::PermissionRequired { permission }
    }
}
