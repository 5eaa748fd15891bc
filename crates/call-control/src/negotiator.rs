//! Call update negotiation
//!
//! When the remote party re-invites with a media change, the negotiator
//! decides whether to answer at once or to ask the user. A prompt carries a
//! deadline: if the user does not answer in time the offer is denied.
//!
//! At most one prompt is open per session. Each prompt gets a fresh
//! [`UpdateToken`]; the deadline timer carries that token, so an expiry that
//! was already queued when the user answered is recognised as stale and
//! dropped.

use crate::bandwidth::BandwidthPolicy;
use crate::error::{CallControlError, CallControlResult};
use crate::scheduler::ScheduledTask;
use crate::types::{MediaParams, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Time the user has to answer a video offer
pub const DEFAULT_CALL_UPDATE_TIMEOUT: Duration = Duration::from_millis(30_000);

/// What to do with a remote media offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferDecision {
    /// Answer immediately with these parameters
    Accept(MediaParams),
    /// Answer immediately without video
    Deny(DenyReason),
    /// Ask the user
    Prompt,
}

/// Why a video offer was refused without asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    VideoDisabled,
    VideoNotPossible,
    RemoteLowBandwidth,
    InConference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpdateToken(u64);

/// Remote offer waiting for the user
#[derive(Debug)]
pub struct PendingCallUpdate {
    pub session_id: SessionId,
    pub remote_params: MediaParams,
    pub token: UpdateToken,
    pub expires_at: DateTime<Utc>,
    deadline: ScheduledTask,
}

#[derive(Debug)]
pub struct CallUpdateNegotiator {
    video_enabled: bool,
    auto_accept_video: bool,
    timeout: Duration,
    pending: BTreeMap<SessionId, PendingCallUpdate>,
    next_token: u64,
}

impl CallUpdateNegotiator {
    pub fn new(video_enabled: bool, auto_accept_video: bool, timeout: Duration) -> Self {
        Self {
            video_enabled,
            auto_accept_video,
            timeout,
            pending: BTreeMap::new(),
            next_token: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decide how to answer `remote` while the call runs with `local`
    pub fn evaluate_offer(
        &self,
        local: &MediaParams,
        remote: &MediaParams,
        in_conference: bool,
        bandwidth: &BandwidthPolicy,
    ) -> OfferDecision {
        let adds_video = remote.video_enabled && !local.video_enabled;
        if !adds_video {
            return OfferDecision::Accept(Self::answer_params(local, remote.video_enabled, bandwidth));
        }

        if !self.video_enabled {
            OfferDecision::Deny(DenyReason::VideoDisabled)
        } else if !bandwidth.is_video_possible() {
            OfferDecision::Deny(DenyReason::VideoNotPossible)
        } else if remote.low_bandwidth {
            OfferDecision::Deny(DenyReason::RemoteLowBandwidth)
        } else if in_conference {
            OfferDecision::Deny(DenyReason::InConference)
        } else if self.auto_accept_video {
            OfferDecision::Accept(Self::answer_params(local, true, bandwidth))
        } else {
            OfferDecision::Prompt
        }
    }

    /// Parameters answering an offer, with video only if requested and allowed
    pub fn answer_params(local: &MediaParams, video: bool, bandwidth: &BandwidthPolicy) -> MediaParams {
        let mut params = local.clone();
        bandwidth.apply_to_params(&mut params);
        params.video_enabled = params.video_enabled && video;
        params
    }

    /// Open a prompt for `session_id`.
    ///
    /// `schedule_deadline` arms the expiry timer for the new token and
    /// the negotiator's timeout. Fails with `Busy` while a prompt is open.
    pub fn open_prompt<F>(
        &mut self,
        session_id: &SessionId,
        remote_params: MediaParams,
        schedule_deadline: F,
    ) -> CallControlResult<&PendingCallUpdate>
    where
        F: FnOnce(UpdateToken, Duration) -> ScheduledTask,
    {
        if self.pending.contains_key(session_id) {
            return Err(CallControlError::Busy {
                session_id: session_id.clone(),
            });
        }

        self.next_token += 1;
        let token = UpdateToken(self.next_token);
        let deadline = schedule_deadline(token, self.timeout);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.timeout).unwrap_or(chrono::Duration::zero());

        let pending = PendingCallUpdate {
            session_id: session_id.clone(),
            remote_params,
            token,
            expires_at,
            deadline,
        };
        debug!(%session_id, ?token, "Call update prompt opened");
        Ok(&*self.pending.entry(session_id.clone()).or_insert(pending))
    }

    /// Remove the prompt for a user answer, cancelling its deadline
    pub fn take_for_resolution(&mut self, session_id: &SessionId) -> Option<PendingCallUpdate> {
        let pending = self.pending.remove(session_id)?;
        pending.deadline.cancel();
        Some(pending)
    }

    /// Remove the prompt on deadline expiry, only if `token` is still current
    pub fn take_expired(
        &mut self,
        session_id: &SessionId,
        token: UpdateToken,
    ) -> Option<PendingCallUpdate> {
        match self.pending.get(session_id) {
            Some(pending) if pending.token == token => self.pending.remove(session_id),
            _ => {
                debug!(%session_id, ?token, "Ignoring stale call update deadline");
                None
            }
        }
    }

    /// Drop any prompt for a session that went away
    pub fn clear_session(&mut self, session_id: &SessionId) -> bool {
        self.pending.remove(session_id).is_some()
    }

    pub fn pending(&self, session_id: &SessionId) -> Option<&PendingCallUpdate> {
        self.pending.get(session_id)
    }

    pub fn has_pending(&self, session_id: &SessionId) -> bool {
        self.pending.contains_key(session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingCallUpdate> {
        self.pending.values()
    }
}
