//! Call sessions owned by the coordinator

mod state_table;

pub use state_table::{CallState, CoreCallState, Transition, next_state};

use crate::conference::ConferenceId;
use crate::types::{CallDirection, MediaParams, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local pause or resume request waiting for the core to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldRequest {
    Pause,
    Resume,
}

/// One call as seen by the coordinator
///
/// Sessions are created when the core first reports an incoming or outgoing
/// call and removed when they reach a terminal state. Only the coordinator
/// mutates them.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: SessionId,
    pub direction: CallDirection,
    pub remote_address: String,
    pub state: CallState,
    /// Media currently negotiated for the call
    pub media: MediaParams,
    /// Last media parameters offered by the remote party
    pub remote_params: Option<MediaParams>,
    pub recording: bool,
    /// ZRTP short authentication string, when one was negotiated
    pub authentication_token: Option<String>,
    pub authentication_token_verified: bool,
    pub conference: Option<ConferenceId>,
    pub pending_hold: Option<HoldRequest>,
    /// Declined busy on arrival, only waiting for the core to end it
    pub declined: bool,
    /// Ordering key for "most recently activated"
    pub activation_seq: u64,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new(id: SessionId, direction: CallDirection, remote_address: impl Into<String>) -> Self {
        Self {
            id,
            direction,
            remote_address: remote_address.into(),
            state: CallState::Idle,
            media: MediaParams::default(),
            remote_params: None,
            recording: false,
            authentication_token: None,
            authentication_token_verified: false,
            conference: None,
            pending_hold: None,
            declined: false,
            activation_seq: 0,
            created_at: Utc::now(),
            connected_at: None,
        }
    }

    /// Run a reported state through the transition table and apply it.
    ///
    /// A pending hold request is only settled by moving into an acknowledging
    /// state; re-reports of the state the call is already in leave it pending.
    pub fn apply(&mut self, reported: CoreCallState) -> Transition {
        let transition = next_state(self.state, reported);
        if let Transition::To(next) = transition {
            if next == CallState::Connected && self.connected_at.is_none() {
                self.connected_at = Some(Utc::now());
            }
            self.state = next;
            if next.acknowledges_hold() {
                self.pending_hold = None;
            }
        }
        transition
    }

    /// Whether the session takes part in current call selection
    pub fn is_live(&self) -> bool {
        !self.declined && !self.state.is_terminal()
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == CallDirection::Incoming
    }

    /// Incoming call still waiting for the user to answer
    pub fn is_ringing_incoming(&self) -> bool {
        !self.declined
            && self.is_incoming()
            && matches!(self.state, CallState::IncomingReceived | CallState::EarlyMedia)
    }

    /// Precedence used when picking the foreground call.
    ///
    /// Running and outgoing calls rank above an unanswered incoming call,
    /// which ranks above a call the user put on hold.
    pub fn activity_rank(&self) -> u8 {
        if matches!(self.state, CallState::Pausing | CallState::Paused) {
            0
        } else if self.is_ringing_incoming() {
            1
        } else {
            2
        }
    }

    /// Whether the session can be merged into a conference right now
    pub fn is_settled_and_established(&self) -> bool {
        self.state.is_established() && !self.state.is_transitional() && self.pending_hold.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(direction: CallDirection) -> CallSession {
        CallSession::new(SessionId::new("call-1"), direction, "sip:bob@example.com")
    }

    #[test]
    fn connected_time_is_recorded_once() {
        let mut call = session(CallDirection::Outgoing);
        call.apply(CoreCallState::OutgoingInit);
        assert!(call.connected_at.is_none());
        call.apply(CoreCallState::Connected);
        let connected_at = call.connected_at;
        assert!(connected_at.is_some());
        call.apply(CoreCallState::StreamsRunning);
        assert_eq!(call.connected_at, connected_at);
    }

    #[test]
    fn pending_hold_cleared_on_acknowledgement() {
        let mut call = session(CallDirection::Incoming);
        call.apply(CoreCallState::IncomingReceived);
        call.apply(CoreCallState::Connected);
        call.apply(CoreCallState::StreamsRunning);

        call.pending_hold = Some(HoldRequest::Pause);
        call.apply(CoreCallState::Pausing);
        assert_eq!(call.pending_hold, Some(HoldRequest::Pause));
        call.apply(CoreCallState::Paused);
        assert_eq!(call.pending_hold, None);
    }

    #[test]
    fn ignored_report_keeps_state_and_pending_hold() {
        let mut call = session(CallDirection::Incoming);
        call.apply(CoreCallState::IncomingReceived);
        call.pending_hold = Some(HoldRequest::Resume);
        assert_eq!(call.apply(CoreCallState::Paused), Transition::Ignore);
        assert_eq!(call.state, CallState::IncomingReceived);
        assert_eq!(call.pending_hold, Some(HoldRequest::Resume));
    }

    #[test]
    fn running_re_report_keeps_pending_pause() {
        let mut call = session(CallDirection::Outgoing);
        call.apply(CoreCallState::OutgoingInit);
        call.apply(CoreCallState::Connected);
        call.apply(CoreCallState::StreamsRunning);

        call.pending_hold = Some(HoldRequest::Pause);
        assert_eq!(call.apply(CoreCallState::StreamsRunning), Transition::Stay);
        assert_eq!(call.pending_hold, Some(HoldRequest::Pause));
    }

    #[test]
    fn declined_call_neither_rings_nor_counts_as_live() {
        let mut call = session(CallDirection::Incoming);
        call.apply(CoreCallState::IncomingReceived);
        assert!(call.is_ringing_incoming());
        assert!(call.is_live());

        call.declined = true;
        assert!(!call.is_ringing_incoming());
        assert!(!call.is_live());
    }

    #[test]
    fn ranks_follow_activity() {
        let mut call = session(CallDirection::Incoming);
        call.apply(CoreCallState::IncomingReceived);
        assert_eq!(call.activity_rank(), 1);
        call.apply(CoreCallState::Connected);
        assert_eq!(call.activity_rank(), 2);
        call.apply(CoreCallState::Paused);
        assert_eq!(call.activity_rank(), 0);
    }
}
