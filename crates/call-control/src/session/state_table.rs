//! Call state transition table
//!
//! Every state the telephony core can report is checked against the current
//! [`CallState`] of the session before it is applied. Reports that do not fit
//! the table are ignored (and logged by the caller) instead of corrupting the
//! session, and the terminal states absorb everything except `End -> Released`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a call session as tracked by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    IncomingReceived,
    OutgoingInit,
    OutgoingRinging,
    EarlyMedia,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    PausedByRemote,
    Resuming,
    UpdatedByRemote,
    Updating,
    End,
    Released,
}

impl CallState {
    /// `End` and `Released` absorb every further report
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::End | CallState::Released)
    }

    /// Media is flowing or about to flow in both directions
    pub fn is_running(self) -> bool {
        matches!(
            self,
            CallState::Connected
                | CallState::StreamsRunning
                | CallState::Updating
                | CallState::UpdatedByRemote
        )
    }

    /// The call has been answered and not yet ended
    pub fn is_established(self) -> bool {
        matches!(
            self,
            CallState::Connected
                | CallState::StreamsRunning
                | CallState::Pausing
                | CallState::Paused
                | CallState::PausedByRemote
                | CallState::Resuming
                | CallState::UpdatedByRemote
                | CallState::Updating
        )
    }

    /// A local or remote request is in flight and the core has not settled yet
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            CallState::Pausing | CallState::Resuming | CallState::UpdatedByRemote | CallState::Updating
        )
    }

    /// Not yet answered
    pub fn is_ringing(self) -> bool {
        matches!(
            self,
            CallState::IncomingReceived
                | CallState::OutgoingInit
                | CallState::OutgoingRinging
                | CallState::EarlyMedia
        )
    }

    /// Entering one of these states re-evaluates the audio route
    pub fn triggers_route_evaluation(self) -> bool {
        matches!(
            self,
            CallState::Connected | CallState::StreamsRunning | CallState::Resuming
        )
    }

    /// Reaching one of these states settles a pending pause or resume
    pub fn acknowledges_hold(self) -> bool {
        matches!(
            self,
            CallState::Paused | CallState::StreamsRunning | CallState::PausedByRemote
        ) || self.is_terminal()
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State reported by the telephony core in a call state event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreCallState {
    IncomingReceived,
    OutgoingInit,
    OutgoingRinging,
    EarlyMedia,
    Connected,
    StreamsRunning,
    Pausing,
    Paused,
    PausedByRemote,
    Resuming,
    UpdatedByRemote,
    Updating,
    Error,
    End,
    Released,
}

impl CoreCallState {
    /// Session state this report leads to when accepted
    pub fn target(self) -> CallState {
        match self {
            CoreCallState::IncomingReceived => CallState::IncomingReceived,
            CoreCallState::OutgoingInit => CallState::OutgoingInit,
            CoreCallState::OutgoingRinging => CallState::OutgoingRinging,
            CoreCallState::EarlyMedia => CallState::EarlyMedia,
            CoreCallState::Connected => CallState::Connected,
            CoreCallState::StreamsRunning => CallState::StreamsRunning,
            CoreCallState::Pausing => CallState::Pausing,
            CoreCallState::Paused => CallState::Paused,
            CoreCallState::PausedByRemote => CallState::PausedByRemote,
            CoreCallState::Resuming => CallState::Resuming,
            CoreCallState::UpdatedByRemote => CallState::UpdatedByRemote,
            CoreCallState::Updating => CallState::Updating,
            CoreCallState::Error | CoreCallState::End => CallState::End,
            CoreCallState::Released => CallState::Released,
        }
    }
}

/// Outcome of checking a reported state against the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the given state
    To(CallState),
    /// Same state reported again, refresh media only
    Stay,
    /// Not allowed from the current state
    Ignore,
}

/// Look up the transition for `reported` while the session is in `current`
pub fn next_state(current: CallState, reported: CoreCallState) -> Transition {
    use CallState as S;

    let target = reported.target();

    match current {
        S::Released => return Transition::Ignore,
        S::End => {
            return match target {
                S::Released => Transition::To(S::Released),
                S::End => Transition::Stay,
                _ => Transition::Ignore,
            };
        }
        _ => {}
    }

    if target.is_terminal() {
        return Transition::To(target);
    }
    if target == current {
        return Transition::Stay;
    }

    let allowed = match current {
        S::Idle => matches!(target, S::IncomingReceived | S::OutgoingInit),
        S::IncomingReceived => matches!(target, S::EarlyMedia | S::Connected),
        S::OutgoingInit => matches!(target, S::OutgoingRinging | S::EarlyMedia | S::Connected),
        S::OutgoingRinging => matches!(target, S::EarlyMedia | S::Connected),
        S::EarlyMedia => matches!(target, S::Connected),
        S::Connected => matches!(
            target,
            S::StreamsRunning | S::Paused | S::PausedByRemote | S::UpdatedByRemote
        ),
        S::StreamsRunning => matches!(
            target,
            S::Pausing | S::Paused | S::PausedByRemote | S::UpdatedByRemote | S::Updating
        ),
        S::Pausing => matches!(target, S::Paused | S::StreamsRunning),
        S::Paused => matches!(target, S::Resuming | S::UpdatedByRemote),
        S::PausedByRemote => matches!(
            target,
            S::StreamsRunning | S::Pausing | S::Paused | S::Resuming | S::UpdatedByRemote
        ),
        S::Resuming => matches!(target, S::StreamsRunning | S::Paused | S::PausedByRemote),
        S::UpdatedByRemote => matches!(target, S::StreamsRunning | S::Paused | S::PausedByRemote),
        S::Updating => matches!(target, S::StreamsRunning | S::PausedByRemote),
        S::End | S::Released => false,
    };

    if allowed {
        Transition::To(target)
    } else {
        Transition::Ignore
    }
}
