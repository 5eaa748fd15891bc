//! UI state projection
//!
//! After every coordinator step the full UI-relevant state is recomputed into
//! a [`UiSnapshot`] and published on a `watch` channel. Subscribers only wake
//! up when the snapshot actually changed.

use crate::audio::AudioRoute;
use crate::session::CallState;
use crate::types::{CallDirection, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Derived, read-only view of the call-control state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSnapshot {
    pub current_session_id: Option<SessionId>,
    pub route: AudioRoute,
    pub mic_muted: bool,
    /// Video state of the current call
    pub video_enabled: bool,
    /// Recording state of the current call
    pub is_recording: bool,
    pub conference_size: usize,
    pub pending_update_prompt: Option<PendingPrompt>,
    pub calls: Vec<CallSummary>,
}

impl Default for UiSnapshot {
    fn default() -> Self {
        Self {
            current_session_id: None,
            route: AudioRoute::Earpiece,
            mic_muted: false,
            video_enabled: false,
            is_recording: false,
            conference_size: 0,
            pending_update_prompt: None,
            calls: Vec::new(),
        }
    }
}

impl UiSnapshot {
    pub fn call(&self, session_id: &SessionId) -> Option<&CallSummary> {
        self.calls.iter().find(|call| &call.session_id == session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
}

/// One line of the call list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSummary {
    pub session_id: SessionId,
    pub remote_address: String,
    pub direction: CallDirection,
    pub state: CallState,
    pub video_enabled: bool,
    pub in_conference: bool,
    pub recording: bool,
    pub authentication_token_verified: bool,
}

/// Publisher side of the snapshot channel
#[derive(Debug)]
pub struct UiStateProjector {
    sender: watch::Sender<UiSnapshot>,
}

impl UiStateProjector {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(UiSnapshot::default());
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<UiSnapshot> {
        self.sender.subscribe()
    }

    /// Publish `snapshot`, returns `true` if it differed from the last one
    pub fn publish(&self, snapshot: UiSnapshot) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        })
    }

    pub fn current(&self) -> UiSnapshot {
        self.sender.borrow().clone()
    }
}

impl Default for UiStateProjector {
    fn default() -> Self {
        Self::new()
    }
}
