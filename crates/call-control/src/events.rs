//! Transient events published to the user interface
//!
//! Durable UI state lives in the [`UiSnapshot`](crate::projector::UiSnapshot).
//! Everything that is shown once and then forgotten (toasts, prompts,
//! statistics) goes out as a [`UiEvent`] on the broadcast channel.

use crate::negotiator::DenyReason;
use crate::telephony::{CallStats, RegistrationState};
use crate::types::{FailureCategory, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    Notification(Notification),
    /// The remote party asks to add video; answer before `expires_at`
    CallUpdatePrompt {
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    },
    /// An action waits for the user to grant a permission
    PermissionRequired {
        permission: Permission,
        session_id: Option<SessionId>,
    },
    /// Ask the user to compare the ZRTP authentication token with the remote party
    VerifyAuthenticationToken {
        session_id: SessionId,
        token: String,
    },
    RegistrationChanged {
        account_id: String,
        state: RegistrationState,
        message: Option<String>,
    },
    CallStats(CallStats),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub session_id: Option<SessionId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self {
            kind,
            session_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn call_failed(session_id: SessionId, category: FailureCategory) -> Self {
        Self::new(
            NotificationKind::CallFailed(category),
            Some(session_id),
            category.user_message(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CallFailed(FailureCategory),
    MicrophoneMuted,
    CallUpdateDenied(DenyReason),
    CallUpdateExpired,
    /// A deferred action was dropped because the permission was refused
    PermissionDenied(Permission),
    Info,
}

/// Runtime permissions the coordinator depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Microphone,
    Camera,
}
