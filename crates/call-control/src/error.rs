//! Error types for the call-control layer

use crate::audio::AudioRoute;
use crate::events::Permission;
use crate::session::CallState;
use crate::types::SessionId;
use thiserror::Error;

/// Result type for call-control operations
pub type CallControlResult<T> = Result<T, CallControlError>;

/// Errors returned by coordinator operations
///
/// Policy rejections (`Busy`, `InvalidState`, `TooManyCalls`, `VideoNotPossible`)
/// leave every session untouched.
#[derive(Debug, Error)]
pub enum CallControlError {
    /// No session with this id is known
    #[error("Call not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    /// A pause or resume request is still waiting for the core
    #[error("Call {session_id} is busy with a previous request")]
    Busy { session_id: SessionId },

    /// Operation not allowed in the session's current state
    #[error("Cannot {operation} while call is {state}")]
    InvalidState {
        operation: &'static str,
        state: CallState,
    },

    /// Maximum number of concurrent calls reached
    #[error("Maximum number of concurrent calls reached ({max})")]
    TooManyCalls { max: usize },

    /// Video was refused by policy
    #[error("Video is not possible: {reason}")]
    VideoNotPossible { reason: String },

    /// The action was deferred until the permission is granted
    #[error("Permission required: {permission:?}")]
    PermissionRequired { permission: Permission },

    /// Requested audio output is not available
    #[error("Audio route unavailable: {route}")]
    RouteUnavailable { route: AudioRoute },

    /// The audio platform failed
    #[error("Audio device error: {message}")]
    AudioDevice { message: String },

    /// Conference bookkeeping refused the operation
    #[error("Conference error: {reason}")]
    Conference { reason: String },

    /// The telephony core rejected a command
    #[error("Telephony core rejected {command}: {source}")]
    Core {
        command: &'static str,
        #[source]
        source: CoreError,
    },

    /// Not one of the sixteen DTMF symbols
    #[error("Invalid DTMF digit: {digit:?}")]
    InvalidDtmf { digit: char },

    /// No call is in the foreground
    #[error("No current call")]
    NoCurrentCall,

    /// The coordinator task is gone
    #[error("Call coordinator has stopped")]
    CoordinatorStopped,

    /// Configuration failed validation
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl CallControlError {
    pub fn session_not_found(session_id: &SessionId) -> Self {
        Self::SessionNotFound {
            session_id: session_id.clone(),
        }
    }

    pub fn invalid_state(operation: &'static str, state: CallState) -> Self {
        Self::InvalidState { operation, state }
    }

    pub fn video_not_possible(reason: impl Into<String>) -> Self {
        Self::VideoNotPossible {
            reason: reason.into(),
        }
    }

    pub fn conference(reason: impl Into<String>) -> Self {
        Self::Conference {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Adapter for `map_err` on core command results
    pub fn core(command: &'static str) -> impl FnOnce(CoreError) -> Self {
        move |source| Self::Core { command, source }
    }
}

/// Failure reported by a telephony core command
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("telephony core unavailable")]
    Unavailable,
}

/// Failure switching or adjusting the audio output
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AudioRouteError {
    #[error("{route} output is not available")]
    DeviceUnavailable { route: AudioRoute },

    #[error("audio platform error: {message}")]
    Platform { message: String },
}

impl AudioRouteError {
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }
}

impl From<AudioRouteError> for CallControlError {
    fn from(err: AudioRouteError) -> Self {
        match err {
            AudioRouteError::DeviceUnavailable { route } => Self::RouteUnavailable { route },
            AudioRouteError::Platform { message } => Self::AudioDevice { message },
        }
    }
}
