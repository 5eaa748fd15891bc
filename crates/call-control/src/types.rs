//! Value types shared by every call-control component

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Identifier the telephony core assigns to a call session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Direction of a call relative to the local user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Media encryption negotiated for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaEncryption {
    #[default]
    None,
    Srtp,
    Zrtp,
    Dtls,
}

impl fmt::Display for MediaEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaEncryption::None => "none",
            MediaEncryption::Srtp => "SRTP",
            MediaEncryption::Zrtp => "ZRTP",
            MediaEncryption::Dtls => "DTLS",
        };
        f.write_str(name)
    }
}

/// Media parameters of one side of a call
///
/// The telephony core hands these out from `create_params` and reports the
/// negotiated and remote variants with call state events.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaParams {
    /// Whether a video stream is (or should be) part of the call
    pub video_enabled: bool,
    /// Audio bandwidth ceiling in kbit/s, `None` when uncapped
    pub audio_bandwidth_kbps: Option<u32>,
    /// Low-bandwidth mode, advertised to the remote party
    pub low_bandwidth: bool,
    /// Media encryption in use
    pub encryption: MediaEncryption,
    /// File the call is recorded into when recording is started
    pub record_file: Option<PathBuf>,
}

impl MediaParams {
    /// Audio-only parameters
    pub fn audio() -> Self {
        Self::default()
    }

    /// Parameters with video enabled
    pub fn video() -> Self {
        Self {
            video_enabled: true,
            ..Self::default()
        }
    }

    pub fn with_video(mut self, enabled: bool) -> Self {
        self.video_enabled = enabled;
        self
    }

    pub fn with_low_bandwidth(mut self, low_bandwidth: bool) -> Self {
        self.low_bandwidth = low_bandwidth;
        self
    }

    pub fn with_encryption(mut self, encryption: MediaEncryption) -> Self {
        self.encryption = encryption;
        self
    }
}

/// Why the telephony core ended or refused a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Normal hang-up
    Normal,
    Declined,
    Busy,
    NotFound,
    NotAcceptable,
    Generic,
    /// Raw SIP status code the core could not classify
    Status(u16),
}

impl Reason {
    /// Classify a SIP final response status
    pub fn from_status(code: u16) -> Self {
        match code {
            200..=299 => Reason::Normal,
            603 => Reason::Declined,
            486 | 600 => Reason::Busy,
            404 | 410 | 604 => Reason::NotFound,
            415 | 488 | 606 => Reason::NotAcceptable,
            code if code >= 400 => Reason::Generic,
            code => Reason::Status(code),
        }
    }

    /// The user-facing failure category, `None` for a normal termination
    pub fn failure(self) -> Option<FailureCategory> {
        match self {
            Reason::Normal => None,
            Reason::Declined => Some(FailureCategory::Declined),
            Reason::Busy => Some(FailureCategory::Busy),
            Reason::NotFound => Some(FailureCategory::NotFound),
            Reason::NotAcceptable => Some(FailureCategory::IncompatibleMedia),
            Reason::Generic => Some(FailureCategory::Generic),
            Reason::Status(code) => Reason::from_status(code).failure_for_status(),
        }
    }

    fn failure_for_status(self) -> Option<FailureCategory> {
        match self {
            Reason::Status(_) => None,
            other => other.failure(),
        }
    }
}

/// User-visible classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Declined,
    Busy,
    NotFound,
    IncompatibleMedia,
    Generic,
}

impl FailureCategory {
    /// Short message shown to the user
    pub fn user_message(self) -> &'static str {
        match self {
            FailureCategory::Declined => "Call declined",
            FailureCategory::Busy => "User busy",
            FailureCategory::NotFound => "User not found",
            FailureCategory::IncompatibleMedia => "Incompatible media parameters",
            FailureCategory::Generic => "Call failed",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_reasons() {
        assert_eq!(Reason::from_status(603), Reason::Declined);
        assert_eq!(Reason::from_status(486), Reason::Busy);
        assert_eq!(Reason::from_status(600), Reason::Busy);
        assert_eq!(Reason::from_status(404), Reason::NotFound);
        assert_eq!(Reason::from_status(488), Reason::NotAcceptable);
        assert_eq!(Reason::from_status(500), Reason::Generic);
        assert_eq!(Reason::from_status(200), Reason::Normal);
    }

    #[test]
    fn failure_categories_carry_user_messages() {
        assert_eq!(Reason::Declined.failure().unwrap().user_message(), "Call declined");
        assert_eq!(Reason::NotFound.failure().unwrap().user_message(), "User not found");
        assert_eq!(
            Reason::NotAcceptable.failure().unwrap().user_message(),
            "Incompatible media parameters"
        );
        assert_eq!(Reason::Busy.failure().unwrap().user_message(), "User busy");
        assert_eq!(Reason::Normal.failure(), None);
    }

    #[test]
    fn raw_status_reasons_are_classified() {
        assert_eq!(Reason::Status(486).failure(), Some(FailureCategory::Busy));
        assert_eq!(Reason::Status(503).failure(), Some(FailureCategory::Generic));
        assert_eq!(Reason::Status(180).failure(), None);
    }
}
