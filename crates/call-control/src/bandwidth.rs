//! Bandwidth and video policy
//!
//! The active [`BandwidthProfile`] decides whether video is possible at all.
//! Outgoing call parameters and answers to remote renegotiation offers both
//! go through [`BandwidthPolicy::apply_to_params`].

use crate::types::MediaParams;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Audio bandwidth ceiling used when video is not possible (kbit/s)
pub const LOW_BANDWIDTH_AUDIO_KBPS: u32 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthProfile {
    #[default]
    HighResolution,
    LowResolution,
    LowBandwidth,
}

#[derive(Debug, Clone)]
pub struct BandwidthPolicy {
    profile: BandwidthProfile,
}

impl BandwidthPolicy {
    pub fn new(profile: BandwidthProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> BandwidthProfile {
        self.profile
    }

    pub fn set_profile(&mut self, profile: BandwidthProfile) {
        if self.profile != profile {
            debug!(from = ?self.profile, to = ?profile, "Bandwidth profile changed");
        }
        self.profile = profile;
    }

    /// User-imposed restriction: limited switches to low bandwidth
    pub fn set_user_restriction(&mut self, limited: bool) {
        self.set_profile(if limited {
            BandwidthProfile::LowBandwidth
        } else {
            BandwidthProfile::HighResolution
        });
    }

    pub fn is_video_possible(&self) -> bool {
        self.profile != BandwidthProfile::LowBandwidth
    }

    /// Force the profile's limits onto call parameters.
    ///
    /// Without video, audio is capped at [`LOW_BANDWIDTH_AUDIO_KBPS`]. With
    /// video possible the cap is lifted and video enabled; callers narrow
    /// `video_enabled` further from their own settings.
    pub fn apply_to_params(&self, params: &mut MediaParams) {
        if self.is_video_possible() {
            params.video_enabled = true;
            params.audio_bandwidth_kbps = None;
        } else {
            params.video_enabled = false;
            params.audio_bandwidth_kbps = Some(LOW_BANDWIDTH_AUDIO_KBPS);
        }
    }
}

impl Default for BandwidthPolicy {
    fn default() -> Self {
        Self::new(BandwidthProfile::default())
    }
}
