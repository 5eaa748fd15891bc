//! Coordinator configuration
//!
//! [`CoordinatorConfig`] deserializes from JSON with every field optional, and
//! offers `with_*` builder methods for programmatic setup:
//!
//! ```rust
//! use rvoip_call_control::config::CoordinatorConfig;
//! use rvoip_call_control::bandwidth::BandwidthProfile;
//!
//! let config = CoordinatorConfig::new()
//!     .with_max_calls(2)
//!     .with_auto_accept_video(true)
//!     .with_bandwidth_profile(BandwidthProfile::LowBandwidth);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.call_update_timeout_ms, 30_000);
//! ```

use crate::audio::DeviceCapabilitySnapshot;
use crate::bandwidth::BandwidthProfile;
use crate::error::{CallControlError, CallControlResult};
use crate::events::Permission;
use crate::negotiator::DEFAULT_CALL_UPDATE_TIMEOUT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Calls beyond this are refused (outgoing) or declined busy (incoming)
    pub max_concurrent_calls: usize,
    /// Master switch for video
    pub video_enabled: bool,
    /// Place outgoing calls with video
    pub initiate_with_video: bool,
    /// Accept remote video offers without asking
    pub auto_accept_video: bool,
    /// How long the user has to answer a video offer
    pub call_update_timeout_ms: u64,
    /// Answer incoming calls automatically after this delay
    pub auto_answer_delay_ms: Option<u64>,
    pub bandwidth_profile: BandwidthProfile,
    /// Call statistics period, 0 disables statistics
    pub stats_interval_ms: u64,
    /// Capacity of the coordinator mailbox
    pub mailbox_capacity: usize,
    /// Device state at startup
    pub device: DeviceCapabilitySnapshot,
    /// Permissions already granted at startup
    pub granted_permissions: Vec<Permission>,
    /// Directory recordings are written into
    pub recordings_dir: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 5,
            video_enabled: true,
            initiate_with_video: false,
            auto_accept_video: false,
            call_update_timeout_ms: DEFAULT_CALL_UPDATE_TIMEOUT.as_millis() as u64,
            auto_answer_delay_ms: None,
            bandwidth_profile: BandwidthProfile::HighResolution,
            stats_interval_ms: 1000,
            mailbox_capacity: 256,
            device: DeviceCapabilitySnapshot::default(),
            granted_permissions: vec![Permission::Microphone, Permission::Camera],
            recordings_dir: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = max;
        self
    }

    pub fn with_video(mut self, enabled: bool) -> Self {
        self.video_enabled = enabled;
        self
    }

    pub fn with_initiate_video(mut self, enabled: bool) -> Self {
        self.initiate_with_video = enabled;
        self
    }

    pub fn with_auto_accept_video(mut self, enabled: bool) -> Self {
        self.auto_accept_video = enabled;
        self
    }

    pub fn with_call_update_timeout(mut self, timeout: Duration) -> Self {
        self.call_update_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_auto_answer(mut self, delay: Option<Duration>) -> Self {
        self.auto_answer_delay_ms = delay.map(|delay| delay.as_millis() as u64);
        self
    }

    pub fn with_bandwidth_profile(mut self, profile: BandwidthProfile) -> Self {
        self.bandwidth_profile = profile;
        self
    }

    pub fn with_stats_interval(mut self, interval: Option<Duration>) -> Self {
        self.stats_interval_ms = interval.map_or(0, |interval| interval.as_millis() as u64);
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_device(mut self, device: DeviceCapabilitySnapshot) -> Self {
        self.device = device;
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.granted_permissions = permissions.into_iter().collect();
        self
    }

    pub fn with_recordings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recordings_dir = Some(dir.into());
        self
    }

    pub fn call_update_timeout(&self) -> Duration {
        Duration::from_millis(self.call_update_timeout_ms)
    }

    pub fn auto_answer_delay(&self) -> Option<Duration> {
        self.auto_answer_delay_ms.map(Duration::from_millis)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_ms > 0).then(|| Duration::from_millis(self.stats_interval_ms))
    }

    /// Recording file for a call to `remote`, when a recordings directory is set
    pub fn recording_path(&self, remote: &str, at: DateTime<Utc>) -> Option<PathBuf> {
        let dir = self.recordings_dir.as_ref()?;
        let name: String = remote
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        Some(dir.join(format!("{}_{}.mkv", name, at.format("%Y%m%d-%H%M%S"))))
    }

    pub fn validate(&self) -> CallControlResult<()> {
        if self.max_concurrent_calls == 0 {
            return Err(CallControlError::invalid_config(
                "max_concurrent_calls must be at least 1",
            ));
        }
        if self.mailbox_capacity == 0 {
            return Err(CallControlError::invalid_config(
                "mailbox_capacity must be at least 1",
            ));
        }
        if self.call_update_timeout_ms == 0 {
            return Err(CallControlError::invalid_config(
                "call_update_timeout_ms must be positive",
            ));
        }
        Ok(())
    }
}
