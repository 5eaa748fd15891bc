//! Audio route selection

use crate::error::AudioRouteError;
use crate::session::CallSession;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Output the call audio is played through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRoute {
    Earpiece,
    Speaker,
    Bluetooth,
}

impl fmt::Display for AudioRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioRoute::Earpiece => "earpiece",
            AudioRoute::Speaker => "speaker",
            AudioRoute::Bluetooth => "bluetooth",
        };
        f.write_str(name)
    }
}

/// What the device can currently play audio through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCapabilitySnapshot {
    pub bluetooth_connected: bool,
    /// The connected headset exposes an audio playback profile
    pub bluetooth_playback_capable: bool,
    pub wired_headset_connected: bool,
    pub is_tablet: bool,
}

impl DeviceCapabilitySnapshot {
    pub fn bluetooth_available(&self) -> bool {
        self.bluetooth_connected && self.bluetooth_playback_capable
    }

    /// Whether `route` can be used with this device state
    pub fn supports(&self, route: AudioRoute) -> bool {
        match route {
            AudioRoute::Bluetooth => self.bluetooth_available(),
            AudioRoute::Earpiece | AudioRoute::Speaker => true,
        }
    }
}

/// Pick the route for `session`, first matching rule wins:
///
/// 1. a user override whose device is still available
/// 2. Bluetooth when a playback-capable headset is connected
/// 3. speaker on tablets
/// 4. earpiece for audio-only calls (and when no call exists)
/// 5. speaker for video calls
pub fn select_route(
    session: Option<&CallSession>,
    device: &DeviceCapabilitySnapshot,
    user_override: Option<AudioRoute>,
) -> AudioRoute {
    if let Some(route) = user_override.filter(|route| device.supports(*route)) {
        return route;
    }
    if device.bluetooth_available() {
        return AudioRoute::Bluetooth;
    }
    if device.is_tablet {
        return AudioRoute::Speaker;
    }
    match session {
        Some(session) if session.media.video_enabled => AudioRoute::Speaker,
        _ => AudioRoute::Earpiece,
    }
}

/// Route and override in force before Bluetooth took over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RememberedRoute {
    route: AudioRoute,
    user_override: Option<AudioRoute>,
}

/// Stateful wrapper around [`select_route`]
///
/// Tracks the device snapshot and the user's override, and remembers what to
/// go back to when a Bluetooth headset or a wired headset goes away. Every
/// method returns the route that should now be applied.
#[derive(Debug, Clone)]
pub struct AudioRoutePolicy {
    device: DeviceCapabilitySnapshot,
    user_override: Option<AudioRoute>,
    before_bluetooth: Option<RememberedRoute>,
    speaker_before_wired_headset: Option<bool>,
    current: AudioRoute,
}

impl AudioRoutePolicy {
    pub fn new(device: DeviceCapabilitySnapshot) -> Self {
        Self {
            device,
            user_override: None,
            before_bluetooth: None,
            speaker_before_wired_headset: None,
            current: select_route(None, &device, None),
        }
    }

    pub fn device(&self) -> &DeviceCapabilitySnapshot {
        &self.device
    }

    pub fn current(&self) -> AudioRoute {
        self.current
    }

    pub fn user_override(&self) -> Option<AudioRoute> {
        self.user_override
    }

    /// Recompute the route after a session change
    pub fn evaluate(&mut self, session: Option<&CallSession>) -> AudioRoute {
        self.settle(session)
    }

    /// Pin a route chosen by the user
    pub fn set_user_override(
        &mut self,
        session: Option<&CallSession>,
        route: AudioRoute,
    ) -> Result<AudioRoute, AudioRouteError> {
        if !self.device.supports(route) {
            return Err(AudioRouteError::DeviceUnavailable { route });
        }
        if route == AudioRoute::Bluetooth && self.current != AudioRoute::Bluetooth {
            self.before_bluetooth = Some(RememberedRoute {
                route: self.current,
                user_override: self.user_override,
            });
        }
        self.user_override = Some(route);
        Ok(self.settle(session))
    }

    /// Speaker on, or back to what the rules pick without the speaker
    pub fn toggle_speaker(&mut self, session: Option<&CallSession>) -> AudioRoute {
        if self.current == AudioRoute::Speaker {
            let fallback = select_route(session, &self.device, None);
            self.user_override = match fallback {
                AudioRoute::Speaker => Some(AudioRoute::Earpiece),
                _ => None,
            };
        } else {
            self.user_override = Some(AudioRoute::Speaker);
        }
        self.settle(session)
    }

    /// Take a new device snapshot into account
    pub fn update_device(
        &mut self,
        session: Option<&CallSession>,
        device: DeviceCapabilitySnapshot,
    ) -> AudioRoute {
        let previous = std::mem::replace(&mut self.device, device);

        if previous.bluetooth_available() && !device.bluetooth_available() {
            self.restore_after_bluetooth(session);
        }

        if !previous.wired_headset_connected && device.wired_headset_connected {
            let on_speaker = self.current == AudioRoute::Speaker;
            self.speaker_before_wired_headset = Some(on_speaker);
            if on_speaker && !device.bluetooth_available() {
                self.user_override = Some(AudioRoute::Earpiece);
            }
        } else if previous.wired_headset_connected && !device.wired_headset_connected {
            if self.speaker_before_wired_headset.take() == Some(true) {
                self.user_override = Some(AudioRoute::Speaker);
            }
        }

        self.settle(session)
    }

    /// Forget overrides and remembered routes once no call is left
    pub fn reset(&mut self) -> AudioRoute {
        self.user_override = None;
        self.before_bluetooth = None;
        self.speaker_before_wired_headset = None;
        self.settle(None)
    }

    fn restore_after_bluetooth(&mut self, session: Option<&CallSession>) {
        let remembered = self.before_bluetooth.take();
        let overridden = self.user_override == Some(AudioRoute::Bluetooth);

        self.user_override = match remembered {
            Some(memory) if overridden => {
                let by_rules = select_route(session, &self.device, memory.user_override);
                if by_rules == memory.route {
                    memory.user_override
                } else {
                    Some(memory.route)
                }
            }
            Some(memory) => memory.user_override,
            None if overridden => None,
            None => self.user_override,
        };
        debug!(restored = ?self.user_override, "Bluetooth output lost");
    }

    fn settle(&mut self, session: Option<&CallSession>) -> AudioRoute {
        let next = select_route(session, &self.device, self.user_override);
        if next == AudioRoute::Bluetooth {
            if self.current != AudioRoute::Bluetooth && self.before_bluetooth.is_none() {
                self.before_bluetooth = Some(RememberedRoute {
                    route: self.current,
                    user_override: self.user_override,
                });
            }
        } else {
            self.before_bluetooth = None;
        }
        self.current = next;
        next
    }
}
