//! Recording audio output

use parking_lot::Mutex;
use rvoip_call_control::audio::{AudioOutputPort, DeviceRef, VolumeStream};
use rvoip_call_control::error::AudioRouteError;
use rvoip_call_control::types::SessionId;
use std::sync::Arc;

#[derive(Debug, Default)]
struct PortState {
    switches: Vec<(Option<SessionId>, DeviceRef)>,
    volumes: Vec<(VolumeStream, i32)>,
    ringing: Vec<bool>,
    volume_fixed: bool,
    failing: bool,
}

/// Audio port whose recordings stay readable after it moved to the worker thread
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MockAudioPort {
    state: Arc<Mutex<PortState>>,
}

impl MockAudioPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device whose call volume cannot be changed
    pub fn with_fixed_volume() -> Self {
        let port = Self::default();
        port.state.lock().volume_fixed = true;
        port
    }

    /// Make route switches fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn switches(&self) -> Vec<(Option<SessionId>, DeviceRef)> {
        self.state.lock().switches.clone()
    }

    pub fn devices(&self) -> Vec<DeviceRef> {
        self.state
            .lock()
            .switches
            .iter()
            .map(|(_, device)| *device)
            .collect()
    }

    pub fn volumes(&self) -> Vec<(VolumeStream, i32)> {
        self.state.lock().volumes.clone()
    }

    /// Every ring tone toggle, in order
    pub fn ringing_changes(&self) -> Vec<bool> {
        self.state.lock().ringing.clone()
    }
}

impl AudioOutputPort for MockAudioPort {
    fn set_output_device(
        &mut self,
        session: Option<&SessionId>,
        device: DeviceRef,
    ) -> Result<(), AudioRouteError> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(AudioRouteError::platform("mock device failure"));
        }
        state.switches.push((session.cloned(), device));
        Ok(())
    }

    fn adjust_stream_volume(
        &mut self,
        stream: VolumeStream,
        delta: i32,
    ) -> Result<(), AudioRouteError> {
        self.state.lock().volumes.push((stream, delta));
        Ok(())
    }

    fn is_volume_fixed(&self) -> bool {
        self.state.lock().volume_fixed
    }

    fn set_ringing(&mut self, ringing: bool) -> Result<(), AudioRouteError> {
        self.state.lock().ringing.push(ringing);
        Ok(())
    }
}
