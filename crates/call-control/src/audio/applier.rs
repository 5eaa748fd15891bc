//! Applying routes to the audio platform

use super::policy::AudioRoute;
use crate::error::AudioRouteError;
use crate::types::SessionId;
use serde::{Deserialize, Serialize};
use std::io;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Platform output device backing a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRef {
    BuiltinEarpiece,
    BuiltinSpeaker,
    BluetoothSco,
}

impl DeviceRef {
    pub fn for_route(route: AudioRoute) -> Self {
        match route {
            AudioRoute::Earpiece => DeviceRef::BuiltinEarpiece,
            AudioRoute::Speaker => DeviceRef::BuiltinSpeaker,
            AudioRoute::Bluetooth => DeviceRef::BluetoothSco,
        }
    }
}

/// Volume stream adjusted by the volume keys during a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStream {
    VoiceCall,
    BluetoothSco,
}

/// Blocking interface to the platform audio system
///
/// Implementations are only ever called from the audio worker thread.
pub trait AudioOutputPort: Send + 'static {
    /// Route call audio to `device`; `session` is `None` once no call is left
    fn set_output_device(
        &mut self,
        session: Option<&SessionId>,
        device: DeviceRef,
    ) -> Result<(), AudioRouteError>;

    fn adjust_stream_volume(&mut self, stream: VolumeStream, delta: i32)
    -> Result<(), AudioRouteError>;

    fn is_volume_fixed(&self) -> bool;

    fn set_ringing(&mut self, ringing: bool) -> Result<(), AudioRouteError>;
}

/// Work sent from the coordinator to the audio worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCommand {
    Apply {
        session_id: Option<SessionId>,
        route: AudioRoute,
    },
    AdjustVolume {
        delta: i32,
    },
    Ringing(bool),
}

/// Idempotent front for an [`AudioOutputPort`]
///
/// Re-applying the route already in force for the same session does not
/// touch the platform. A failed switch is not remembered, so the next apply
/// retries it.
pub struct RouteApplier<P> {
    port: P,
    applied: Option<(Option<SessionId>, AudioRoute)>,
    switches: u64,
    ringing: bool,
}

impl<P: AudioOutputPort> RouteApplier<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            applied: None,
            switches: 0,
            ringing: false,
        }
    }

    /// Returns `true` when the platform was actually switched
    pub fn apply(
        &mut self,
        session_id: Option<&SessionId>,
        route: AudioRoute,
    ) -> Result<bool, AudioRouteError> {
        if let Some((applied_session, applied_route)) = &self.applied {
            if applied_session.as_ref() == session_id && *applied_route == route {
                debug!(?session_id, %route, "Route already applied");
                return Ok(false);
            }
        }

        self.port
            .set_output_device(session_id, DeviceRef::for_route(route))?;
        self.applied = Some((session_id.cloned(), route));
        self.switches += 1;
        info!(?session_id, %route, "Audio route applied");
        Ok(true)
    }

    /// Adjust the stream matching the applied route
    pub fn adjust_volume(&mut self, delta: i32) -> Result<(), AudioRouteError> {
        if self.port.is_volume_fixed() {
            warn!(delta, "Volume is fixed on this device, ignoring adjustment");
            return Ok(());
        }
        let stream = match self.applied_route() {
            Some(AudioRoute::Bluetooth) => VolumeStream::BluetoothSco,
            _ => VolumeStream::VoiceCall,
        };
        self.port.adjust_stream_volume(stream, delta)
    }

    pub fn set_ringing(&mut self, ringing: bool) -> Result<(), AudioRouteError> {
        if self.ringing == ringing {
            return Ok(());
        }
        self.port.set_ringing(ringing)?;
        self.ringing = ringing;
        Ok(())
    }

    pub fn execute(&mut self, command: RouteCommand) -> Result<(), AudioRouteError> {
        match command {
            RouteCommand::Apply { session_id, route } => {
                self.apply(session_id.as_ref(), route).map(|_| ())
            }
            RouteCommand::AdjustVolume { delta } => self.adjust_volume(delta),
            RouteCommand::Ringing(ringing) => self.set_ringing(ringing),
        }
    }

    pub fn applied_route(&self) -> Option<AudioRoute> {
        self.applied.as_ref().map(|(_, route)| *route)
    }

    /// Number of platform switches performed so far
    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }
}

/// Run `applier` on its own thread until the command channel closes.
///
/// The applier is handed back through the join handle.
pub fn spawn_route_worker<P: AudioOutputPort>(
    mut applier: RouteApplier<P>,
    mut commands: mpsc::UnboundedReceiver<RouteCommand>,
) -> io::Result<JoinHandle<RouteApplier<P>>> {
    thread::Builder::new()
        .name("audio-route".to_string())
        .spawn(move || {
            while let Some(command) = commands.blocking_recv() {
                if let Err(e) = applier.execute(command.clone()) {
                    warn!(?command, error = %e, "Audio route command failed");
                }
            }
            debug!("Audio route worker stopped");
            applier
        })
}
