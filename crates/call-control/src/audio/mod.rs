//! Audio routing
//!
//! Routing is split in two halves:
//!
//! - [`policy`] decides *which* output a call should use. It is pure and cheap
//!   and runs inside the coordinator step that observed the change.
//! - [`applier`] performs the switch on the platform. Device calls may block,
//!   so they run on a dedicated worker thread fed through a channel.
//!
//! ```text
//!  coordinator ──select_route()──▶ AudioRoute ──RouteCommand──▶ audio worker
//!                                                                  │
//!                                                     AudioOutputPort::set_output_device
//! ```

pub mod applier;
pub mod policy;

pub use applier::{
    AudioOutputPort, DeviceRef, RouteApplier, RouteCommand, VolumeStream, spawn_route_worker,
};
pub use policy::{AudioRoute, AudioRoutePolicy, DeviceCapabilitySnapshot, select_route};
