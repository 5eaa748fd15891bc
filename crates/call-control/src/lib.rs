//! # rvoip-call-control
//!
//! Call-control layer for softphone applications. It sits between a user
//! interface and a telephony core (the SIP/media engine) and keeps the call
//! state consistent while events arrive asynchronously from the network and
//! actions arrive from the user.
//!
//! ## Components
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`coordinator`] | Owns every call session, serializes core events and user actions |
//! | [`audio`] | Picks the audio output (earpiece, speaker, Bluetooth) and applies it |
//! | [`bandwidth`] | Decides whether video is possible under the bandwidth profile |
//! | [`negotiator`] | Answers remote media changes, prompting the user with a deadline |
//! | [`projector`] | Publishes the derived UI snapshot |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   actions    ┌────────────────────────────┐
//! │  User interface  │─────────────▶│     CoordinatorHandle      │
//! │                  │◀─────────────│  snapshot watch / events   │
//! └──────────────────┘              └─────────────┬──────────────┘
//!                                                 │ mailbox
//!                                   ┌─────────────▼──────────────┐
//!        CoreEvent stream ─────────▶│        Coordinator         │
//!                                   │ sessions · conference ·    │
//!                                   │ audio policy · negotiator  │
//!                                   └──────┬──────────────┬──────┘
//!                       TelephonyCore cmds │              │ RouteCommand
//!                                   ┌──────▼─────┐  ┌─────▼────────┐
//!                                   │ Telephony  │  │ audio worker │
//!                                   │    core    │  │   (thread)   │
//!                                   └────────────┘  └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_call_control::prelude::*;
//! use tokio_stream::wrappers::ReceiverStream;
//!
//! # async fn example(
//! #     core: Arc<dyn TelephonyCore>,
//! #     port: impl AudioOutputPort,
//! #     events: tokio::sync::mpsc::Receiver<CoreEvent>,
//! # ) -> CallControlResult<()> {
//! let (handle, _tasks) = CoordinatorHandle::spawn(
//!     CoordinatorConfig::new().with_max_calls(2),
//!     core,
//!     port,
//!     ReceiverStream::new(events),
//! )?;
//!
//! let session_id = handle.place_call("sip:bob@example.com").await?;
//! handle.toggle_speaker().await?;
//! println!("current call: {:?}", handle.snapshot().current_session_id);
//! handle.hang_up(HangUpTarget::Session(session_id)).await?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod bandwidth;
pub mod conference;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod negotiator;
pub mod projector;
pub mod scheduler;
pub mod session;
pub mod telephony;
pub mod types;

pub use error::{AudioRouteError, CallControlError, CallControlResult, CoreError};

pub mod prelude {
    pub use crate::audio::{
        AudioOutputPort, AudioRoute, DeviceCapabilitySnapshot, DeviceRef, RouteCommand,
        VolumeStream,
    };
    pub use crate::bandwidth::BandwidthProfile;
    pub use crate::conference::ConferenceId;
    pub use crate::config::CoordinatorConfig;
    pub use crate::coordinator::{
        Coordinator, CoordinatorHandle, CoordinatorMessage, DeviceEvent, HangUpTarget,
    };
    pub use crate::error::{AudioRouteError, CallControlError, CallControlResult, CoreError};
    pub use crate::events::{Notification, NotificationKind, Permission, UiEvent};
    pub use crate::projector::{CallSummary, UiSnapshot};
    pub use crate::session::{CallState, CoreCallState};
    pub use crate::telephony::{
        CallStateEvent, CallStats, CoreEvent, EncryptionEvent, RegistrationEvent,
        RegistrationState, TelephonyCore,
    };
    pub use crate::types::{
        CallDirection, FailureCategory, MediaEncryption, MediaParams, Reason, SessionId,
    };
}
