//! JSON scenario files
//!
//! A scenario is a configuration plus a list of steps. Steps either act as
//! the user (through the [`CoordinatorHandle`]), act as the network (events
//! injected into the [`LoopbackCore`]), change the device, or check the
//! published snapshot.
//!
//! ```json
//! {
//!   "name": "answer and hang up",
//!   "steps": [
//!     { "action": "incoming", "session_id": "in-1", "from": "sip:bob@example.com" },
//!     { "action": "accept_call", "session_id": "in-1" },
//!     { "action": "expect", "calls": 1, "route": "earpiece" },
//!     { "action": "hang_up" }
//!   ]
//! }
//! ```

use crate::loopback::{LoggingAudioPort, LoopbackCore};
use anyhow::{Context, Result, bail};
use rvoip_call_control::audio::AudioRoute;
use rvoip_call_control::config::CoordinatorConfig;
use rvoip_call_control::coordinator::{CoordinatorHandle, DeviceEvent, HangUpTarget};
use rvoip_call_control::error::CallControlResult;
use rvoip_call_control::projector::UiSnapshot;
use rvoip_call_control::session::CoreCallState;
use rvoip_call_control::telephony::{CallStateEvent, CoreEvent};
use rvoip_call_control::types::{MediaParams, Reason, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: CoordinatorConfig,
    /// Remote parties answer outgoing calls straight away
    #[serde(default = "default_true")]
    pub remote_auto_answer: bool,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(text)?;
        scenario.config.validate()?;
        Ok(scenario)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    // Network side
    Incoming {
        session_id: SessionId,
        from: String,
        #[serde(default)]
        video: bool,
    },
    RemoteAnswer {
        session_id: SessionId,
    },
    RemoteVideoOffer {
        session_id: SessionId,
    },
    RemotePause {
        session_id: SessionId,
    },
    RemoteHangUp {
        session_id: SessionId,
        #[serde(default)]
        reason: Option<Reason>,
    },
    CoreEvent {
        event: CoreEvent,
    },

    // Platform side
    Device {
        event: DeviceEvent,
    },

    // User side
    PlaceCall {
        address: String,
    },
    AcceptCall {
        session_id: SessionId,
    },
    DeclineCall {
        session_id: SessionId,
        #[serde(default)]
        reason: Option<Reason>,
    },
    PauseOrResume {
        session_id: SessionId,
    },
    /// Without a session the current call is hung up
    HangUp {
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(default)]
        all: bool,
    },
    AddVideo {
        session_id: SessionId,
    },
    RemoveVideo {
        session_id: SessionId,
    },
    AnswerCallUpdate {
        accept: bool,
    },
    ToggleMicro,
    ToggleSpeaker,
    SelectRoute {
        route: AudioRoute,
    },
    AdjustVolume {
        delta: i32,
    },
    EnterConference,
    LeaveConference,
    RemoveFromConference {
        session_id: SessionId,
    },
    ToggleRecording,
    VerifyToken {
        session_id: SessionId,
        verified: bool,
    },
    RestrictBandwidth {
        limited: bool,
    },
    SwitchCamera,
    SendDtmf {
        digits: String,
    },

    // Control
    Wait {
        ms: u64,
    },
    Snapshot,
    Expect(Expectation),
}

/// Checks against the published snapshot; absent fields are not checked
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Expectation {
    pub calls: Option<usize>,
    pub current: Option<SessionId>,
    pub route: Option<AudioRoute>,
    pub conference_size: Option<usize>,
    pub mic_muted: Option<bool>,
    pub video_enabled: Option<bool>,
    pub recording: Option<bool>,
    pub prompt: Option<bool>,
    /// Whether the previous user action was refused
    pub rejected: Option<bool>,
}

impl Expectation {
    fn check(&self, snapshot: &UiSnapshot, last_rejected: bool) -> Result<()> {
        check("calls", self.calls, snapshot.calls.len())?;
        check(
            "current",
            self.current.clone().map(Some),
            snapshot.current_session_id.clone(),
        )?;
        check("route", self.route, snapshot.route)?;
        check("conference_size", self.conference_size, snapshot.conference_size)?;
        check("mic_muted", self.mic_muted, snapshot.mic_muted)?;
        check("video_enabled", self.video_enabled, snapshot.video_enabled)?;
        check("recording", self.recording, snapshot.is_recording)?;
        check("prompt", self.prompt, snapshot.pending_update_prompt.is_some())?;
        check("rejected", self.rejected, last_rejected)
    }
}

fn check<T: PartialEq + Debug>(field: &str, expected: Option<T>, actual: T) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => {
            bail!("expected {} to be {:?}, found {:?}", field, expected, actual)
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Time given to the coordinator to settle after each step
    pub step_delay: Duration,
    /// Print UI events and snapshots to stdout
    pub print: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(50),
            print: true,
        }
    }
}

/// Outcome of a scenario run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub steps: usize,
    pub rejected: usize,
    pub snapshot: UiSnapshot,
}

/// Run every step, then shut the coordinator down
pub async fn run(scenario: Scenario, options: RunOptions) -> Result<RunReport> {
    let Scenario {
        name,
        config,
        remote_auto_answer,
        steps,
    } = scenario;
    info!(name = name.as_deref().unwrap_or("unnamed"), steps = steps.len(), "Running scenario");

    let (core, events) = LoopbackCore::new(remote_auto_answer);
    let core = Arc::new(core);
    let (handle, tasks) = CoordinatorHandle::spawn(
        config,
        core.clone(),
        LoggingAudioPort::default(),
        UnboundedReceiverStream::new(events),
    )?;

    let printer = options.print.then(|| {
        let mut ui_events = handle.ui_events();
        tokio::spawn(async move {
            while let Some(event) = ui_events.next().await {
                match event.map(|event| serde_json::to_string(&event)) {
                    Ok(Ok(line)) => println!("{}", line),
                    Ok(Err(e)) => warn!(error = %e, "Unprintable UI event"),
                    Err(e) => warn!(error = %e, "UI event printer fell behind"),
                }
            }
        })
    });

    let mut runner = Runner {
        handle,
        core,
        options,
        last_rejected: false,
        rejected: 0,
    };
    let outcome = runner.run_steps(&steps).await;

    let snapshot = runner.handle.snapshot();
    runner.handle.shutdown().await?;
    tasks.join().await?;
    if let Some(printer) = printer {
        printer.abort();
    }

    outcome?;
    Ok(RunReport {
        steps: steps.len(),
        rejected: runner.rejected,
        snapshot,
    })
}

struct Runner {
    handle: CoordinatorHandle,
    core: Arc<LoopbackCore>,
    options: RunOptions,
    last_rejected: bool,
    rejected: usize,
}

impl Runner {
    async fn run_steps(&mut self, steps: &[Step]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            self.step(step)
                .await
                .with_context(|| format!("Step {} ({:?}) failed", index + 1, step))?;
            tokio::time::sleep(self.options.step_delay).await;
        }
        Ok(())
    }

    async fn step(&mut self, step: &Step) -> Result<()> {
        let handle = &self.handle;
        match step {
            Step::Incoming {
                session_id,
                from,
                video,
            } => {
                self.core.inject(
                    CallStateEvent::new(session_id.clone(), CoreCallState::IncomingReceived)
                        .with_remote_address(from.clone())
                        .with_remote_params(MediaParams::audio().with_video(*video)),
                );
            }
            Step::RemoteAnswer { session_id } => {
                self.core
                    .inject(CallStateEvent::new(session_id.clone(), CoreCallState::Connected));
                self.core.inject(
                    CallStateEvent::new(session_id.clone(), CoreCallState::StreamsRunning)
                        .with_current_params(MediaParams::audio()),
                );
            }
            Step::RemoteVideoOffer { session_id } => {
                self.core.inject(
                    CallStateEvent::new(session_id.clone(), CoreCallState::UpdatedByRemote)
                        .with_remote_params(MediaParams::video()),
                );
            }
            Step::RemotePause { session_id } => {
                self.core.inject(CallStateEvent::new(
                    session_id.clone(),
                    CoreCallState::PausedByRemote,
                ));
            }
            Step::RemoteHangUp { session_id, reason } => {
                self.core.inject(
                    CallStateEvent::new(session_id.clone(), CoreCallState::End)
                        .with_reason(reason.unwrap_or(Reason::Normal)),
                );
                self.core
                    .inject(CallStateEvent::new(session_id.clone(), CoreCallState::Released));
            }
            Step::CoreEvent { event } => self.core.inject(event.clone()),
            Step::Device { event } => handle.device_changed(event.clone()).await?,

            Step::PlaceCall { address } => {
                let result = handle.place_call(address.as_str()).await;
                self.record("place_call", result);
            }
            Step::AcceptCall { session_id } => {
                let result = handle.accept_call(session_id).await;
                self.record("accept_call", result);
            }
            Step::DeclineCall { session_id, reason } => {
                let result = handle
                    .decline_call(session_id, reason.unwrap_or(Reason::Declined))
                    .await;
                self.record("decline_call", result);
            }
            Step::PauseOrResume { session_id } => {
                let result = handle.pause_or_resume(session_id).await;
                self.record("pause_or_resume", result);
            }
            Step::HangUp { session_id, all } => {
                let target = match (session_id, all) {
                    (_, true) => HangUpTarget::All,
                    (Some(session_id), false) => HangUpTarget::Session(session_id.clone()),
                    (None, false) => HangUpTarget::Current,
                };
                let result = handle.hang_up(target).await;
                self.record("hang_up", result);
            }
            Step::AddVideo { session_id } => {
                let result = handle.add_video(session_id).await;
                self.record("add_video", result);
            }
            Step::RemoveVideo { session_id } => {
                let result = handle.remove_video(session_id).await;
                self.record("remove_video", result);
            }
            Step::AnswerCallUpdate { accept } => {
                let result = handle.accept_call_update(*accept).await;
                self.record("answer_call_update", result);
            }
            Step::ToggleMicro => {
                let result = handle.toggle_micro().await;
                self.record("toggle_micro", result);
            }
            Step::ToggleSpeaker => {
                let result = handle.toggle_speaker().await;
                self.record("toggle_speaker", result);
            }
            Step::SelectRoute { route } => {
                let result = handle.select_audio_route(*route).await;
                self.record("select_route", result);
            }
            Step::AdjustVolume { delta } => {
                let result = handle.adjust_volume(*delta).await;
                self.record("adjust_volume", result);
            }
            Step::EnterConference => {
                let result = handle.enter_conference().await;
                self.record("enter_conference", result);
            }
            Step::LeaveConference => {
                let result = handle.leave_conference().await;
                self.record("leave_conference", result);
            }
            Step::RemoveFromConference { session_id } => {
                let result = handle.remove_from_conference(session_id).await;
                self.record("remove_from_conference", result);
            }
            Step::ToggleRecording => {
                let result = handle.toggle_recording().await;
                self.record("toggle_recording", result);
            }
            Step::VerifyToken {
                session_id,
                verified,
            } => {
                let result = handle
                    .set_authentication_token_verified(session_id, *verified)
                    .await;
                self.record("verify_token", result);
            }
            Step::RestrictBandwidth { limited } => {
                let result = handle.set_bandwidth_restriction(*limited).await;
                self.record("restrict_bandwidth", result);
            }
            Step::SwitchCamera => {
                let result = handle.switch_camera().await;
                self.record("switch_camera", result);
            }
            Step::SendDtmf { digits } => {
                for digit in digits.chars() {
                    let result = self.handle.send_dtmf(digit).await;
                    self.record("send_dtmf", result);
                }
            }

            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
            Step::Snapshot => {
                if self.options.print {
                    println!("{}", serde_json::to_string_pretty(&handle.snapshot())?);
                }
            }
            Step::Expect(expectation) => {
                expectation.check(&handle.snapshot(), self.last_rejected)?
            }
        }
        Ok(())
    }

    /// Refused actions are part of a scenario, not a failure of the run
    fn record<T: Debug>(&mut self, action: &str, result: CallControlResult<T>) {
        self.last_rejected = result.is_err();
        match result {
            Ok(value) => info!(action, result = ?value, "Action applied"),
            Err(e) => {
                self.rejected += 1;
                warn!(action, error = %e, "Action rejected");
            }
        }
    }
}
