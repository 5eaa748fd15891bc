//! Video add/remove and remote call update negotiation

use rvoip_call_control::bandwidth::{BandwidthProfile, LOW_BANDWIDTH_AUDIO_KBPS};
use rvoip_call_control::coordinator::DeviceEvent;
use rvoip_call_control::error::CallControlError;
use rvoip_call_control::events::{NotificationKind, Permission, UiEvent};
use rvoip_call_control::negotiator::DenyReason;
use rvoip_call_control::session::{CallState, CoreCallState};
use rvoip_call_control::telephony::{CallStateEvent, STATIC_PICTURE_DEVICE};
use rvoip_call_control::types::{MediaParams, SessionId};
use rvoip_call_control_test_utils::fixtures::{self, BOB, test_config};
use rvoip_call_control_test_utils::{CoreCommand, MockCore, TestHarness};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn answered_video(harness: &TestHarness) -> Vec<bool> {
    harness
        .core
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            CoreCommand::AcceptUpdate { params, .. } => Some(params.video_enabled),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn add_video_is_refused_on_low_bandwidth() {
    let mut harness = TestHarness::new(
        test_config().with_bandwidth_profile(BandwidthProfile::LowBandwidth),
    );
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    let err = assert_err!(harness.add_video(&id).await);
    assert!(matches!(err, CallControlError::VideoNotPossible { .. }));

    assert_eq!(harness.core.count("update"), 0);
    let call = harness.snapshot().call(&id).cloned().unwrap();
    assert_eq!(call.state, CallState::StreamsRunning);
    assert!(!call.video_enabled);
}

#[tokio::test]
async fn bandwidth_restriction_can_be_set_at_runtime() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;

    assert_ok!(harness.set_bandwidth_restriction(true).await);
    assert_err!(harness.add_video(&id).await);

    assert_ok!(harness.set_bandwidth_restriction(false).await);
    assert_ok!(harness.add_video(&id).await);
}

#[tokio::test]
async fn add_video_sends_update_with_video() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    assert_ok!(harness.add_video(&id).await);
    assert_eq!(
        harness.core.command_names(),
        vec!["enable_video_capture", "update"]
    );
    match harness.core.last("update") {
        Some(CoreCommand::Update { params, .. }) => assert!(params.video_enabled),
        other => panic!("unexpected update: {other:?}"),
    }
    assert!(harness.snapshot().video_enabled);

    // Already on: nothing more to do
    assert_ok!(harness.add_video(&id).await);
    assert_eq!(harness.core.count("update"), 1);

    assert_ok!(harness.remove_video(&id).await);
    assert_eq!(harness.core.count("update"), 2);
    assert!(!harness.snapshot().video_enabled);
}

#[tokio::test]
async fn add_video_requires_a_running_call() {
    let mut harness = TestHarness::default_config();
    harness.report(fixtures::incoming("call-1", BOB)).await;

    let err = assert_err!(harness.add_video(&SessionId::from("call-1")).await);
    assert!(matches!(err, CallControlError::InvalidState { .. }));
}

#[tokio::test]
async fn add_video_refused_when_remote_is_on_low_bandwidth() {
    let mut harness = TestHarness::default_config();
    harness
        .report(
            fixtures::incoming("call-1", BOB)
                .with_remote_params(MediaParams::audio().with_low_bandwidth(true)),
        )
        .await;
    let id = SessionId::from("call-1");
    assert_ok!(harness.accept_call(&id).await);
    harness.report_state("call-1", CoreCallState::Connected).await;
    harness
        .report_state("call-1", CoreCallState::StreamsRunning)
        .await;

    let err = assert_err!(harness.add_video(&id).await);
    assert!(matches!(err, CallControlError::VideoNotPossible { .. }));
}

#[tokio::test(start_paused = true)]
async fn unanswered_offer_is_denied_when_the_deadline_passes() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.drain_ui_events();
    harness.core.clear();

    harness.report(fixtures::video_offer("call-1")).await;
    let prompt = harness.snapshot().pending_update_prompt.unwrap();
    assert_eq!(prompt.session_id, id);
    assert!(matches!(
        harness.drain_ui_events().as_slice(),
        [UiEvent::CallUpdatePrompt { session_id, .. }] if *session_id == id
    ));

    assert_eq!(harness.run_timers_for(Duration::from_millis(29_999)).await, 0);
    assert!(answered_video(&harness).is_empty());

    assert_eq!(harness.run_timers_for(Duration::from_millis(2)).await, 1);
    assert_eq!(answered_video(&harness), vec![false]);
    assert_eq!(harness.snapshot().pending_update_prompt, None);
    assert!(harness.drain_ui_events().iter().any(|event| matches!(
        event,
        UiEvent::Notification(n) if n.kind == NotificationKind::CallUpdateExpired
    )));

    harness
        .report(
            CallStateEvent::new("call-1", CoreCallState::StreamsRunning)
                .with_current_params(MediaParams::audio()),
        )
        .await;
    let call = harness.snapshot().call(&id).cloned().unwrap();
    assert_eq!(call.state, CallState::StreamsRunning);
    assert!(!call.video_enabled);

    // The deadline fires exactly once
    assert_eq!(harness.run_timers_for(Duration::from_secs(60)).await, 0);
    assert_eq!(answered_video(&harness), vec![false]);
}

#[tokio::test(start_paused = true)]
async fn answering_before_the_deadline_cancels_it() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    harness.report(fixtures::video_offer("call-1")).await;
    assert_eq!(harness.run_timers_for(Duration::from_secs(10)).await, 0);

    assert_ok!(harness.resolve_call_update(None, true).await);
    assert_eq!(
        harness.core.command_names(),
        vec!["enable_video_capture", "enable_video_display", "accept_update"]
    );
    assert_eq!(answered_video(&harness), vec![true]);
    assert!(harness.snapshot().video_enabled);
    assert_eq!(harness.snapshot().pending_update_prompt, None);

    // Neither the old deadline nor a second answer has any effect
    assert_eq!(harness.run_timers_for(Duration::from_secs(60)).await, 0);
    assert_ok!(harness.resolve_call_update(Some(&id), false).await);
    assert_eq!(answered_video(&harness), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn declining_the_prompt_answers_without_video() {
    let mut harness = TestHarness::default_config();
    harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    harness.report(fixtures::video_offer("call-1")).await;
    assert_ok!(harness.resolve_call_update(None, false).await);

    assert_eq!(harness.core.command_names(), vec!["accept_update"]);
    assert_eq!(answered_video(&harness), vec![false]);
    assert_eq!(harness.run_timers_for(Duration::from_secs(60)).await, 0);
}

#[tokio::test]
async fn second_offer_while_prompt_open_keeps_one_prompt() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;

    harness.report(fixtures::video_offer("call-1")).await;
    let first = harness.coordinator.negotiator().pending(&id).unwrap().token;
    harness.report(fixtures::video_offer("call-1")).await;

    assert_eq!(harness.coordinator.negotiator().iter().count(), 1);
    assert_eq!(harness.coordinator.negotiator().pending(&id).unwrap().token, first);
}

#[tokio::test]
async fn offer_is_auto_accepted_when_configured() {
    let mut harness = TestHarness::new(test_config().with_auto_accept_video(true));
    harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    harness.report(fixtures::video_offer("call-1")).await;

    assert_eq!(answered_video(&harness), vec![true]);
    assert_eq!(harness.snapshot().pending_update_prompt, None);
    assert!(harness.core.commands().contains(&CoreCommand::EnableVideoDisplay(true)));
}

#[tokio::test]
async fn offer_is_denied_without_prompt_when_policy_forbids_video() {
    let cases = [
        (test_config().with_video(false), MediaParams::video(), DenyReason::VideoDisabled),
        (
            test_config().with_bandwidth_profile(BandwidthProfile::LowBandwidth),
            MediaParams::video(),
            DenyReason::VideoNotPossible,
        ),
        (
            test_config(),
            MediaParams::video().with_low_bandwidth(true),
            DenyReason::RemoteLowBandwidth,
        ),
    ];

    for (config, offer, reason) in cases {
        let mut harness = TestHarness::new(config);
        harness.establish_incoming("call-1", BOB).await;
        harness.drain_ui_events();
        harness.core.clear();

        harness
            .report(
                CallStateEvent::new("call-1", CoreCallState::UpdatedByRemote)
                    .with_remote_params(offer),
            )
            .await;

        assert_eq!(answered_video(&harness), vec![false], "{reason:?}");
        assert_eq!(harness.snapshot().pending_update_prompt, None);
        let events = harness.drain_ui_events();
        assert!(
            events.iter().any(|event| matches!(
                event,
                UiEvent::Notification(n) if n.kind == NotificationKind::CallUpdateDenied(reason)
            )),
            "{reason:?}"
        );
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, UiEvent::CallUpdatePrompt { .. }))
        );
    }
}

#[tokio::test]
async fn low_bandwidth_answer_caps_audio() {
    let mut harness = TestHarness::new(
        test_config().with_bandwidth_profile(BandwidthProfile::LowBandwidth),
    );
    harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    harness.report(fixtures::video_offer("call-1")).await;

    match harness.core.last("accept_update") {
        Some(CoreCommand::AcceptUpdate { params, .. }) => {
            assert!(!params.video_enabled);
            assert_eq!(params.audio_bandwidth_kbps, Some(LOW_BANDWIDTH_AUDIO_KBPS));
        }
        other => panic!("unexpected answer: {other:?}"),
    }
}

#[tokio::test]
async fn offer_without_new_video_is_answered_directly() {
    let mut harness = TestHarness::default_config();
    harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    harness
        .report(
            CallStateEvent::new("call-1", CoreCallState::UpdatedByRemote)
                .with_remote_params(MediaParams::audio()),
        )
        .await;

    assert_eq!(harness.core.command_names(), vec!["accept_update"]);
    assert_eq!(harness.snapshot().pending_update_prompt, None);
}

#[tokio::test(start_paused = true)]
async fn accepting_video_waits_for_camera_permission() {
    let mut harness = TestHarness::new(test_config().with_permissions([Permission::Microphone]));
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();
    harness.report(fixtures::video_offer("call-1")).await;
    harness.drain_ui_events();

    let err = assert_err!(harness.resolve_call_update(None, true).await);
    assert!(matches!(
        err,
        CallControlError::PermissionRequired {
            permission: Permission::Camera
        }
    ));
    assert_eq!(
        harness.drain_ui_events(),
        vec![UiEvent::PermissionRequired {
            permission: Permission::Camera,
            session_id: Some(id.clone()),
        }]
    );
    assert!(answered_video(&harness).is_empty());
    assert!(harness.snapshot().pending_update_prompt.is_some());

    harness
        .device(DeviceEvent::PermissionChanged {
            permission: Permission::Camera,
            granted: true,
        })
        .await;
    assert_eq!(answered_video(&harness), vec![true]);
    assert_eq!(harness.snapshot().pending_update_prompt, None);
    assert_eq!(harness.run_timers_for(Duration::from_secs(60)).await, 0);
}

#[tokio::test]
async fn video_call_waits_for_camera_permission() {
    let mut harness = TestHarness::new(
        test_config()
            .with_initiate_video(true)
            .with_permissions([Permission::Microphone]),
    );

    let err = assert_err!(harness.place_call(BOB).await);
    assert!(matches!(err, CallControlError::PermissionRequired { .. }));
    assert_eq!(harness.core.count("invite"), 0);
    assert!(harness.snapshot().calls.is_empty());

    harness
        .device(DeviceEvent::PermissionChanged {
            permission: Permission::Camera,
            granted: true,
        })
        .await;
    match harness.core.last("invite") {
        Some(CoreCommand::Invite { address, params }) => {
            assert_eq!(address, BOB);
            assert!(params.video_enabled);
        }
        other => panic!("unexpected invite: {other:?}"),
    }
    assert_eq!(harness.snapshot().calls.len(), 1);
}

#[tokio::test]
async fn denied_camera_cancels_deferred_video_call() {
    let mut harness = TestHarness::new(
        test_config()
            .with_initiate_video(true)
            .with_permissions([Permission::Microphone]),
    );
    assert_err!(harness.place_call(BOB).await);
    harness.drain_ui_events();

    harness
        .device(DeviceEvent::PermissionChanged {
            permission: Permission::Camera,
            granted: false,
        })
        .await;
    assert_eq!(harness.core.count("invite"), 0);
    let kinds: Vec<NotificationKind> = harness
        .drain_ui_events()
        .into_iter()
        .filter_map(|event| match event {
            UiEvent::Notification(notification) => Some(notification.kind),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec![NotificationKind::PermissionDenied(Permission::Camera)]);

    // A later grant must not revive the abandoned call
    harness
        .device(DeviceEvent::PermissionChanged {
            permission: Permission::Camera,
            granted: true,
        })
        .await;
    assert_eq!(harness.core.count("invite"), 0);
    assert!(harness.snapshot().calls.is_empty());
}

#[tokio::test]
async fn core_settling_the_update_closes_the_prompt() {
    let mut harness = TestHarness::default_config();
    harness.establish_incoming("call-1", BOB).await;

    harness.report(fixtures::video_offer("call-1")).await;
    assert!(harness.snapshot().pending_update_prompt.is_some());

    harness
        .report_state("call-1", CoreCallState::StreamsRunning)
        .await;
    assert_eq!(harness.snapshot().pending_update_prompt, None);
}

fn two_cameras() -> Arc<MockCore> {
    Arc::new(MockCore::new().with_video_devices(
        &["front", STATIC_PICTURE_DEVICE, "back"],
        Some("front"),
    ))
}

#[tokio::test]
async fn switching_camera_refreshes_the_video_call() {
    let core = two_cameras();
    let mut harness = TestHarness::with_core(test_config(), core.clone());
    let id = harness.establish_incoming("call-1", BOB).await;
    harness
        .report(
            fixtures::state("call-1", CoreCallState::StreamsRunning)
                .with_current_params(MediaParams::video()),
        )
        .await;
    harness.core.clear();

    assert_eq!(assert_ok!(harness.switch_camera().await), "back");
    assert_eq!(core.video_device().as_deref(), Some("back"));
    match harness.core.last("update") {
        Some(CoreCommand::Update { session_id, params }) => {
            assert_eq!(session_id, id);
            assert!(params.video_enabled);
        }
        other => panic!("unexpected update: {other:?}"),
    }

    assert_eq!(assert_ok!(harness.switch_camera().await), "front");
}

#[tokio::test]
async fn switching_camera_outside_a_video_call_only_selects_the_device() {
    let mut harness = TestHarness::with_core(test_config(), two_cameras());
    harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    assert_ok!(harness.switch_camera().await);
    assert_eq!(
        harness.core.command_names(),
        vec!["video_devices", "set_video_device"]
    );
}

#[tokio::test]
async fn switching_without_a_second_camera_is_refused() {
    let core = Arc::new(MockCore::new().with_video_devices(&["front"], Some("front")));
    let mut harness = TestHarness::with_core(test_config(), core);

    let err = assert_err!(harness.switch_camera().await);
    assert!(matches!(err, CallControlError::VideoNotPossible { .. }));
    assert_eq!(harness.core.count("set_video_device"), 0);
}
