//! Call lifecycle, hold, hang-up and failure handling through the coordinator

use rvoip_call_control::audio::RouteCommand;
use rvoip_call_control::coordinator::{DeviceEvent, HangUpTarget};
use rvoip_call_control::error::CallControlError;
use rvoip_call_control::events::{NotificationKind, Permission, UiEvent};
use rvoip_call_control::session::{CallState, CoreCallState};
use rvoip_call_control::telephony::{
    CallStateEvent, CoreEvent, EncryptionEvent, RegistrationEvent, RegistrationState,
};
use rvoip_call_control::types::{FailureCategory, MediaEncryption, Reason, SessionId};
use rvoip_call_control_test_utils::fixtures::{self, ALICE, BOB, CAROL, test_config};
use rvoip_call_control_test_utils::{CoreCommand, TestHarness};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn failures(events: &[UiEvent]) -> Vec<FailureCategory> {
    events
        .iter()
        .filter_map(|event| match event {
            UiEvent::Notification(notification) => match notification.kind {
                NotificationKind::CallFailed(category) => Some(category),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn incoming_call_lifecycle_is_projected() {
    let mut harness = TestHarness::default_config();
    harness.report(fixtures::incoming("call-1", BOB)).await;

    let snapshot = harness.snapshot();
    assert_eq!(snapshot.current_session_id, Some(SessionId::from("call-1")));
    let call = snapshot.call(&SessionId::from("call-1")).unwrap();
    assert_eq!(call.state, CallState::IncomingReceived);
    assert_eq!(call.remote_address, BOB);

    let id = SessionId::from("call-1");
    assert_ok!(harness.accept_call(&id).await);
    harness.report_state("call-1", CoreCallState::Connected).await;
    harness
        .report_state("call-1", CoreCallState::StreamsRunning)
        .await;
    assert_eq!(
        harness.snapshot().call(&id).unwrap().state,
        CallState::StreamsRunning
    );

    harness.report(fixtures::ended("call-1", Reason::Normal)).await;
    let snapshot = harness.snapshot();
    assert!(snapshot.calls.is_empty());
    assert_eq!(snapshot.current_session_id, None);
    assert!(failures(&harness.drain_ui_events()).is_empty());
}

#[tokio::test]
async fn outgoing_call_is_tracked_before_the_core_reports_it() {
    let mut harness = TestHarness::default_config();
    let id = assert_ok!(harness.place_call(ALICE).await);

    assert_eq!(id, SessionId::from("call-1"));
    let snapshot = harness.snapshot();
    assert_eq!(snapshot.current_session_id, Some(id.clone()));
    assert_eq!(snapshot.call(&id).unwrap().state, CallState::OutgoingInit);

    // The core confirming the call is not a transition
    harness.report_state("call-1", CoreCallState::OutgoingInit).await;
    harness
        .report_state("call-1", CoreCallState::OutgoingRinging)
        .await;
    assert_eq!(
        harness.snapshot().call(&id).unwrap().state,
        CallState::OutgoingRinging
    );
}

#[tokio::test]
async fn outgoing_params_follow_video_settings() {
    let mut harness = TestHarness::new(test_config().with_initiate_video(true));
    assert_ok!(harness.place_call(ALICE).await);
    match harness.core.last("invite") {
        Some(CoreCommand::Invite { address, params }) => {
            assert_eq!(address, ALICE);
            assert!(params.video_enabled);
            assert_eq!(params.audio_bandwidth_kbps, None);
        }
        other => panic!("unexpected invite: {other:?}"),
    }

    let mut harness = TestHarness::default_config();
    assert_ok!(harness.place_call(ALICE).await);
    match harness.core.last("invite") {
        Some(CoreCommand::Invite { params, .. }) => assert!(!params.video_enabled),
        other => panic!("unexpected invite: {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_transition_is_ignored() {
    let mut harness = TestHarness::default_config();
    harness.report(fixtures::incoming("call-1", BOB)).await;

    harness.report_state("call-1", CoreCallState::Paused).await;
    harness
        .report_state("call-1", CoreCallState::StreamsRunning)
        .await;

    let id = SessionId::from("call-1");
    assert_eq!(
        harness.snapshot().call(&id).unwrap().state,
        CallState::IncomingReceived
    );
}

#[tokio::test]
async fn events_for_unknown_calls_are_dropped() {
    let mut harness = TestHarness::default_config();
    harness
        .report_state("ghost", CoreCallState::StreamsRunning)
        .await;
    harness.report(fixtures::ended("ghost", Reason::Busy)).await;

    assert!(harness.snapshot().calls.is_empty());
    assert!(harness.drain_ui_events().is_empty());
}

#[tokio::test]
async fn termination_reasons_map_to_notifications() {
    let cases = [
        (Reason::from_status(603), FailureCategory::Declined, "Call declined"),
        (Reason::from_status(486), FailureCategory::Busy, "User busy"),
        (Reason::from_status(404), FailureCategory::NotFound, "User not found"),
        (
            Reason::from_status(488),
            FailureCategory::IncompatibleMedia,
            "Incompatible media parameters",
        ),
        (Reason::from_status(500), FailureCategory::Generic, "Call failed"),
    ];

    for (reason, category, message) in cases {
        let mut harness = TestHarness::default_config();
        let id = assert_ok!(harness.place_call(ALICE).await);
        harness.drain_ui_events();

        harness.report(fixtures::ended(id.as_str(), reason)).await;

        let events = harness.drain_ui_events();
        assert_eq!(failures(&events), vec![category], "{reason:?}");
        let Some(UiEvent::Notification(notification)) = events.first() else {
            panic!("expected a notification for {reason:?}");
        };
        assert_eq!(notification.message, message);
        assert_eq!(notification.session_id, Some(id));
        assert!(harness.snapshot().calls.is_empty());
    }
}

#[tokio::test]
async fn core_error_without_reason_is_generic_failure() {
    let mut harness = TestHarness::default_config();
    let id = assert_ok!(harness.place_call(ALICE).await);
    harness.drain_ui_events();

    harness.report_state(id.as_str(), CoreCallState::Error).await;

    assert_eq!(
        failures(&harness.drain_ui_events()),
        vec![FailureCategory::Generic]
    );
    assert!(harness.coordinator.session(&id).is_none());
}

#[tokio::test]
async fn second_pause_before_acknowledgement_is_busy() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    assert_ok!(harness.pause_or_resume(&id).await);
    let err = assert_err!(harness.pause_or_resume(&id).await);
    assert!(matches!(err, CallControlError::Busy { .. }));
    assert_eq!(harness.core.command_names(), vec!["pause"]);

    harness.report_state("call-1", CoreCallState::Pausing).await;
    assert_err!(harness.pause_or_resume(&id).await);
    harness.report_state("call-1", CoreCallState::Paused).await;

    assert_ok!(harness.pause_or_resume(&id).await);
    assert_eq!(
        harness.core.last("resume"),
        Some(CoreCommand::Resume(id.clone()))
    );
}

#[tokio::test]
async fn repeated_running_report_does_not_settle_a_pause() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    assert_ok!(harness.pause_or_resume(&id).await);
    harness
        .report_state("call-1", CoreCallState::StreamsRunning)
        .await;

    let err = assert_err!(harness.pause_or_resume(&id).await);
    assert!(matches!(err, CallControlError::Busy { .. }));
    assert_eq!(harness.core.command_names(), vec!["pause"]);
}

#[tokio::test]
async fn pause_outside_running_or_paused_is_rejected() {
    let mut harness = TestHarness::default_config();
    harness.report(fixtures::incoming("call-1", BOB)).await;
    harness.core.clear();

    let err = assert_err!(harness.pause_or_resume(&SessionId::from("call-1")).await);
    assert!(matches!(
        err,
        CallControlError::InvalidState {
            state: CallState::IncomingReceived,
            ..
        }
    ));

    let err = assert_err!(harness.pause_or_resume(&SessionId::from("nope")).await);
    assert!(matches!(err, CallControlError::SessionNotFound { .. }));
    assert!(harness.core.commands().is_empty());
}

#[tokio::test]
async fn recording_stops_before_terminate() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;

    assert!(assert_ok!(harness.toggle_recording().await));
    assert!(harness.snapshot().is_recording);
    harness.core.clear();

    assert_ok!(harness.hang_up(HangUpTarget::Current).await);
    assert_eq!(
        harness.core.commands(),
        vec![
            CoreCommand::StopRecording(id.clone()),
            CoreCommand::Terminate(id),
        ]
    );
    assert!(!harness.snapshot().is_recording);
}

#[tokio::test]
async fn recording_requires_an_answered_call() {
    let mut harness = TestHarness::default_config();
    let err = assert_err!(harness.toggle_recording().await);
    assert!(matches!(err, CallControlError::NoCurrentCall));

    harness.report(fixtures::incoming("call-1", BOB)).await;
    let err = assert_err!(harness.toggle_recording().await);
    assert!(matches!(err, CallControlError::InvalidState { .. }));
}

#[tokio::test]
async fn hang_up_all_terminates_every_call() {
    let mut harness = TestHarness::default_config();
    let first = harness.establish_incoming("call-1", BOB).await;
    let second = harness.establish_incoming("call-2", CAROL).await;
    harness.core.clear();

    assert_ok!(harness.hang_up(HangUpTarget::All).await);
    assert_eq!(
        harness.core.commands(),
        vec![CoreCommand::Terminate(first), CoreCommand::Terminate(second)]
    );

    let err = assert_err!(TestHarness::default_config().hang_up(HangUpTarget::Current).await);
    assert!(matches!(err, CallControlError::NoCurrentCall));
}

#[tokio::test]
async fn rejected_terminate_is_reported() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.fail("terminate");

    let err = assert_err!(harness.hang_up(HangUpTarget::Session(id.clone())).await);
    assert!(matches!(
        err,
        CallControlError::Core {
            command: "terminate",
            ..
        }
    ));
    assert!(harness.coordinator.session(&id).is_some());
}

#[tokio::test]
async fn most_recently_activated_call_is_current() {
    let mut harness = TestHarness::default_config();
    let first = harness.establish_incoming("call-1", BOB).await;
    let second = harness.establish_incoming("call-2", CAROL).await;
    assert_eq!(harness.current(), Some(second.clone()));

    harness.report(fixtures::ended("call-2", Reason::Normal)).await;
    assert_eq!(harness.current(), Some(first));
}

#[tokio::test]
async fn ringing_call_does_not_steal_foreground_from_running_call() {
    let mut harness = TestHarness::default_config();
    let first = harness.establish_incoming("call-1", BOB).await;
    harness.report(fixtures::incoming("call-2", CAROL)).await;
    assert_eq!(harness.current(), Some(first.clone()));

    // Putting the running call on hold hands the foreground to the ringing one
    assert_ok!(harness.pause_or_resume(&first).await);
    harness.report_state("call-1", CoreCallState::Pausing).await;
    assert_eq!(harness.current(), Some(SessionId::from("call-2")));

    // Resuming makes the first call the most recent activation again
    harness.report_state("call-1", CoreCallState::Paused).await;
    let second = SessionId::from("call-2");
    assert_ok!(harness.accept_call(&second).await);
    harness.report_state("call-2", CoreCallState::Connected).await;
    assert_eq!(harness.current(), Some(second));

    assert_ok!(harness.pause_or_resume(&first).await);
    harness.report_state("call-1", CoreCallState::Resuming).await;
    assert_eq!(harness.current(), Some(first));
}

#[tokio::test]
async fn incoming_call_is_declined_busy_during_external_call() {
    let mut harness = TestHarness::default_config();
    let running = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    harness
        .device(DeviceEvent::ExternalCall { active: true })
        .await;
    assert_eq!(
        harness.core.commands(),
        vec![CoreCommand::Pause(running.clone())]
    );

    harness.report(fixtures::incoming("call-2", CAROL)).await;
    assert_eq!(
        harness.core.last("decline"),
        Some(CoreCommand::Decline {
            session_id: SessionId::from("call-2"),
            reason: Reason::Busy,
        })
    );
    assert_eq!(harness.current(), Some(running));
}

#[tokio::test]
async fn busy_declined_call_neither_rings_nor_becomes_current() {
    let mut harness = TestHarness::default_config();
    harness
        .device(DeviceEvent::ExternalCall { active: true })
        .await;

    harness.report(fixtures::incoming("call-1", BOB)).await;
    assert_eq!(
        harness.core.last("decline"),
        Some(CoreCommand::Decline {
            session_id: SessionId::from("call-1"),
            reason: Reason::Busy,
        })
    );
    assert!(harness.drain_routes().is_empty());
    assert_eq!(harness.current(), None);
    assert!(harness.snapshot().calls.is_empty());

    let err = assert_err!(harness.accept_call(&SessionId::from("call-1")).await);
    assert!(matches!(err, CallControlError::InvalidState { .. }));
    assert_eq!(harness.core.count("accept_with_params"), 0);

    harness.report(fixtures::ended("call-1", Reason::Busy)).await;
    let routes = harness.drain_routes();
    assert!(
        !routes
            .iter()
            .any(|command| matches!(command, RouteCommand::Ringing(true)))
    );
    assert!(harness.coordinator.session(&SessionId::from("call-1")).is_none());
}

#[tokio::test]
async fn call_limit_applies_to_both_directions() {
    let mut harness = TestHarness::new(test_config().with_max_calls(1));
    harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    let err = assert_err!(harness.place_call(ALICE).await);
    assert!(matches!(err, CallControlError::TooManyCalls { max: 1 }));
    assert_eq!(harness.core.count("invite"), 0);

    harness.report(fixtures::incoming("call-2", CAROL)).await;
    assert_eq!(
        harness.core.last("decline"),
        Some(CoreCommand::Decline {
            session_id: SessionId::from("call-2"),
            reason: Reason::Busy,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn incoming_call_is_auto_answered_after_delay() {
    let mut harness =
        TestHarness::new(test_config().with_auto_answer(Some(Duration::from_secs(2))));
    harness.report(fixtures::incoming("call-1", BOB)).await;

    assert_eq!(harness.run_timers_for(Duration::from_secs(1)).await, 0);
    assert_eq!(harness.core.count("accept_with_params"), 0);

    assert_eq!(harness.run_timers_for(Duration::from_secs(2)).await, 1);
    assert_eq!(harness.core.count("accept_with_params"), 1);
}

#[tokio::test(start_paused = true)]
async fn declined_call_is_not_auto_answered() {
    let mut harness =
        TestHarness::new(test_config().with_auto_answer(Some(Duration::from_secs(2))));
    harness.report(fixtures::incoming("call-1", BOB)).await;
    assert_ok!(
        harness
            .decline_call(&SessionId::from("call-1"), Reason::Declined)
            .await
    );

    assert_eq!(harness.run_timers_for(Duration::from_secs(10)).await, 0);
    assert_eq!(harness.core.count("accept_with_params"), 0);
}

#[tokio::test]
async fn ring_tone_only_for_a_lone_incoming_call() {
    let mut harness = TestHarness::default_config();
    harness.report(fixtures::incoming("call-1", BOB)).await;
    assert!(harness.drain_routes().contains(&RouteCommand::Ringing(true)));

    assert_ok!(harness.accept_call(&SessionId::from("call-1")).await);
    harness.report_state("call-1", CoreCallState::Connected).await;
    assert!(harness.drain_routes().contains(&RouteCommand::Ringing(false)));

    harness.report(fixtures::incoming("call-2", CAROL)).await;
    assert!(
        !harness
            .drain_routes()
            .iter()
            .any(|command| matches!(command, RouteCommand::Ringing(_)))
    );
}

#[tokio::test]
async fn missing_microphone_permission_mutes_instead_of_blocking() {
    let mut harness = TestHarness::new(test_config().with_permissions([Permission::Camera]));
    let id = harness.establish_incoming("call-1", BOB).await;

    assert!(harness.snapshot().mic_muted);
    assert!(harness.core.commands().contains(&CoreCommand::EnableMic(false)));
    let events = harness.drain_ui_events();
    assert!(events.iter().any(|event| matches!(
        event,
        UiEvent::Notification(n) if n.kind == NotificationKind::MicrophoneMuted
    )));
    assert!(events.contains(&UiEvent::PermissionRequired {
        permission: Permission::Microphone,
        session_id: Some(id),
    }));

    let err = assert_err!(harness.toggle_micro().await);
    assert!(matches!(
        err,
        CallControlError::PermissionRequired {
            permission: Permission::Microphone
        }
    ));

    harness
        .device(DeviceEvent::PermissionChanged {
            permission: Permission::Microphone,
            granted: true,
        })
        .await;
    assert!(!assert_ok!(harness.toggle_micro().await));
    assert!(!harness.snapshot().mic_muted);
    assert_eq!(harness.core.last("enable_mic"), Some(CoreCommand::EnableMic(true)));
}

#[tokio::test]
async fn toggle_micro_flips_mute() {
    let mut harness = TestHarness::default_config();
    harness.establish_incoming("call-1", BOB).await;

    assert!(assert_ok!(harness.toggle_micro().await));
    assert!(harness.snapshot().mic_muted);
    assert!(!assert_ok!(harness.toggle_micro().await));
    assert!(!harness.snapshot().mic_muted);
}

#[tokio::test]
async fn zrtp_token_is_offered_for_verification() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.drain_ui_events();

    harness
        .core_event(CoreEvent::EncryptionChanged(EncryptionEvent {
            session_id: id.clone(),
            encryption: MediaEncryption::Zrtp,
            authentication_token: Some("a7f3".to_string()),
            token_verified: false,
        }))
        .await;
    assert_eq!(
        harness.drain_ui_events(),
        vec![UiEvent::VerifyAuthenticationToken {
            session_id: id.clone(),
            token: "a7f3".to_string(),
        }]
    );

    assert_ok!(harness.set_authentication_token_verified(&id, true).await);
    assert!(
        harness
            .snapshot()
            .call(&id)
            .unwrap()
            .authentication_token_verified
    );
}

#[tokio::test]
async fn registration_changes_are_forwarded() {
    let mut harness = TestHarness::default_config();
    harness
        .core_event(CoreEvent::Registration(RegistrationEvent {
            account_id: "alice".to_string(),
            state: RegistrationState::Failed,
            message: Some("403 Forbidden".to_string()),
        }))
        .await;

    assert_eq!(
        harness.drain_ui_events(),
        vec![UiEvent::RegistrationChanged {
            account_id: "alice".to_string(),
            state: RegistrationState::Failed,
            message: Some("403 Forbidden".to_string()),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn statistics_are_published_while_a_call_exists() {
    let mut harness =
        TestHarness::new(test_config().with_stats_interval(Some(Duration::from_secs(1))));
    assert_eq!(harness.run_timers_for(Duration::from_secs(3)).await, 0);

    let id = harness.establish_incoming("call-1", BOB).await;
    harness.drain_ui_events();
    assert_eq!(harness.run_timers_for(Duration::from_millis(2500)).await, 2);
    let stats: Vec<_> = harness
        .drain_ui_events()
        .into_iter()
        .filter_map(|event| match event {
            UiEvent::CallStats(stats) => Some(stats.session_id),
            _ => None,
        })
        .collect();
    assert_eq!(stats, vec![id.clone(), id]);

    harness.report(fixtures::ended("call-1", Reason::Normal)).await;
    assert_eq!(harness.run_timers_for(Duration::from_secs(3)).await, 0);
}

#[tokio::test]
async fn remote_address_is_filled_in_later() {
    let mut harness = TestHarness::default_config();
    harness
        .report(CallStateEvent::new("call-1", CoreCallState::IncomingReceived))
        .await;
    harness
        .report(
            CallStateEvent::new("call-1", CoreCallState::EarlyMedia).with_remote_address(BOB),
        )
        .await;

    assert_eq!(
        harness
            .snapshot()
            .call(&SessionId::from("call-1"))
            .unwrap()
            .remote_address,
        BOB
    );
}

#[tokio::test]
async fn dtmf_goes_to_the_current_call() {
    let mut harness = TestHarness::default_config();
    let id = harness.establish_incoming("call-1", BOB).await;
    harness.core.clear();

    assert_ok!(harness.send_dtmf('5').await);
    assert_ok!(harness.send_dtmf('a').await);
    assert_eq!(
        harness.core.commands(),
        vec![
            CoreCommand::SendDtmf {
                session_id: id.clone(),
                digit: '5',
            },
            CoreCommand::SendDtmf {
                session_id: id,
                digit: 'A',
            },
        ]
    );
}

#[tokio::test]
async fn dtmf_is_refused_without_a_running_call() {
    let mut harness = TestHarness::default_config();
    assert!(matches!(
        assert_err!(harness.send_dtmf('1').await),
        CallControlError::NoCurrentCall
    ));

    harness.report(fixtures::incoming("call-1", BOB)).await;
    assert!(matches!(
        assert_err!(harness.send_dtmf('1').await),
        CallControlError::InvalidState { .. }
    ));
    assert!(matches!(
        assert_err!(harness.send_dtmf('x').await),
        CallControlError::InvalidDtmf { digit: 'X' }
    ));
    assert_eq!(harness.core.count("send_dtmf"), 0);
}
