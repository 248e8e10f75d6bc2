// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use triage_adapters::rtr::fake::{ok, FakeCloudClient};
use triage_adapters::CommandStatus;

fn manager(fake: &FakeCloudClient) -> SessionManager<FakeCloudClient> {
    SessionManager::new(fake.clone(), &Timeouts::default())
}

#[tokio::test]
async fn start_execute_end_round_trip() {
    let fake = FakeCloudClient::new();
    fake.on_command("pwd", vec![ok("/opt/0x4n6nerd")]);
    let sessions = manager(&fake);

    let mut session = sessions.start("aid-1").await.unwrap();
    let result = sessions
        .execute(&mut session, "runscript", "pwd", true)
        .await
        .unwrap();
    assert_eq!(result.stdout_trimmed(), "/opt/0x4n6nerd");
    assert_eq!(result.return_code, 0);

    sessions.end(session).await.unwrap();
    assert!(fake.open_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn incomplete_command_times_out() {
    let fake = FakeCloudClient::new();
    fake.on_command(
        "slow",
        vec![CommandStatus {
            complete: false,
            stdout: String::new(),
            stderr: String::new(),
        }],
    );
    let sessions = manager(&fake);
    let mut session = sessions.start("aid-1").await.unwrap();

    let err = sessions
        .execute(&mut session, "runscript", "slow", true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CommandTimeout { .. }));
}

#[tokio::test]
async fn expect_clean_maps_stderr_to_remote_error() {
    let fake = FakeCloudClient::new();
    fake.on_command(
        "mkdir",
        vec![CommandStatus {
            complete: true,
            stdout: String::new(),
            stderr: "permission denied".to_string(),
        }],
    );
    let sessions = manager(&fake);
    let mut session = sessions.start("aid-1").await.unwrap();

    let err = sessions
        .execute_expect_clean(&mut session, "mkdir", "mkdir temp", true)
        .await
        .unwrap_err();
    match err {
        EngineError::RemoteError { stderr } => assert_eq!(stderr, "permission denied"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn failed_pulse_is_session_lost() {
    let fake = FakeCloudClient::new();
    fake.fail_next_pulses(1);
    let sessions = manager(&fake);
    let mut session = sessions.start("aid-1").await.unwrap();

    let err = sessions.pulse(&mut session).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionLost(_)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_against_one_agent_serialize() {
    let fake = FakeCloudClient::new();
    let gate = AgentGate::default();
    let sessions = manager(&fake).with_gate(gate.clone());
    let competing = manager(&fake).with_gate(gate);

    let first = sessions.start("aid-1").await.unwrap();
    let second = tokio::spawn(async move { competing.start("aid-1").await });

    // The second open stays parked while the first session lives.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!second.is_finished(), "second session opened while first was live");

    sessions.end(first).await.unwrap();
    let session = second.await.unwrap().unwrap();
    assert_eq!(session.device_id, "aid-1");
}

#[tokio::test(start_paused = true)]
async fn pulse_tracker_fires_on_cadence_only() {
    let fake = FakeCloudClient::new();
    let sessions = manager(&fake);
    let mut session = sessions.start("aid-1").await.unwrap();
    let mut tracker = PulseTracker::new();

    tracker.tick(&sessions, &mut session).await.unwrap();
    let pulses_before = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, triage_adapters::RtrCall::PulseSession(_)))
        .count();
    assert_eq!(pulses_before, 0);

    tokio::time::sleep(Duration::from_secs(301)).await;
    tracker.tick(&sessions, &mut session).await.unwrap();
    let pulses_after = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, triage_adapters::RtrCall::PulseSession(_)))
        .count();
    assert_eq!(pulses_after, 1);
}
