// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use triage_adapters::rtr::fake::{ok, FakeCloudClient};
use triage_adapters::RtrCall;
use triage_config::Timeouts;

fn engine(fake: &FakeCloudClient) -> CleanupEngine<FakeCloudClient> {
    CleanupEngine::new(SessionManager::new(fake.clone(), &Timeouts::default()))
}

fn unix_ws() -> WorkspacePaths {
    WorkspacePaths::with_defaults(Platform::Linux)
}

fn windows_ws() -> WorkspacePaths {
    WorkspacePaths::with_defaults(Platform::Windows)
}

/// Script a pristine Unix endpoint: no stale processes, no workspace,
/// creation succeeds, directory empty.
fn script_clean_unix(fake: &FakeCloudClient) {
    fake.on_command("ps aux", vec![ok("")]);
    fake.on_command("test -d", vec![ok("NOT_FOUND"), ok("EXISTS")]);
    fake.on_command("mkdir -p", vec![ok("")]);
    fake.on_command("wc -l", vec![ok("3")]);
}

#[tokio::test(start_paused = true)]
async fn clean_endpoint_passes_the_barrier() {
    let fake = FakeCloudClient::new();
    script_clean_unix(&fake);
    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();

    cleanup.ensure_clean(&mut session, &unix_ws()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stale_process_is_killed_before_workspace_work() {
    let fake = FakeCloudClient::new();
    // First sweep finds the collector; after the kill, sweeps are empty.
    fake.on_command(
        "ps aux",
        vec![
            ok("root      4321 95.0  1.2 1 2 ?  R    12:00  10:00 /opt/0x4n6nerd/uac-main/uac -p full"),
            ok(""),
        ],
    );
    fake.on_command("kill -9 4321", vec![ok("")]);
    fake.on_command("test -d", vec![ok("NOT_FOUND"), ok("EXISTS")]);
    fake.on_command("mkdir -p", vec![ok("")]);
    fake.on_command("wc -l", vec![ok("3")]);

    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    cleanup.ensure_clean(&mut session, &unix_ws()).await.unwrap();

    let killed = fake.calls().iter().any(|c| {
        matches!(c, RtrCall::AdminCommand { cmdline, .. } if cmdline.contains("kill -9 4321"))
    });
    assert!(killed);
}

#[tokio::test(start_paused = true)]
async fn orchestrator_commands_are_exempt_from_the_sweep() {
    let fake = FakeCloudClient::new();
    // The only match is our own sweep command; nothing should be killed.
    fake.on_command(
        "ps aux",
        vec![ok(
            "root      9999  0.0  0.0 1 2 ?  S    12:00   0:00 bash -c ps aux | grep -E 'curl .*amazonaws.*uac-'",
        )],
    );
    fake.on_command("test -d", vec![ok("NOT_FOUND"), ok("EXISTS")]);
    fake.on_command("mkdir -p", vec![ok("")]);
    fake.on_command("wc -l", vec![ok("3")]);

    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    cleanup.ensure_clean(&mut session, &unix_ws()).await.unwrap();

    let kills = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RtrCall::AdminCommand { cmdline, .. } if cmdline.contains("kill -9")))
        .count();
    assert_eq!(kills, 0);
}

#[tokio::test(start_paused = true)]
async fn dirty_workspace_is_removed_then_recreated_empty() {
    let fake = FakeCloudClient::new();
    fake.on_command("ps aux", vec![ok("")]);
    // exists → removal → gone → created
    fake.on_command("test -d", vec![ok("EXISTS"), ok("NOT_FOUND"), ok("EXISTS")]);
    fake.on_command("rm -rf", vec![ok("")]);
    fake.on_command("mkdir -p", vec![ok("")]);
    fake.on_command("wc -l", vec![ok("3")]);

    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    cleanup.ensure_clean(&mut session, &unix_ws()).await.unwrap();

    let removed = fake.calls().iter().any(|c| {
        matches!(c, RtrCall::AdminCommand { cmdline, .. } if cmdline.contains("rm -rf /opt/0x4n6nerd"))
    });
    assert!(removed);
}

#[tokio::test(start_paused = true)]
async fn surviving_workspace_is_a_precondition_failure() {
    let fake = FakeCloudClient::new();
    fake.on_command("ps aux", vec![ok("")]);
    // The workspace refuses to die through the whole fallback chain.
    fake.on_command("test -d", vec![ok("EXISTS")]);
    fake.on_command("rm -rf", vec![ok("")]);
    fake.on_command("chmod -R 777", vec![ok("")]);

    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    let err = cleanup
        .ensure_clean(&mut session, &unix_ws())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn non_empty_workspace_fails_verification() {
    let fake = FakeCloudClient::new();
    fake.on_command("ps aux", vec![ok("")]);
    fake.on_command("test -d", vec![ok("NOT_FOUND"), ok("EXISTS")]);
    fake.on_command("mkdir -p", vec![ok("")]);
    fake.on_command("wc -l", vec![ok("7")]);

    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    let err = cleanup
        .ensure_clean(&mut session, &unix_ws())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn windows_removal_escalates_to_takeown() {
    let fake = FakeCloudClient::new();
    fake.on_command("Get-WmiObject Win32_Process", vec![ok("")]);
    // exists, survives Remove-Item and rmdir, dies after takeown, then
    // exists again post-creation. The triple-backtick prefix pins the
    // rule to the standalone existence probe, not the guarded Remove-Item
    // script that also mentions Test-Path.
    fake.on_command(
        "```Test-Path",
        vec![ok("True"), ok("True"), ok("True"), ok("False"), ok("True")],
    );
    fake.on_command("Remove-Item", vec![ok("")]);
    fake.on_command("rmdir /s /q", vec![ok("")]);
    fake.on_command("takeown", vec![ok("")]);
    fake.on_command("New-Item", vec![ok("")]);
    fake.on_command("Measure-Object", vec![ok("0")]);

    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    cleanup
        .ensure_clean(&mut session, &windows_ws())
        .await
        .unwrap();

    let takeown_used = fake.calls().iter().any(|c| {
        matches!(c, RtrCall::AdminCommand { cmdline, .. } if cmdline.contains("takeown"))
    });
    assert!(takeown_used);
}

#[tokio::test(start_paused = true)]
async fn cleanup_after_moves_cwd_out_first() {
    let fake = FakeCloudClient::new();
    fake.on_command("test -d", vec![ok("NOT_FOUND")]);
    fake.on_command("rm -rf", vec![ok("")]);

    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    cleanup.cleanup_after(&mut session, &unix_ws()).await.unwrap();

    let calls = fake.calls();
    let cd_pos = calls
        .iter()
        .position(|c| matches!(c, RtrCall::AdminCommand { verb, .. } if verb == "cd"))
        .unwrap();
    let rm_pos = calls
        .iter()
        .position(|c| {
            matches!(c, RtrCall::AdminCommand { cmdline, .. } if cmdline.contains("rm -rf"))
        })
        .unwrap();
    assert!(cd_pos < rm_pos);
}

#[tokio::test(start_paused = true)]
async fn emergency_runs_whole_chain_despite_failures() {
    let fake = FakeCloudClient::new();
    // No scripted commands: everything returns the default clean status;
    // emergency ignores outcomes anyway.
    let cleanup = engine(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    cleanup.emergency(&mut session, &windows_ws()).await;

    let attempts = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RtrCall::AdminCommand { cmdline, .. } if cmdline.contains("Remove-Item") || cmdline.contains("rmdir") || cmdline.contains("takeown")))
        .count();
    assert_eq!(attempts, 3);
}

#[test]
fn orchestrator_token_matching() {
    assert!(is_orchestrator_process("sh -c ps aux | grep -E './uac '"));
    assert!(is_orchestrator_process("runscript -Raw=someting"));
    // Profile names contain "triage"; the collector itself is fair game.
    assert!(!is_orchestrator_process("/opt/0x4n6nerd/uac-main/uac -p ir_triage"));
}
