// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use triage_adapters::rtr::fake::{ok, FakeCloudClient};
use triage_adapters::{CommandStatus, RtrCall};
use triage_config::Timeouts;
use triage_core::ExtractedFile;

fn setup(fake: &FakeCloudClient) -> FileTransfer<FakeCloudClient> {
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    FileTransfer::new(sessions, &Timeouts::default())
}

fn stage_download(fake: &FakeCloudClient, bytes: &[u8], sha_polls: u32, unknown_polls: u32) {
    fake.on_command("get ", vec![ok("")]);
    fake.stage_session_file(
        ExtractedFile {
            sha256: "sha-abc".to_string(),
            size: Some(bytes.len() as u64),
            // The fake allocates req ids sequentially; the get is issued
            // after the session init, so it gets req-2.
            cloud_request_id: "req-2".to_string(),
            filename: "archive.zip".to_string(),
        },
        sha_polls,
    );
    fake.stage_extracted_content("sha-abc", bytes.to_vec(), unknown_polls);
}

#[tokio::test(start_paused = true)]
async fn downloads_and_writes_7z_named_file() {
    let fake = FakeCloudClient::new();
    stage_download(&fake, b"payload-bytes", 2, 3);
    let transfer = setup(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let path = transfer
        .download(
            &mut session,
            "C:\\0x4n6nerd\\temp\\archive.zip",
            dir.path(),
            Some(13),
        )
        .await
        .unwrap();

    assert_eq!(path.file_name().unwrap().to_str().unwrap(), "archive.7z");
    assert_eq!(std::fs::read(&path).unwrap(), b"payload-bytes");
}

#[tokio::test(start_paused = true)]
async fn get_stderr_is_a_hard_failure() {
    let fake = FakeCloudClient::new();
    fake.on_command(
        "get ",
        vec![CommandStatus {
            complete: true,
            stdout: String::new(),
            stderr: "no such file".to_string(),
        }],
    );
    let transfer = setup(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = transfer
        .download(&mut session, "/opt/0x4n6nerd/evidence/a.tar.gz", dir.path(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransferFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn sha_timeout_does_not_reissue_get() {
    let fake = FakeCloudClient::new();
    fake.on_command("get ", vec![ok("")]);
    // No session file ever staged: the sha never arrives.
    let transfer = setup(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = transfer
        .download(&mut session, "/opt/0x4n6nerd/evidence/a.tar.gz", dir.path(), Some(64))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransferFailed(_)));

    let gets = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RtrCall::ActiveResponder { verb, .. } if verb == "get"))
        .count();
    assert_eq!(gets, 1);
}

#[tokio::test(start_paused = true)]
async fn long_sha_phase_keeps_session_pulsed() {
    let fake = FakeCloudClient::new();
    // SHA arrives only after many polls: 80 polls x 5s = 400s of waiting,
    // which must carry at least one keepalive.
    stage_download(&fake, b"x", 80, 0);
    let transfer = setup(&fake);
    let sessions = SessionManager::new(fake.clone(), &Timeouts::default());
    let mut session = sessions.start("aid-1").await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    transfer
        .download(&mut session, "/opt/0x4n6nerd/evidence/a.tar.gz", dir.path(), Some(1))
        .await
        .unwrap();

    let pulses = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RtrCall::PulseSession(_)))
        .count();
    assert!(pulses >= 1, "expected keepalives during sha retrieval");
}

#[tokio::test]
async fn ensure_put_file_replaces_by_name() {
    let fake = FakeCloudClient::new();
    fake.seed_put_file("kape.zip");

    ensure_put_file(&fake, "kape.zip", vec![1], "comment", "desc")
        .await
        .unwrap();

    assert_eq!(fake.put_file_uploads("kape.zip"), 1);
    let calls = fake.calls();
    let delete_pos = calls
        .iter()
        .position(|c| matches!(c, RtrCall::DeletePutFile(_)))
        .unwrap();
    let create_pos = calls
        .iter()
        .position(|c| matches!(c, RtrCall::CreatePutFile(_)))
        .unwrap();
    assert!(delete_pos < create_pos);
}

#[tokio::test]
async fn put_file_exists_checks_by_name() {
    let fake = FakeCloudClient::new();
    assert!(!put_file_exists(&fake, "uac.zip").await.unwrap());
    fake.seed_put_file("uac.zip");
    assert!(put_file_exists(&fake, "uac.zip").await.unwrap());
}

#[test]
fn remote_names_strip_both_separators() {
    assert_eq!(remote_file_name("C:\\ws\\temp\\a.zip"), "a.zip");
    assert_eq!(remote_file_name("/opt/ws/evidence/a.tar.gz"), "a.tar.gz");
    assert_eq!(remote_file_name(""), "unknown_file");
}
