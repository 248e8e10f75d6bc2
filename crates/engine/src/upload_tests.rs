// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use triage_adapters::FakeObjectStore;
use yare::parameterized;

#[parameterized(
    small_file_hits_floor = { 10 * 1024 * 1024, 300 },
    mid_file_scales = { 2_000 * 1024 * 1024, 1_500 },
    huge_file_hits_cap = { 8_000 * 1024 * 1024, 1_800 },
)]
fn windows_budget_clamps(size: u64, expected_secs: u64) {
    assert_eq!(
        windows_upload_budget(size),
        Duration::from_secs(expected_secs)
    );
}

#[test]
fn unix_budget_caps_at_profile_maximum() {
    let profile_max = Duration::from_secs(1_200);
    assert_eq!(
        unix_upload_budget(8_000 * 1024 * 1024, profile_max),
        profile_max
    );
    assert_eq!(
        unix_upload_budget(1024, profile_max),
        Duration::from_secs(300)
    );
}

#[test]
fn rewrite_keeps_path_and_signature() {
    let url = "https://evidence.s3.amazonaws.com/host-triage.7z?X-Amz-Signature=abc&X-Amz-Expires=3600";
    let rewritten = rewrite_presigned_host(url, "s3-proxy.example.net").unwrap();
    assert_eq!(
        rewritten,
        "https://s3-proxy.example.net/host-triage.7z?X-Amz-Signature=abc&X-Amz-Expires=3600"
    );
}

#[tokio::test]
async fn verify_accepts_size_within_tolerance() {
    let store = FakeObjectStore::new("evidence");
    store.put_object("a.7z", 1_000_000);
    let size = verify_uploaded(&store, "a.7z", Some(1_004_000)).await.unwrap();
    assert_eq!(size, 1_000_000);
}

#[tokio::test]
async fn verify_rejects_missing_object() {
    let store = FakeObjectStore::new("evidence");
    let err = verify_uploaded(&store, "a.7z", None).await.unwrap_err();
    assert!(matches!(err, EngineError::TransferFailed(_)));
}

#[tokio::test]
async fn verify_rejects_size_mismatch() {
    let store = FakeObjectStore::new("evidence");
    store.put_object("a.7z", 10);
    let err = verify_uploaded(&store, "a.7z", Some(1_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransferFailed(_)));
}
