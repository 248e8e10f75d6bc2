// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use triage_adapters::{DeviceDetails, FakeCloudClient, RtrCall};

fn device(hostname: &str) -> DeviceDetails {
    DeviceDetails {
        device_id: format!("aid-{hostname}"),
        cid: "cid-1".to_string(),
        hostname: hostname.to_string(),
        platform_name: "Linux".to_string(),
        os_version: "Ubuntu 22.04".to_string(),
        cpu_name: String::new(),
    }
}

#[tokio::test]
async fn resolves_and_normalizes_platform() {
    let fake = FakeCloudClient::new();
    fake.set_devices(vec![device("web01")]);
    let resolver = HostResolver::new(fake);

    let host = resolver.resolve("web01").await.unwrap();
    assert_eq!(host.aid, "aid-web01");
    assert_eq!(host.cid, "cid-1");
    assert_eq!(host.platform, triage_core::Platform::Linux);
}

#[tokio::test]
async fn unknown_host_is_not_found() {
    let fake = FakeCloudClient::new();
    let resolver = HostResolver::new(fake);
    let err = resolver.resolve("ghost").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn record_without_cid_is_not_found() {
    let fake = FakeCloudClient::new();
    let mut record = device("web01");
    record.cid = String::new();
    fake.set_devices(vec![record]);
    let resolver = HostResolver::new(fake);
    let err = resolver.resolve("web01").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn second_resolve_hits_cache() {
    let fake = FakeCloudClient::new();
    fake.set_devices(vec![device("web01")]);
    let resolver = HostResolver::new(fake.clone());

    resolver.resolve("web01").await.unwrap();
    resolver.resolve("web01").await.unwrap();

    let queries = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RtrCall::QueryHosts(_)))
        .count();
    assert_eq!(queries, 1);
}

#[tokio::test(start_paused = true)]
async fn cache_expires_after_ttl() {
    let fake = FakeCloudClient::new();
    fake.set_devices(vec![device("web01")]);
    let resolver = HostResolver::with_ttl(fake.clone(), Duration::from_secs(60));

    resolver.resolve("web01").await.unwrap();
    tokio::time::sleep(Duration::from_secs(61)).await;
    resolver.resolve("web01").await.unwrap();

    let queries = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RtrCall::QueryHosts(_)))
        .count();
    assert_eq!(queries, 2);
}
