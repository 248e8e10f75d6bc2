// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn all_ok_requires_every_host_green() {
    let mut report = BatchReport::default();
    report.record(
        "a",
        HostOutcome::succeeded("s3://b/a.7z".into(), Duration::from_secs(60)),
    );
    report.record(
        "b",
        HostOutcome::failed("collector failed".into(), Duration::from_secs(10)),
    );
    assert_eq!(report.successes(), 1);
    assert_eq!(report.total(), 2);
    assert!(!report.all_ok());

    report.record(
        "b",
        HostOutcome::succeeded("s3://b/b.7z".into(), Duration::from_secs(20)),
    );
    assert!(report.all_ok());
}

#[test]
fn empty_report_is_not_ok() {
    assert!(!BatchReport::default().all_ok());
}

#[test]
fn fatal_overrides_green_hosts() {
    let mut report = BatchReport::default();
    report.record(
        "a",
        HostOutcome::succeeded("s3://b/a.7z".into(), Duration::from_secs(60)),
    );
    report.fatal = Some("authentication failed".into());
    assert!(!report.all_ok());
}

#[test]
fn average_ignores_hosts_that_never_ran() {
    let mut report = BatchReport::default();
    report.record(
        "a",
        HostOutcome::succeeded("d".into(), Duration::from_secs(100)),
    );
    report.record("b", HostOutcome::failed("unresolved".into(), Duration::ZERO));
    report.record(
        "c",
        HostOutcome::succeeded("d".into(), Duration::from_secs(200)),
    );
    assert_eq!(report.average_host_duration(), Some(Duration::from_secs(150)));
}

#[test]
fn summary_has_one_line_per_host_plus_totals() {
    let mut report = BatchReport::default();
    report.record(
        "web01",
        HostOutcome::succeeded("s3://b/x.7z".into(), Duration::from_secs(90)),
    );
    report.elapsed = Duration::from_secs(95);
    let lines = report.summary_lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("web01: ok"));
    assert!(lines[1].contains("1/1 succeeded"));
}
