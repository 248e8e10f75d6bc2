// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn entry(comment: Option<&str>) -> HostEntry {
    HostEntry {
        ip: "10.1.2.3".into(),
        hostname: "proxy.example.net".into(),
        comment: comment.map(String::from),
    }
}

#[test]
fn unix_line_with_comment() {
    assert_eq!(
        entry(Some("s3-proxy")).unix_line(),
        "10.1.2.3 proxy.example.net #s3-proxy"
    );
}

#[test]
fn unix_line_without_comment() {
    assert_eq!(entry(None).unix_line(), "10.1.2.3 proxy.example.net");
}

#[test]
fn windows_line_uses_backtick_tabs() {
    assert_eq!(
        entry(Some("s3-proxy")).windows_line(),
        "10.1.2.3`tproxy.example.net`t#s3-proxy"
    );
}
