// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    dns = { "failed to resolve host", true },
    connection = { "Connection refused", true },
    timeout = { "operation timeout after 30s", true },
    network = { "network unreachable", true },
    other_transport = { "tls handshake rejected", false },
)]
fn network_matching_is_message_based(message: &str, expected: bool) {
    assert_eq!(
        RtrError::Transport(message.to_string()).is_network(),
        expected
    );
}

#[test]
fn api_errors_are_never_network() {
    let err = RtrError::Api {
        code: 500,
        message: "connection pool exhausted".to_string(),
    };
    assert!(!err.is_network());
}

#[test]
fn unknown_file_is_distinct() {
    assert!(matches!(RtrError::UnknownFile, RtrError::UnknownFile));
    assert!(!RtrError::UnknownFile.is_network());
}
