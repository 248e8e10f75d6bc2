// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error-path specs: failures that must be reported before any
//! control-plane traffic, with exit code 1.

use crate::prelude::*;

#[test]
fn unknown_subcommand_is_an_error() {
    cli().args(&["exfiltrate"]).fails();
}

#[test]
fn kape_requires_a_hostname() {
    cli().args(&["kape"]).fails();
}

#[test]
fn missing_credentials_fail_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .pwd(dir.path())
        .args(&["kape", "-n", "WIN-DC01", "-t", "KapeTriage", "--download"])
        .fails()
        .stderr_has("FALCON_CLIENT_ID");
}

#[test]
fn upload_mode_requires_a_bucket() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .pwd(dir.path())
        .env("FALCON_CLIENT_ID", "id")
        .env("FALCON_CLIENT_SECRET", "secret")
        .args(&["kape", "-n", "WIN-DC01", "-t", "KapeTriage"])
        .fails()
        .stderr_has("bucket_name");
}

#[test]
fn malformed_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "workspace: [broken").unwrap();
    cli()
        .pwd(dir.path())
        .env("FALCON_CLIENT_ID", "id")
        .env("FALCON_CLIENT_SECRET", "secret")
        .args(&[
            "--config",
            config.to_str().unwrap(),
            "uac",
            "-n",
            "web01",
            "--download",
        ])
        .fails()
        .stderr_has("configuration");
}
