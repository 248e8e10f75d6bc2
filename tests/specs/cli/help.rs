// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI help output specs.

use crate::prelude::*;

#[test]
fn help_lists_collection_subcommands() {
    cli()
        .args(&["--help"])
        .passes()
        .stdout_has("kape")
        .stdout_has("uac")
        .stdout_has("kape-batch")
        .stdout_has("uac-batch");
}

#[test]
fn kape_help_shows_hostname_and_target() {
    cli()
        .args(&["kape", "--help"])
        .passes()
        .stdout_has("--hostname")
        .stdout_has("--target")
        .stdout_has("--download");
}

#[test]
fn version_is_reported() {
    cli().args(&["--version"]).passes().stdout_has("0.1");
}
