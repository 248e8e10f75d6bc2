// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Read;

fn tool_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kape.exe"), b"binary").unwrap();
    std::fs::create_dir(dir.path().join("Targets")).unwrap();
    std::fs::write(dir.path().join("Targets").join("Triage.tkape"), b"t").unwrap();
    std::fs::write(dir.path().join(".DS_Store"), b"junk").unwrap();
    // A stale CLI file must not survive into the package.
    std::fs::write(dir.path().join("_kape.cli"), b"old command").unwrap();
    dir
}

fn entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
fn cli_line_embeds_target_and_workspace() {
    assert_eq!(
        kape_cli_line("!SANS_Triage", "C:\\0x4n6nerd"),
        ".\\kape.exe --tsource C: --tdest C:\\0x4n6nerd\\temp --target !SANS_Triage --vhdx \"%m-triage\""
    );
}

#[test]
fn package_contains_tree_and_generated_cli() {
    let dir = tool_dir();
    let bytes = build_kape_zip(dir.path(), "KapeTriage", "C:\\0x4n6nerd").unwrap();
    let names = entry_names(&bytes);

    assert!(names.contains(&"kape.exe".to_string()));
    assert!(names.contains(&"Targets/Triage.tkape".to_string()));
    assert!(names.contains(&"_kape.cli".to_string()));
    assert!(!names.iter().any(|n| n.contains(".DS_Store")));
}

#[test]
fn generated_cli_replaces_stale_one() {
    let dir = tool_dir();
    let bytes = build_kape_zip(dir.path(), "KapeTriage", "C:\\0x4n6nerd").unwrap();

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut cli = String::new();
    archive
        .by_name("_kape.cli")
        .unwrap()
        .read_to_string(&mut cli)
        .unwrap();
    assert!(cli.contains("--target KapeTriage"));
    assert!(!cli.contains("old command"));
}

#[test]
fn missing_tool_dir_is_collector_failure() {
    let err = build_kape_zip(Path::new("/nonexistent/kape"), "T", "C:\\ws").unwrap_err();
    assert!(matches!(err, EngineError::CollectorFailed(_)));
}

#[test]
fn empty_tool_dir_is_collector_failure() {
    let dir = tempfile::tempdir().unwrap();
    let err = build_kape_zip(dir.path(), "T", "C:\\ws").unwrap_err();
    assert!(matches!(err, EngineError::CollectorFailed(_)));
}
