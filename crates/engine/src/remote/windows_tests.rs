// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn sweep_matches_name_and_command_line() {
    let cmd = process_sweep("kape.exe");
    assert!(cmd.starts_with("runscript -Raw=```"));
    assert!(cmd.contains("$_.Name -like '*kape.exe*'"));
    assert!(cmd.contains("$_.CommandLine -like '*kape.exe*'"));
}

#[test]
fn parses_format_table_rows() {
    let output = "\
ProcessId Name          CommandLine
--------- ----          -----------
     1234 kape.exe      C:\\0x4n6nerd\\kape.exe --tsource C:
     5678 powershell.exe powershell -file deploy_kape.ps1
";
    let processes = parse_process_listing(output);
    assert_eq!(processes.len(), 2);
    assert_eq!(processes[0].pid, "1234");
    assert!(processes[0].command.contains("kape.exe"));
    assert_eq!(processes[1].pid, "5678");
}

#[test]
fn parse_skips_headers_and_blank_lines() {
    assert!(parse_process_listing("ProcessId Name\n--------- ----\n\n").is_empty());
}

#[test]
fn removal_sequence_stops_holders_first() {
    let cmd = remove_workspace("C:\\0x4n6nerd");
    let stop = cmd.find("Stop-Process").unwrap();
    let sleep = cmd.find("Start-Sleep 2").unwrap();
    let remove = cmd.find("Remove-Item").unwrap();
    assert!(stop < sleep && sleep < remove);
}

#[test]
fn takeown_fallback_resets_acls() {
    let cmd = remove_workspace_takeown("C:\\0x4n6nerd");
    assert!(cmd.contains("takeown /F 'C:\\0x4n6nerd' /R"));
    assert!(cmd.contains("icacls 'C:\\0x4n6nerd' /reset"));
}

#[test]
fn upload_launcher_is_hidden_and_backgrounded() {
    let cmd = start_upload(
        "C:\\0x4n6nerd\\temp\\a-triage.zip",
        "https://bucket.s3.amazonaws.com/a-triage.7z?sig=x",
    );
    assert!(cmd.contains("Start-Process powershell -WindowStyle hidden"));
    assert!(cmd.contains("Invoke-WebRequest -Method PUT -Infile 'C:\\0x4n6nerd\\temp\\a-triage.zip'"));
}

#[test]
fn host_entries_render_as_add_content_chain() {
    let entries = vec![
        HostEntry {
            ip: "10.0.0.5".into(),
            hostname: "proxy.example.net".into(),
            comment: Some("s3-proxy".into()),
        },
        HostEntry {
            ip: "10.0.0.9".into(),
            hostname: "other.example.net".into(),
            comment: None,
        },
    ];
    let cmd = add_host_entries(&entries).unwrap();
    assert!(cmd.contains("drivers\\etc\\hosts"));
    assert!(cmd.contains("10.0.0.5`tproxy.example.net`t#s3-proxy"));
    assert!(cmd.contains("; Add-Content"));
}

#[test]
fn no_entries_means_no_command() {
    assert!(add_host_entries(&[]).is_none());
}
