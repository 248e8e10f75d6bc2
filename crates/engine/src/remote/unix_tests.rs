// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn sweep_excludes_the_grep_itself() {
    let cmd = process_sweep("curl .*amazonaws.*uac-");
    assert!(cmd.contains("grep -E 'curl .*amazonaws.*uac-'"));
    assert!(cmd.contains("grep -v grep"));
}

#[test]
fn parses_ps_aux_rows() {
    let output = "\
root      4321 95.0  1.2 123456 7890 ?  R    12:00  10:00 /opt/0x4n6nerd/uac-main/uac -p ir_triage
root      4400  0.1  0.0   1234  567 ?  S    12:01   0:00 tail -f uac_output.log
";
    let processes = parse_process_listing(output);
    assert_eq!(processes.len(), 2);
    assert_eq!(processes[0].pid, "4321");
    assert!(processes[0].command.starts_with("/opt/0x4n6nerd/uac-main/uac"));
}

#[test]
fn parse_ignores_short_rows() {
    assert!(parse_process_listing("USER PID %CPU\n").is_empty());
}

#[test]
fn uac_launch_is_a_detached_subshell_with_triplet() {
    let cmd = launch_uac("/opt/0x4n6nerd/uac-main", "ir_triage", "/opt/0x4n6nerd");
    assert!(cmd.contains("(cd /opt/0x4n6nerd/uac-main && ./uac -p ir_triage --output-format tar /opt/0x4n6nerd/evidence"));
    assert!(cmd.contains("< /dev/null > /opt/0x4n6nerd/uac_output.log 2>&1"));
    assert!(cmd.contains("echo $? > /opt/0x4n6nerd/uac_exit_code"));
    assert!(cmd.contains("& echo $! > /opt/0x4n6nerd/uac.pid"));
    assert!(!cmd.contains("nohup"));
}

#[test]
fn upload_launch_has_empty_content_type_and_triplet() {
    let cmd = start_upload(
        "/opt/0x4n6nerd/evidence/uac-h-linux-20240301123055.tar.gz",
        "https://bucket.s3.amazonaws.com/uac-h-linux-20240301123055.7z?sig=x",
        "/opt/0x4n6nerd/evidence",
        1200,
    );
    assert!(cmd.contains("-H 'Content-Type:'"));
    assert!(cmd.contains("--max-time 1200"));
    assert!(cmd.contains("--retry 3 --retry-delay 5 --fail"));
    assert!(cmd.contains("echo $? > /opt/0x4n6nerd/evidence/upload_exit_code"));
    assert!(cmd.contains("& echo $! > /opt/0x4n6nerd/evidence/upload.pid"));
}

#[test]
fn workspace_removal_syncs_before_returning() {
    let cmd = remove_workspace("/opt/0x4n6nerd");
    let contents = cmd.find("rm -rf /opt/0x4n6nerd/*").unwrap();
    let dir = cmd.find("rm -rf /opt/0x4n6nerd 2>").unwrap();
    let sync = cmd.find("sync").unwrap();
    assert!(contents < dir && dir < sync);
}

#[test]
fn host_entries_append_to_etc_hosts() {
    let entries = vec![HostEntry {
        ip: "10.0.0.5".into(),
        hostname: "proxy.example.net".into(),
        comment: Some("s3-proxy".into()),
    }];
    let cmd = add_host_entries(&entries).unwrap();
    assert!(cmd.contains("echo '10.0.0.5 proxy.example.net #s3-proxy' >> /etc/hosts"));
}
