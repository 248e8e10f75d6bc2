// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell command builders for macOS and Linux endpoints.
//!
//! Long-running remote work (the collector itself, the archive upload) is
//! launched in a backgrounded subshell that writes a pid / log / exit-code
//! file triplet into the workspace; supervision polls those files plus
//! `ps`. `nohup` is deliberately avoided: it fails without a TTY in the
//! RTR environment.

use crate::remote::{runscript, RemoteProcess};
use triage_config::HostEntry;

/// List processes matching an extended-regex pattern.
pub fn process_sweep(pattern: &str) -> String {
    runscript(&format!("ps aux | grep -E '{pattern}' | grep -v grep"))
}

/// Parse `ps aux` rows: pid in column 2, command from column 11.
pub fn parse_process_listing(output: &str) -> Vec<RemoteProcess> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 11 {
                return None;
            }
            if !fields[1].bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(RemoteProcess {
                pid: fields[1].to_string(),
                command: fields[10..].join(" "),
            })
        })
        .collect()
}

pub fn kill_process(pid: &str) -> String {
    runscript(&format!("kill -9 {pid}"))
}

pub fn test_dir(path: &str) -> String {
    runscript(&format!(
        "test -d {path} && echo 'EXISTS' || echo 'NOT_FOUND'"
    ))
}

/// Remove the workspace contents then the directory, syncing before the
/// verify pass so a racing delete is visible.
pub fn remove_workspace(workspace: &str) -> String {
    runscript(&format!(
        "rm -rf {workspace}/* 2>/dev/null || true; rm -rf {workspace} 2>/dev/null || true; sync; sleep 3"
    ))
}

/// Removal fallback: reset permissions, then delete depth-first.
pub fn remove_workspace_fallback(workspace: &str) -> String {
    runscript(&format!(
        "chmod -R 777 {workspace} 2>/dev/null || true; find {workspace} -depth -delete 2>/dev/null || true; rm -rf {workspace} 2>/dev/null || true; sync; sleep 1"
    ))
}

pub fn create_workspace(workspace: &str) -> String {
    runscript(&format!("mkdir -p {workspace} && sync && sleep 1"))
}

/// Line count of `ls -la`; 3 or fewer lines (total, `.`, `..`) is empty.
pub fn count_entries(workspace: &str) -> String {
    runscript(&format!("ls -la {workspace} | wc -l"))
}

pub fn file_size(path: &str) -> String {
    runscript(&format!("ls -la '{path}' | awk '{{print $5}}'"))
}

pub fn list_directory(path: &str) -> String {
    runscript(&format!("ls -la {path}"))
}

pub fn unzip_package(workspace: &str, archive: &str) -> String {
    runscript(&format!("cd {workspace} && unzip -o {archive} 2>&1"))
}

/// Locate the extracted UAC tree without relying on shell globbing.
pub fn find_uac_dir(workspace: &str) -> String {
    runscript(&format!(
        "find {workspace} -maxdepth 1 -type d -name 'uac*' | head -1"
    ))
}

pub fn chmod_executable(path: &str) -> String {
    runscript(&format!("chmod +x {path}"))
}

/// Launch UAC detached. The subshell runs from the tool directory, writes
/// stdout/stderr to the log, the exit code to its file, and its pid to
/// the pid file.
pub fn launch_uac(uac_dir: &str, profile: &str, workspace: &str) -> String {
    runscript(&format!(
        "(cd {uac_dir} && ./uac -p {profile} --output-format tar {workspace}/evidence < /dev/null > {workspace}/uac_output.log 2>&1; echo $? > {workspace}/uac_exit_code) & echo $! > {workspace}/uac.pid && echo 'UAC started in background'"
    ))
}

pub fn read_pid_file(workspace: &str) -> String {
    runscript(&format!(
        "test -f {workspace}/uac.pid && cat {workspace}/uac.pid"
    ))
}

pub fn tail_log(workspace: &str, lines: u32) -> String {
    runscript(&format!(
        "test -f {workspace}/uac_output.log && tail -n {lines} {workspace}/uac_output.log || echo 'Log file not found'"
    ))
}

pub fn read_exit_code(workspace: &str) -> String {
    runscript(&format!(
        "test -f {workspace}/uac_exit_code && cat {workspace}/uac_exit_code"
    ))
}

pub fn process_alive(pid: &str) -> String {
    runscript(&format!("ps -p {pid} -o pid= 2>/dev/null"))
}

/// Append hosts-file entries for the upload proxy.
pub fn add_host_entries(entries: &[HostEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let adds: Vec<String> = entries
        .iter()
        .map(|entry| format!("echo '{}' >> /etc/hosts", entry.unix_line()))
        .collect();
    Some(runscript(&adds.join("; ")))
}

/// Launch the archive PUT detached with its own pid / log / exit-code
/// triplet. The empty `Content-Type:` header is required by the presigned
/// URL; the exit code is advisory only (HEAD on the object decides).
pub fn start_upload(file_path: &str, url: &str, evidence_dir: &str, max_time_secs: u64) -> String {
    runscript(&format!(
        "(curl -X PUT -T '{file_path}' -H 'Content-Type:' --max-time {max_time_secs} --connect-timeout 30 --retry 3 --retry-delay 5 --fail '{url}' > {evidence_dir}/upload.log 2>&1; echo $? > {evidence_dir}/upload_exit_code) & echo $! > {evidence_dir}/upload.pid && echo 'Upload started in background'"
    ))
}

pub fn upload_progress(evidence_dir: &str) -> String {
    runscript(&format!(
        "test -f {evidence_dir}/upload.log && tail -1 {evidence_dir}/upload.log | grep -o '[0-9]\\+\\.[0-9]%' | tail -1"
    ))
}

pub fn read_upload_exit_code(evidence_dir: &str) -> String {
    runscript(&format!(
        "test -f {evidence_dir}/upload_exit_code && cat {evidence_dir}/upload_exit_code"
    ))
}

pub fn read_upload_pid(evidence_dir: &str) -> String {
    runscript(&format!(
        "test -f {evidence_dir}/upload.pid && cat {evidence_dir}/upload.pid"
    ))
}

#[cfg(test)]
#[path = "unix_tests.rs"]
mod tests;
