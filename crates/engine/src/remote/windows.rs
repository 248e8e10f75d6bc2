// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PowerShell command builders for Windows endpoints.

use crate::remote::{runscript, RemoteProcess};
use triage_config::HostEntry;

/// List processes whose name or command line matches `pattern`.
pub fn process_sweep(pattern: &str) -> String {
    runscript(&format!(
        "Get-WmiObject Win32_Process | Where-Object {{ $_.Name -like '*{pattern}*' -or $_.CommandLine -like '*{pattern}*' }} | Select-Object ProcessId,Name,CommandLine | Format-Table -AutoSize"
    ))
}

/// Parse `process_sweep` output: rows whose first column is a pid.
pub fn parse_process_listing(output: &str) -> Vec<RemoteProcess> {
    output
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let (pid, rest) = trimmed.split_once(char::is_whitespace)?;
            if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(RemoteProcess {
                pid: pid.to_string(),
                command: rest.trim().to_string(),
            })
        })
        .collect()
}

pub fn kill_process(pid: &str) -> String {
    runscript(&format!("taskkill /F /PID {pid}"))
}

pub fn test_path(path: &str) -> String {
    runscript(&format!("Test-Path '{path}'"))
}

/// Remove the workspace: stop anything holding a handle, settle, then
/// delete recursively.
pub fn remove_workspace(workspace: &str) -> String {
    runscript(&format!(
        "Get-Process | Where-Object {{$_.Path -like '{workspace}*'}} | Stop-Process -Force -ErrorAction SilentlyContinue; Start-Sleep 2; if (Test-Path '{workspace}') {{ Remove-Item -Path '{workspace}' -Recurse -Force -ErrorAction Stop }}"
    ))
}

/// First removal fallback: cmd.exe rmdir is more forceful on locked trees.
pub fn remove_workspace_fallback(workspace: &str) -> String {
    runscript(&format!("cmd.exe /c 'rmdir /s /q {workspace} 2>nul'"))
}

/// Last-resort removal: take ownership and reset ACLs before deleting.
pub fn remove_workspace_takeown(workspace: &str) -> String {
    runscript(&format!(
        "takeown /F '{workspace}' /R /D Y | Out-Null; icacls '{workspace}' /reset /T /C | Out-Null; Remove-Item -Path '{workspace}' -Recurse -Force -ErrorAction SilentlyContinue"
    ))
}

pub fn create_workspace(workspace: &str) -> String {
    runscript(&format!(
        "New-Item -ItemType Directory -Path '{workspace}' -Force"
    ))
}

/// Count of entries in the workspace; an empty workspace yields `0`.
pub fn count_entries(workspace: &str) -> String {
    runscript(&format!(
        "(Get-ChildItem '{workspace}' -Force | Measure-Object).Count"
    ))
}

pub fn file_length(path: &str) -> String {
    runscript(&format!("(Get-Item '{path}').Length"))
}

pub fn read_file(path: &str) -> String {
    runscript(&format!(
        "Get-Content '{path}' -ErrorAction SilentlyContinue"
    ))
}

pub fn list_directory(path: &str) -> String {
    runscript(&format!("Get-ChildItem '{path}' | Select-Object Name"))
}

/// Launch the packaged deployment script.
pub fn run_deploy_script(script_path: &str) -> String {
    runscript(&format!(
        "powershell.exe -noprofile -executionpolicy bypass -file {script_path}"
    ))
}

/// Append hosts-file entries so the upload proxy resolves without DNS.
pub fn add_host_entries(entries: &[HostEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let adds: Vec<String> = entries
        .iter()
        .map(|entry| {
            format!(
                "Add-Content -Path 'C:\\Windows\\System32\\drivers\\etc\\hosts' -Value '{}'",
                entry.windows_line()
            )
        })
        .collect();
    Some(runscript(&adds.join("; ")))
}

/// Start the archive PUT in a hidden background PowerShell so the
/// synchronous RTR channel returns promptly.
pub fn start_upload(file_path: &str, url: &str) -> String {
    runscript(&format!(
        "Set-ItemProperty -Path 'HKLM:\\SOFTWARE\\Microsoft\\Internet Explorer\\Main' -Name 'DisableFirstRunCustomize' -Value 2; Start-Process powershell -WindowStyle hidden -ArgumentList \"Invoke-WebRequest -Method PUT -Infile '{file_path}' -Uri '{url}'\""
    ))
}

/// Count of live background upload processes; zero means the PUT exited.
pub fn count_upload_processes() -> String {
    runscript(
        "Get-WmiObject Win32_Process -Filter \"Name='powershell.exe'\" | Where-Object { $_.CommandLine -like '*Invoke-WebRequest*' -and $_.CommandLine -like '*PUT*' } | Measure-Object | Select-Object -ExpandProperty Count",
    )
}

#[cfg(test)]
#[path = "windows_tests.rs"]
mod tests;
