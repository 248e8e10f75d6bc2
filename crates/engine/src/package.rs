// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! KAPE deployment package construction.
//!
//! The put-file `kape.zip` carries the tool tree plus a generated
//! `_kape.cli` whose single line is the command the launcher script hands
//! to `kape.exe` on the endpoint.

use crate::error::EngineError;
use std::io::{Cursor, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::{write::FileOptions, ZipWriter};

/// The single command line KAPE reads from `_kape.cli`.
pub fn kape_cli_line(target: &str, workspace: &str) -> String {
    format!(
        ".\\kape.exe --tsource C: --tdest {workspace}\\temp --target {target} --vhdx \"%m-triage\""
    )
}

/// Zip the KAPE tool tree with a freshly generated `_kape.cli`.
///
/// `tool_dir` entries keep their tree-relative paths; any `_kape.cli`
/// already in the tree is superseded by the generated one.
pub fn build_kape_zip(
    tool_dir: &Path,
    target: &str,
    workspace: &str,
) -> Result<Vec<u8>, EngineError> {
    if !tool_dir.is_dir() {
        return Err(EngineError::CollectorFailed(format!(
            "kape tool directory not found: {}",
            tool_dir.display()
        )));
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options: FileOptions<()> =
        FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut files_added = false;
    for entry in WalkDir::new(tool_dir) {
        let entry =
            entry.map_err(|err| EngineError::CollectorFailed(format!("kape tree walk: {err}")))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name == ".DS_Store" || name == "_kape.cli" {
            continue;
        }
        let relative = path.strip_prefix(tool_dir).map_err(|err| {
            EngineError::CollectorFailed(format!("kape tree relative path: {err}"))
        })?;
        zip.start_file(relative.to_string_lossy().replace('\\', "/"), options)
            .map_err(|err| EngineError::CollectorFailed(format!("zip entry: {err}")))?;
        let bytes = std::fs::read(path)?;
        zip.write_all(&bytes)
            .map_err(|err| EngineError::CollectorFailed(format!("zip write: {err}")))?;
        files_added = true;
    }
    if !files_added {
        return Err(EngineError::CollectorFailed(format!(
            "kape tool directory is empty: {}",
            tool_dir.display()
        )));
    }

    zip.start_file("_kape.cli", options)
        .map_err(|err| EngineError::CollectorFailed(format!("zip entry: {err}")))?;
    zip.write_all(kape_cli_line(target, workspace).as_bytes())
        .map_err(|err| EngineError::CollectorFailed(format!("zip write: {err}")))?;

    let cursor = zip
        .finish()
        .map_err(|err| EngineError::CollectorFailed(format!("zip finalize: {err}")))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
#[path = "package_tests.rs"]
mod tests;
