// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collection-archive naming.
//!
//! KAPE emits `<ISO-timestamp>_<hostname>-triage.{vhdx|zip|7z}` under the
//! workspace temp directory; UAC emits
//! `uac-<hostname>-<os>-<YYYYMMDDhhmmss>.tar.gz` under evidence. The
//! control plane rewrites every retrieved file into a 7z container, so all
//! locally written evacuation files carry a `.7z` extension regardless of
//! the source name.

use regex::Regex;

/// A KAPE triage archive identified in a directory listing.
///
/// `base_name` carries no extension; KAPE may emit `.vhdx`, `.zip` or
/// `.7z` and the extension is resolved at evacuation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KapeArtifact {
    pub base_name: String,
}

impl KapeArtifact {
    /// Locate a triage archive in `ls` output from the workspace temp dir.
    pub fn find_in_listing(listing: &str) -> Option<Self> {
        let Ok(re) = Regex::new(
            r"(\d{4}-\d{2}-\d{2}T\d+)(_)([a-zA-Z0-9\-]+)(-triage)(?:\.(vhdx|zip|7z))?",
        ) else {
            return None;
        };
        let caps = re.captures(listing)?;
        let base = format!("{}{}{}{}", &caps[1], &caps[2], &caps[3], &caps[4]);
        Some(Self { base_name: base })
    }

    /// Name of the zip KAPE writes next to the vhdx.
    pub fn zip_name(&self) -> String {
        format!("{}.zip", self.base_name)
    }

    /// Object key / local filename after control-plane 7z rewrite.
    pub fn evacuation_name(&self) -> String {
        format!("{}.7z", self.base_name)
    }
}

/// A UAC output archive identified in an evidence-directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UacArtifact {
    pub base_name: String,
}

impl UacArtifact {
    /// Locate the finished tarball for `hostname` in `ls -la` output.
    ///
    /// UAC timestamps have no `T` separator (`YYYYMMDDhhmmss`).
    pub fn find_in_listing(listing: &str, hostname: &str) -> Option<Self> {
        let pattern = format!(r"(uac-{}-\w+-\d{{14}})\.tar\.gz", regex::escape(hostname));
        let Ok(re) = Regex::new(&pattern) else {
            return None;
        };
        let caps = re.captures(listing)?;
        Some(Self {
            base_name: caps[1].to_string(),
        })
    }

    pub fn tar_name(&self) -> String {
        format!("{}.tar.gz", self.base_name)
    }

    /// Object key / local filename after control-plane 7z rewrite.
    pub fn evacuation_name(&self) -> String {
        format!("{}.7z", self.base_name)
    }
}

/// Force the `.7z` extension the control-plane rewrite imposes.
///
/// Recognized archive suffixes are replaced; anything else gets `.7z`
/// appended. Idempotent for names already ending in `.7z`.
pub fn with_7z_extension(name: &str) -> String {
    if name.ends_with(".7z") {
        return name.to_string();
    }
    for suffix in [".tar.gz", ".vhdx", ".zip", ".tar", ".gz"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            return format!("{stem}.7z");
        }
    }
    format!("{name}.7z")
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
