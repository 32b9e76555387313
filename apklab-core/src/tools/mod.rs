//! Builders for the invocations of each external tool.
//! These only describe what to run; [pipeline](crate::pipeline) decides when to run it.

pub mod adb;
pub mod apktool;
pub mod git;
pub mod jadx;
pub mod quark;
pub mod signer;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::ApklabError;

// Checks that a configured tool path is set and exists on disk.
fn require_existing(tool: &'static str, path: String) -> Result<PathBuf> {
    if path.is_empty() || !Path::new(&path).exists() {
        return Err(ApklabError::ToolMissing { tool, path }.into());
    }

    Ok(PathBuf::from(path))
}

// Gets the file name of a path for use in progress captions.
fn display_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .to_string()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
