//! Errors that stop an operation before (or instead of) running an external tool.
//! Failures of the external tools themselves are not errors: see [Outcome](crate::executor::Outcome).

use std::{fmt::Display, path::PathBuf};

/// Carried inside [anyhow::Error] so that callers can `downcast_ref` when they need to
/// tell the kinds apart (e.g. to decide which notification to show).
#[derive(Debug)]
pub enum ApklabError {
    /// A configured external tool path is empty or does not exist.
    ToolMissing { tool: &'static str, path: String },
    /// Every candidate name for a project directory was already taken.
    ProjectDirExhausted { base: PathBuf },
    /// The decode metadata file is missing, or names no original APK.
    MetadataMissing { path: PathBuf },
    /// A manifest/network security config/smali file could not be read or understood.
    PatchParse { message: String },
    /// A method or API call could not be found while navigating to a report occurrence.
    NavigationMiss { message: String },
    /// The file given as an APK does not exist or is not an APK.
    InvalidApk { path: PathBuf, reason: &'static str },
}

impl std::error::Error for ApklabError {}

impl Display for ApklabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolMissing { tool, path } if path.is_empty() => {
                write!(f, "{tool} is not configured. Please check your configuration")
            }
            Self::ToolMissing { tool, path } => {
                write!(f, "{tool} not found at {path}. Please check your configuration")
            }
            Self::ProjectDirExhausted { base } => {
                write!(f, "Could not find a free project directory name based on {base:?}")
            }
            Self::MetadataMissing { path } => {
                write!(f, "Could not determine the APK file name from {path:?}")
            }
            Self::PatchParse { message } => write!(f, "Failed to parse file for patching: {message}"),
            Self::NavigationMiss { message } => write!(f, "{message}"),
            Self::InvalidApk { path, reason } => write!(f, "{reason}: {path:?}"),
        }
    }
}
