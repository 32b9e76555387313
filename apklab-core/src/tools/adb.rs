use std::path::Path;

use anyhow::Result;

use super::{display_name, path_arg};
use crate::{error::ApklabError, executor::ToolInvocation};

pub const ADB_EXE_NAME: &str = "adb";

/// `adb install -r <apk>`, replacing any installed version of the app.
pub fn install(apk_path: &Path) -> Result<ToolInvocation> {
    let invalid = |reason: &'static str| ApklabError::InvalidApk {
        path: apk_path.to_path_buf(),
        reason,
    };

    if !apk_path.is_file() {
        return Err(invalid("file does not exist").into());
    }
    let is_apk = apk_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"));
    if !is_apk {
        return Err(invalid("not an .apk file").into());
    }

    let report = format!("Installing {}", display_name(apk_path));
    Ok(ToolInvocation::new("Installing", report, ADB_EXE_NAME)
        .args(["install".to_string(), "-r".to_string(), path_arg(apk_path)]))
}
