//! Jadx: decompiles the APK's dex files to Java source.

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{display_name, path_arg, require_existing};
use crate::{config::ConfigProvider, executor::ToolInvocation};

/// Directory, relative to the project, that Java sources are written to.
pub const JAVA_SOURCE_DIR: &str = "java_src";

#[cfg(windows)]
const JADX_EXE_NAME: &str = "jadx.bat";

#[cfg(not(windows))]
const JADX_EXE_NAME: &str = "jadx";

/// Gets the jadx launcher inside the configured jadx directory.
pub fn jadx_executable(config: &dyn ConfigProvider) -> Result<PathBuf> {
    let jadx_dir = config.jadx_dir_path();
    let exe_path = if jadx_dir.is_empty() {
        String::new()
    } else {
        Path::new(&jadx_dir).join("bin").join(JADX_EXE_NAME).to_string_lossy().to_string()
    };

    require_existing("Jadx", exe_path)
}

/// `jadx -r -q -ds <project_dir>/java_src <apk> [extra]`.
pub fn decompile(
    config: &dyn ConfigProvider,
    apk_path: &Path,
    project_dir: &Path,
    extra_args: &[String],
) -> Result<ToolInvocation> {
    let jadx = jadx_executable(config)?;
    let java_dir = project_dir.join(JAVA_SOURCE_DIR);
    let report = format!("Decompiling {} into {}", display_name(apk_path), java_dir.display());

    Ok(ToolInvocation::new("Decompiling", report, path_arg(&jadx))
        .args(["-r".to_string(), "-q".to_string(), "-ds".to_string(), path_arg(&java_dir), path_arg(apk_path)])
        .args(extra_args.iter().cloned())
        .should_exist(java_dir))
}
