//! Quark-Engine: scores an APK against a rule set of suspicious API call pairs.

use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use log::debug;

use super::{display_name, path_arg};
use crate::{
    config::ConfigProvider,
    executor::{change_dir, ToolInvocation},
};

/// Name of the report written into the project directory.
pub const QUARK_REPORT_FILENAME: &str = "quarkReport.json";
pub const QUARK_EXE_NAME: &str = "quark";

pub fn report_path(project_dir: &Path) -> PathBuf {
    project_dir.join(QUARK_REPORT_FILENAME)
}

/// Checks whether `quark` can be launched at all.
pub fn probe_installed() -> bool {
    let status = Command::new(QUARK_EXE_NAME)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) => status.success(),
        Err(err) => {
            debug!("Could not run {QUARK_EXE_NAME}: {err}");
            false
        }
    }
}

/// `quark -a <apk> -o <project_dir>/quarkReport.json`, run from the quark data directory
/// since quark looks for its rules relative to the working directory.
pub fn analyze(config: &dyn ConfigProvider, apk_path: &Path, project_dir: &Path) -> ToolInvocation {
    let command = format!(
        "{} && {QUARK_EXE_NAME}",
        change_dir(&config.quark_data_dir())
    );
    let report = format!("Analyzing {} with Quark", display_name(apk_path));
    let report_file = report_path(project_dir);

    ToolInvocation::new("Quark analysis", report, command)
        .args(["-a".to_string(), path_arg(apk_path), "-o".to_string(), path_arg(&report_file)])
        .should_exist(report_file)
        .shell()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[cfg(unix)]
    #[test]
    fn runs_from_data_dir_and_expects_report() {
        let settings = Settings {
            quark_data_dir: Some(PathBuf::from("/home/user/.quark-engine")),
            ..Default::default()
        };
        let invocation = analyze(&settings, Path::new("/apks/app.apk"), Path::new("/apks/app"));

        assert!(invocation.shell);
        assert_eq!(invocation.command, "cd /home/user/.quark-engine && quark");
        assert_eq!(invocation.args, vec!["-a", "/apks/app.apk", "-o", "/apks/app/quarkReport.json"]);
        assert_eq!(invocation.should_exist, Some(PathBuf::from("/apks/app/quarkReport.json")));
    }
}
