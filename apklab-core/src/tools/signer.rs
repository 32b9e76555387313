//! uber-apk-signer: zipaligns and signs a rebuilt APK, with a debug key unless a keystore is configured.

use std::path::Path;

use anyhow::Result;
use log::warn;

use super::{display_name, path_arg, require_existing};
use crate::{config::ConfigProvider, executor::ToolInvocation};

/// `java -jar uber-apk-signer.jar -a <apk> --allowResign --overwrite [keystore args]`.
/// The APK is signed in place, so it must still exist afterwards.
pub fn sign(config: &dyn ConfigProvider, apk_path: &Path) -> Result<ToolInvocation> {
    let jar = require_existing("uber-apk-signer", config.apk_signer_path())?;
    let report = format!("Signing {}", display_name(apk_path));

    let mut invocation = ToolInvocation::new("Signing", report, config.java_path())
        .args(["-jar".to_string(), path_arg(&jar), "-a".to_string(), path_arg(apk_path)])
        .args(["--allowResign", "--overwrite"])
        .should_exist(apk_path);

    match config.keystore() {
        Some(creds) if creds.keystore_path.exists() => {
            invocation = invocation.args([
                "--ks".to_string(),
                path_arg(&creds.keystore_path),
                "--ksPass".to_string(),
                creds.keystore_password,
                "--ksAlias".to_string(),
                creds.key_alias,
                "--ksKeyPass".to_string(),
                creds.key_password,
            ]);
        }
        Some(creds) => warn!(
            "Keystore {:?} does not exist, signing with the debug key instead",
            creds.keystore_path
        ),
        None => {}
    }

    Ok(invocation)
}
