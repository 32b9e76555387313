//! Prepares a decoded project for HTTPS interception: trusts user-installed CA certificates
//! through the network security config and neutralizes custom `X509TrustManager` implementations.

mod manifest;
mod nsc;
mod smali;

pub use manifest::{ensure_nsc_reference, DEFAULT_NSC_NAME, MANIFEST_FILENAME};
pub use nsc::{nsc_path, patch_config, patch_config_file, DEFAULT_CONFIG};
pub use smali::{patch_smali_source, patch_smali_tree, SmaliPatchResult};

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use apklab_xml::Document;
use log::{info, warn};

use crate::error::ApklabError;

/// What [apply_mitm_patch] changed.
#[derive(Debug, Clone, PartialEq)]
pub struct MitmOutcome {
    /// Name of the `res/xml` resource used as the network security config.
    pub nsc_name: String,
    pub manifest_updated: bool,
    pub nsc_written: bool,
    /// Smali files that had at least one trust manager method replaced.
    pub patched_files: Vec<PathBuf>,
}

impl MitmOutcome {
    /// Whether any pinning logic was found (and patched) in this run.
    pub fn pinning_found(&self) -> bool {
        !self.patched_files.is_empty()
    }
}

/// Applies the whole MITM patch to a decoded project.
/// Files are written one at a time, so an error part way through leaves the earlier files patched.
pub fn apply_mitm_patch(project_dir: &Path) -> Result<MitmOutcome> {
    info!("Applying MITM patch to {}", project_dir.display());

    let (nsc_name, manifest_updated) = ensure_nsc_reference(project_dir)
        .context("Patching AndroidManifest.xml")?;
    if manifest_updated {
        info!("Pointed the manifest at @xml/{nsc_name}");
    }

    let nsc_written = patch_config_file(&nsc_path(project_dir, &nsc_name))
        .context("Patching network security config")?;

    let smali = patch_smali_tree(project_dir).context("Patching smali")?;
    if smali.patched_files.is_empty() {
        warn!("No certificate pinning logic found.");
    }

    info!("MITM patch applied. Rebuild the project with --debug so that the debug-overrides apply");
    Ok(MitmOutcome {
        nsc_name,
        manifest_updated,
        nsc_written,
        patched_files: smali.patched_files,
    })
}

fn patch_parse_error(path: &Path, err: impl Display) -> anyhow::Error {
    ApklabError::PatchParse {
        message: format!("{}: {err}", path.display()),
    }
    .into()
}

fn read_patch_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| patch_parse_error(path, err))
}

fn read_xml(path: &Path) -> Result<Document> {
    let contents = read_patch_input(path)?;
    apklab_xml::parse_document(contents.as_bytes()).map_err(|err| patch_parse_error(path, format!("{err:#}")))
}

fn write_xml(path: &Path, doc: &Document) -> Result<()> {
    let contents = apklab_xml::write_document(doc)?;
    std::fs::write(path, contents).with_context(|| format!("Writing {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mitm::smali::tests::{TRUST_MANAGER, TRUST_MANAGER_CLASS};

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
    <application android:label="@string/app_name">
        <activity android:name=".MainActivity"/>
    </application>
</manifest>
"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILENAME), MANIFEST).unwrap();
        let class_dir = dir.path().join("smali_classes2").join("com").join("example");
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join(TRUST_MANAGER_CLASS), TRUST_MANAGER).unwrap();
        dir
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, String)> {
        let mut files: Vec<_> = walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| (entry.path().to_path_buf(), std::fs::read_to_string(entry.path()).unwrap()))
            .collect();
        files.sort();
        files
    }

    #[test]
    fn first_run_patches_everything() {
        let dir = project();
        let outcome = apply_mitm_patch(dir.path()).unwrap();

        assert_eq!(outcome.nsc_name, DEFAULT_NSC_NAME);
        assert!(outcome.manifest_updated);
        assert!(outcome.nsc_written);
        assert!(outcome.pinning_found());
        assert_eq!(
            std::fs::read_to_string(nsc_path(dir.path(), DEFAULT_NSC_NAME)).unwrap(),
            DEFAULT_CONFIG
        );
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = project();
        apply_mitm_patch(dir.path()).unwrap();
        let after_first = snapshot(dir.path());

        let outcome = apply_mitm_patch(dir.path()).unwrap();
        assert!(!outcome.pinning_found());
        assert!(!outcome.manifest_updated);
        assert!(!outcome.nsc_written);
        assert_eq!(snapshot(dir.path()), after_first);
    }

    #[test]
    fn malformed_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILENAME), "<manifest><application></manifest>").unwrap();

        let err = apply_mitm_patch(dir.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<ApklabError>(), Some(ApklabError::PatchParse { .. })));
    }

    #[test]
    fn missing_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = apply_mitm_patch(dir.path()).unwrap_err();
        assert!(matches!(err.downcast_ref::<ApklabError>(), Some(ApklabError::PatchParse { .. })));
    }
}
