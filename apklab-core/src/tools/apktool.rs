//! Apktool: decodes APK resources and disassembles dex to smali, and builds them back into an APK.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use log::warn;
use regex::Regex;

use super::{display_name, path_arg, require_existing};
use crate::{config::ConfigProvider, error::ApklabError, executor::ToolInvocation};

/// The metadata file apktool writes into the root of every decoded project.
pub const APKTOOL_YML_FILENAME: &str = "apktool.yml";
/// Directory, relative to the project, that rebuilt APKs are written to.
pub const DIST_DIR: &str = "dist";

static APK_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"apkFileName: (.*\.apk)").expect("APK file name pattern should be valid")
});

/// Accepts either the path of `apktool.yml` or the project directory containing it,
/// and gives back `(project_dir, apktool_yml_path)`.
pub fn resolve_project(path: impl AsRef<Path>) -> (PathBuf, PathBuf) {
    let path = path.as_ref();
    if path.is_dir() {
        (path.to_path_buf(), path.join(APKTOOL_YML_FILENAME))
    } else {
        let project_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        (project_dir, path.to_path_buf())
    }
}

/// Extracts the name of the original APK from the `apkFileName: <name>.apk` line of `apktool.yml`.
pub fn original_apk_name(apktool_yml: impl AsRef<Path>) -> Result<String> {
    let apktool_yml = apktool_yml.as_ref();
    let missing = || ApklabError::MetadataMissing { path: apktool_yml.to_path_buf() };

    if !apktool_yml.exists() {
        return Err(missing().into());
    }

    let contents = std::fs::read_to_string(apktool_yml).context("Reading apktool.yml")?;
    match APK_FILE_NAME.captures(&contents) {
        Some(captures) => Ok(captures[1].to_string()),
        None => {
            warn!("Couldn't find apkFileName in {apktool_yml:?}");
            Err(missing().into())
        }
    }
}

/// Lists the `smali`, `smali_classes2`, ... directories of a decoded project, sorted by name.
pub fn smali_dirs(project_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(project_dir)
        .context("Listing project directory")?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_ok_and(|file_type| file_type.is_dir())
                && entry.file_name().to_string_lossy().starts_with("smali")
        })
        .map(|entry| entry.path())
        .collect();
    dirs.sort();

    Ok(dirs)
}

fn jar_args(config: &dyn ConfigProvider) -> Result<Vec<String>> {
    let jar = require_existing("Apktool", config.apktool_path())?;
    Ok(vec!["-jar".to_string(), path_arg(&jar)])
}

/// `java -jar apktool.jar d <apk> -o <project_dir> [extra]`.
/// Successful only if `apktool.yml` is written into the project directory.
pub fn decode(
    config: &dyn ConfigProvider,
    apk_path: &Path,
    project_dir: &Path,
    extra_args: &[String],
) -> Result<ToolInvocation> {
    let report = format!("Decoding {} into {}", display_name(apk_path), project_dir.display());

    Ok(ToolInvocation::new("Decoding", report, config.java_path())
        .args(jar_args(config)?)
        .args(["d".to_string(), path_arg(apk_path), "-o".to_string(), path_arg(project_dir)])
        .args(extra_args.iter().cloned())
        .should_exist(project_dir.join(APKTOOL_YML_FILENAME)))
}

/// The path that [build] writes the rebuilt APK to.
pub fn built_apk_path(project_dir: &Path, apk_name: &str) -> PathBuf {
    project_dir.join(DIST_DIR).join(apk_name)
}

/// `java -jar apktool.jar b <project_dir> [extra]`.
/// Successful only if `<project_dir>/dist/<apk_name>` exists afterwards.
pub fn build(
    config: &dyn ConfigProvider,
    project_dir: &Path,
    apk_name: &str,
    extra_args: &[String],
) -> Result<ToolInvocation> {
    let report = format!(
        "Rebuilding {apk_name} into {}{}{DIST_DIR}",
        display_name(project_dir),
        std::path::MAIN_SEPARATOR
    );

    Ok(ToolInvocation::new("Rebuilding", report, config.java_path())
        .args(jar_args(config)?)
        .args(["b".to_string(), path_arg(project_dir)])
        .args(extra_args.iter().cloned())
        .should_exist(built_apk_path(project_dir, apk_name)))
}

/// Clears the framework resources apktool caches between runs.
pub fn empty_framework_dir(config: &dyn ConfigProvider) -> Result<ToolInvocation> {
    Ok(ToolInvocation::new(
        "Cleanup Apktool framework dir",
        "Cleaning up Apktool framework dir",
        config.java_path(),
    )
    .args(jar_args(config)?)
    .args(["empty-framework-dir", "--force"]))
}
