//! Replaces the bodies of `X509TrustManager` methods in smali so that every certificate chain is accepted.
//! The old body is kept below the replacement as comments.

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use const_format::formatcp;
use log::{debug, info};
use regex::{Captures, Regex};
use walkdir::WalkDir;

use super::read_patch_input;
use crate::tools::apktool;

// Only files containing this line can hold a trust manager implementation.
const INTERFACE_LINE: &str = ".implements Ljavax/net/ssl/X509TrustManager;";

const CERT_ARRAY: &str = "[Ljava/security/cert/X509Certificate;";
const CHECK_TRUSTED_PARAMS: &str = formatcp!("({CERT_ARRAY}Ljava/lang/String;)V");
const CHECK_CLIENT_TRUSTED: &str = formatcp!("checkClientTrusted{CHECK_TRUSTED_PARAMS}");
const CHECK_SERVER_TRUSTED: &str = formatcp!("checkServerTrusted{CHECK_TRUSTED_PARAMS}");
const GET_ACCEPTED_ISSUERS: &str = formatcp!("getAcceptedIssuers(){CERT_ARRAY}");

const INSERTED_MARKER: &str = "# inserted by APKLab to disable certificate pinning";
const COMMENTED_MARKER: &str = "# commented out by APKLab to disable old method body";

const RETURN_VOID_FIX: &[&str] = &[".locals 0", "return-void"];
const RETURN_EMPTY_ARRAY_FIX: &[&str] = &[
    ".locals 1",
    "const/4 v0, 0x0",
    formatcp!("new-array v0, v0, {CERT_ARRAY}"),
    "return-object v0",
];

const SMALI_INDENT: &str = "    ";

struct MethodFix {
    pattern: Regex,
    replacement: &'static [&'static str],
}

static METHOD_FIXES: LazyLock<Vec<MethodFix>> = LazyLock::new(|| {
    [
        (CHECK_CLIENT_TRUSTED, RETURN_VOID_FIX),
        (CHECK_SERVER_TRUSTED, RETURN_VOID_FIX),
        (GET_ACCEPTED_ISSUERS, RETURN_EMPTY_ARRAY_FIX),
    ]
    .into_iter()
    .map(|(signature, replacement)| MethodFix {
        pattern: Regex::new(&format!(
            r"(\.method public (?:final )?{})\n((?s:.+?))\n(\.end method)",
            regex::escape(signature)
        ))
        .expect("Trust manager method pattern should be valid"),
        replacement,
    })
    .collect()
});

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmaliPatchResult {
    /// Number of `.smali` files looked at.
    pub scanned_files: usize,
    /// Number of files that implement `X509TrustManager`.
    pub trust_manager_files: usize,
    pub patched_files: Vec<PathBuf>,
}

/// Patches the trust manager methods in the given smali source, which must use `\n` line endings.
/// Returns `None` if nothing needed patching. Methods patched by a previous run are left alone.
pub fn patch_smali_source(source: &str) -> Option<String> {
    if !source.contains(INTERFACE_LINE) {
        return None;
    }

    let mut patched_methods = 0;
    let mut output = source.to_string();
    for fix in METHOD_FIXES.iter() {
        output = fix
            .pattern
            .replace_all(&output, |caps: &Captures| {
                if caps[2].trim_start().starts_with(INSERTED_MARKER) {
                    return caps[0].to_string();
                }

                patched_methods += 1;
                neutralize(&caps[1], fix.replacement, &caps[2], &caps[3])
            })
            .into_owned();
    }

    (patched_methods > 0).then_some(output)
}

fn neutralize(opening: &str, replacement: &[&str], body: &str, closing: &str) -> String {
    let mut inner: Vec<String> = vec![INSERTED_MARKER.to_string()];
    inner.extend(replacement.iter().map(|line| line.to_string()));
    inner.push(String::new());
    inner.push(COMMENTED_MARKER.to_string());
    inner.push("# ".to_string());
    inner.extend(
        body.split('\n')
            .map(|line| format!("# {}", line.strip_prefix(SMALI_INDENT).unwrap_or(line))),
    );

    std::iter::once(opening.to_string())
        .chain(inner.into_iter().map(|line| format!("{SMALI_INDENT}{line}")))
        .chain(std::iter::once(closing.to_string()))
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, PartialEq)]
enum FileOutcome {
    NotTrustManager,
    AlreadyPatched,
    Patched,
}

fn patch_smali_file(path: &Path) -> Result<FileOutcome> {
    let contents = read_patch_input(path)?;
    if !contents.contains(INTERFACE_LINE) {
        return Ok(FileOutcome::NotTrustManager);
    }

    let normalized = contents.replace("\r\n", "\n");
    let Some(patched) = patch_smali_source(&normalized) else {
        debug!("{path:?} implements X509TrustManager but has nothing left to patch");
        return Ok(FileOutcome::AlreadyPatched);
    };

    info!("Applying patch in {}", path.display());
    let patched = if cfg!(windows) { patched.replace('\n', "\r\n") } else { patched };
    std::fs::write(path, patched).with_context(|| format!("Writing {path:?}"))?;
    Ok(FileOutcome::Patched)
}

/// Patches every `.smali` file below the `smali*` directories of the project.
pub fn patch_smali_tree(project_dir: &Path) -> Result<SmaliPatchResult> {
    let smali_roots = apktool::smali_dirs(project_dir)?;

    let mut result = SmaliPatchResult::default();
    for root in smali_roots {
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.context("Walking smali directory")?;
            if !entry.file_type().is_file() || entry.path().extension() != Some(OsStr::new("smali")) {
                continue;
            }

            result.scanned_files += 1;
            let path = entry.path();
            match patch_smali_file(path)? {
                FileOutcome::NotTrustManager => {}
                FileOutcome::AlreadyPatched => result.trust_manager_files += 1,
                FileOutcome::Patched => {
                    result.trust_manager_files += 1;
                    result.patched_files.push(path.to_path_buf());
                }
            }
        }
    }

    debug!(
        "Scanned {} smali files, {} trust managers, {} patched",
        result.scanned_files,
        result.trust_manager_files,
        result.patched_files.len()
    );
    Ok(result)
}
