//! Finds where a report's API call occurs in the decoded smali and shows it in the host.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    error::ApklabError,
    host::{HighlightStyle, Host, LineSpan},
    report::{ApiCall, ApiDescriptor},
    tools::apktool,
};

const METHOD_START: &str = ".method";
const METHOD_END: &str = ".end method";

/// Where an API call was found.
#[derive(Clone, Debug, PartialEq)]
pub struct Navigation {
    pub file: PathBuf,
    /// From the `.method` line to the `.end method` line.
    pub method: LineSpan,
    /// The lines of the first and second API call.
    pub api_lines: [usize; 2],
}

fn miss(message: String) -> anyhow::Error {
    ApklabError::NavigationMiss { message }.into()
}

/// Finds the smali file for a class descriptor such as `Lcom/example/Foo` in any of the `smali*` directories.
/// Both `Lcom/example/Foo.smali` and `com/example/Foo.smali` are tried.
pub fn find_smali_file(project_dir: &Path, class: &str) -> Result<Option<PathBuf>> {
    let smali_dirs = apktool::smali_dirs(project_dir)?;

    let mut candidates = vec![format!("{class}.smali")];
    if let Some(stripped) = class.strip_prefix('L') {
        candidates.push(format!("{stripped}.smali"));
    }

    for dir in &smali_dirs {
        for candidate in &candidates {
            let path = dir.join(candidate);
            if path.is_file() {
                return Ok(Some(path));
            }
        }
    }

    Ok(None)
}

/// Finds the last method whose `.method` line mentions `method`, up to its `.end method` line.
pub fn find_method_span(lines: &[&str], method: &str) -> Option<LineSpan> {
    let start = lines
        .iter()
        .rposition(|line| line.contains(METHOD_START) && line.contains(method))?;
    let end = start + lines[start..].iter().position(|line| line.contains(METHOD_END))?;

    (start < end).then(|| LineSpan::new(start, end))
}

fn without_whitespace(token: &str) -> String {
    token.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Finds the first line within `span` that contains both the opcode and the target of `api`.
pub fn find_api_line(lines: &[&str], span: LineSpan, api: &ApiDescriptor) -> Option<usize> {
    let opcode = without_whitespace(api.opcode()?);
    let target = without_whitespace(api.target()?);

    (span.start..span.end)
        .find(|&index| lines.get(index).is_some_and(|line| line.contains(&opcode) && line.contains(&target)))
}

/// Locates an API call of a report and, if both calls are found, highlights the method and the calls
/// and reveals the start of the method. Nothing is shown if anything can't be found.
pub fn navigate(project_dir: &Path, call: &ApiCall, host: &dyn Host) -> Result<Navigation> {
    let class = &call.function.class;
    let method = &call.function.method;

    let file = find_smali_file(project_dir, class)?
        .ok_or_else(|| miss(format!("Could not find the smali file for class {class}")))?;
    debug!("Class {class} is in {file:?}");

    let contents = std::fs::read_to_string(&file).with_context(|| format!("Reading {file:?}"))?;
    let lines: Vec<&str> = contents.lines().collect();

    let span = find_method_span(&lines, method)
        .ok_or_else(|| miss(format!("Could not find method {method} in {}", file.display())))?;

    let mut api_lines = [0; 2];
    for (api_line, api) in api_lines.iter_mut().zip(&call.apis) {
        *api_line = find_api_line(&lines, span, api).ok_or_else(|| {
            miss(format!(
                "Could not find API call {} in method {method}",
                api.target().unwrap_or_default()
            ))
        })?;
    }

    info!(
        "{} found in {} (lines {}-{})",
        call.id,
        file.display(),
        span.start + 1,
        span.end + 1
    );
    host.highlight(&file, HighlightStyle::MethodBody, &[span]);
    host.highlight(
        &file,
        HighlightStyle::ApiCall,
        &api_lines.map(LineSpan::single),
    );
    host.reveal_line(&file, span.start);

    Ok(Navigation {
        file,
        method: span,
        api_lines,
    })
}
