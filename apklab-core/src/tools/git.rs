//! Turns a freshly decoded project into a git repository with a single initial commit,
//! so that later edits can be reviewed with `git diff`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::executor::{change_dir, ToolInvocation};

/// Build output is never committed.
pub const GITIGNORE: &str = "/build\n/dist\n";
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial APKLab project";

pub fn write_gitignore(project_dir: &Path) -> Result<()> {
    std::fs::write(project_dir.join(".gitignore"), GITIGNORE).context("Writing .gitignore")
}

/// Runs `git init`, then commits everything in the project.
/// `core.safecrlf` is disabled since decoded resources mix line endings.
pub fn init_repository(project_dir: &Path) -> ToolInvocation {
    let command = format!(
        "{} && git init && git config core.safecrlf false && git add -A && git commit -q -m",
        change_dir(project_dir)
    );

    ToolInvocation::new("Initializing Git", "Initializing project directory as a Git repository", command)
        .args([INITIAL_COMMIT_MESSAGE])
        .should_exist(project_dir.join(".git"))
        .shell()
}
