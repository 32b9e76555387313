//! Chains the external tools together for each user action.
//! A stage only runs if every stage before it succeeded; a failed or cancelled stage ends the run.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, error, info};

use crate::{
    config::ConfigProvider,
    error::ApklabError,
    executor::{ProcessResult, ProcessRunner, ToolInvocation},
    host::{Host, NotifyLevel},
    mitm::{self, MitmOutcome},
    project_dir::allocate_project_dir,
    tools::{adb, apktool, git, jadx, quark, signer},
};

/// Which optional stages to run after decoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeOptions {
    pub decompile_java: bool,
    pub quark_analysis: bool,
    pub init_git: bool,
    pub open_workspace: bool,
    /// Extra arguments passed to `apktool d`.
    pub apktool_args: Vec<String>,
    /// Extra arguments passed to jadx.
    pub jadx_args: Vec<String>,
}

impl DecodeOptions {
    /// Options with git initialisation taken from the config, and everything else off.
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self {
            init_git: config.init_project_dir_as_git(),
            ..Default::default()
        }
    }
}

/// The results of the stages that were run, in order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineReport {
    pub project_dir: Option<PathBuf>,
    /// The APK produced by a rebuild.
    pub output_apk: Option<PathBuf>,
    pub stages: Vec<ProcessResult>,
    /// True if every stage that was asked for ran and succeeded.
    pub completed: bool,
}

impl PipelineReport {
    /// The stage that ended the run early, if any.
    pub fn failed_stage(&self) -> Option<&ProcessResult> {
        self.stages.iter().find(|stage| !stage.succeeded())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }

    // Runs the invocation and records its result. Returns false if the pipeline should stop.
    fn run(&mut self, runner: &dyn ProcessRunner, invocation: &ToolInvocation) -> bool {
        let result = runner.run(invocation);
        let succeeded = result.succeeded();
        if !succeeded {
            info!(
                "Stopping after {}: process {}",
                result.name,
                result.reason().unwrap_or_default()
            );
        }

        self.stages.push(result);
        succeeded
    }
}

pub struct Orchestrator<'a> {
    config: &'a dyn ConfigProvider,
    runner: &'a dyn ProcessRunner,
    host: &'a dyn Host,
    quark_probe: fn() -> bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a dyn ConfigProvider, runner: &'a dyn ProcessRunner, host: &'a dyn Host) -> Self {
        Self {
            config,
            runner,
            host,
            quark_probe: quark::probe_installed,
        }
    }

    /// Replaces the check used to decide whether quark is installed.
    pub fn with_quark_probe(mut self, probe: fn() -> bool) -> Self {
        self.quark_probe = probe;
        self
    }

    // Shows errors that stop a pipeline from starting (or a patch from completing) to the user.
    fn surface<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            error!("{err:#}");
            self.host.notify(NotifyLevel::Error, &err.to_string());
        }

        result
    }

    /// Decodes an APK into a new project directory next to it, then runs the optional stages.
    pub fn decode(&self, apk_path: &Path, options: &DecodeOptions) -> Result<PipelineReport> {
        self.surface(self.decode_inner(apk_path, options))
    }

    fn decode_inner(&self, apk_path: &Path, options: &DecodeOptions) -> Result<PipelineReport> {
        if !apk_path.is_file() {
            return Err(ApklabError::InvalidApk {
                path: apk_path.to_path_buf(),
                reason: "file does not exist",
            }
            .into());
        }

        let project_dir = allocate_project_dir(apk_path)?;

        // Every tool is checked before anything is run.
        let decode = apktool::decode(self.config, apk_path, &project_dir, &options.apktool_args)?;
        let decompile = if options.decompile_java {
            Some(jadx::decompile(self.config, apk_path, &project_dir, &options.jadx_args)?)
        } else {
            None
        };
        let analyze = if options.quark_analysis {
            if !(self.quark_probe)() {
                return Err(ApklabError::ToolMissing {
                    tool: "Quark-Engine",
                    path: quark::QUARK_EXE_NAME.to_string(),
                }
                .into());
            }
            Some(quark::analyze(self.config, apk_path, &project_dir))
        } else {
            None
        };

        let mut report = PipelineReport {
            project_dir: Some(project_dir.clone()),
            ..Default::default()
        };

        if !report.run(self.runner, &decode) {
            return Ok(report);
        }

        for invocation in [decompile, analyze].iter().flatten() {
            if !report.run(self.runner, invocation) {
                return Ok(report);
            }
        }

        if options.init_git {
            if let Err(err) = git::write_gitignore(&project_dir) {
                error!("Failed to initialize git: {err:#}");
                self.host.notify(NotifyLevel::Error, "Initializing Git process failed.");
                return Ok(report);
            }

            if !report.run(self.runner, &git::init_repository(&project_dir)) {
                return Ok(report);
            }
        } else {
            debug!("Not initializing {project_dir:?} as a git repository");
        }

        if options.open_workspace {
            self.host.open_folder(&project_dir);
        }

        report.completed = true;
        Ok(report)
    }

    /// Rebuilds a decoded project into `dist/<original name>` and signs the result.
    /// `project` may be the project directory or its `apktool.yml`.
    pub fn rebuild(&self, project: &Path, apktool_args: &[String]) -> Result<PipelineReport> {
        self.surface(self.rebuild_inner(project, apktool_args))
    }

    fn rebuild_inner(&self, project: &Path, apktool_args: &[String]) -> Result<PipelineReport> {
        let (project_dir, apktool_yml) = apktool::resolve_project(project);
        let apk_name = apktool::original_apk_name(&apktool_yml)?;
        let output_apk = apktool::built_apk_path(&project_dir, &apk_name);

        let build = apktool::build(self.config, &project_dir, &apk_name, apktool_args)?;
        let sign = signer::sign(self.config, &output_apk)?;

        let mut report = PipelineReport {
            project_dir: Some(project_dir),
            output_apk: Some(output_apk),
            ..Default::default()
        };

        report.completed = report.run(self.runner, &build) && report.run(self.runner, &sign);
        Ok(report)
    }

    /// Rebuilds and signs the project, then installs the result on the connected device.
    pub fn rebuild_and_install(&self, project: &Path, apktool_args: &[String]) -> Result<PipelineReport> {
        let mut report = self.rebuild(project, apktool_args)?;
        if !report.completed {
            return Ok(report);
        }

        let install = match report.output_apk.as_deref() {
            Some(apk) => self.surface(adb::install(apk))?,
            None => return Ok(report),
        };
        report.completed = report.run(self.runner, &install);
        Ok(report)
    }

    /// Applies the MITM patch to a decoded project.
    /// `project` may be the project directory or its `apktool.yml`.
    pub fn patch(&self, project: &Path) -> Result<MitmOutcome> {
        let (project_dir, _) = apktool::resolve_project(project);
        let outcome = self.surface(mitm::apply_mitm_patch(&project_dir))?;

        let message = if outcome.pinning_found() {
            format!(
                "Applied MITM patch, {} file(s) with certificate pinning patched",
                outcome.patched_files.len()
            )
        } else {
            "Applied MITM patch. No certificate pinning logic found.".to_string()
        };
        self.host.notify(NotifyLevel::Info, &message);

        Ok(outcome)
    }

    pub fn install(&self, apk_path: &Path) -> Result<PipelineReport> {
        let install = self.surface(adb::install(apk_path))?;

        let mut report = PipelineReport::default();
        report.completed = report.run(self.runner, &install);
        Ok(report)
    }

    /// Clears apktool's framework cache.
    pub fn empty_framework_dir(&self) -> Result<PipelineReport> {
        let invocation = self.surface(apktool::empty_framework_dir(self.config))?;

        let mut report = PipelineReport::default();
        report.completed = report.run(self.runner, &invocation);
        Ok(report)
    }
}
