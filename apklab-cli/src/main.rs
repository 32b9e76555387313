mod console_host;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use apklab_core::{
    navigator,
    pipeline::PipelineReport,
    report::{self, render_summary},
    tools::quark::QUARK_REPORT_FILENAME,
    CancelToken, DecodeOptions, Executor, Orchestrator, Settings,
};
use clap::{Parser, Subcommand};
use console_host::ConsoleHost;
use log::info;

#[derive(Parser)]
#[command(version, long_about = None)]
#[command(arg_required_else_help = true)]
#[command(about = "Decode, analyze, patch, rebuild and install Android apps")]
struct Cli {
    /// Settings file to use instead of ~/.apklab/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Java runtime used to run apktool and the APK signer
    #[arg(long, global = true)]
    java_path: Option<String>,
    /// Path of the apktool JAR
    #[arg(long, global = true)]
    apktool: Option<String>,
    /// Directory jadx was extracted to
    #[arg(long, global = true)]
    jadx_dir: Option<String>,
    /// Path of the uber-apk-signer JAR
    #[arg(long, global = true)]
    apk_signer: Option<String>,
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decodes an APK into a new project directory next to it
    Decode {
        apk: PathBuf,
        /// Also decompile to Java source with jadx
        #[arg(short = 'j', long)]
        decompile: bool,
        /// Also analyze the APK with Quark-Engine
        #[arg(short, long)]
        quark: bool,
        /// Don't initialize the project as a git repository
        #[arg(long)]
        no_git: bool,
        /// Print the project directory once everything has finished
        #[arg(long)]
        open: bool,
        /// Extra argument for apktool, may be repeated
        #[arg(long = "apktool-arg", allow_hyphen_values = true)]
        apktool_args: Vec<String>,
        /// Extra argument for jadx, may be repeated
        #[arg(long = "jadx-arg", allow_hyphen_values = true)]
        jadx_args: Vec<String>,
    },
    /// Rebuilds and signs a decoded project (the directory or its apktool.yml)
    Rebuild {
        project: PathBuf,
        /// Install the signed APK on the connected device afterwards
        #[arg(short, long)]
        install: bool,
        /// Extra argument for apktool, may be repeated
        #[arg(long = "apktool-arg", allow_hyphen_values = true)]
        apktool_args: Vec<String>,
    },
    /// Patches a decoded project to trust user certificates and disable certificate pinning
    Patch { project: PathBuf },
    /// Installs an APK on the connected device
    Install { apk: PathBuf },
    /// Summarizes a Quark-Engine report
    Report {
        report: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Shows where an API call from the Quark report of a project occurs
    Navigate {
        project: PathBuf,
        /// Id of the API call, as shown by `report`, e.g. c3-f0
        call_id: String,
        /// Report to read, defaults to quarkReport.json in the project
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Clears apktool's framework directory
    EmptyFramework,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load_or_default(cli.config.as_deref()).context("Loading settings")?;
    if let Some(java) = &cli.java_path {
        settings.java_path = Some(java.clone());
    }
    if let Some(apktool) = &cli.apktool {
        settings.apktool_path = apktool.clone();
    }
    if let Some(jadx_dir) = &cli.jadx_dir {
        settings.jadx_dir_path = jadx_dir.clone();
    }
    if let Some(apk_signer) = &cli.apk_signer {
        settings.apk_signer_path = apk_signer.clone();
    }

    Ok(settings)
}

// Turns an incomplete pipeline into an error, so that the exit code reflects it.
fn check_completed(report: PipelineReport) -> Result<()> {
    if report.completed {
        return Ok(());
    }

    match report.failed_stage() {
        Some(stage) => Err(anyhow!(
            "{} process {}",
            stage.name,
            stage.reason().unwrap_or_default()
        )),
        None => Err(anyhow!("Pipeline did not complete")),
    }
}

fn navigate(project: &Path, call_id: &str, report_path: Option<PathBuf>) -> Result<()> {
    let report_path = report_path.unwrap_or_else(|| project.join(QUARK_REPORT_FILENAME));
    let summary = report::load_report(&report_path)?;
    let (crime, call) = summary
        .api_call(call_id)
        .ok_or_else(|| anyhow!("No API call with id {call_id} in {report_path:?}"))?;

    info!("{}: {}", crime.id, crime.crime);
    navigator::navigate(project, call, &ConsoleHost)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .init();

    let settings = load_settings(&cli)?;
    let host = ConsoleHost;

    let cancel = CancelToken::new();
    let canceller = cancel.clone();
    ctrlc::set_handler(move || canceller.cancel()).context("Setting Ctrl+C handler")?;

    let executor = Executor::new(&host, cancel);
    let orchestrator = Orchestrator::new(&settings, &executor, &host);

    match cli.command {
        Commands::Decode { apk, decompile, quark, no_git, open, apktool_args, jadx_args } => {
            let options = DecodeOptions {
                decompile_java: decompile,
                quark_analysis: quark,
                init_git: !no_git && DecodeOptions::from_config(&settings).init_git,
                open_workspace: open,
                apktool_args,
                jadx_args,
            };
            check_completed(orchestrator.decode(&apk, &options)?)?;
        }
        Commands::Rebuild { project, install, apktool_args } => {
            let report = if install {
                orchestrator.rebuild_and_install(&project, &apktool_args)?
            } else {
                orchestrator.rebuild(&project, &apktool_args)?
            };
            if let Some(apk) = report.output_apk.as_ref().filter(|_| report.completed) {
                info!("Signed APK: {}", apk.display());
            }
            check_completed(report)?;
        }
        Commands::Patch { project } => {
            orchestrator.patch(&project)?;
        }
        Commands::Install { apk } => check_completed(orchestrator.install(&apk)?)?,
        Commands::Report { report: report_path, json } => {
            let summary = report::load_report(&report_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary).context("Serializing report")?);
            } else {
                print!("{}", render_summary(&summary));
            }
        }
        Commands::Navigate { project, call_id, report: report_path } => {
            navigate(&project, &call_id, report_path)?
        }
        Commands::EmptyFramework => check_completed(orchestrator.empty_framework_dir()?)?,
    }

    Ok(())
}
