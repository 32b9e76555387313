//! Runs external tools one at a time, streaming their output into the log and deciding whether they succeeded.

use std::{
    fmt::Display,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use log::{error, info, warn};

use crate::host::{Host, NotifyLevel};

// How often a running child is checked for exit/cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Describes a single run of an external tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolInvocation {
    /// Name of the process, e.g. `Decoding`.
    pub name: String,
    /// Caption printed in the banner before the process output.
    pub report: String,
    /// The executable, or the whole command line prefix if `shell` is set.
    pub command: String,
    pub args: Vec<String>,
    /// A file or directory which must exist after the process exits for it to count as successful.
    pub should_exist: Option<PathBuf>,
    /// Run the command through the platform shell, needed when `command` is a compound expression.
    pub shell: bool,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, report: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            report: report.into(),
            command: command.into(),
            args: Vec::new(),
            should_exist: None,
            shell: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn should_exist(mut self, path: impl Into<PathBuf>) -> Self {
        self.should_exist = Some(path.into());
        self
    }

    pub fn shell(mut self) -> Self {
        self.shell = true;
        self
    }

    /// The command line as it would be typed, for the log.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }

    fn build_command(&self) -> Command {
        if !self.shell {
            let mut command = Command::new(&self.command);
            command.args(&self.args);
            return command;
        }

        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }

        if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(line);
            command
        } else {
            let mut command = Command::new("sh");
            command.arg("-c").arg(line);
            command
        }
    }
}

/// Quotes an argument so that the platform shell passes it through as a single word.
pub fn shell_quote(arg: &str) -> String {
    quote(arg, cfg!(windows))
}

/// `cd` into `dir`, switching drives too under `cmd`.
pub fn change_dir(dir: &Path) -> String {
    cd(dir, cfg!(windows))
}

fn quote(arg: &str, cmd: bool) -> String {
    let plain_symbols = if cmd { "-_./=:@,+" } else { "-_./=:@,+%" };
    let is_plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || plain_symbols.contains(c));
    if is_plain {
        return arg.to_string();
    }

    if cmd {
        // cmd expands %VAR% even between double quotes, but not a caret-escaped % outside them.
        format!("\"{}\"", arg.replace('"', "\\\"").replace('%', "\"^%\""))
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

fn cd(dir: &Path, cmd: bool) -> String {
    let dir = quote(&dir.to_string_lossy(), cmd);
    if cmd {
        format!("cd /d {dir}")
    } else {
        format!("cd {dir}")
    }
}

/// Why a process did not succeed.
#[derive(Clone, Debug, PartialEq)]
pub enum Failure {
    /// Exited with a non-zero code, or was killed by a signal (`None`).
    ExitCode(Option<i32>),
    /// Exited with code 0 but the path that should have been created does not exist.
    MissingOutput(PathBuf),
    /// The process could not be started at all.
    Spawn(String),
}

impl Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExitCode(Some(code)) => write!(f, "exited with code {code}"),
            Self::ExitCode(None) => write!(f, "was terminated by a signal"),
            Self::MissingOutput(path) => write!(f, "exited with code 0 but {path:?} does not exist"),
            Self::Spawn(err) => write!(f, "could not be started: {err}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Succeeded,
    Failed(Failure),
    Cancelled,
}

/// The result of running one [ToolInvocation].
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessResult {
    pub name: String,
    pub exit_code: Option<i32>,
    pub outcome: Outcome,
}

impl ProcessResult {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }

    /// A description of why the process did not succeed, or `None` if it did.
    pub fn reason(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Succeeded => None,
            Outcome::Failed(failure) => Some(failure.to_string()),
            Outcome::Cancelled => Some("was cancelled".to_string()),
        }
    }
}

/// Anything that can run a [ToolInvocation] to completion.
/// Pipelines depend on this rather than on [Executor] directly.
pub trait ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> ProcessResult;
}

/// A shared flag used to ask a running process to stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs processes for real, reporting results to the [Host].
pub struct Executor<'a> {
    host: &'a dyn Host,
    cancel: CancelToken,
}

impl<'a> Executor<'a> {
    pub fn new(host: &'a dyn Host, cancel: CancelToken) -> Self {
        Self { host, cancel }
    }

    fn finish(&self, invocation: &ToolInvocation, exit_code: Option<i32>, outcome: Outcome) -> ProcessResult {
        let name = &invocation.name;
        match &outcome {
            Outcome::Succeeded => {
                info!("{name} process was successful");
                self.host.notify(NotifyLevel::Info, &format!("{name} process was successful."));
            }
            Outcome::Failed(failure) => {
                error!("{name} process {failure}");
                self.host.notify(NotifyLevel::Error, &format!("{name} process failed."));
            }
            // Not a failure, so no notification.
            Outcome::Cancelled => info!("User canceled the {name} process"),
        }

        ProcessResult {
            name: name.clone(),
            exit_code,
            outcome,
        }
    }

    // Waits for the child to exit, killing it if cancellation is requested first.
    // Returns None if the child was cancelled.
    fn wait_or_cancel(&self, child: &mut std::process::Child) -> std::io::Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }

            if self.cancel.is_cancelled() {
                if let Err(err) = child.kill() {
                    // Can happen if the child exited between the two checks.
                    warn!("Failed to kill process: {err}");
                }
                child.wait()?;
                return Ok(None);
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ProcessRunner for Executor<'_> {
    fn run(&self, invocation: &ToolInvocation) -> ProcessResult {
        self.host.show_output();
        let separator = "-".repeat(invocation.report.len());
        info!("{separator}");
        info!("{}", invocation.report);
        info!("{separator}");
        info!("{}", invocation.command_line());

        if self.cancel.is_cancelled() {
            return self.finish(invocation, None, Outcome::Cancelled);
        }

        let mut child = match invocation
            .build_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return self.finish(invocation, None, Outcome::Failed(Failure::Spawn(err.to_string())))
            }
        };

        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(log_lines),
            child.stderr.take().map(log_lines),
        ]
        .into_iter()
        .flatten()
        .collect();

        let waited = self.wait_or_cancel(&mut child);
        // A cancelled shell may leave grandchildren holding the output pipes open, so only wait
        // for the readers to drain when the process exited by itself.
        if !matches!(waited, Ok(None)) {
            for reader in readers {
                let _ = reader.join();
            }
        }

        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => return self.finish(invocation, None, Outcome::Cancelled),
            Err(err) => {
                return self.finish(invocation, None, Outcome::Failed(Failure::Spawn(err.to_string())))
            }
        };

        let exit_code = status.code();
        let outcome = if !status.success() {
            Outcome::Failed(Failure::ExitCode(exit_code))
        } else {
            match &invocation.should_exist {
                Some(path) if !path.exists() => Outcome::Failed(Failure::MissingOutput(path.clone())),
                _ => Outcome::Succeeded,
            }
        };

        self.finish(invocation, exit_code, outcome)
    }
}

// Logs every line read from `stream` on a separate thread, trimmed of surrounding whitespace.
fn log_lines<R: Read + Send + 'static>(stream: R) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => info!("{}", String::from_utf8_lossy(&line).trim()),
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::host::{HighlightStyle, LineSpan};
    use std::cell::RefCell;

    /// Records everything sent to it.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub notifications: RefCell<Vec<(NotifyLevel, String)>>,
        pub highlights: RefCell<Vec<(PathBuf, HighlightStyle, Vec<LineSpan>)>>,
        pub revealed: RefCell<Vec<(PathBuf, usize)>>,
        pub opened: RefCell<Vec<PathBuf>>,
    }

    impl Host for RecordingHost {
        fn notify(&self, level: NotifyLevel, message: &str) {
            self.notifications.borrow_mut().push((level, message.to_string()));
        }

        fn highlight(&self, file: &Path, style: HighlightStyle, spans: &[LineSpan]) {
            self.highlights.borrow_mut().push((file.to_path_buf(), style, spans.to_vec()));
        }

        fn reveal_line(&self, file: &Path, line: usize) {
            self.revealed.borrow_mut().push((file.to_path_buf(), line));
        }

        fn open_folder(&self, path: &Path) {
            self.opened.borrow_mut().push(path.to_path_buf());
        }
    }

    #[test]
    fn plain_arguments_are_not_quoted() {
        assert_eq!(shell_quote("-a"), "-a");
        assert_eq!(shell_quote("/tmp/app.apk"), "/tmp/app.apk");
    }

    #[cfg(unix)]
    #[test]
    fn arguments_with_spaces_are_quoted() {
        assert_eq!(shell_quote("/tmp/my app.apk"), "'/tmp/my app.apk'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn cmd_quoting_keeps_percent_signs_literal() {
        assert_eq!(quote("100%", false), "100%");
        assert_eq!(quote("100%", true), r#""100"^%"""#);
        assert_eq!(quote(r"C:\apks\%TEMP%.apk", true), r#""C:\apks\"^%"TEMP"^%".apk""#);
        assert_eq!(quote(r#"say "hi""#, true), r#""say \"hi\"""#);
    }

    #[test]
    fn cmd_cd_switches_drives() {
        assert_eq!(cd(Path::new("/home/user/quark"), false), "cd /home/user/quark");
        assert_eq!(cd(Path::new(r"D:\quark rules"), true), r#"cd /d "D:\quark rules""#);
    }

    #[test]
    fn command_line_joins_arguments() {
        let invocation = ToolInvocation::new("Installing", "Installing app.apk", "adb")
            .args(["install", "-r", "app.apk"]);
        assert_eq!(invocation.command_line(), "adb install -r app.apk");
    }

    #[test]
    fn missing_executable_is_a_spawn_failure() {
        let host = RecordingHost::default();
        let executor = Executor::new(&host, CancelToken::new());
        let result = executor.run(&ToolInvocation::new(
            "Testing",
            "Running a missing tool",
            "apklab-definitely-not-a-real-binary",
        ));

        assert!(matches!(result.outcome, Outcome::Failed(Failure::Spawn(_))));
        let notifications = host.notifications.borrow();
        assert_eq!(notifications.as_slice(), &[(NotifyLevel::Error, "Testing process failed.".to_string())]);
    }

    #[test]
    fn already_cancelled_token_does_not_start_the_process() {
        let host = RecordingHost::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let executor = Executor::new(&host, cancel);

        let result = executor.run(&ToolInvocation::new("Testing", "Cancelled", "apklab-definitely-not-a-real-binary"));
        assert_eq!(result.outcome, Outcome::Cancelled);
        assert!(host.notifications.borrow().is_empty());
    }

    #[cfg(unix)]
    mod unix {
        use super::*;

        fn sh(script: &str) -> ToolInvocation {
            ToolInvocation::new("Testing", "Running a test script", "sh").args(["-c", script])
        }

        #[test]
        fn zero_exit_is_success() {
            let host = RecordingHost::default();
            let result = Executor::new(&host, CancelToken::new()).run(&sh("echo hello; echo oops >&2"));

            assert!(result.succeeded());
            assert_eq!(result.exit_code, Some(0));
            assert_eq!(
                host.notifications.borrow().as_slice(),
                &[(NotifyLevel::Info, "Testing process was successful.".to_string())]
            );
        }

        #[test]
        fn non_zero_exit_is_failure() {
            let host = RecordingHost::default();
            let result = Executor::new(&host, CancelToken::new()).run(&sh("exit 3"));

            assert_eq!(result.outcome, Outcome::Failed(Failure::ExitCode(Some(3))));
            assert_eq!(result.reason().unwrap(), "exited with code 3");
        }

        #[test]
        fn zero_exit_without_expected_output_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let expected = dir.path().join("apktool.yml");
            let host = RecordingHost::default();

            let result = Executor::new(&host, CancelToken::new()).run(&sh("exit 0").should_exist(&expected));
            assert_eq!(result.exit_code, Some(0));
            assert_eq!(result.outcome, Outcome::Failed(Failure::MissingOutput(expected)));
        }

        #[test]
        fn zero_exit_with_expected_output_is_success() {
            let dir = tempfile::tempdir().unwrap();
            let expected = dir.path().join("out.txt");
            let host = RecordingHost::default();

            let script = format!("echo done > {}", shell_quote(&expected.to_string_lossy()));
            let result = Executor::new(&host, CancelToken::new()).run(&sh(&script).should_exist(&expected));
            assert!(result.succeeded());
        }

        #[test]
        fn shell_mode_runs_compound_commands() {
            let dir = tempfile::tempdir().unwrap();
            let sub_dir = dir.path().join("with space");
            std::fs::create_dir(&sub_dir).unwrap();
            let host = RecordingHost::default();

            let invocation = ToolInvocation::new(
                "Testing",
                "Compound command",
                format!("cd {} && touch", shell_quote(&sub_dir.to_string_lossy())),
            )
            .args(["made by shell.txt"])
            .should_exist(sub_dir.join("made by shell.txt"))
            .shell();

            assert!(Executor::new(&host, CancelToken::new()).run(&invocation).succeeded());
        }

        #[test]
        fn cancelling_kills_a_running_process() {
            let host = RecordingHost::default();
            let cancel = CancelToken::new();
            let canceller = cancel.clone();
            let handle = std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(200));
                canceller.cancel();
            });

            let started = std::time::Instant::now();
            let result = Executor::new(&host, cancel).run(&sh("exec sleep 30"));
            handle.join().unwrap();

            assert_eq!(result.outcome, Outcome::Cancelled);
            assert!(started.elapsed() < Duration::from_secs(20));
            assert!(host.notifications.borrow().is_empty());
        }
    }
}
