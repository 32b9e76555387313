//! Runs the decode and rebuild pipelines against stand-in tools written as shell scripts.
#![cfg(unix)]

use std::{
    cell::RefCell,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use apklab_core::{
    host::{HighlightStyle, LineSpan, NotifyLevel},
    CancelToken, DecodeOptions, Executor, Host, Orchestrator, Settings,
};

// Stands in for `java -jar <apktool|uber-apk-signer> ...`.
const FAKE_JAVA: &str = r#"#!/bin/sh
jar="$2"
shift 2
case "$jar" in
  *apktool.jar)
    case "$1" in
      d)
        mkdir -p "$4"
        printf 'version: 2.9.3\napkFileName: %s\n' "$(basename "$2")" > "$4/apktool.yml"
        ;;
      b)
        name=$(sed -n 's/^apkFileName: //p' "$2/apktool.yml")
        mkdir -p "$2/dist"
        cp "$2/apktool.yml" "$2/dist/$name"
        ;;
      empty-framework-dir)
        echo "Removing framework files"
        ;;
      *)
        exit 3
        ;;
    esac
    ;;
  *uber-apk-signer.jar)
    [ -f "$2" ] || exit 1
    echo "Signed $2"
    ;;
  *)
    exit 2
    ;;
esac
"#;

#[derive(Default)]
struct TestHost {
    notifications: RefCell<Vec<(NotifyLevel, String)>>,
}

impl Host for TestHost {
    fn notify(&self, level: NotifyLevel, message: &str) {
        self.notifications.borrow_mut().push((level, message.to_string()));
    }

    fn highlight(&self, _file: &Path, _style: HighlightStyle, _spans: &[LineSpan]) {}

    fn reveal_line(&self, _file: &Path, _line: usize) {}

    fn open_folder(&self, _path: &Path) {}
}

struct Tools {
    dir: tempfile::TempDir,
    settings: Settings,
}

fn tools() -> Tools {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin");
    std::fs::create_dir(&bin).unwrap();

    let java = bin.join("java");
    std::fs::write(&java, FAKE_JAVA).unwrap();
    std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
    for jar in ["apktool.jar", "uber-apk-signer.jar"] {
        std::fs::write(bin.join(jar), "").unwrap();
    }

    let settings = Settings {
        java_path: Some(java.to_string_lossy().to_string()),
        apktool_path: bin.join("apktool.jar").to_string_lossy().to_string(),
        apk_signer_path: bin.join("uber-apk-signer.jar").to_string_lossy().to_string(),
        ..Default::default()
    };

    Tools { dir, settings }
}

fn sample_apk(dir: &Path, name: &str) -> PathBuf {
    let apk = dir.join(name);
    std::fs::write(&apk, b"PK\x03\x04").unwrap();
    apk
}

#[test]
fn decode_then_rebuild_round_trip() {
    let tools = tools();
    let apk = sample_apk(tools.dir.path(), "sample app.apk");
    let host = TestHost::default();
    let executor = Executor::new(&host, CancelToken::new());
    let orchestrator = Orchestrator::new(&tools.settings, &executor, &host);

    let decoded = orchestrator.decode(&apk, &DecodeOptions::default()).unwrap();
    assert!(decoded.completed, "{:?}", decoded.failed_stage());
    let project_dir = decoded.project_dir.unwrap();
    assert_eq!(project_dir, tools.dir.path().join("sample app"));

    let metadata = std::fs::read_to_string(project_dir.join("apktool.yml")).unwrap();
    assert!(metadata.lines().any(|line| line == "apkFileName: sample app.apk"));

    let rebuilt = orchestrator.rebuild(&project_dir.join("apktool.yml"), &[]).unwrap();
    assert!(rebuilt.completed, "{:?}", rebuilt.failed_stage());
    assert_eq!(rebuilt.stage_names(), ["Rebuilding", "Signing"]);
    let output_apk = project_dir.join("dist").join("sample app.apk");
    assert!(output_apk.is_file());
    assert_eq!(rebuilt.output_apk, Some(output_apk));

    assert_eq!(
        host.notifications.borrow().as_slice(),
        &[
            (NotifyLevel::Info, "Decoding process was successful.".to_string()),
            (NotifyLevel::Info, "Rebuilding process was successful.".to_string()),
            (NotifyLevel::Info, "Signing process was successful.".to_string()),
        ]
    );
}

#[test]
fn decoding_again_uses_a_new_directory() {
    let tools = tools();
    let apk = sample_apk(tools.dir.path(), "app.apk");
    let host = TestHost::default();
    let executor = Executor::new(&host, CancelToken::new());
    let orchestrator = Orchestrator::new(&tools.settings, &executor, &host);

    let first = orchestrator.decode(&apk, &DecodeOptions::default()).unwrap();
    let first_dir = first.project_dir.unwrap();
    std::fs::write(first_dir.join("notes.txt"), "keep me").unwrap();

    let second = orchestrator.decode(&apk, &DecodeOptions::default()).unwrap();
    assert!(second.completed);
    assert_eq!(second.project_dir, Some(tools.dir.path().join("app1")));
    assert_eq!(std::fs::read_to_string(first_dir.join("notes.txt")).unwrap(), "keep me");
}

#[test]
fn failing_tool_is_reported() {
    let mut tools = tools();
    let apk = sample_apk(tools.dir.path(), "app.apk");
    // The fake java exits with 2 for unknown jars.
    let other_jar = tools.dir.path().join("bin").join("other.jar");
    std::fs::write(&other_jar, "").unwrap();
    tools.settings.apktool_path = other_jar.to_string_lossy().to_string();

    let host = TestHost::default();
    let executor = Executor::new(&host, CancelToken::new());
    let report = Orchestrator::new(&tools.settings, &executor, &host)
        .decode(&apk, &DecodeOptions { decompile_java: false, ..Default::default() })
        .unwrap();

    assert!(!report.completed);
    let failed = report.failed_stage().unwrap();
    assert_eq!(failed.exit_code, Some(2));
    assert_eq!(
        host.notifications.borrow().as_slice(),
        &[(NotifyLevel::Error, "Decoding process failed.".to_string())]
    );
}

#[test]
fn empty_framework_dir_runs_apktool() {
    let tools = tools();
    let host = TestHost::default();
    let executor = Executor::new(&host, CancelToken::new());

    let report = Orchestrator::new(&tools.settings, &executor, &host)
        .empty_framework_dir()
        .unwrap();
    assert!(report.completed);
}
