mod common;

use common::FakeRunner;
use stackup::config::RuntimeConfig;
use stackup::runtime_env::DependencyManifest;
use stackup::{
    BootstrapError, FixedAnswer, ProjectRoot, RuntimeEnvironmentInstaller, StepAction, UseDefaults,
    Version,
};
use std::path::Path;
use std::sync::Arc;

const PYPROJECT: &str = r#"
[project]
name = "kosmos"
version = "0.1.0"

[project.optional-dependencies]
dev = ["pytest"]
"#;

/// Runner that behaves like a host with `python3.11` installed; `-m venv`
/// lays down an interpreter inside the environment.
fn python_host(root: &ProjectRoot, version: &str) -> Arc<FakeRunner> {
    let runner = FakeRunner::with_tools(&["python3.11"]);
    runner.respond("python3.11 --version", 0, &format!("Python {}", version));
    runner.respond("python3.11 -m pip --version", 0, "pip 24.0 from /usr/lib/python3");

    let venv_python = root.join("venv").join("bin").join("python");
    runner.on_success("python3.11 -m venv", move || {
        std::fs::create_dir_all(venv_python.parent().unwrap()).unwrap();
        std::fs::write(&venv_python, "").unwrap();
    });
    Arc::new(runner)
}

fn snapshot(dir: &Path) -> Vec<String> {
    let mut entries: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    entries
}

#[tokio::test]
async fn test_second_run_reuses_everything() {
    let (_dir, root) = common::temp_project();
    common::write(&root, "pyproject.toml", PYPROJECT);
    common::write(&root, ".env.example", "NEO4J_PASSWORD=changeme\n");
    let runner = python_host(&root, "3.11.4");

    let installer = RuntimeEnvironmentInstaller::new(
        root.clone(),
        RuntimeConfig::default(),
        runner.clone(),
        Arc::new(UseDefaults),
    );

    let first = installer.run().await.expect("first run");
    assert_eq!(first.step("virtual environment").unwrap().action, StepAction::Created);
    assert_eq!(first.step("configuration").unwrap().action, StepAction::Created);
    assert_eq!(first.step("directory data").unwrap().action, StepAction::Created);
    let after_first = snapshot(root.path());

    let second = installer.run().await.expect("second run");
    assert_eq!(second.step("virtual environment").unwrap().action, StepAction::Reused);
    assert_eq!(second.step("configuration").unwrap().action, StepAction::Reused);
    assert!(second
        .steps
        .iter()
        .filter(|s| s.target.starts_with("directory "))
        .all(|s| s.action == StepAction::Reused));
    assert_eq!(snapshot(root.path()), after_first);

    let venv_creations = runner
        .calls()
        .iter()
        .filter(|c| c.starts_with("python3.11 -m venv"))
        .count();
    assert_eq!(venv_creations, 1, "environment must not be recreated without a prompt");
}

#[tokio::test]
async fn test_recreate_on_confirmation() {
    let (_dir, root) = common::temp_project();
    let runner = python_host(&root, "3.12.1");
    let config = RuntimeConfig::default();

    RuntimeEnvironmentInstaller::new(root.clone(), config.clone(), runner.clone(), Arc::new(UseDefaults))
        .run()
        .await
        .unwrap();

    let summary =
        RuntimeEnvironmentInstaller::new(root.clone(), config, runner.clone(), Arc::new(FixedAnswer(true)))
            .run()
            .await
            .unwrap();
    assert_eq!(
        summary.step("virtual environment").unwrap().action,
        StepAction::Recreated
    );
}

#[tokio::test]
async fn test_too_old_runtime_is_fatal() {
    let (_dir, root) = common::temp_project();
    let runner = python_host(&root, "3.10.12");

    let err = RuntimeEnvironmentInstaller::new(root.clone(), RuntimeConfig::default(), runner.clone(), Arc::new(UseDefaults))
        .run()
        .await
        .unwrap_err();

    match err {
        BootstrapError::VersionTooOld { found, required, .. } => {
            assert_eq!(found, Version::new(3, 10, 12));
            assert_eq!(required, Version::new(3, 11, 0));
        }
        other => panic!("expected VersionTooOld, got {:?}", other),
    }
    assert!(!root.join("venv").exists());
    assert!(!runner.was_called("python3.11 -m venv"));
}

#[tokio::test]
async fn test_missing_runtime_is_fatal() {
    let (_dir, root) = common::temp_project();
    let runner = Arc::new(FakeRunner::new());

    let err = RuntimeEnvironmentInstaller::new(root, RuntimeConfig::default(), runner, Arc::new(UseDefaults))
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::MissingTool { .. }));
}

#[tokio::test]
async fn test_prefers_pyproject_with_dev_extra() {
    let (_dir, root) = common::temp_project();
    common::write(&root, "pyproject.toml", PYPROJECT);
    common::write(&root, "requirements.txt", "requests\n");
    let runner = python_host(&root, "3.11.4");

    let installer = RuntimeEnvironmentInstaller::new(
        root.clone(),
        RuntimeConfig::default(),
        runner.clone(),
        Arc::new(UseDefaults),
    );
    assert_eq!(
        installer.detect_manifest(),
        DependencyManifest::Pyproject {
            extra: Some("dev".to_string())
        }
    );

    installer.run().await.unwrap();
    let python = installer.venv_python().to_string_lossy().into_owned();
    assert!(runner.was_called(&format!("{} -m pip install -e .[dev]", python)));
    assert!(!runner.was_called(&format!("{} -m pip install -r", python)));
}

#[tokio::test]
async fn test_no_manifest_and_no_template_warn() {
    let (_dir, root) = common::temp_project();
    let runner = python_host(&root, "3.11.4");

    let summary = RuntimeEnvironmentInstaller::new(root, RuntimeConfig::default(), runner, Arc::new(UseDefaults))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.step("dependencies").unwrap().action, StepAction::Warned);
    assert_eq!(summary.step("configuration").unwrap().action, StepAction::Warned);
    assert_eq!(summary.step("migrations").unwrap().action, StepAction::Skipped);
}

#[tokio::test]
async fn test_failed_import_is_informational() {
    let (_dir, root) = common::temp_project();
    let runner = python_host(&root, "3.11.4");
    let installer = RuntimeEnvironmentInstaller::new(
        root.clone(),
        RuntimeConfig::default(),
        runner.clone(),
        Arc::new(UseDefaults),
    );
    let python = installer.venv_python().to_string_lossy().into_owned();
    runner.fail(
        &format!("{} -c import neo4j", python),
        "ModuleNotFoundError: No module named 'neo4j'",
    );

    let summary = installer.run().await.unwrap();
    let step = summary.step("import neo4j").unwrap();
    assert_eq!(step.action, StepAction::Skipped);
    assert!(step.detail.contains("ModuleNotFoundError"));
    assert_eq!(summary.step("import pydantic").unwrap().action, StepAction::Verified);
}

/// An operator who never answers.
struct Unanswered;

#[async_trait::async_trait]
impl stackup::ConfirmationPolicy for Unanswered {
    async fn confirm(&self, _question: &str, _default: bool) -> bool {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_pending_prompt_can_be_cancelled() {
    let (_dir, root) = common::temp_project();
    let runner = python_host(&root, "3.11.4");
    let config = RuntimeConfig::default();

    RuntimeEnvironmentInstaller::new(root.clone(), config.clone(), runner.clone(), Arc::new(UseDefaults))
        .run()
        .await
        .unwrap();

    // Existing environment: the recreate prompt is reached and waits
    let installer = RuntimeEnvironmentInstaller::new(root.clone(), config, runner.clone(), Arc::new(Unanswered));
    let waited = tokio::time::timeout(std::time::Duration::from_millis(200), installer.run()).await;

    assert!(waited.is_err(), "run must stay cancellable while a prompt is open");
    assert!(root.join("venv").join("bin").join("python").exists());
}
