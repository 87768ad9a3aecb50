//! RuntimeEnvironmentInstaller: language runtime, isolated dependency
//! environment, project dependencies, default configuration and working
//! directories.
use crate::command::{CommandRunner, CommandSpec};
use crate::config::RuntimeConfig;
use crate::confirm::ConfirmationPolicy;
use crate::envfile::{materialize_from_template, Materialized};
use crate::error::{BootstrapError, Result};
use crate::project::ProjectRoot;
use crate::target::{SetupSummary, StepAction, TargetStatus};
use crate::version::Version;
use std::path::PathBuf;
use std::sync::Arc;

const COMPONENT: &str = "RuntimeEnv";

/// A discovered interpreter that passed the version gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub version: Version,
}

/// How project dependencies get installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyManifest {
    /// `pyproject.toml`, installed editable; `extra` when the dev group exists
    Pyproject { extra: Option<String> },
    /// Flat `requirements.txt`
    Requirements,
    None,
}

pub struct RuntimeEnvironmentInstaller {
    root: ProjectRoot,
    config: RuntimeConfig,
    runner: Arc<dyn CommandRunner>,
    confirm: Arc<dyn ConfirmationPolicy>,
}

impl RuntimeEnvironmentInstaller {
    pub fn new(
        root: ProjectRoot,
        config: RuntimeConfig,
        runner: Arc<dyn CommandRunner>,
        confirm: Arc<dyn ConfirmationPolicy>,
    ) -> Self {
        Self {
            root,
            config,
            runner,
            confirm,
        }
    }

    /// Run every step. Too-old or missing runtime, missing package manager
    /// and failed dependency installation are fatal; the rest degrade to
    /// warnings in the returned summary.
    pub async fn run(&self) -> Result<SetupSummary> {
        tracing::info!(
            "[{}] Setting up runtime environment in {}",
            COMPONENT,
            self.root.path().display()
        );
        let mut summary = SetupSummary::new(COMPONENT);

        let interpreter = self.discover_runtime(&mut summary).await?;
        self.check_package_manager(&interpreter, &mut summary)
            .await?;
        self.ensure_environment(&interpreter, &mut summary).await?;
        self.upgrade_pip(&mut summary).await;
        self.install_dependencies(&mut summary).await?;
        self.materialize_config(&mut summary)?;
        self.scaffold_directories(&mut summary)?;
        self.verify_imports(&mut summary).await;
        self.run_migrations(&mut summary).await;

        tracing::info!("[{}] Runtime environment ready", COMPONENT);
        Ok(summary)
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.root.join(&self.config.venv_dir)
    }

    /// Executable inside the environment's script directory.
    pub fn venv_tool(&self, name: &str) -> PathBuf {
        if cfg!(windows) {
            self.venv_dir().join("Scripts").join(format!("{}.exe", name))
        } else {
            self.venv_dir().join("bin").join(name)
        }
    }

    pub fn venv_python(&self) -> PathBuf {
        self.venv_tool("python")
    }

    fn venv_python_program(&self) -> String {
        self.venv_python().to_string_lossy().into_owned()
    }

    /// First candidate interpreter at or above the minimum version.
    async fn discover_runtime(&self, summary: &mut SetupSummary) -> Result<Interpreter> {
        let minimum = self.config.min_version;
        let mut newest_too_old: Option<Interpreter> = None;

        for candidate in &self.config.interpreters {
            if !self.runner.has_tool(candidate).await {
                tracing::debug!("[{}] Interpreter {} not on PATH", COMPONENT, candidate);
                continue;
            }

            let output = match self
                .runner
                .run(&CommandSpec::new(candidate.as_str()).arg("--version"))
                .await
            {
                Ok(o) => o,
                Err(e) => {
                    tracing::debug!("[{}] {} --version failed: {}", COMPONENT, candidate, e);
                    continue;
                }
            };

            // Older interpreters print the version on stderr
            let text = format!("{}\n{}", output.stdout, output.stderr);
            let Some(version) = Version::extract(&text) else {
                tracing::warn!(
                    "[{}] Could not parse version from {} output: {}",
                    COMPONENT,
                    candidate,
                    text.trim()
                );
                continue;
            };

            let found = Interpreter {
                program: candidate.clone(),
                version,
            };
            if version.satisfies(&minimum) {
                summary.record(
                    "runtime",
                    TargetStatus::PresentValid,
                    StepAction::Verified,
                    format!("{} {} (>= {})", found.program, version, minimum),
                );
                return Ok(found);
            }

            tracing::warn!(
                "[{}] {} is {}, below required {}",
                COMPONENT,
                candidate,
                version,
                minimum
            );
            if newest_too_old
                .as_ref()
                .map_or(true, |prev| version > prev.version)
            {
                newest_too_old = Some(found);
            }
        }

        match newest_too_old {
            Some(old) => Err(BootstrapError::VersionTooOld {
                name: old.program,
                found: old.version,
                required: minimum,
            }),
            None => Err(BootstrapError::missing_tool(
                &self.config.interpreters.join(" / "),
                &format!("install Python {} or newer", minimum),
            )),
        }
    }

    async fn check_package_manager(
        &self,
        interpreter: &Interpreter,
        summary: &mut SetupSummary,
    ) -> Result<()> {
        let spec = CommandSpec::new(interpreter.program.as_str()).args(["-m", "pip", "--version"]);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(BootstrapError::missing_tool(
                "pip",
                &format!(
                    "{} -m pip is unavailable; install python3-pip",
                    interpreter.program
                ),
            ));
        }
        let detail = output.stdout.lines().next().unwrap_or("pip").trim().to_string();
        summary.record(
            "package manager",
            TargetStatus::PresentValid,
            StepAction::Verified,
            detail,
        );
        Ok(())
    }

    /// Reuse an existing environment unless the operator asks to recreate it.
    async fn ensure_environment(
        &self,
        interpreter: &Interpreter,
        summary: &mut SetupSummary,
    ) -> Result<()> {
        let venv_dir = self.venv_dir();
        let venv_name = self.config.venv_dir.display().to_string();

        if venv_dir.exists() {
            if !self.venv_python().exists() {
                tracing::warn!(
                    "[{}] {} exists but has no interpreter, recreating",
                    COMPONENT,
                    venv_name
                );
                std::fs::remove_dir_all(&venv_dir)?;
                self.create_environment(interpreter).await?;
                summary.record(
                    "virtual environment",
                    TargetStatus::PresentStale,
                    StepAction::Recreated,
                    format!("{} was missing its interpreter", venv_name),
                );
                return Ok(());
            }

            let question = format!(
                "Virtual environment '{}' already exists. Recreate it? Installed packages will be lost.",
                venv_name
            );
            if self.confirm.confirm(&question, false).await {
                std::fs::remove_dir_all(&venv_dir)?;
                self.create_environment(interpreter).await?;
                summary.record(
                    "virtual environment",
                    TargetStatus::PresentValid,
                    StepAction::Recreated,
                    venv_name,
                );
            } else {
                summary.record(
                    "virtual environment",
                    TargetStatus::PresentValid,
                    StepAction::Reused,
                    format!("keeping existing {}", venv_name),
                );
            }
            return Ok(());
        }

        self.create_environment(interpreter).await?;
        summary.record(
            "virtual environment",
            TargetStatus::Absent,
            StepAction::Created,
            format!("{} with {} {}", venv_name, interpreter.program, interpreter.version),
        );
        Ok(())
    }

    async fn create_environment(&self, interpreter: &Interpreter) -> Result<()> {
        let spec = CommandSpec::new(interpreter.program.as_str())
            .args(["-m", "venv"])
            .arg(self.venv_dir().to_string_lossy())
            .current_dir(self.root.path());
        self.runner.run_checked(&spec).await?;
        Ok(())
    }

    async fn upgrade_pip(&self, summary: &mut SetupSummary) {
        let spec = CommandSpec::new(self.venv_python_program())
            .args(["-m", "pip", "install", "--upgrade", "pip"])
            .current_dir(self.root.path());
        match self.runner.run_checked(&spec).await {
            Ok(_) => summary.record(
                "pip upgrade",
                TargetStatus::PresentValid,
                StepAction::Verified,
                "pip is up to date",
            ),
            Err(e) => summary.record(
                "pip upgrade",
                TargetStatus::PresentStale,
                StepAction::Warned,
                format!("could not upgrade pip: {}", e),
            ),
        }
    }

    /// Inspect the project for a dependency manifest.
    pub fn detect_manifest(&self) -> DependencyManifest {
        let pyproject = self.root.join("pyproject.toml");
        if pyproject.exists() {
            let extra = match std::fs::read_to_string(&pyproject)
                .map_err(|e| e.to_string())
                .and_then(|s| toml::from_str::<toml::Table>(&s).map_err(|e| e.to_string()))
            {
                Ok(table) => declares_extra(&table, &self.config.dev_extra)
                    .then(|| self.config.dev_extra.clone()),
                Err(e) => {
                    tracing::warn!(
                        "[{}] Could not parse pyproject.toml ({}), installing without extras",
                        COMPONENT,
                        e
                    );
                    None
                }
            };
            return DependencyManifest::Pyproject { extra };
        }
        if self.root.join("requirements.txt").exists() {
            return DependencyManifest::Requirements;
        }
        DependencyManifest::None
    }

    async fn install_dependencies(&self, summary: &mut SetupSummary) -> Result<()> {
        let base = CommandSpec::new(self.venv_python_program())
            .args(["-m", "pip", "install"])
            .current_dir(self.root.path());

        let (spec, detail) = match self.detect_manifest() {
            DependencyManifest::Pyproject { extra: Some(extra) } => {
                let target = format!(".[{}]", extra);
                (base.arg("-e").arg(&target), format!("editable install of {}", target))
            }
            DependencyManifest::Pyproject { extra: None } => (
                base.args(["-e", "."]),
                "editable install of pyproject.toml".to_string(),
            ),
            DependencyManifest::Requirements => (
                base.args(["-r", "requirements.txt"]),
                "requirements.txt".to_string(),
            ),
            DependencyManifest::None => {
                summary.record(
                    "dependencies",
                    TargetStatus::Absent,
                    StepAction::Warned,
                    "no pyproject.toml or requirements.txt found",
                );
                return Ok(());
            }
        };

        tracing::info!("[{}] Installing dependencies: {}", COMPONENT, detail);
        self.runner.run_checked(&spec).await?;
        summary.record(
            "dependencies",
            TargetStatus::PresentValid,
            StepAction::Installed,
            detail,
        );
        Ok(())
    }

    fn materialize_config(&self, summary: &mut SetupSummary) -> Result<()> {
        let env_file = self.root.env_file();
        match materialize_from_template(&self.root.env_template(), &env_file)? {
            Materialized::AlreadyPresent => summary.record(
                "configuration",
                TargetStatus::PresentValid,
                StepAction::Reused,
                ".env already present, left untouched",
            ),
            Materialized::Created => {
                summary.record(
                    "configuration",
                    TargetStatus::Absent,
                    StepAction::Created,
                    ".env copied from .env.example",
                );
                summary.record(
                    "configuration secrets",
                    TargetStatus::PresentStale,
                    StepAction::Warned,
                    format!(
                        "{} holds template placeholders; fill in API keys and passwords before starting the stack",
                        env_file.display()
                    ),
                );
            }
            Materialized::NoTemplate => summary.record(
                "configuration",
                TargetStatus::Absent,
                StepAction::Warned,
                "neither .env nor .env.example exists; create .env before starting the stack",
            ),
        }
        Ok(())
    }

    fn scaffold_directories(&self, summary: &mut SetupSummary) -> Result<()> {
        for dir in &self.config.directories {
            let path = self.root.join(dir);
            let target = format!("directory {}", dir.display());
            if path.is_dir() {
                summary.record(target, TargetStatus::PresentValid, StepAction::Reused, "exists");
                continue;
            }
            std::fs::create_dir_all(&path)?;
            summary.record(
                target,
                TargetStatus::Absent,
                StepAction::Created,
                path.display().to_string(),
            );
        }
        Ok(())
    }

    /// Best-effort import checks; failures are informational.
    async fn verify_imports(&self, summary: &mut SetupSummary) {
        let modules = std::iter::once(&self.config.package).chain(&self.config.critical_imports);
        for module in modules {
            let spec = CommandSpec::new(self.venv_python_program())
                .arg("-c")
                .arg(format!("import {}", module))
                .current_dir(self.root.path());
            let target = format!("import {}", module);
            match self.runner.run(&spec).await {
                Ok(output) if output.success() => summary.record(
                    target,
                    TargetStatus::PresentValid,
                    StepAction::Verified,
                    "importable",
                ),
                Ok(output) => summary.record(
                    target,
                    TargetStatus::Absent,
                    StepAction::Skipped,
                    format!("not importable (informational): {}", output.last_line()),
                ),
                Err(e) => summary.record(
                    target,
                    TargetStatus::Absent,
                    StepAction::Skipped,
                    format!("check unavailable (informational): {}", e),
                ),
            }
        }
    }

    /// Apply database migrations when the migration tool is installed.
    async fn run_migrations(&self, summary: &mut SetupSummary) {
        let alembic = self.venv_tool("alembic");
        let alembic_program = alembic.to_string_lossy().into_owned();
        if !self.root.join("alembic.ini").exists() {
            summary.record(
                "migrations",
                TargetStatus::Absent,
                StepAction::Skipped,
                "no alembic.ini in project",
            );
            return;
        }
        if !self.runner.has_tool(&alembic_program).await {
            summary.record(
                "migrations",
                TargetStatus::Absent,
                StepAction::Skipped,
                "migration tool not installed",
            );
            return;
        }

        let spec = CommandSpec::new(alembic_program)
            .args(["upgrade", "head"])
            .current_dir(self.root.path());
        match self.runner.run_checked(&spec).await {
            Ok(_) => summary.record(
                "migrations",
                TargetStatus::PresentValid,
                StepAction::Verified,
                "database schema at head",
            ),
            Err(e) => summary.record(
                "migrations",
                TargetStatus::PresentStale,
                StepAction::Warned,
                format!("migration failed: {}", e),
            ),
        }
    }
}

/// Whether `[project.optional-dependencies]` declares `extra`.
fn declares_extra(pyproject: &toml::Table, extra: &str) -> bool {
    pyproject
        .get("project")
        .and_then(|p| p.get("optional-dependencies"))
        .and_then(|deps| deps.get(extra))
        .is_some()
}
