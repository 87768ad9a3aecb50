//! External command execution behind an injectable seam.
//!
//! Installers and probes describe what to run with [`CommandSpec`] and hand it
//! to a [`CommandRunner`]. [`SystemRunner`] spawns real processes; tests swap
//! in a scripted runner.
use crate::error::{BootstrapError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// `sh -c <script>`, for pipelines such as `curl ... | gpg --dearmor`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Prefix with `sudo` unless already running as root.
    pub fn privileged(self, as_root: bool) -> Self {
        if as_root {
            return self;
        }
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
            cwd: self.cwd,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr (or stdout), for error messages.
    pub fn last_line(&self) -> &str {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .filter(|l| !l.trim().is_empty())
            .last()
            .unwrap_or("No output available")
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    /// A program that cannot be found is reported as `MissingTool`.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Whether `program` is available (absolute path or on PATH).
    async fn has_tool(&self, program: &str) -> bool;

    /// Run and turn a non-zero exit into a `Command` error.
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec).await?;
        if !output.success() {
            return Err(BootstrapError::Command(format!(
                "'{}' failed (exit {}): {}",
                spec,
                output.exit_code,
                output.last_line()
            )));
        }
        Ok(output)
    }
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("[SystemRunner] Running: {}", spec);

        let mut command = tokio::process::Command::new(&spec.program);
        command.args(&spec.args);
        // A caller's timeout drops this future; the child must not outlive it
        command.kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BootstrapError::missing_tool(&spec.program, "not found on PATH")
            } else {
                BootstrapError::Io(std::io::Error::other(format!(
                    "Failed to spawn '{}': {}",
                    spec, e
                )))
            }
        })?;

        let result = CommandOutput {
            // Killed by a signal: no code
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!("[SystemRunner] '{}' exited with {}", spec, result.exit_code);
        Ok(result)
    }

    async fn has_tool(&self, program: &str) -> bool {
        if program.contains('/') {
            return Path::new(program).exists();
        }

        tokio::process::Command::new("which")
            .arg(program)
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}
