//! ContainerEngineInstaller: container engine and compose plugin on a WSL2
//! host.
//!
//! Steps:
//! - confirm the host signature before touching system packages
//! - reuse an existing engine (start its daemon, offer reinstall)
//! - register the vendor signing key and repository
//! - install engine, CLI, runtime shim and compose plugin in one transaction
//! - add the invoking user to the engine group and start the daemon
//! - verify binary, daemon, compose plugin and a smoke-test container
use crate::command::{CommandRunner, CommandSpec};
use crate::config::EngineConfig;
use crate::confirm::ConfirmationPolicy;
use crate::error::{BootstrapError, Result};
use crate::poll::{poll_until, PollPolicy};
use crate::project::ProjectRoot;
use crate::target::{SetupSummary, StepAction, TargetStatus};
use std::sync::Arc;
use std::time::Duration;

const COMPONENT: &str = "EngineInstall";

/// How long to wait for the daemon after asking it to start.
const DAEMON_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DAEMON_POLL_CEILING: Duration = Duration::from_secs(15);

/// Who is running the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    /// Invoking user; under sudo this is the original user
    pub user: Option<String>,
    pub is_root: bool,
}

impl HostIdentity {
    pub fn detect() -> Self {
        let user = std::env::var("SUDO_USER")
            .or_else(|_| std::env::var("USER"))
            .ok()
            .filter(|u| !u.is_empty());
        Self {
            user,
            is_root: nix::unistd::Uid::effective().is_root(),
        }
    }

    /// The non-root user to add to the engine group, if any.
    pub fn group_member(&self) -> Option<&str> {
        self.user.as_deref().filter(|u| *u != "root")
    }
}

pub struct ContainerEngineInstaller {
    root: ProjectRoot,
    config: EngineConfig,
    identity: HostIdentity,
    runner: Arc<dyn CommandRunner>,
    confirm: Arc<dyn ConfirmationPolicy>,
    daemon_poll: PollPolicy,
}

impl ContainerEngineInstaller {
    pub fn new(
        root: ProjectRoot,
        config: EngineConfig,
        identity: HostIdentity,
        runner: Arc<dyn CommandRunner>,
        confirm: Arc<dyn ConfirmationPolicy>,
    ) -> Self {
        Self {
            root,
            config,
            identity,
            runner,
            confirm,
            daemon_poll: PollPolicy::new(DAEMON_POLL_INTERVAL, DAEMON_POLL_CEILING),
        }
    }

    pub fn with_daemon_poll(mut self, policy: PollPolicy) -> Self {
        self.daemon_poll = policy;
        self
    }

    pub async fn run(&self) -> Result<SetupSummary> {
        let mut summary = SetupSummary::new(COMPONENT);

        self.check_host(&mut summary).await?;

        if self.runner.has_tool(&self.config.binary).await {
            let version = self.engine_version().await?;
            summary.record(
                "container engine",
                TargetStatus::PresentValid,
                StepAction::Verified,
                version,
            );
            // Dead daemon is fatal only once the reinstall is declined
            let daemon = self.ensure_daemon(&mut summary).await;
            if let Err(e) = &daemon {
                summary.record(
                    "engine daemon",
                    TargetStatus::PresentStale,
                    StepAction::Warned,
                    e.to_string(),
                );
            }

            let question = match &daemon {
                Ok(()) => format!("{} is already installed. Reinstall it?", self.config.binary),
                Err(_) => format!(
                    "{} is installed but its daemon does not respond. Reinstall it?",
                    self.config.binary
                ),
            };
            if !self.confirm.confirm(&question, false).await {
                daemon?;
                summary.record(
                    "reinstall",
                    TargetStatus::PresentValid,
                    StepAction::Skipped,
                    "keeping existing installation",
                );
                self.verify(&mut summary).await?;
                return Ok(summary);
            }
            tracing::info!("[{}] Reinstalling {}", COMPONENT, self.config.binary);
        } else {
            tracing::info!(
                "[{}] {} not found, installing",
                COMPONENT,
                self.config.binary
            );
        }

        self.install_prerequisites(&mut summary).await?;
        self.configure_repository(&mut summary).await?;
        self.install_engine(&mut summary).await?;
        self.post_install(&mut summary).await?;
        self.verify(&mut summary).await?;

        Ok(summary)
    }

    /// Refuse to touch system packages on an unrecognized host unless the
    /// operator overrides.
    async fn check_host(&self, summary: &mut SetupSummary) -> Result<()> {
        let path = &self.config.host_signature_file;
        let signature = std::fs::read_to_string(path).unwrap_or_else(|e| {
            tracing::warn!("[{}] Cannot read {}: {}", COMPONENT, path.display(), e);
            String::new()
        });

        if host_matches(&signature, &self.config.host_markers) {
            summary.record(
                "host",
                TargetStatus::PresentValid,
                StepAction::Verified,
                "WSL2 host signature detected",
            );
            return Ok(());
        }

        let detail = format!(
            "{} does not mention any of [{}]",
            path.display(),
            self.config.host_markers.join(", ")
        );

        if self.config.allow_unrecognized_host {
            summary.record(
                "host",
                TargetStatus::PresentStale,
                StepAction::Warned,
                format!("{}; continuing (override set)", detail),
            );
            return Ok(());
        }

        let question = format!(
            "This does not look like a WSL2 host ({}). Continue and modify system packages anyway?",
            detail
        );
        if self.confirm.confirm(&question, false).await {
            summary.record(
                "host",
                TargetStatus::PresentStale,
                StepAction::Warned,
                format!("{}; continuing at operator request", detail),
            );
            Ok(())
        } else {
            Err(BootstrapError::Declined(format!(
                "unrecognized host: {}. Re-run with --allow-any-host to override",
                detail
            )))
        }
    }

    fn engine(&self) -> CommandSpec {
        CommandSpec::new(self.config.binary.as_str()).current_dir(self.root.path())
    }

    fn privileged(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program)
            .current_dir(self.root.path())
            .privileged(self.identity.is_root)
    }

    async fn engine_version(&self) -> Result<String> {
        let output = self.runner.run_checked(&self.engine().arg("--version")).await?;
        Ok(output.stdout.trim().to_string())
    }

    fn daemon_info(&self) -> CommandSpec {
        // Through sudo: group membership may not apply to this session yet
        CommandSpec::new(self.config.binary.as_str())
            .arg("info")
            .current_dir(self.root.path())
            .privileged(self.identity.is_root)
    }

    async fn daemon_responding(&self) -> bool {
        self.runner
            .run(&self.daemon_info())
            .await
            .map(|o| o.success())
            .unwrap_or(false)
    }

    /// Start the daemon if needed and wait for it. Fatal when it never answers.
    async fn ensure_daemon(&self, summary: &mut SetupSummary) -> Result<()> {
        if self.daemon_responding().await {
            summary.record(
                "engine daemon",
                TargetStatus::Running,
                StepAction::Verified,
                "daemon responding",
            );
            return Ok(());
        }

        tracing::info!("[{}] Daemon not responding, starting it", COMPONENT);
        let start = self.privileged("service").args([self.config.binary.as_str(), "start"]);
        if let Err(e) = self.runner.run_checked(&start).await {
            tracing::warn!("[{}] Daemon start command failed: {}", COMPONENT, e);
        }

        let runner = self.runner.clone();
        let info = self.daemon_info();
        let outcome = poll_until(&self.daemon_poll, || {
            let runner = runner.clone();
            let info = info.clone();
            async move { runner.run(&info).await.map(|o| o.success()).unwrap_or(false) }
        })
        .await;

        if outcome.is_ready() {
            summary.record(
                "engine daemon",
                TargetStatus::PresentValid,
                StepAction::Started,
                format!("daemon up after {:?}", outcome.elapsed()),
            );
            Ok(())
        } else {
            Err(BootstrapError::DaemonUnavailable(format!(
                "daemon did not respond within {:?}; check `sudo service {} status`",
                self.daemon_poll.ceiling, self.config.binary
            )))
        }
    }

    async fn install_prerequisites(&self, summary: &mut SetupSummary) -> Result<()> {
        self.runner
            .run_checked(&self.privileged("apt-get").arg("update"))
            .await?;
        self.runner
            .run_checked(
                &self
                    .privileged("apt-get")
                    .args(["install", "-y"])
                    .args(self.config.prerequisites.iter().cloned()),
            )
            .await?;
        summary.record(
            "prerequisites",
            TargetStatus::Absent,
            StepAction::Installed,
            self.config.prerequisites.join(" "),
        );
        Ok(())
    }

    /// Register the signing key and package source. The old key is removed
    /// first so repeated runs do not trip over a duplicate.
    async fn configure_repository(&self, summary: &mut SetupSummary) -> Result<()> {
        let keyring_dir = self.config.keyring_dir.to_string_lossy().into_owned();
        let key_path = self.config.key_path().to_string_lossy().into_owned();

        self.runner
            .run_checked(
                &self
                    .privileged("install")
                    .args(["-m", "0755", "-d", keyring_dir.as_str()]),
            )
            .await?;
        self.runner
            .run_checked(&self.privileged("rm").args(["-f", key_path.as_str()]))
            .await?;
        self.runner
            .run_checked(&self.privileged("sh").args([
                "-c".to_string(),
                format!(
                    "curl -fsSL {} | gpg --dearmor -o {}",
                    self.config.key_url, key_path
                ),
            ]))
            .await?;
        self.runner
            .run_checked(&self.privileged("chmod").args(["a+r", key_path.as_str()]))
            .await?;

        let arch = self
            .runner
            .run_checked(&CommandSpec::new("dpkg").arg("--print-architecture"))
            .await?
            .stdout
            .trim()
            .to_string();
        let codename = self
            .runner
            .run_checked(&CommandSpec::new("lsb_release").arg("-cs"))
            .await?
            .stdout
            .trim()
            .to_string();

        let line = repository_line(&self.config, &arch, &codename);
        let sources = self.config.sources_file.to_string_lossy().into_owned();
        self.runner
            .run_checked(&self.privileged("sh").args([
                "-c".to_string(),
                format!("echo '{}' > {}", line, sources),
            ]))
            .await?;

        summary.record(
            "package repository",
            TargetStatus::Absent,
            StepAction::Installed,
            line,
        );
        Ok(())
    }

    async fn install_engine(&self, summary: &mut SetupSummary) -> Result<()> {
        self.runner
            .run_checked(&self.privileged("apt-get").arg("update"))
            .await?;
        self.runner
            .run_checked(
                &self
                    .privileged("apt-get")
                    .args(["install", "-y"])
                    .args(self.config.packages.iter().cloned()),
            )
            .await?;
        summary.record(
            "container engine",
            TargetStatus::Absent,
            StepAction::Installed,
            self.config.packages.join(" "),
        );
        Ok(())
    }

    async fn post_install(&self, summary: &mut SetupSummary) -> Result<()> {
        match self.identity.group_member() {
            Some(user) => {
                self.runner
                    .run_checked(&self.privileged("usermod").args([
                        "-aG",
                        self.config.group.as_str(),
                        user,
                    ]))
                    .await?;
                summary.record(
                    "group membership",
                    TargetStatus::Absent,
                    StepAction::Warned,
                    format!(
                        "added {} to group '{}'; log out and back in (or run `newgrp {}`) for it to take effect",
                        user, self.config.group, self.config.group
                    ),
                );
            }
            None => summary.record(
                "group membership",
                TargetStatus::PresentValid,
                StepAction::Skipped,
                "running as root, no user to add",
            ),
        }

        self.ensure_daemon(summary).await
    }

    async fn verify(&self, summary: &mut SetupSummary) -> Result<()> {
        let version = self.engine_version().await?;
        tracing::info!("[{}] {}", COMPONENT, version);

        if !self.daemon_responding().await {
            return Err(BootstrapError::DaemonUnavailable(format!(
                "`{} info` fails; start the daemon with `sudo service {} start`",
                self.config.binary, self.config.binary
            )));
        }

        match self
            .runner
            .run(&self.engine().args(["compose", "version"]))
            .await
        {
            Ok(o) if o.success() => summary.record(
                "compose plugin",
                TargetStatus::PresentValid,
                StepAction::Verified,
                o.stdout.trim().to_string(),
            ),
            _ => summary.record(
                "compose plugin",
                TargetStatus::Absent,
                StepAction::Warned,
                "compose plugin not available; install docker-compose-plugin",
            ),
        }

        let smoke = self
            .engine()
            .args(["run", "--rm", self.config.smoke_image.as_str()]);
        match self.runner.run(&smoke).await {
            Ok(o) if o.success() => summary.record(
                "smoke test",
                TargetStatus::PresentValid,
                StepAction::Verified,
                format!("{} container ran", self.config.smoke_image),
            ),
            Ok(o) => summary.record(
                "smoke test",
                TargetStatus::PresentStale,
                StepAction::Warned,
                format!(
                    "{} failed ({}); a new login session may be needed for group permissions",
                    self.config.smoke_image,
                    o.last_line()
                ),
            ),
            Err(e) => summary.record(
                "smoke test",
                TargetStatus::PresentStale,
                StepAction::Warned,
                format!("could not run smoke test: {}", e),
            ),
        }

        Ok(())
    }
}

/// Whether the host signature mentions any marker (case-insensitive).
pub fn host_matches(signature: &str, markers: &[String]) -> bool {
    let signature = signature.to_ascii_lowercase();
    markers
        .iter()
        .any(|m| !m.is_empty() && signature.contains(&m.to_ascii_lowercase()))
}

/// The apt source line for the vendor repository.
pub fn repository_line(config: &EngineConfig, arch: &str, codename: &str) -> String {
    format!(
        "deb [arch={} signed-by={}] {} {} stable",
        arch,
        config.key_path().display(),
        config.repo_url,
        codename
    )
}
