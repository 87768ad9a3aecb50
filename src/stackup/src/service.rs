//! ManagedServiceBootstrapper: start one compose-managed service and wait
//! until it answers on its advertised ports.
use crate::command::{CommandRunner, CommandSpec};
use crate::config::ServiceConfig;
use crate::confirm::ConfirmationPolicy;
use crate::envfile::EnvFile;
use crate::error::{BootstrapError, Result};
use crate::poll::{poll_until, tcp_reachable, PollOutcome};
use crate::project::ProjectRoot;
use crate::target::{SetupSummary, StepAction, TargetStatus};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const COMPONENT: &str = "ServiceBootstrap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Bolt,
    Tcp,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Bolt => "bolt",
            Protocol::Tcp => "tcp",
        }
    }
}

/// Connection coordinates for a managed service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEndpoint {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Configuration key holding the credential, not the secret itself
    pub credential_ref: Option<String>,
}

impl ServiceEndpoint {
    pub fn uri(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.uri(), self.name)
    }
}

/// The endpoints a service is expected to expose, as declared by its
/// configuration. The verifier probes these same coordinates.
pub fn expected_endpoints(config: &ServiceConfig) -> (ServiceEndpoint, ServiceEndpoint) {
    let credential_ref = config
        .env_keys
        .iter()
        .find(|k| k.ends_with("PASSWORD"))
        .cloned();
    (
        ServiceEndpoint {
            name: format!("{} browser", config.name),
            host: config.host.clone(),
            port: config.http_port,
            protocol: Protocol::Http,
            credential_ref: credential_ref.clone(),
        },
        ServiceEndpoint {
            name: format!("{} bolt", config.name),
            host: config.host.clone(),
            port: config.bolt_port,
            protocol: Protocol::Bolt,
            credential_ref,
        },
    )
}

/// State of the service container as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    Absent,
}

/// Classify the `{{.Status}}` column of `docker ps -a`.
pub fn parse_container_status(status: &str) -> ContainerState {
    let status = status.lines().next().unwrap_or("").trim();
    if status.is_empty() {
        ContainerState::Absent
    } else if status.starts_with("Up") || status.starts_with("Restarting") {
        ContainerState::Running
    } else {
        ContainerState::Stopped
    }
}

/// Whether the compose declaration lists `service` under `services:`.
pub fn compose_declares_service(content: &str, service: &str) -> bool {
    match serde_yaml::from_str::<serde_yaml::Value>(content) {
        Ok(doc) => doc
            .get("services")
            .and_then(|s| s.as_mapping())
            .map(|m| m.contains_key(service))
            .unwrap_or(false),
        Err(e) => {
            tracing::debug!(
                "[{}] Compose file is not valid YAML ({}), scanning lines",
                COMPONENT,
                e
            );
            let wanted = format!("{}:", service);
            content
                .lines()
                .any(|l| l.starts_with(char::is_whitespace) && l.trim() == wanted)
        }
    }
}

/// Compose front-end available on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeCommand {
    /// `docker compose` plugin
    Plugin(String),
    /// Standalone `docker-compose`
    Standalone,
}

impl ComposeCommand {
    fn base(&self, root: &ProjectRoot, file: &str) -> CommandSpec {
        let spec = match self {
            ComposeCommand::Plugin(engine) => CommandSpec::new(engine.as_str()).arg("compose"),
            ComposeCommand::Standalone => CommandSpec::new("docker-compose"),
        };
        spec.args(["-f", file]).current_dir(root.path())
    }
}

/// Outcome of a successful bootstrap.
#[derive(Debug, Clone)]
pub struct ServiceStartup {
    pub summary: SetupSummary,
    pub primary: ServiceEndpoint,
    pub secondary: ServiceEndpoint,
    pub secondary_reachable: bool,
    pub readiness: PollOutcome,
    pub username: String,
    pub password: String,
    /// Where the password came from (`.env` or manifest default)
    pub password_source: String,
}

impl ServiceStartup {
    /// Connection details for the operator. Always printed by callers.
    pub fn connection_info(&self) -> String {
        render_connection(
            &self.primary,
            &self.secondary,
            self.secondary_reachable,
            &self.username,
            &self.password,
            &self.password_source,
        )
    }
}

fn render_connection(
    primary: &ServiceEndpoint,
    secondary: &ServiceEndpoint,
    secondary_reachable: bool,
    username: &str,
    password: &str,
    password_source: &str,
) -> String {
    let mut out = String::new();
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out.push_str("  Service connection details\n");
    out.push_str(&format!("  Browser:  {}\n", primary.uri()));
    out.push_str(&format!(
        "  Bolt:     {}{}\n",
        secondary.uri(),
        if secondary_reachable {
            ""
        } else {
            "  (not answering yet)"
        }
    ));
    out.push_str(&format!("  Username: {}\n", username));
    out.push_str(&format!(
        "  Password: {}  (from {})\n",
        password, password_source
    ));
    out.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    out
}

pub struct ManagedServiceBootstrapper {
    root: ProjectRoot,
    config: ServiceConfig,
    engine_binary: String,
    runner: Arc<dyn CommandRunner>,
    confirm: Arc<dyn ConfirmationPolicy>,
}

impl ManagedServiceBootstrapper {
    pub fn new(
        root: ProjectRoot,
        config: ServiceConfig,
        engine_binary: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        confirm: Arc<dyn ConfirmationPolicy>,
    ) -> Self {
        Self {
            root,
            config,
            engine_binary: engine_binary.into(),
            runner,
            confirm,
        }
    }

    pub async fn run(&self) -> Result<ServiceStartup> {
        let mut summary = SetupSummary::new(COMPONENT);
        let name = self.config.name.clone();

        let (compose, env) = self.preconditions(&mut summary).await?;

        match self.container_state().await? {
            ContainerState::Running => {
                let question = format!("Service '{}' is already running. Restart it?", name);
                if self.confirm.confirm(&question, false).await {
                    self.runner
                        .run_checked(&self.compose(&compose).args(["restart", name.as_str()]))
                        .await?;
                    summary.record(
                        "service",
                        TargetStatus::Running,
                        StepAction::Restarted,
                        format!("{} restarted", name),
                    );
                } else {
                    summary.record(
                        "service",
                        TargetStatus::Running,
                        StepAction::Reused,
                        format!("{} already running", name),
                    );
                }
            }
            ContainerState::Stopped => {
                // Start in place; recreating would discard initialized state
                self.runner
                    .run_checked(
                        &self
                            .engine()
                            .args(["start", self.config.container_name.as_str()]),
                    )
                    .await?;
                summary.record(
                    "service",
                    TargetStatus::PresentValid,
                    StepAction::Started,
                    format!("existing container {} started", self.config.container_name),
                );
            }
            ContainerState::Absent => {
                self.runner
                    .run_checked(&self.compose(&compose).args(["up", "-d", name.as_str()]))
                    .await?;
                summary.record(
                    "service",
                    TargetStatus::Absent,
                    StepAction::Created,
                    format!("{} created via compose", name),
                );
            }
        }

        let (primary, secondary) = expected_endpoints(&self.config);
        let (password, password_source) = self.password(&env);
        let username = self
            .env_value(&env, "USER")
            .unwrap_or(&self.config.username)
            .to_string();
        let readiness = match self.wait_ready(&primary).await {
            Ok(readiness) => readiness,
            // The container may still come up; the operator needs the coordinates either way
            Err(BootstrapError::Timeout(msg)) => {
                return Err(BootstrapError::Timeout(format!(
                    "{}\n{}",
                    msg,
                    render_connection(
                        &primary,
                        &secondary,
                        false,
                        &username,
                        &password,
                        &password_source
                    )
                )))
            }
            Err(e) => return Err(e),
        };
        summary.record(
            "readiness",
            TargetStatus::Running,
            StepAction::Verified,
            format!(
                "{} answered after {:?} ({} attempts)",
                primary.uri(),
                readiness.elapsed(),
                readiness.attempts()
            ),
        );

        let policy = self.config.poll_policy();
        let secondary_reachable =
            tcp_reachable(&secondary.host, secondary.port, policy.attempt_timeout()).await;
        if secondary_reachable {
            summary.record(
                "secondary port",
                TargetStatus::Running,
                StepAction::Verified,
                secondary.uri(),
            );
        } else {
            summary.record(
                "secondary port",
                TargetStatus::PresentStale,
                StepAction::Warned,
                format!("{} not answering yet", secondary.uri()),
            );
        }

        let startup = ServiceStartup {
            summary,
            primary,
            secondary,
            secondary_reachable,
            readiness,
            username,
            password,
            password_source,
        };
        tracing::info!("[{}] {} ready", COMPONENT, name);
        Ok(startup)
    }

    fn engine(&self) -> CommandSpec {
        CommandSpec::new(self.engine_binary.as_str()).current_dir(self.root.path())
    }

    fn compose(&self, compose: &ComposeCommand) -> CommandSpec {
        let file = self.config.compose_file.to_string_lossy();
        compose.base(&self.root, &file)
    }

    /// Engine installed and running, compose file present and naming the
    /// service, environment configured (or defaults noted).
    async fn preconditions(&self, summary: &mut SetupSummary) -> Result<(ComposeCommand, EnvFile)> {
        if !self.runner.has_tool(&self.engine_binary).await {
            return Err(BootstrapError::missing_tool(
                &self.engine_binary,
                "install the container engine first (`stackup engine`)",
            ));
        }

        let info = self.runner.run(&self.engine().arg("info")).await?;
        if !info.success() {
            return Err(BootstrapError::DaemonUnavailable(format!(
                "{} daemon is not running ({}); start it with `sudo service {} start` and retry",
                self.engine_binary,
                info.last_line(),
                self.engine_binary
            )));
        }
        summary.record(
            "engine daemon",
            TargetStatus::Running,
            StepAction::Verified,
            "daemon responding",
        );

        let compose_path = self.root.join(&self.config.compose_file);
        let content = std::fs::read_to_string(&compose_path).map_err(|e| {
            BootstrapError::Config(format!(
                "Cannot read compose file {}: {}",
                compose_path.display(),
                e
            ))
        })?;
        if !compose_declares_service(&content, &self.config.name) {
            return Err(BootstrapError::Config(format!(
                "{} does not declare service '{}'",
                compose_path.display(),
                self.config.name
            )));
        }
        summary.record(
            "compose declaration",
            TargetStatus::PresentValid,
            StepAction::Verified,
            format!("{} declares '{}'", self.config.compose_file.display(), self.config.name),
        );

        let compose = self.detect_compose().await?;

        let env_path = self.root.env_file();
        let env = EnvFile::load_optional(&env_path)?;
        if !env_path.exists() {
            summary.record(
                "service environment",
                TargetStatus::Absent,
                StepAction::Warned,
                "no .env file; using defaults from the compose manifest",
            );
        } else {
            let missing = env.missing(&self.config.env_keys);
            if missing.is_empty() {
                summary.record(
                    "service environment",
                    TargetStatus::PresentValid,
                    StepAction::Verified,
                    ".env carries service settings",
                );
            } else {
                summary.record(
                    "service environment",
                    TargetStatus::PresentStale,
                    StepAction::Warned,
                    format!("{} not set in .env; using manifest defaults", missing.join(", ")),
                );
            }
        }

        Ok((compose, env))
    }

    async fn detect_compose(&self) -> Result<ComposeCommand> {
        let plugin = self
            .runner
            .run(&self.engine().args(["compose", "version"]))
            .await;
        if matches!(plugin, Ok(ref o) if o.success()) {
            return Ok(ComposeCommand::Plugin(self.engine_binary.clone()));
        }
        if self.runner.has_tool("docker-compose").await {
            return Ok(ComposeCommand::Standalone);
        }
        Err(BootstrapError::missing_tool(
            "docker compose",
            "install docker-compose-plugin",
        ))
    }

    async fn container_state(&self) -> Result<ContainerState> {
        let filter = format!("name=^/{}$", self.config.container_name);
        let output = self
            .runner
            .run_checked(&self.engine().args([
                "ps",
                "-a",
                "--filter",
                filter.as_str(),
                "--format",
                "{{.Status}}",
            ]))
            .await?;
        let state = parse_container_status(&output.stdout);
        tracing::info!(
            "[{}] Container {} state: {:?}",
            COMPONENT,
            self.config.container_name,
            state
        );
        Ok(state)
    }

    /// Poll the primary port until it answers or the ceiling passes.
    async fn wait_ready(&self, endpoint: &ServiceEndpoint) -> Result<PollOutcome> {
        let policy = self.config.poll_policy();
        tracing::info!(
            "[{}] Waiting for {} (every {:?}, up to {:?})",
            COMPONENT,
            endpoint.uri(),
            policy.interval,
            policy.ceiling
        );

        let host = endpoint.host.clone();
        let port = endpoint.port;
        let attempt_timeout = policy.attempt_timeout();
        let outcome = poll_until(&policy, || {
            let host = host.clone();
            async move { tcp_reachable(&host, port, attempt_timeout).await }
        })
        .await;

        match outcome {
            PollOutcome::Ready { .. } => Ok(outcome),
            PollOutcome::TimedOut { elapsed, attempts } => Err(BootstrapError::Timeout(format!(
                "{} did not answer on {} within {:?} ({} attempts); inspect `docker compose logs {}`",
                self.config.name,
                endpoint.uri(),
                elapsed,
                attempts,
                self.config.name
            ))),
        }
    }

    /// Non-empty `.env` value of the first service key ending in `suffix`.
    fn env_value<'a>(&self, env: &'a EnvFile, suffix: &str) -> Option<&'a str> {
        self.config
            .env_keys
            .iter()
            .find(|k| k.ends_with(suffix))
            .and_then(|k| env.get(k))
            .filter(|v| !v.is_empty())
    }

    fn password(&self, env: &EnvFile) -> (String, String) {
        match self.env_value(env, "PASSWORD") {
            Some(p) => (p.to_string(), ".env".to_string()),
            None => (
                self.config.password.clone(),
                "manifest default".to_string(),
            ),
        }
    }
}
