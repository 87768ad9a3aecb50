//! Full bootstrap: runtime, engine, service, then verification.
//!
//! A failing component never aborts the run. It is recorded, whatever
//! depends on it is skipped with a reason, and the verifier always runs.
use crate::command::CommandRunner;
use crate::config::StackConfig;
use crate::confirm::ConfirmationPolicy;
use crate::engine::{ContainerEngineInstaller, HostIdentity};
use crate::error::{BootstrapError, Result};
use crate::exit_codes;
use crate::lock::ProjectLock;
use crate::project::ProjectRoot;
use crate::report::HealthReport;
use crate::runtime_env::RuntimeEnvironmentInstaller;
use crate::service::{ManagedServiceBootstrapper, ServiceStartup};
use crate::target::SetupSummary;
use crate::verify::{DeploymentVerifier, VerifySettings};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOutcome {
    Completed(String),
    Failed(String),
    Skipped(String),
    Declined(String),
}

impl ComponentOutcome {
    fn from_error(err: &BootstrapError) -> Self {
        match err {
            BootstrapError::Declined(reason) => ComponentOutcome::Declined(reason.clone()),
            other => ComponentOutcome::Failed(other.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ComponentOutcome::Completed(_))
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ComponentOutcome::Failed(_) => exit_codes::FAILURE,
            ComponentOutcome::Declined(_) => exit_codes::DECLINED,
            ComponentOutcome::Completed(_) | ComponentOutcome::Skipped(_) => exit_codes::SUCCESS,
        }
    }
}

impl fmt::Display for ComponentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentOutcome::Completed(detail) => write!(f, "completed  {}", detail),
            ComponentOutcome::Failed(detail) => write!(f, "FAILED     {}", detail),
            ComponentOutcome::Skipped(detail) => write!(f, "skipped    {}", detail),
            ComponentOutcome::Declined(detail) => write!(f, "declined   {}", detail),
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub components: Vec<(String, ComponentOutcome)>,
    pub summaries: Vec<SetupSummary>,
    pub service: Option<ServiceStartup>,
    pub health: Option<HealthReport>,
}

impl PipelineReport {
    fn push(&mut self, component: &str, outcome: ComponentOutcome) {
        self.components.push((component.to_string(), outcome));
    }

    pub fn outcome(&self, component: &str) -> Option<&ComponentOutcome> {
        self.components
            .iter()
            .find(|(name, _)| name == component)
            .map(|(_, outcome)| outcome)
    }

    /// Failure wins over declined, declined over success.
    pub fn exit_code(&self) -> i32 {
        let mut codes: Vec<i32> = self.components.iter().map(|(_, o)| o.exit_code()).collect();
        if let Some(health) = &self.health {
            codes.push(health.exit_code());
        }
        if codes.contains(&exit_codes::FAILURE) {
            exit_codes::FAILURE
        } else if codes.contains(&exit_codes::DECLINED) {
            exit_codes::DECLINED
        } else {
            exit_codes::SUCCESS
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for summary in &self.summaries {
            out.push_str(&summary.render());
            out.push('\n');
        }
        if let Some(service) = &self.service {
            out.push_str(&service.connection_info());
            out.push('\n');
        }
        if let Some(health) = &self.health {
            out.push_str(&health.render());
            out.push('\n');
        }
        out.push_str("── Pipeline ──\n");
        for (name, outcome) in &self.components {
            out.push_str(&format!("  {:<10} {}\n", name, outcome));
        }
        out
    }
}

pub const RUNTIME: &str = "runtime";
pub const ENGINE: &str = "engine";
pub const SERVICE: &str = "service";
pub const VERIFY: &str = "verify";

pub struct Pipeline {
    root: ProjectRoot,
    config: StackConfig,
    identity: HostIdentity,
    runner: Arc<dyn CommandRunner>,
    confirm: Arc<dyn ConfirmationPolicy>,
}

impl Pipeline {
    pub fn new(
        root: ProjectRoot,
        config: StackConfig,
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
        }
    }

    /// Errors only when the project lock cannot be taken; component
    /// failures are folded into the report.
    pub async fn run(&self) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        {
            let _lock = ProjectLock::acquire(&self.root)?;
            self.install(&mut report).await;
        }

        self.verify(&mut report).await;

        tracing::info!("[Pipeline] Finished with exit code {}", report.exit_code());
        Ok(report)
    }

    async fn install(&self, report: &mut PipelineReport) {
        tracing::info!("[Pipeline] Stage 1/4: runtime environment");
        let runtime = RuntimeEnvironmentInstaller::new(
            self.root.clone(),
            self.config.runtime.clone(),
            self.runner.clone(),
            self.confirm.clone(),
        );
        match runtime.run().await {
            Ok(summary) => {
                report.push(RUNTIME, completed(&summary));
                report.summaries.push(summary);
            }
            Err(e) => {
                tracing::error!("[Pipeline] {} failed: {}", RUNTIME, e);
                report.push(RUNTIME, ComponentOutcome::from_error(&e));
            }
        }

        tracing::info!("[Pipeline] Stage 2/4: container engine");
        let engine = ContainerEngineInstaller::new(
            self.root.clone(),
            self.config.engine.clone(),
            self.identity.clone(),
            self.runner.clone(),
            self.confirm.clone(),
        );
        let engine_ready = match engine.run().await {
            Ok(summary) => {
                report.push(ENGINE, completed(&summary));
                report.summaries.push(summary);
                true
            }
            Err(e) => {
                tracing::error!("[Pipeline] {} failed: {}", ENGINE, e);
                report.push(ENGINE, ComponentOutcome::from_error(&e));
                false
            }
        };

        if !engine_ready {
            tracing::warn!("[Pipeline] Skipping {}: container engine not ready", SERVICE);
            report.push(
                SERVICE,
                ComponentOutcome::Skipped("container engine not ready".to_string()),
            );
            return;
        }

        tracing::info!("[Pipeline] Stage 3/4: managed service");
        let service = ManagedServiceBootstrapper::new(
            self.root.clone(),
            self.config.service.clone(),
            self.config.engine.binary.clone(),
            self.runner.clone(),
            self.confirm.clone(),
        );
        match service.run().await {
            Ok(startup) => {
                report.push(SERVICE, completed(&startup.summary));
                report.summaries.push(startup.summary.clone());
                report.service = Some(startup);
            }
            Err(e) => {
                tracing::error!("[Pipeline] {} failed: {}", SERVICE, e);
                report.push(SERVICE, ComponentOutcome::from_error(&e));
            }
        }
    }

    async fn verify(&self, report: &mut PipelineReport) {
        tracing::info!("[Pipeline] Stage 4/4: deployment verification");
        let settings = match VerifySettings::from_environment(&self.root, &self.config) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("[Pipeline] {} failed: {}", VERIFY, e);
                report.push(VERIFY, ComponentOutcome::Failed(e.to_string()));
                return;
            }
        };

        let verifier =
            DeploymentVerifier::from_config(settings, &self.config.verify, self.runner.clone());
        let health = verifier.run().await;
        let counts = &health.counts;
        let detail = format!(
            "{} passed, {} warnings, {} failed",
            counts.passed, counts.warnings, counts.failed
        );
        report.push(
            VERIFY,
            if health.is_healthy() {
                ComponentOutcome::Completed(detail)
            } else {
                ComponentOutcome::Failed(detail)
            },
        );
        report.health = Some(health);
    }
}

fn completed(summary: &SetupSummary) -> ComponentOutcome {
    let warnings = summary.warnings().count();
    ComponentOutcome::Completed(format!(
        "{} step(s), {} warning(s)",
        summary.steps.len(),
        warnings
    ))
}
