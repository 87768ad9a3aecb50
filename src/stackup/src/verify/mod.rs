//! DeploymentVerifier: read-only audit of a running deployment.
//!
//! Checks are independent: each one is evaluated exactly once, none can
//! stop another, and the report lists them in a fixed order regardless of
//! completion order.
pub mod probes;
pub mod settings;

pub use probes::{parse_container_listing, ProbeContext};
pub use settings::{parse_database_url, DatabaseTarget, VerifySettings};

use crate::command::CommandRunner;
use crate::config::VerifyConfig;
use crate::report::{CheckResult, HealthCheck, HealthReport, Outcome, Probe, Severity};
use futures::future;
use std::sync::Arc;
use std::time::Duration;

pub const CHECK_APP_LIVENESS: &str = "application liveness";
pub const CHECK_APP_READINESS: &str = "application readiness";
pub const CHECK_APP_METRICS: &str = "application metrics";
pub const CHECK_DATABASE: &str = "relational database";
pub const CHECK_CACHE: &str = "cache";
pub const CHECK_GRAPH_HTTP: &str = "graph store http";
pub const CHECK_GRAPH_BOLT: &str = "graph store bolt";
pub const CHECK_CONTAINERS: &str = "container health";
pub const CHECK_ORCHESTRATOR: &str = "orchestrator";

pub struct DeploymentVerifier {
    settings: VerifySettings,
    runner: Arc<dyn CommandRunner>,
    workers: usize,
    probe_timeout: Duration,
    retry_window: Duration,
}

impl DeploymentVerifier {
    pub fn new(
        settings: VerifySettings,
        runner: Arc<dyn CommandRunner>,
        workers: usize,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            runner,
            workers: workers.max(1),
            probe_timeout,
            retry_window: Duration::ZERO,
        }
    }

    /// Retry refused HTTP and TCP checks for up to `window` before judging.
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    pub fn from_config(
        settings: VerifySettings,
        config: &VerifyConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self::new(settings, runner, config.workers, config.probe_timeout())
            .with_retry_window(config.retry_window())
    }

    pub fn settings(&self) -> &VerifySettings {
        &self.settings
    }

    /// The full, ordered check list for these settings.
    pub fn checks(&self) -> Vec<HealthCheck> {
        let s = &self.settings;
        let mut checks = vec![
            HealthCheck::new(
                0,
                CHECK_APP_LIVENESS,
                Severity::Fatal,
                Probe::Http {
                    url: s.app_url("/health"),
                },
                "start the application and check its logs",
            ),
            HealthCheck::new(
                1,
                CHECK_APP_READINESS,
                Severity::Fatal,
                Probe::Http {
                    url: s.app_url("/health/ready"),
                },
                "a dependency of the application is down; see the readiness response",
            ),
            HealthCheck::new(
                2,
                CHECK_APP_METRICS,
                Severity::Degrading,
                Probe::Http {
                    url: s.app_url("/metrics"),
                },
                "enable the metrics endpoint for monitoring",
            ),
        ];

        checks.push(match &s.database {
            DatabaseTarget::Postgres { host, port } => HealthCheck::new(
                3,
                CHECK_DATABASE,
                Severity::Fatal,
                Probe::Tool {
                    program: "pg_isready".to_string(),
                    args: vec![
                        "-h".to_string(),
                        host.clone(),
                        "-p".to_string(),
                        port.to_string(),
                    ],
                    expect: None,
                },
                format!("check that PostgreSQL is running on {}:{}", host, port),
            ),
            DatabaseTarget::Sqlite { path } => HealthCheck::new(
                3,
                CHECK_DATABASE,
                Severity::Fatal,
                Probe::File { path: path.clone() },
                "run database migrations or start the application once to create it",
            ),
        });

        checks.extend([
            HealthCheck::new(
                4,
                CHECK_CACHE,
                Severity::Degrading,
                Probe::Tool {
                    program: "redis-cli".to_string(),
                    args: vec![
                        "-h".to_string(),
                        s.redis_host.clone(),
                        "-p".to_string(),
                        s.redis_port.to_string(),
                        "ping".to_string(),
                    ],
                    expect: Some("PONG".to_string()),
                },
                "start Redis or disable caching",
            ),
            HealthCheck::new(
                5,
                CHECK_GRAPH_HTTP,
                Severity::Degrading,
                Probe::Http {
                    url: s.graph_http.uri(),
                },
                "start the graph store with `stackup service`",
            ),
            HealthCheck::new(
                6,
                CHECK_GRAPH_BOLT,
                Severity::Degrading,
                Probe::Tcp {
                    host: s.graph_bolt.host.clone(),
                    port: s.graph_bolt.port,
                },
                "start the graph store with `stackup service`",
            ),
            HealthCheck::new(
                7,
                CHECK_CONTAINERS,
                Severity::Fatal,
                Probe::ContainerHealth {
                    engine: s.engine.clone(),
                },
                format!("inspect with `{} ps` and `{} logs <name>`", s.engine, s.engine),
            ),
            HealthCheck::new(
                8,
                CHECK_ORCHESTRATOR,
                Severity::Degrading,
                Probe::Tool {
                    program: "kubectl".to_string(),
                    args: vec![
                        "get".to_string(),
                        "pods".to_string(),
                        "-n".to_string(),
                        s.namespace.clone(),
                    ],
                    expect: None,
                },
                format!("check the '{}' namespace with kubectl", s.namespace),
            ),
        ]);

        checks
    }

    /// Evaluate every check, at most `workers` at a time.
    pub async fn run(&self) -> HealthReport {
        let checks = self.checks();
        tracing::info!(
            "[Verify] Running {} checks with {} workers",
            checks.len(),
            self.workers
        );

        let ctx = ProbeContext::new(self.runner.clone(), self.probe_timeout)
            .with_retry_window(self.retry_window);
        // At most `workers` probes in flight
        let semaphore = tokio::sync::Semaphore::new(self.workers);
        let evaluations = checks.iter().map(|check| {
            let ctx = &ctx;
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let verdict = ctx.evaluate(&check.probe).await;
                let result = check.classify(verdict);
                match result.outcome {
                    Outcome::Pass => {
                        tracing::info!("[Verify] {}: PASS ({})", result.name, result.detail)
                    }
                    Outcome::Warn => {
                        tracing::warn!("[Verify] {}: WARN ({})", result.name, result.detail)
                    }
                    Outcome::Fail => {
                        tracing::error!("[Verify] {}: FAIL ({})", result.name, result.detail)
                    }
                }
                result
            }
        });
        let results: Vec<CheckResult> = future::join_all(evaluations).await;

        let report = HealthReport::from_results(results);
        tracing::info!(
            "[Verify] {} passed, {} warnings, {} failed",
            report.counts.passed,
            report.counts.warnings,
            report.counts.failed
        );
        report
    }
}
