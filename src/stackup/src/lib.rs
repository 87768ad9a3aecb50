//! stackup
//!
//! Bootstraps a local stack from a clean machine and audits the result:
//! language runtime environment, container engine, one compose-managed
//! service, and a read-only deployment health report.
//!
//! Every component takes an explicit [`ProjectRoot`] and talks to the host
//! through the injectable [`CommandRunner`] and [`ConfirmationPolicy`] seams.

pub mod command;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod envfile;
pub mod error;
pub mod exit_codes;
pub mod lock;
pub mod pipeline;
pub mod poll;
pub mod project;
pub mod report;
pub mod runtime_env;
pub mod service;
pub mod target;
pub mod verify;
pub mod version;

pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use config::StackConfig;
pub use confirm::{AlwaysYes, ConfirmationPolicy, FixedAnswer, InteractivePrompt, UseDefaults};
pub use engine::{ContainerEngineInstaller, HostIdentity};
pub use error::{BootstrapError, Result};
pub use lock::ProjectLock;
pub use pipeline::{ComponentOutcome, Pipeline, PipelineReport};
pub use poll::{poll_until, PollOutcome, PollPolicy};
pub use project::ProjectRoot;
pub use report::{CheckResult, HealthCheck, HealthReport, Outcome, Severity};
pub use runtime_env::RuntimeEnvironmentInstaller;
pub use service::{ManagedServiceBootstrapper, Protocol, ServiceEndpoint, ServiceStartup};
pub use target::{SetupSummary, StepAction, StepRecord, TargetStatus};
pub use verify::{DeploymentVerifier, VerifySettings};
pub use version::Version;
