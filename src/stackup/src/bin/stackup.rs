//! stackup command line: one subcommand per component plus the full pipeline.
use anyhow::Context;
use clap::{Parser, Subcommand};
use stackup::{
    exit_codes, AlwaysYes, BootstrapError, CommandRunner, ConfirmationPolicy,
    ContainerEngineInstaller, DeploymentVerifier, HostIdentity, InteractivePrompt,
    ManagedServiceBootstrapper, Pipeline, ProjectLock, ProjectRoot, RuntimeEnvironmentInstaller,
    StackConfig, SystemRunner, UseDefaults, VerifySettings,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "stackup",
    version,
    about = "Bootstrap a local stack and verify the deployment"
)]
struct Cli {
    /// Project root (default: nearest ancestor with stackup.toml, pyproject.toml,
    /// docker-compose.yml or .git)
    #[arg(long = "project-root", global = true)]
    project_root: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true, conflicts_with = "non_interactive")]
    yes: bool,

    /// Take every confirmation's default without prompting
    #[arg(long = "non-interactive", global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the language runtime environment and install dependencies
    Runtime,
    /// Install and verify the container engine
    Engine {
        /// Proceed on a host that does not match the supported signature
        #[arg(long = "allow-any-host")]
        allow_any_host: bool,
    },
    /// Start the compose-managed service and wait for readiness
    Service,
    /// Audit the running deployment
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run every component in order, then verify
    All {
        #[arg(long = "allow-any-host")]
        allow_any_host: bool,
    },
}

#[tokio::main]
async fn main() {
    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = tokio::select! {
        result = run(cli) => match result {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                e.downcast_ref::<BootstrapError>()
                    .map(BootstrapError::exit_code)
                    .unwrap_or(exit_codes::FAILURE)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!("  Interrupted, partial progress is kept; re-run to continue.");
            exit_codes::INTERRUPTED
        }
    };

    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let root = match &cli.project_root {
        Some(path) => ProjectRoot::new(path)?,
        None => {
            let cwd = std::env::current_dir().context("Cannot read current directory")?;
            ProjectRoot::discover(cwd)?
        }
    };
    let mut config = StackConfig::load(&root)?;

    let confirm: Arc<dyn ConfirmationPolicy> = if cli.yes {
        Arc::new(AlwaysYes)
    } else if cli.non_interactive {
        Arc::new(UseDefaults)
    } else {
        Arc::new(InteractivePrompt)
    };
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);

    banner(&cli.command, &root);

    match cli.command {
        Command::Runtime => {
            let _lock = ProjectLock::acquire(&root)?;
            let summary =
                RuntimeEnvironmentInstaller::new(root, config.runtime, runner, confirm)
                    .run()
                    .await?;
            println!("{}", summary.render());
            Ok(exit_codes::SUCCESS)
        }
        Command::Engine { allow_any_host } => {
            config.engine.allow_unrecognized_host |= allow_any_host;
            let _lock = ProjectLock::acquire(&root)?;
            let summary = ContainerEngineInstaller::new(
                root,
                config.engine,
                HostIdentity::detect(),
                runner,
                confirm,
            )
            .run()
            .await?;
            println!("{}", summary.render());
            Ok(exit_codes::SUCCESS)
        }
        Command::Service => {
            let _lock = ProjectLock::acquire(&root)?;
            let startup = ManagedServiceBootstrapper::new(
                root,
                config.service,
                config.engine.binary,
                runner,
                confirm,
            )
            .run()
            .await?;
            println!("{}", startup.summary.render());
            println!("{}", startup.connection_info());
            Ok(exit_codes::SUCCESS)
        }
        Command::Verify { json } => {
            let settings = VerifySettings::from_environment(&root, &config)?;
            let report = DeploymentVerifier::from_config(settings, &config.verify, runner)
                .run()
                .await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
            Ok(report.exit_code())
        }
        Command::All { allow_any_host } => {
            config.engine.allow_unrecognized_host |= allow_any_host;
            let report = Pipeline::new(root, config, HostIdentity::detect(), runner, confirm)
                .run()
                .await?;
            println!("{}", report.render());
            Ok(report.exit_code())
        }
    }
}

fn banner(command: &Command, root: &ProjectRoot) {
    let title = match command {
        Command::Runtime => "runtime environment",
        Command::Engine { .. } => "container engine",
        Command::Service => "managed service",
        Command::Verify { .. } => "deployment verification",
        Command::All { .. } => "full bootstrap",
    };
    eprintln!("╔════════════════════════════════════════════════════════════════╗");
    eprintln!("║  stackup: {:<53}║", title);
    eprintln!("╚════════════════════════════════════════════════════════════════╝");
    eprintln!("  Project root: {}", root.path().display());
}
