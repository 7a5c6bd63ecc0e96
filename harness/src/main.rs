use clap::{Parser, Subcommand};
use harness::{
    run_session, EnvironmentMode, HarnessConfig, LifecycleController, SessionContext,
    TeardownOutcome,
};
use provisioner::CommandProvisioner;
use runtime::{CliRuntimeClient, RuntimeClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Bring integration test clusters up and down and drive their containers")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Use an already-running cluster (same as CLUSTER=1)
    #[arg(long, global = true)]
    cluster: bool,
    /// Leave the local cluster running afterwards (same as NO_TEARDOWN=1)
    #[arg(long, global = true)]
    no_teardown: bool,
    /// Seconds to wait after provisioning before tests start
    #[arg(long, global = true)]
    settle_delay: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the cluster and leave it running
    Up,
    /// Capture diagnostic logs and destroy the cluster, even one left by an earlier run
    Down,
    /// Start every container of a role
    Start { role: String },
    /// Kill every container of a role
    Stop { role: String },
    /// Restart every container of a role
    Restart { role: String },
    /// Print the logs of every container of a role
    Logs { role: String },
    /// Run a test command inside a full session
    Run {
        /// Test command and its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Print the effective configuration
    Config {
        /// Render as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Defaults < config file < environment < command-line flags
    fn harness_config(&self) -> Result<HarnessConfig, Box<dyn std::error::Error>> {
        let config = match &self.config {
            Some(path) => HarnessConfig::load(path)?,
            None => HarnessConfig::default(),
        };
        let mut config = config.apply_env_overrides(|key| std::env::var(key).ok());

        if self.cluster {
            config.mode = EnvironmentMode::External;
        }
        if self.no_teardown {
            config.skip_teardown = true;
        }
        if let Some(secs) = self.settle_delay {
            config.settle_delay_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.harness_config()?;

    match cli.command {
        Commands::Up => {
            let mut controller = controller(config).await?;
            let options = controller.config().provision.clone();
            controller.setup(&options).await?;
            info!("cluster is up");
        }
        Commands::Down => {
            let mut controller = controller(config).await?;
            report_teardown(&controller.force_teardown().await?);
        }
        Commands::Start { role } => {
            context(&config).await?.group(&role)?.start().await?;
        }
        Commands::Stop { role } => {
            context(&config).await?.group(&role)?.stop().await?;
        }
        Commands::Restart { role } => {
            context(&config).await?.group(&role)?.restart().await?;
        }
        Commands::Logs { role } => {
            let logs = context(&config).await?.group(&role)?.logs().await?;
            for (name, text) in logs {
                println!("==> {} <==", name);
                println!("{}", text);
            }
        }
        Commands::Run { command } => {
            let code = run_tests(config, command).await?;
            std::process::exit(code);
        }
        Commands::Config { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml_string()?);
            }
        }
    }

    Ok(())
}

async fn runtime_client(
    config: &HarnessConfig,
) -> Result<Arc<dyn RuntimeClient>, Box<dyn std::error::Error>> {
    let client = CliRuntimeClient::new(config.runtime.clone()).await?;
    info!(runtime = client.runtime_name(), "using container runtime");
    Ok(Arc::new(client))
}

async fn controller(
    config: HarnessConfig,
) -> Result<LifecycleController, Box<dyn std::error::Error>> {
    let runtime = runtime_client(&config).await?;
    let provisioner = Arc::new(CommandProvisioner::new(config.provisioner.clone())?);
    Ok(LifecycleController::new(config, provisioner, runtime)?)
}

async fn context(config: &HarnessConfig) -> Result<SessionContext, Box<dyn std::error::Error>> {
    let runtime = runtime_client(config).await?;
    Ok(SessionContext::new(runtime, config.topology.clone()))
}

/// Run the test command inside a session; its exit code becomes ours even
/// when teardown fails afterwards
async fn run_tests(
    config: HarnessConfig,
    command: Vec<String>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let (program, args) = match command.split_first() {
        Some((program, args)) => (program.clone(), args.to_vec()),
        None => return Err("no test command given".into()),
    };
    let options = config.provision.clone();
    let controller = controller(config).await?;

    let report = run_session(controller, &options, |_context| async move {
        info!(command = %command.join(" "), "running tests");
        tokio::process::Command::new(&program)
            .args(&args)
            .status()
            .await
    })
    .await?;

    if let Ok(outcome) = &report.teardown {
        report_teardown(outcome);
    }
    let status = report.value?;
    Ok(status.code().unwrap_or(1))
}

fn report_teardown(outcome: &TeardownOutcome) {
    match outcome {
        TeardownOutcome::ExternallyManaged => info!("external cluster left running"),
        TeardownOutcome::Skipped => info!("teardown skipped; cluster left running"),
        TeardownOutcome::NotStarted => info!("cluster was never started"),
        TeardownOutcome::AlreadyReleased => info!("cluster was already torn down"),
        TeardownOutcome::Destroyed { diagnostics } => {
            let failed = diagnostics.iter().filter(|c| c.is_err()).count();
            info!(
                captured = diagnostics.len() - failed,
                failed, "cluster destroyed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_takes_trailing_command() {
        let cli = Cli::try_parse_from(["harness", "run", "--", "pytest", "-k", "jobmgr"]).unwrap();
        match cli.command {
            Commands::Run { command } => assert_eq!(command, vec!["pytest", "-k", "jobmgr"]),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "harness",
            "--cluster",
            "--no-teardown",
            "--settle-delay",
            "0",
            "config",
        ])
        .unwrap();
        let config = cli.harness_config().unwrap();
        assert_eq!(config.mode, EnvironmentMode::External);
        assert!(config.skip_teardown);
        assert_eq!(config.settle_delay(), Duration::ZERO);
    }

    #[test]
    fn test_role_commands_parse() {
        let cli = Cli::try_parse_from(["harness", "restart", "jobmgr"]).unwrap();
        assert!(matches!(cli.command, Commands::Restart { role } if role == "jobmgr"));
    }
}
