//! loadshield: switches a Cloudflare zone to "under attack" while host CPU
//! stays high, and back once it settles.
//!
//! ## Subcommands
//!
//! - `run` (default): start the monitoring loop until SIGINT/SIGTERM
//! - `check`: test CPU sampling and both remote APIs, then exit

mod check;
mod logging;

use clap::{Parser, Subcommand};
use loadshield_core::{
    AttackModeOrchestrator, CloudflareClient, MessageFormatter, OrchestratorSettings,
    ShieldConfig, ShutdownHandle, StartupError, SysinfoSampler, TelegramNotifier,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "loadshield")]
#[command(about = "CPU-driven Cloudflare attack-mode agent")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.loadshield/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Default)]
enum Commands {
    /// Monitor CPU and toggle the security level (default)
    #[default]
    Run,

    /// Test connectivity and print the effective configuration
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = ShieldConfig::load(cli.config);
    let logging_config = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    let _logging_guard = logging::init(&logging_config);

    let config = match loaded {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or_default() {
        Commands::Run => run(config).await,
        Commands::Check => check(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "loadshield failed");
            ExitCode::FAILURE
        }
    }
}

fn build_clients(config: &ShieldConfig) -> Result<(CloudflareClient, TelegramNotifier), StartupError> {
    let formatter = MessageFormatter::for_local_host(
        config.monitoring.clone(),
        config.cloudflare.default_security_level,
    );
    let security = CloudflareClient::new(&config.cloudflare)?;
    let notifier = TelegramNotifier::new(&config.telegram, formatter)?;
    Ok((security, notifier))
}

async fn run(config: ShieldConfig) -> Result<(), StartupError> {
    let (security, notifier) = build_clients(&config)?;
    let mut orchestrator = AttackModeOrchestrator::start(
        OrchestratorSettings::from_config(&config),
        SysinfoSampler::new(),
        security,
        notifier,
        CancellationToken::new(),
    )
    .await?;

    spawn_signal_listener(orchestrator.shutdown_handle());
    orchestrator.run().await;
    info!("loadshield stopped");
    Ok(())
}

async fn check(config: ShieldConfig) -> Result<(), StartupError> {
    let (security, notifier) = build_clients(&config)?;
    check::run(&config, &security, &notifier).await
}

fn spawn_signal_listener(handle: ShutdownHandle) {
    tokio::spawn(async move {
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                None
            }
        };

        let name = tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    warn!(error = %err, "Failed to listen for SIGINT");
                }
                "SIGINT"
            }
            _ = async {
                match terminate.as_mut() {
                    Some(stream) => {
                        stream.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => "SIGTERM",
        };

        info!(signal = name, "Received shutdown signal");
        handle.shutdown();
    });
}
