//! approver-policy - CertificateRequestPolicy readiness controller

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use approver_policy::approver::builtin;
use approver_policy::config::{
    ControllerConfig, DEFAULT_READY_TIMEOUT, DEFAULT_REQUEUE_AFTER, DEFAULT_WORKERS,
};
use approver_policy::controller::{build_policy_controller, Context};
use approver_policy::crd::CertificateRequestPolicy;
use approver_policy::registry::Registry;
use approver_policy::retry::{retry_if, RetryConfig};
use approver_policy::telemetry::{init_tracing, LogFormat};
use approver_policy::Error;

/// approver-policy - keeps CertificateRequestPolicy Ready conditions current
#[derive(Parser, Debug)]
#[command(name = "approver-policy", version, about, long_about = None)]
struct Cli {
    /// Print the CertificateRequestPolicy CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    controller: ControllerArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the readiness controller (default mode)
    Controller,
}

/// Controller tunables, accepted before or after the subcommand
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Number of policies reconciled concurrently
    #[arg(
        long,
        global = true,
        env = "APPROVER_POLICY_WORKERS",
        default_value_t = DEFAULT_WORKERS
    )]
    workers: u16,

    /// Requeue interval for not-ready policies when no approver gives a hint
    #[arg(
        long,
        global = true,
        env = "APPROVER_POLICY_DEFAULT_REQUEUE_MS",
        default_value_t = DEFAULT_REQUEUE_AFTER.as_millis() as u64
    )]
    default_requeue_ms: u64,

    /// Deadline for a single approver readiness check
    #[arg(
        long,
        global = true,
        env = "APPROVER_POLICY_READY_TIMEOUT_SECS",
        default_value_t = DEFAULT_READY_TIMEOUT.as_secs()
    )]
    ready_timeout_secs: u64,

    /// Log output format
    #[arg(
        long,
        global = true,
        env = "APPROVER_POLICY_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,
}

impl ControllerArgs {
    fn config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            default_requeue_after: Duration::from_millis(self.default_requeue_ms),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&CertificateRequestPolicy::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_tracing(cli.controller.log_format)?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(&cli.controller).await,
    }
}

/// Run the readiness controller until SIGINT/SIGTERM
async fn run_controller(args: &ControllerArgs) -> anyhow::Result<()> {
    let config = args.config();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid controller configuration: {}", e))?;

    // Registration is an explicit call list; a clash is a build defect
    let registry = Registry::new()
        .store(builtin::approvers())
        .map_err(|e| anyhow::anyhow!("failed to register approvers: {}", e))?;
    info!(
        count = registry.len(),
        approvers = ?registry.names().collect::<Vec<_>>(),
        "registered approvers"
    );

    let client = retry_if(
        &RetryConfig::startup(),
        "create_kube_client",
        Error::is_retryable,
        || async { Client::try_default().await.map_err(Error::from) },
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to create kubernetes client: {}", e))?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let ctx = Arc::new(
        Context::builder(client.clone(), registry)
            .config(config)
            .cancellation(cancel)
            .build(),
    );

    build_policy_controller(client, ctx).await;

    info!("controller stopped");
    Ok(())
}

/// Cancel `token` on the first SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}
