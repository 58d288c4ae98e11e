mod config;
mod confirm;
mod registry;
mod report;
mod rollout;
mod transport;

use anyhow::{bail, Context, Result};
use config::RolloutConfig;
use registry::{DeviceRegistry, InventoryRegistry, PostgresRegistry};
use report::{ConsoleReporter, Reporter};
use rollout::Orchestrator;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use transport::{BridgeTransport, DeviceTransport};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let config = RolloutConfig::load().context("failed to load configuration")?;

    let reporter = Arc::new(ConsoleReporter::new(config.transport.port));
    reporter.banner(fleet_shared::now());

    let registry = open_registry(&config).await?;
    let transport = Arc::new(BridgeTransport::from_config(&config.transport));

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted by user, stopping after the current stage");
            watcher.cancel();
        }
    });

    execute(
        &config,
        registry.as_ref(),
        transport,
        reporter,
        confirm::confirm("Continue with update?"),
        &cancel,
    )
    .await
}

/// Fetch the fleet, ask for confirmation and roll out
///
/// `approval` is only awaited once a non-empty fleet has been listed and is
/// skipped entirely with `assume_yes`. An interruption while waiting for it
/// counts as a refusal. No device is contacted before approval.
async fn execute<F>(
    config: &RolloutConfig,
    registry: &dyn DeviceRegistry,
    transport: Arc<dyn DeviceTransport>,
    reporter: Arc<dyn Reporter>,
    approval: F,
    cancel: &CancellationToken,
) -> Result<ExitCode>
where
    F: Future<Output = Result<bool>>,
{
    info!("Fetching eligible devices from {} registry", registry.name());
    let devices = registry
        .fetch_eligible_devices()
        .await
        .context("failed to fetch eligible devices")?;

    reporter.on_fleet_fetched(&devices);
    if devices.is_empty() {
        return Ok(ExitCode::FAILURE);
    }

    if !config.rollout.assume_yes {
        let approved = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            answer = approval => answer?,
        };
        if !approved {
            reporter.on_declined();
            return Ok(ExitCode::FAILURE);
        }
    }

    let package = &config.rollout.package_path;
    if !package.is_file() {
        bail!("package {} does not exist", package.display());
    }

    let orchestrator = Orchestrator::new(config.rollout.clone(), transport, reporter);
    orchestrator.run(devices, cancel).await;

    Ok(ExitCode::SUCCESS)
}

/// Database registry when a URL is configured, otherwise the static inventory
async fn open_registry(config: &RolloutConfig) -> Result<Box<dyn DeviceRegistry>> {
    let port = config.transport.port;

    if let Some(url) = &config.registry.database_url {
        let registry = PostgresRegistry::connect(url, port)
            .await
            .context("failed to open device registry")?;
        return Ok(Box::new(registry));
    }

    if config.registry.devices.is_empty() {
        bail!("no device registry configured: set DATABASE_URL or list [[registry.devices]]");
    }

    Ok(Box::new(InventoryRegistry::new(
        config.registry.devices.clone(),
        port,
    )))
}
