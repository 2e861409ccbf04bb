// # ipfailoverd - IP Failover Daemon
//
// Thin integration layer around ipfailover-core. All decision, DNS and
// state logic lives in the library; this binary only:
//
// 1. Parses the command line and loads the YAML configuration
// 2. Applies `IPFAILOVER_*` environment overrides and validates
// 3. Initializes logging and the runtime
// 4. Registers providers and builds the engine
// 5. Serves `/metrics` and `/health` on `metrics_addr`
// 6. Runs until SIGTERM/SIGINT, or runs a single health check
//
// ## Example
//
// ```bash
// export IPFAILOVER_CONFIG=/etc/ipfailover/config.yaml
// ipfailoverd
// ipfailoverd --health-check
// ```
//
// ## Exit codes
//
// - 0: Clean shutdown (or healthy, with `--health-check`)
// - 1: Configuration or startup error (or unhealthy)
// - 2: Runtime error

use anyhow::{Context, Result};
use clap::Parser;
use ipfailover_core::traits::StateStore;
use ipfailover_core::{
    EngineEvent, FailoverConfig, FailoverEngine, FileStateStore, HealthPolicy, MetricsServer, PrometheusMetrics,
    ProviderRegistry, TcpProber, check_health,
};
use ipfailover_ip_http::HttpIpChecker;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the engine gets to stop after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailoverExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FailoverExitCode> for ExitCode {
    fn from(code: FailoverExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep DNS records pointed at a reachable primary address, failing over to
/// a secondary address when the primary stops answering.
#[derive(Debug, Parser)]
#[command(name = "ipfailoverd", version, about)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "IPFAILOVER_CONFIG")]
    config: PathBuf,

    /// Run one health check and exit 0 (healthy) or 1 (unhealthy)
    #[arg(long)]
    health_check: bool,

    /// Override the configured log level
    #[arg(long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// Look up records but only log changes; state is never written
    #[arg(long, env = "IPFAILOVER_DRY_RUN")]
    dry_run: bool,
}

/// Where a daemon run failed
#[derive(Debug)]
enum Failure {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

impl Failure {
    fn exit_code(&self) -> FailoverExitCode {
        match self {
            Failure::Startup(_) => FailoverExitCode::ConfigError,
            Failure::Runtime(_) => FailoverExitCode::RuntimeError,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Startup(e) => write!(f, "startup failed: {e:#}"),
            Failure::Runtime(e) => write!(f, "runtime failure: {e:#}"),
        }
    }
}

/// Load, override and validate configuration
fn load_config(cli: &Cli) -> Result<FailoverConfig> {
    let mut config = FailoverConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    config
        .apply_env_overrides()
        .context("Invalid IPFAILOVER_* environment override")?;

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return FailoverExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&config.log_level))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FailoverExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FailoverExitCode::RuntimeError.into();
        }
    };

    if cli.health_check {
        return rt.block_on(run_health_check(&config)).into();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        records = config.records.len(),
        dry_run = cli.dry_run,
        "Starting ipfailoverd"
    );

    let result = rt.block_on(run_daemon(config, cli.dry_run));
    match result {
        Ok(()) => {
            info!("Daemon stopped cleanly");
            FailoverExitCode::CleanShutdown.into()
        }
        Err(failure) => {
            error!("Daemon error: {}", failure);
            failure.exit_code().into()
        }
    }
}

/// One-shot health check
async fn run_health_check(config: &FailoverConfig) -> FailoverExitCode {
    let checker = match HttpIpChecker::from_config(config) {
        Ok(checker) => checker,
        Err(e) => {
            error!("Health check setup failed: {}", e);
            return FailoverExitCode::ConfigError;
        }
    };
    let store = match FileStateStore::new(&config.state_file).await {
        Ok(store) => store,
        Err(e) => {
            error!("Health check setup failed: {}", e);
            return FailoverExitCode::ConfigError;
        }
    };

    let policy = HealthPolicy {
        tolerate_corrupt_state: config.tolerate_corrupt_state,
        timeout: config.engine.operation_timeout(),
    };
    let report = check_health(&checker, &store, &policy).await;

    if report.is_healthy() {
        info!(
            address = ?report.address,
            state_corrupted = report.state_corrupted,
            "Healthy"
        );
        FailoverExitCode::CleanShutdown
    } else {
        for problem in &report.problems {
            error!("Unhealthy: {}", problem);
        }
        FailoverExitCode::ConfigError
    }
}

/// Build every component from configuration
fn provider_registry(dry_run: bool) -> ProviderRegistry {
    #[allow(unused_mut)]
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    ipfailover_provider_cloudflare::register(&mut registry, dry_run);

    #[cfg(feature = "hetzner")]
    ipfailover_provider_hetzner::register(&mut registry, dry_run);

    if dry_run {
        warn!("DRY-RUN mode: DNS changes are logged, not made");
    }
    info!(providers = ?registry.list_providers(), "Providers registered");
    registry
}

/// Run the daemon until a shutdown signal
async fn run_daemon(config: FailoverConfig, dry_run: bool) -> Result<(), Failure> {
    let registry = provider_registry(dry_run);
    let bindings = registry
        .bind_records(&config.records)
        .context("Failed to create DNS providers")
        .map_err(Failure::Startup)?;

    let checker = HttpIpChecker::from_config(&config)
        .context("Failed to create IP checker")
        .map_err(Failure::Startup)?;

    let store = open_state_store(&config, dry_run)
        .await
        .context("Failed to open state store")
        .map_err(Failure::Startup)?;
    match store.get_last_applied_address().await {
        Ok(address) if !address.is_empty() => info!(address = %address, "Resuming from persisted state"),
        Ok(_) => info!(path = %config.state_file.display(), "No previous state"),
        Err(e) => warn!("Persisted state unreadable, it will be replaced: {}", e),
    }

    let metrics = Arc::new(
        PrometheusMetrics::new()
            .context("Failed to register metrics")
            .map_err(Failure::Startup)?,
    );
    let server = match config.metrics_addr {
        Some(addr) => Some(
            MetricsServer::bind(addr, metrics.clone())
                .await
                .context("Failed to start metrics server")
                .map_err(Failure::Startup)?,
        ),
        None => {
            info!("Metrics server disabled");
            None
        }
    };

    let (engine, events) = FailoverEngine::new(
        &config,
        Arc::new(checker),
        Arc::new(TcpProber::new(config.engine.probe_port)),
        store,
        metrics.clone(),
        bindings,
    )
    .context("Failed to create failover engine")
    .map_err(Failure::Startup)?;

    let token = CancellationToken::new();
    let server_task = server.map(|server| tokio::spawn(server.serve(token.clone())));
    let event_task = tokio::spawn(log_events(events, metrics.clone()));
    let mut engine_task = tokio::spawn({
        let token = token.clone();
        async move { engine.run(token).await }
    });

    let outcome = tokio::select! {
        signal = wait_for_shutdown() => {
            match signal {
                Ok(name) => info!("Received {}, shutting down", name),
                Err(e) => error!("Signal handling failed, shutting down: {}", e),
            }
            token.cancel();

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut engine_task).await {
                Ok(joined) => engine_result(joined),
                Err(_) => Err(Failure::Runtime(anyhow::anyhow!(
                    "Engine did not stop within {:?}",
                    SHUTDOWN_TIMEOUT
                ))),
            }
        }
        // The engine only returns early when startup validation fails
        joined = &mut engine_task => engine_result(joined),
    };

    // Also covers the engine returning early on its own.
    token.cancel();
    if let Some(task) = server_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Metrics server failed: {}", e),
            Err(e) => warn!("Metrics server ended abnormally: {}", e),
        }
    }

    // The engine owned the only sender; the drain task ends once it is gone.
    if let Err(e) = event_task.await {
        warn!("Event logger ended abnormally: {}", e);
    }
    info!(metrics = ?metrics.snapshot(), "Final metrics");

    outcome
}

/// The state file, or a detached in-memory copy of it for dry runs
async fn open_state_store(config: &FailoverConfig, dry_run: bool) -> Result<Arc<dyn StateStore>> {
    let file = FileStateStore::new(&config.state_file).await?;
    if dry_run {
        info!(path = %config.state_file.display(), "DRY-RUN mode: state changes stay in memory");
        Ok(Arc::new(file.detached().await))
    } else {
        Ok(Arc::new(file))
    }
}

fn engine_result(
    joined: std::result::Result<ipfailover_core::Result<()>, tokio::task::JoinError>,
) -> Result<(), Failure> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Failure::Startup(anyhow::Error::new(e).context("Provider validation failed"))),
        Err(e) => Err(Failure::Runtime(anyhow::anyhow!("Engine task failed: {}", e))),
    }
}

/// Log engine events as they arrive
async fn log_events(mut events: mpsc::Receiver<EngineEvent>, metrics: Arc<PrometheusMetrics>) {
    while let Some(event) = events.recv().await {
        let cycle_done = matches!(
            event,
            EngineEvent::UpdateSkipped { .. }
                | EngineEvent::CheckFailed { .. }
                | EngineEvent::RecordReconciled { .. }
                | EngineEvent::RecordFailed { .. }
                | EngineEvent::FailoverCompleted { .. }
        );

        match &event {
            EngineEvent::Started { records_count } => info!(records = records_count, "Engine started"),
            EngineEvent::FailoverCompleted { previous, current } => info!(
                from = previous.as_deref().unwrap_or("<none>"),
                to = %current,
                "DNS now points at new address"
            ),
            EngineEvent::RecordFailed { record, error, retryable } => {
                warn!(record = %record, retryable, "Record not converged: {}", error)
            }
            EngineEvent::Stopped { reason } => info!(reason = %reason, "Engine stopped"),
            other => debug!(event = ?other, "Engine event"),
        }

        if cycle_done {
            debug!(metrics = ?metrics.snapshot(), "Metrics");
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
