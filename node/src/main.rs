use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use peerlink_crypto::{CipherCodec, CipherKeys};
use peerlink_network::{
    ContentPeerObserver, DaemonClient, JsonRpcLedgerClient, KuboClient, LedgerNodeClient,
    LedgerPeerObserver, LivenessProber, PeerSource, ProbeConfig,
};
use peerlink_registry::{AuthContext, HttpRegistry, MemoryRegistry, RegistryBackend, RegistryClient};
use peerlink_rpc::{serve, NodeTable, RpcClient, RpcState};
use peerlink_sync::{Reconciler, Scheduler, SyncJob};
use peerlink_types::NodeDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod version;

use config::{AppConfig, RegistryBackendKind};
use version::{git_commit_hash, PEERLINK_AGENT, PEERLINK_VERSION};

fn build_cli() -> Command {
    Command::new("peerlink-node")
        .version(PEERLINK_VERSION)
        .about("Peer registry synchronization node")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (defaults to config/peerlink.toml when present)")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override RPC port")
                .global(true),
        )
        .arg(
            Arg::new("disable-metrics")
                .long("disable-metrics")
                .action(ArgAction::SetTrue)
                .help("Do not install the Prometheus exporter")
                .global(true),
        )
        .subcommand(Command::new("start").about("Run the sync jobs and the RPC server (default)"))
        .subcommand(Command::new("id").about("Print the descriptor reported by the local node"))
        .subcommand(
            Command::new("connect")
                .about("Introduce the local node to a remote node")
                .arg(
                    Arg::new("addr")
                        .long("addr")
                        .value_name("HOST:PORT")
                        .required(true)
                        .help("RPC address of the remote node"),
                ),
        )
        .subcommand(Command::new("version").about("Print version information"))
}

fn load_config_with_overrides(matches: &ArgMatches) -> Result<AppConfig> {
    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    Ok(config)
}

fn apply_overrides(matches: &ArgMatches, config: &mut AppConfig) {
    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log.level = log_level.clone();
    }
    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log.format = log_format.clone();
    }
    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc.port = *rpc_port;
    }
    if matches.get_flag("disable-metrics") {
        config.metrics.enabled = false;
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    if config.log.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("failed to install log subscriber")?;
    }

    Ok(())
}

fn init_metrics(config: &AppConfig) -> Option<PrometheusHandle> {
    if !config.metrics.enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            describe_counter!(
                "peerlink_sync_passes_total",
                "Reconciliation passes by job and outcome"
            );
            describe_counter!(
                "peerlink_registry_additions_total",
                "Encoded peer entries appended to the registry"
            );
            describe_counter!(
                "peerlink_registry_deletions_total",
                "Stale registry entries deleted"
            );
            describe_counter!(
                "peerlink_sync_skipped_total",
                "Entries or passes skipped, by reason"
            );
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn build_daemon(config: &AppConfig) -> Result<Arc<dyn DaemonClient>> {
    let client = match &config.daemon.repo_path {
        Some(repo) => KuboClient::from_repo(repo.clone(), config.daemon_timeout())
            .with_context(|| format!("failed to set up daemon client for repo {}", repo.display()))?,
        None => KuboClient::new(config.daemon.api_url.clone(), config.daemon_timeout())
            .with_context(|| format!("failed to set up daemon client for {}", config.daemon.api_url))?,
    };
    Ok(Arc::new(client))
}

fn build_registry_backend(config: &AppConfig) -> Result<Arc<dyn RegistryBackend>> {
    match config.registry.backend {
        RegistryBackendKind::Memory => {
            warn!("using the in-memory registry backend; entries are not shared with other nodes");
            Ok(Arc::new(MemoryRegistry::new()))
        }
        RegistryBackendKind::Http => {
            let backend = HttpRegistry::new(config.registry.url.clone(), config.registry_timeout())
                .context("failed to set up registry gateway client")?;
            Ok(Arc::new(backend))
        }
    }
}

fn build_codec(config: &AppConfig) -> Result<Arc<CipherCodec>> {
    let keys = CipherKeys::new(
        config.cipher.private_key.as_bytes().to_vec(),
        config.cipher.public_key.as_bytes().to_vec(),
    )
    .context("invalid cipher key pair")?;
    let codec = CipherCodec::new(keys, config.cipher.rounds, config.epoch()?)
        .context("invalid cipher parameters")?;
    Ok(Arc::new(codec))
}

fn prober(config: &AppConfig, default_port: u16) -> LivenessProber {
    LivenessProber::new(ProbeConfig {
        timeout: config.probe_timeout(),
        concurrency: config.probe.concurrency,
        default_port,
    })
}

fn sync_job(
    name: &str,
    source: Arc<dyn PeerSource>,
    backend: Arc<dyn RegistryBackend>,
    namespace: &str,
    auth: AuthContext,
    codec: Arc<CipherCodec>,
    prober: LivenessProber,
) -> Result<Arc<SyncJob>> {
    let registry = RegistryClient::new(backend, namespace, auth)
        .with_context(|| format!("invalid registry settings for job {name}"))?;
    let reconciler = Reconciler::new(source, registry, codec, prober);
    Ok(Arc::new(SyncJob::new(name, reconciler)))
}

const IDENTITY_RETRY: Duration = Duration::from_secs(5);

/// Wait until the content daemon answers, then publish its peer id as this
/// node's identity. Runs in the background so an absent daemon never blocks
/// startup.
async fn resolve_identity_when_ready(
    state: Arc<RpcState>,
    daemon: Arc<dyn DaemonClient>,
    public_addr: String,
    port: u16,
    retry: Duration,
) {
    loop {
        if daemon.is_ready().await {
            match daemon.identity().await {
                Ok(identity) => {
                    info!(
                        id = %identity.id,
                        agent = %identity.agent_version,
                        "using daemon identity as node id"
                    );
                    state.set_descriptor(NodeDescriptor::new(identity.id, public_addr, port));
                    return;
                }
                Err(err) => warn!(error = %err, "daemon identity unavailable, retrying"),
            }
        } else {
            debug!("content daemon not ready, node identity pending");
        }
        tokio::time::sleep(retry).await;
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => warn!("Failed to listen for shutdown signal: {}", err),
    }
}

async fn run_node(config: AppConfig) -> Result<()> {
    config.validate()?;
    info!(
        version = PEERLINK_VERSION,
        commit = git_commit_hash(),
        "Starting peerlink node"
    );

    let metrics = init_metrics(&config);
    let daemon = build_daemon(&config)?;
    let codec = build_codec(&config)?;
    let backend = build_registry_backend(&config)?;
    let auth = AuthContext::new(config.registry.account.clone(), config.registry.token.clone());

    let mut scheduler = Scheduler::new();

    let content_prober = prober(&config, config.probe.content_port);
    let content_source: Arc<dyn PeerSource> = Arc::new(ContentPeerObserver::new(
        daemon.clone(),
        content_prober.clone(),
    ));
    let content_job = sync_job(
        "content",
        content_source,
        backend.clone(),
        &config.registry.content_namespace,
        auth.clone(),
        codec.clone(),
        content_prober,
    )?;
    scheduler
        .register(&config.sync.content_schedule, content_job)
        .context("failed to schedule content sync")?;

    if config.ledger.enabled {
        let ledger: Arc<dyn LedgerNodeClient> = Arc::new(
            JsonRpcLedgerClient::new(config.ledger.rpc_url.clone(), config.ledger_timeout())
                .context("failed to set up ledger node client")?,
        );
        let ledger_prober = prober(&config, config.probe.ledger_port);
        let ledger_source: Arc<dyn PeerSource> =
            Arc::new(LedgerPeerObserver::new(ledger, ledger_prober.clone()));
        let ledger_job = sync_job(
            "ledger",
            ledger_source,
            backend.clone(),
            &config.registry.ledger_namespace,
            auth.clone(),
            codec.clone(),
            ledger_prober,
        )?;
        scheduler
            .register(&config.sync.ledger_schedule, ledger_job)
            .context("failed to schedule ledger sync")?;
    } else {
        info!("ledger sync disabled via configuration");
    }

    scheduler.start().context("failed to start scheduler")?;

    let client = RpcClient::new(config.rpc_timeout()).context("failed to build RPC client")?;
    let mut state = RpcState::awaiting_identity(NodeTable::new(), client).with_daemon(daemon.clone());
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }
    let state = Arc::new(state);

    let configured_id = config.node.id.trim();
    let identity_task = if configured_id.is_empty() {
        Some(tokio::spawn(resolve_identity_when_ready(
            state.clone(),
            daemon,
            config.rpc.public_addr.clone(),
            config.rpc.port,
            IDENTITY_RETRY,
        )))
    } else {
        state.set_descriptor(NodeDescriptor::new(
            configured_id,
            config.rpc.public_addr.clone(),
            config.rpc.port,
        ));
        None
    };

    let served = serve(state, &config.rpc_bind_addr(), shutdown_signal()).await;
    if let Some(task) = identity_task {
        task.abort();
    }
    scheduler.shutdown();
    served?;

    info!("peerlink node shutdown complete");
    Ok(())
}

async fn print_identity(config: &AppConfig) -> Result<()> {
    let client = RpcClient::new(config.rpc_timeout())?;
    let endpoint = config.local_rpc_url();
    let descriptor = client
        .id(&endpoint)
        .await
        .with_context(|| format!("local node at {endpoint} did not answer Node.ID"))?;
    println!("{}", descriptor.key());
    Ok(())
}

async fn connect_remote(config: &AppConfig, addr: &str) -> Result<()> {
    let client = RpcClient::new(config.rpc_timeout())?;
    let local_endpoint = config.local_rpc_url();
    let local = client
        .id(&local_endpoint)
        .await
        .with_context(|| format!("local node at {local_endpoint} did not answer Node.ID"))?;

    let remote = remote_endpoint(addr);
    client
        .connect(&remote, &local)
        .await
        .with_context(|| format!("{remote} refused the connection from {}", local.key()))?;
    println!("connected {} -> {remote}", local.key());
    Ok(())
}

fn remote_endpoint(addr: &str) -> String {
    let addr = addr.trim().trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        if addr.ends_with("/rpc") {
            addr.to_string()
        } else {
            format!("{addr}/rpc")
        }
    } else {
        format!("http://{addr}/rpc")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if matches.subcommand_name() == Some("version") {
        println!("{PEERLINK_AGENT} (commit {})", git_commit_hash());
        return Ok(());
    }

    let config = load_config_with_overrides(&matches)?;
    init_logging(&config)?;

    match matches.subcommand() {
        Some(("id", _)) => print_identity(&config).await,
        Some(("connect", sub)) => {
            let addr = sub
                .get_one::<String>("addr")
                .context("--addr is required")?;
            connect_remote(&config, addr).await
        }
        _ => run_node(config).await,
    }
}
