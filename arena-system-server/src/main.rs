use anyhow::{Context, Result};
use arena_common::{Registry, RegistryError, SecretStore, SystemKey};
use arena_system_server::batcher::{spawn_batcher, BatcherConfig};
use arena_system_server::model::build_model;
use arena_system_server::server::{run_server, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_REGISTRY_NOT_FOUND: i32 = 3;
const EXIT_SECRET_MISSING: i32 = 4;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the system registry YAML.
    #[clap(long)]
    registry: PathBuf,

    /// The system variant to serve, as system_tag:variant_tag.
    #[clap(long)]
    system: String,

    /// The port to listen on. Defaults to the system's derived port.
    #[clap(long)]
    port: Option<u16>,

    /// Maximum number of requests to coalesce into one batch.
    #[clap(long, default_value_t = 4)]
    max_batch_size: usize,

    /// Maximum seconds to hold a batch open waiting for more requests.
    #[clap(long, default_value_t = 4.0)]
    max_delay: f64,

    /// Hard cap on queued requests before returning 503 Busy.
    #[clap(long, default_value_t = 64)]
    queue_cap: usize,

    /// Total GPU memory in GB, for memory-bounded batch sizing.
    #[clap(long)]
    gpu_total_gb: Option<f64>,

    /// Server-side deadline in seconds for one generate request.
    #[clap(long, default_value_t = 170.0)]
    request_timeout: f64,
}

fn registry_exit_code(error: &RegistryError) -> i32 {
    match error {
        RegistryError::NotFound(_) => EXIT_REGISTRY_NOT_FOUND,
        RegistryError::MissingSecret { .. } => EXIT_SECRET_MISSING,
        _ => EXIT_CONFIG_ERROR,
    }
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .ok();

    let key: SystemKey = match cli_args.system.parse() {
        Ok(key) => key,
        Err(e) => {
            error!("invalid --system: {}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let secrets = SecretStore::from_env();
    let registry = match Registry::load(&cli_args.registry, &secrets) {
        Ok(registry) => registry,
        Err(e) => {
            let code = registry_exit_code(&e);
            error!("failed to load registry: {}", e);
            std::process::exit(code);
        }
    };

    if let Err(e) = serve(cli_args, key, registry).await {
        error!("{:#}", e);
        std::process::exit(EXIT_CONFIG_ERROR);
    }
}

async fn serve(cli_args: CliArgs, key: SystemKey, registry: Registry) -> Result<()> {
    let entry = registry
        .lookup(&key)
        .with_context(|| format!("system {} not in registry", key))?;

    info!("serving {} ({})", key, entry.metadata.display_name);
    let model = build_model(&entry.variant)
        .with_context(|| format!("failed to build model for {}", key))?;

    let batcher_config = BatcherConfig {
        max_batch_size: cli_args.max_batch_size,
        max_delay: Duration::from_secs_f64(cli_args.max_delay),
        queue_cap: cli_args.queue_cap,
        gpu_total_gb: cli_args.gpu_total_gb,
    };
    let server_config = ServerConfig {
        port: cli_args.port.unwrap_or_else(|| key.port()),
        request_timeout: Duration::from_secs_f64(cli_args.request_timeout),
    };

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_shutdown.cancel();
        }
    });

    let handle = spawn_batcher(model, batcher_config, shutdown.clone());
    run_server(handle, server_config, shutdown).await
}
