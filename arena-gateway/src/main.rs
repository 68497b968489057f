use anyhow::{bail, Context, Result};
use arena_common::{Registry, RegistryError, SecretError, SecretStore, SystemKey};
use arena_gateway::battle::BattleGenerator;
use arena_gateway::chat::{OpenAiChatProvider, PromptPipeline};
use arena_gateway::config::{ConfigOverrides, GatewayConfig};
use arena_gateway::matchup::MatchupWeights;
use arena_gateway::prebaked::PrebakedPrompts;
use arena_gateway::server::{run_server, ServerState};
use arena_gateway::store::{FsDocStore, LocalBlobStore};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_REGISTRY_NOT_FOUND: i32 = 3;
const EXIT_SECRET_MISSING: i32 = 4;

const CHAT_API_KEY_SECRET: &str = "openai-api-key";

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the system registry YAML.
    #[clap(long)]
    registry: PathBuf,

    /// Comma-separated systems to serve battles with, each
    /// system_tag:variant_tag with an optional =port override.
    #[clap(long)]
    systems: String,

    /// Matchup weights over ordered pairs, e.g. "a:v/b:w=1.5,b:w/a:v=0.5".
    #[clap(long)]
    weights: Option<String>,

    /// The port to listen on.
    #[clap(long, default_value_t = 8080)]
    port: u16,

    /// Public base URL for audio links. Falls back to GATEWAY_URL.
    #[clap(long)]
    public_base_url: Option<String>,

    /// Base URL where system servers live. Falls back to SYSTEMS_BASE_URL.
    #[clap(long)]
    systems_base_url: Option<String>,

    /// Directory for audio blobs and battle documents.
    #[clap(long, default_value = "./gateway-data")]
    data_dir: PathBuf,

    /// Path to a JSON file of prebaked prompts.
    #[clap(long)]
    prebaked: Option<PathBuf>,

    /// Probability of injecting a transient error (test mode only).
    /// Falls back to FLAKINESS.
    #[clap(long)]
    flakiness: Option<f64>,

    /// Minimum seconds of listening required per side before a vote.
    /// Falls back to MINIMUM_LISTEN_TIME.
    #[clap(long)]
    minimum_listen_time: Option<f64>,

    /// Total deadline in seconds for one generate call.
    #[clap(long)]
    generate_deadline_secs: Option<u64>,

    /// Base URL of the chat completion provider.
    #[clap(long, default_value = "https://api.openai.com")]
    chat_base_url: String,

    /// Chat model used for moderation, routing, and lyrics.
    #[clap(long, default_value = "gpt-4o")]
    chat_model: String,

    /// Tag naming the prompt template configuration.
    #[clap(long)]
    route_config: Option<String>,
}

/// Parse "system:variant" or "system:variant=port" entries.
fn parse_systems(spec: &str) -> Result<(Vec<SystemKey>, HashMap<SystemKey, u16>)> {
    let mut keys = Vec::new();
    let mut ports = HashMap::new();
    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key_part, port_part) = match entry.split_once('=') {
            Some((key, port)) => (key, Some(port)),
            None => (entry, None),
        };
        let key: SystemKey = key_part
            .parse()
            .with_context(|| format!("invalid system {:?}", entry))?;
        if let Some(port) = port_part {
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid port in {:?}", entry))?;
            ports.insert(key.clone(), port);
        }
        keys.push(key);
    }
    if keys.len() < 2 {
        bail!("at least two systems are required, got {}", keys.len());
    }
    Ok((keys, ports))
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

    let overrides = ConfigOverrides {
        port: Some(cli_args.port),
        public_base_url: cli_args.public_base_url.clone(),
        systems_base_url: cli_args.systems_base_url.clone(),
        minimum_listen_time: cli_args.minimum_listen_time,
        flakiness: cli_args.flakiness,
        generate_deadline_secs: cli_args.generate_deadline_secs,
        route_config: cli_args.route_config.clone(),
    };
    let config = match GatewayConfig::resolve(&overrides) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {:#}", e);
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

    let chat_api_key = match secrets.get(CHAT_API_KEY_SECRET) {
        Ok(key) => key,
        Err(e @ SecretError::NotFound { .. }) => {
            error!("{}", e);
            std::process::exit(EXIT_SECRET_MISSING);
        }
    };

    if let Err(e) = serve(cli_args, config, registry, chat_api_key).await {
        error!("{:#}", e);
        std::process::exit(EXIT_CONFIG_ERROR);
    }
}

async fn serve(
    cli_args: CliArgs,
    config: GatewayConfig,
    registry: Registry,
    chat_api_key: String,
) -> Result<()> {
    let (systems, port_overrides) = parse_systems(&cli_args.systems)?;
    info!("enabled systems: {:?}", systems.iter().map(|k| k.to_string()).collect::<Vec<_>>());

    let weights = match &cli_args.weights {
        Some(spec) => MatchupWeights::parse(spec).context("invalid --weights")?,
        None => MatchupWeights::default(),
    };

    let mut system_urls = HashMap::new();
    for key in &systems {
        let port = port_overrides.get(key).copied().unwrap_or_else(|| key.port());
        system_urls.insert(key.clone(), format!("{}:{}", config.systems_base_url, port));
    }

    let provider = OpenAiChatProvider::new(
        cli_args.chat_base_url.clone(),
        cli_args.chat_model.clone(),
        chat_api_key,
    )
    .map_err(|e| anyhow::anyhow!("failed to build chat provider: {}", e))?;
    let pipeline = Arc::new(PromptPipeline::new(
        Arc::new(provider),
        config.route_config.clone(),
    ));

    let blobs = Arc::new(LocalBlobStore::new(
        cli_args.data_dir.join("audio"),
        format!("{}/audio", config.public_base_url),
    ));
    let docs = Arc::new(FsDocStore::new(cli_args.data_dir.join("battles")));

    let battles = BattleGenerator::new(
        Arc::new(registry),
        systems,
        system_urls,
        weights,
        pipeline,
        blobs.clone(),
        docs,
        config.generate_deadline,
        config.minimum_listen_time,
    )
    .map_err(|e| anyhow::anyhow!("failed to build battle generator: {}", e))?;

    let prebaked = match &cli_args.prebaked {
        Some(path) => PrebakedPrompts::load(path),
        None => PrebakedPrompts::empty(),
    };

    let state = ServerState {
        battles: Arc::new(battles),
        blobs,
        prebaked: Arc::new(prebaked),
        config: config.clone(),
        start_time: Instant::now(),
    };
    run_server(state, &config).await
}
