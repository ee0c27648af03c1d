//! Vigil entry point.
//!
//! Loads configuration, initializes tracing, builds the datastore and cache
//! backends and the health checker, then serves the endpoint until a shutdown
//! signal arrives.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil::backends::{cache_from_config, datastore_from_config};
use vigil::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use vigil::health::build_info::BuildInfoReader;
use vigil::health::platform::{CommandRunner, DisabledRunner, PlatformProbe, ProcessRunner};
use vigil::health::runtime::RuntimeProbe;
use vigil::health::HealthChecker;
use vigil::http::start_server;
use vigil::routes::create_router;
use vigil::state::AppState;
use vigil::templates::init_templates;

/// Vigil: health checks for datastore and object cache backed applications
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "vigil=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_tracing(filter: &str, json: bool) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_checker(config: &AppConfig) -> Result<HealthChecker, Box<dyn std::error::Error>> {
    let datastore = datastore_from_config(config)?;
    let cache = cache_from_config(config)?;

    let runner: Box<dyn CommandRunner> = if config.platform.cli_command.is_empty() {
        Box::new(DisabledRunner)
    } else {
        Box::new(ProcessRunner)
    };
    let platform = PlatformProbe::new(
        config.platform.version.clone(),
        config.platform.schema_version,
        config.platform.cli_command.clone(),
        runner,
    );

    Ok(HealthChecker::new(datastore, cache)
        .with_runtime(RuntimeProbe::new(config.health.memory_limit.clone()))
        .with_build_info(BuildInfoReader::new(config.health.build_root.clone()))
        .with_platform(platform)
        .with_slow_threshold(config.health.slow_threshold_seconds))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration first: it decides the log format
    let config = AppConfig::load(&args.config)?;

    // Filter priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    init_tracing(&log_filter, config.logging.is_json());

    tracing::info!(path = %args.config, "Loaded configuration");
    tracing::info!(
        routes = ?config.health.routes,
        slow_threshold = config.health.slow_threshold_seconds,
        cache = ?config.cache.backend,
        fallback = config.datastore.fallback_url.is_some(),
        "Health endpoint configured"
    );

    if config.auth.require_authentication
        && config.auth.tokens.is_empty()
        && config.auth.admin_tokens.is_empty()
    {
        tracing::warn!("Authentication is required but no tokens are configured; every request will be rejected");
    }

    let tera = init_templates()?;
    tracing::info!("Initialized templates");

    let checker = build_checker(&config)?;
    tracing::info!("Initialized health checker");

    let state = AppState::new(config.clone(), tera, checker);
    let app = create_router(state);

    start_server(app, &config).await?;

    tracing::info!("Server stopped");
    Ok(())
}
