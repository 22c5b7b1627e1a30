//! eel event dispatcher.
//!
//! Loads settings, wires the runtime handle with its transport, duplicate
//! checker and observer, then serves the HTTP API until shutdown.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use eel_api::{start_server, AppState};
use eel_core::{Clock, RealClock, Runtime, Settings, TracingObserver};
use eel_delivery::{
    register_duplicate_checker, register_transport, ClientConfig, DuplicateConfig, HttpTransport,
    LruDuplicateChecker,
};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config-eel/config.json";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = std::env::var_os("EEL_CONFIG_PATH")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let settings = load_settings_or_exit(&config_path);
    let env_name = std::env::var("EEL_ENV").unwrap_or_default();

    info!(
        name = %settings.name,
        version = %settings.version,
        env = %env_name,
        config = %config_path.display(),
        "Starting eel event dispatcher"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let runtime = build_runtime(settings, env_name, Arc::clone(&clock))?;
    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.settings().listen_port()));

    let state = AppState::new(runtime, clock);
    start_server(state, addr).await.context("HTTP server failed")?;

    info!("eel shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,eel=debug,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("EEL_LOG_FORMAT").is_ok_and(|format| format == "json") {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true).with_thread_ids(true)).init();
    }
}

/// Loads settings, terminating the process when they cannot be read.
fn load_settings_or_exit(path: &PathBuf) -> Settings {
    match Settings::load(path) {
        Ok(settings) => settings,
        Err(e) => {
            println!("{}", e.to_json_line());
            error!(error = %e, error_type = e.error_type(), cause = e.cause(), "failed to load settings");
            std::process::exit(1);
        },
    }
}

/// Builds the runtime handle and registers the process-wide services on its
/// root context.
fn build_runtime(settings: Settings, env_name: String, clock: Arc<dyn Clock>) -> Result<Runtime> {
    let client_config = ClientConfig::from_settings(&settings);
    let dedup_config = DuplicateConfig::from_settings(&settings);

    let runtime = Runtime::new(settings, env_name).with_observer(Arc::new(TracingObserver::new(Arc::clone(&clock))));

    let transport = HttpTransport::new(client_config).context("failed to build HTTP transport")?;
    register_transport(runtime.root(), Arc::new(transport));

    match dedup_config {
        Some(config) => {
            info!(ttl = ?config.ttl, capacity = config.capacity.get(), "duplicate suppression enabled");
            register_duplicate_checker(runtime.root(), Arc::new(LruDuplicateChecker::from_config(config, clock)));
        },
        None => info!("duplicate suppression disabled"),
    }

    Ok(runtime)
}
