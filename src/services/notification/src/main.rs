//! Main binary for the ExpoBuild Notification Service
//!
//! Serves the admin notification endpoint, runs the scheduled-dispatch loop
//! and exposes health and Prometheus metrics.

use notification_service::{
    config::{NotificationConfig, ObservabilityConfig},
    routes::create_router,
    NotificationService,
};

use anyhow::Context;
use axum::serve;
use clap::{Arg, ArgMatches, Command};
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let matches = create_cli().get_matches();

    // Load configuration
    let config = load_config(&matches)?;

    init_tracing(&config.observability)?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    info!("Starting ExpoBuild Notification Service");
    info!(
        "Configuration: Server {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Enabled channels: Email={}, SMS={}, Dashboard={}",
        config.email.enabled, config.sms.enabled, config.dashboard.enabled
    );

    let service = NotificationService::new(config.clone()).map_err(|e| {
        error!("Failed to initialize notification service: {}", e);
        e
    })?;

    if config.scheduler.enabled {
        service.start_scheduler();
    } else {
        warn!("Scheduler disabled; bulk requests with scheduleAt will be rejected");
    }

    let app = create_router(service.shared_manager(), config.get_timeout("server"));

    // Create socket address
    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid host address: {}", config.server.host))?,
        config.server.port,
    );

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;

    info!("Notification service started successfully on {}", addr);
    info!("Admin endpoint: http://{}/api/admin/notifications", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);

    // Start server with graceful shutdown
    serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown signal received, stopping scheduler");
    service.stop_scheduler();

    info!("ExpoBuild Notification Service stopped gracefully");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(observability: &ObservabilityConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "notification_service={level},expo_shared={level},tower_http=info",
            level = observability.log_level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if observability.json_logs {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("Failed to initialize tracing")?;
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .context("Failed to initialize tracing")?;
    }

    Ok(())
}

/// Create CLI argument parser
fn create_cli() -> Command {
    Command::new("notification-server")
        .version(env!("CARGO_PKG_VERSION"))
        .about("ExpoBuild Notification Service - builder notification dispatch and tracking")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .env("NOTIFICATION_CONFIG_FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Server host address (overrides configuration)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Server port (overrides configuration)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
}

/// Layered configuration with CLI overrides on top
fn load_config(matches: &ArgMatches) -> anyhow::Result<NotificationConfig> {
    let file = matches.get_one::<String>("config").map(String::as_str);
    let mut config = NotificationConfig::load(file).with_context(|| match file {
        Some(file) => format!("Failed to load configuration from file: {}", file),
        None => "Failed to load configuration from environment".to_string(),
    })?;

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }

    if let Some(port_str) = matches.get_one::<String>("port") {
        config.server.port = port_str
            .parse()
            .with_context(|| format!("Invalid port number '{}'", port_str))?;
    }

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }

    Ok(config)
}

/// Wait for shutdown signals
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
