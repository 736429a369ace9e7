use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idev_config::{Config, ConfigLoader};
use idev_core::{Engine, EngineBuilder};
use idev_types::PlatformEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;

#[derive(Parser)]
#[command(name = "idev-platform")]
#[command(about = "Commerce platform and payment rail orchestration service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	/// Overrides `service.log_level` from the configuration file.
	#[arg(long, env = "IDEV_LOG_LEVEL")]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the orchestration service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	// Tracing level may come from the file, so load it first.
	let config = load_config(&cli.config).await?;
	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.service.log_level.clone());
	setup_tracing(&log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli, config).await,
		Some(Commands::Validate) => validate_config(cli, config),
	}
}

async fn load_config(path: &Path) -> Result<Config> {
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", path))
}

async fn start_service(cli: Cli, config: Config) -> Result<()> {
	info!("Starting IDev platform service");
	info!("Configuration loaded from: {:?}", cli.config);
	info!("Service name: {}", config.service.name);
	info!("HTTP listener: {}:{}", config.service.host, config.service.http_port);

	let host = config.service.host.clone();
	let port = config.service.http_port;

	let engine = EngineBuilder::new(config)
		.build()
		.context("Failed to build engine")?;
	let engine = Arc::new(engine);

	engine.init().await.context("Failed to initialize engine")?;

	let events_handle = tokio::spawn(log_events(engine.clone()));

	let api_engine = engine.clone();
	let mut http_handle =
		tokio::spawn(async move { api::start_http_server(api_engine, host, port).await });

	info!("IDev platform service started successfully");

	tokio::select! {
		_ = setup_shutdown_signal() => {
			info!("Shutdown signal received, stopping services...");
		}
		result = &mut http_handle => {
			match result {
				Ok(Ok(())) => warn!("HTTP server exited"),
				Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
				Err(e) => error!(error = %e, "HTTP server task panicked"),
			}
		}
	}

	engine.shutdown();
	http_handle.abort();
	events_handle.abort();

	info!("IDev platform service stopped");
	Ok(())
}

/// Mirrors every orchestration event into the log until shutdown.
async fn log_events(engine: Arc<Engine>) {
	let mut rx = engine.events().subscribe();
	let shutdown = engine.shutdown_token();
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => break,
			event = rx.recv() => match event {
				Ok(PlatformEvent::Commerce(event)) => info!(?event, "Commerce event"),
				Ok(PlatformEvent::Payment(event)) => info!(?event, "Payment event"),
				Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
				Err(RecvError::Closed) => break,
			},
		}
	}
}

fn validate_config(cli: Cli, config: Config) -> Result<()> {
	info!("Configuration file {:?} is valid", cli.config);
	info!("Service name: {}", config.service.name);

	info!("Enabled platforms:");
	for (name, platform) in config.commerce.enabled_platforms() {
		info!("  {} ({})", name, platform.implementation);
	}

	info!("Configured wallets:");
	for name in config.payment.wallets.keys() {
		info!("  {}", name);
	}
	info!("Payment gateway: {}", config.payment.gateway.implementation);
	info!("Storage backend: {}", config.storage.backend);

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to initialize tracing")?;

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "Failed to install Ctrl+C handler");
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
				error!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
