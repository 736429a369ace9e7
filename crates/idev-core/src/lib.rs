//! Engine wiring.
//!
//! [`EngineBuilder`] turns a validated [`Config`] into the storage backend,
//! the commerce adapters, the wallet rails and the card gateway, then hands
//! them to the two orchestrators. Every implementation is created through a
//! named factory so tests can swap any of them for a scripted double.

use idev_commerce::{CommerceError, CommerceInterface, CommerceService, CommerceSettings};
use idev_config::{Config, COMMERCE_IMPLEMENTATIONS};
use idev_payment::{GatewayInterface, PaymentError, PaymentService, PaymentSettings};
use idev_storage::{StorageError, StorageInterface, StorageService};
use idev_types::{ChainRef, EventBus, PlatformKind, WalletType};
use idev_wallet::{WalletError, WalletInterface};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Configuration(String),
	#[error(transparent)]
	Commerce(#[from] CommerceError),
	#[error(transparent)]
	Wallet(#[from] WalletError),
	#[error(transparent)]
	Payment(#[from] PaymentError),
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// The running orchestration layer.
pub struct Engine {
	config: Config,
	storage: Arc<StorageService>,
	commerce: Arc<CommerceService>,
	payment: Arc<PaymentService>,
	events: EventBus,
	shutdown: CancellationToken,
}

impl Engine {
	/// Initializes every commerce adapter and the payment service
	/// concurrently. The first failure aborts initialization.
	pub async fn init(&self) -> Result<(), EngineError> {
		tokio::try_join!(
			async { self.commerce.init().await.map_err(EngineError::from) },
			async { self.payment.init().await.map_err(EngineError::from) },
		)?;
		info!(
			service = %self.config.service.name,
			platforms = self.commerce.supported_platforms().len(),
			wallets = self.payment.supported_wallets().len(),
			"Engine initialized"
		);
		Ok(())
	}

	/// Cancels every in-flight adapter call. Calls made afterwards fail with
	/// `Cancelled`.
	pub fn shutdown(&self) {
		if !self.shutdown.is_cancelled() {
			self.shutdown.cancel();
			info!("Engine shut down");
		}
	}

	pub fn is_shut_down(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	pub fn shutdown_token(&self) -> CancellationToken {
		self.shutdown.clone()
	}

	pub fn commerce(&self) -> &Arc<CommerceService> {
		&self.commerce
	}

	pub fn payment(&self) -> &Arc<PaymentService> {
		&self.payment
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn config(&self) -> &Config {
		&self.config
	}
}

type StorageFactory =
	Box<dyn Fn(&str, &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send>;
type PlatformFactory = Box<
	dyn Fn(PlatformKind, &toml::Value) -> Result<Arc<dyn CommerceInterface>, CommerceError> + Send,
>;
type RailFactory = Box<
	dyn Fn(WalletType, Option<&toml::Value>) -> Result<Arc<dyn WalletInterface>, WalletError> + Send,
>;
type GatewayFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn GatewayInterface>, PaymentError> + Send>;

/// Factory pattern for creating the engine from config.
///
/// Every built-in implementation is registered up front; the `with_*`
/// methods replace one by name.
pub struct EngineBuilder {
	config: Config,
	storage_factory: StorageFactory,
	platform_factories: HashMap<String, PlatformFactory>,
	rail_factory: RailFactory,
	gateway_factories: HashMap<String, GatewayFactory>,
	events: EventBus,
}

impl EngineBuilder {
	pub fn new(config: Config) -> Self {
		let mut platform_factories: HashMap<String, PlatformFactory> = HashMap::new();
		for name in COMMERCE_IMPLEMENTATIONS.iter().copied() {
			platform_factories.insert(
				name.to_string(),
				Box::new(move |kind: PlatformKind, config: &toml::Value| {
					idev_commerce::create_platform(kind, name, config)
				}),
			);
		}
		let mut gateway_factories: HashMap<String, GatewayFactory> = HashMap::new();
		gateway_factories.insert(
			"simulated".to_string(),
			Box::new(idev_payment::implementations::simulated::create_gateway),
		);

		Self {
			config,
			storage_factory: Box::new(idev_storage::create_backend),
			platform_factories,
			rail_factory: Box::new(idev_wallet::create_rail),
			gateway_factories,
			events: EventBus::default(),
		}
	}

	pub fn with_storage_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&str, &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + 'static,
	{
		self.storage_factory = Box::new(factory);
		self
	}

	/// Replaces the factory for the commerce implementation `name`.
	pub fn with_platform_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(PlatformKind, &toml::Value) -> Result<Arc<dyn CommerceInterface>, CommerceError>
			+ Send
			+ 'static,
	{
		self.platform_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_rail_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(WalletType, Option<&toml::Value>) -> Result<Arc<dyn WalletInterface>, WalletError>
			+ Send
			+ 'static,
	{
		self.rail_factory = Box::new(factory);
		self
	}

	pub fn with_gateway_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn GatewayInterface>, PaymentError> + Send + 'static,
	{
		self.gateway_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = events;
		self
	}

	pub fn build(self) -> Result<Engine, EngineError> {
		let config = self.config;
		let shutdown = CancellationToken::new();

		// Create storage backend
		let backend = (self.storage_factory)(&config.storage.backend, &config.storage.settings_value())?;
		let storage = Arc::new(StorageService::new(backend));

		// Create commerce adapters
		let mut adapters = Vec::new();
		for (name, platform) in config.commerce.enabled_platforms() {
			let kind: PlatformKind = name
				.parse()
				.map_err(|e: idev_types::UnknownPlatform| EngineError::Configuration(e.to_string()))?;
			let factory = self
				.platform_factories
				.get(&platform.implementation)
				.ok_or_else(|| {
					EngineError::Configuration(format!(
						"No factory for commerce implementation '{}'",
						platform.implementation
					))
				})?;
			adapters.push(factory(kind, &platform.settings_value())?);
			info!(platform = %kind, implementation = %platform.implementation, "Commerce adapter created");
		}
		if adapters.is_empty() {
			return Err(EngineError::Configuration(
				"No commerce platforms enabled".to_string(),
			));
		}

		let commerce = Arc::new(CommerceService::new(
			adapters,
			CommerceSettings {
				request_timeout: Duration::from_secs(config.commerce.request_timeout_secs),
				reconnect_policy: config.commerce.reconnect_policy.clone(),
				analytics_sample_size: config.commerce.analytics_sample_size,
				webhook_base_url: config.service.webhook_base_url(),
			},
			self.events.clone(),
			shutdown.clone(),
		));

		// Create wallet rails, one per wallet type
		let mut rails = Vec::new();
		for wallet in WalletType::ALL {
			let settings = config
				.payment
				.wallets
				.get(wallet.as_str())
				.map(|table| toml::Value::Table(table.clone()));
			rails.push((self.rail_factory)(wallet, settings.as_ref())?);
		}

		let gateway_config = &config.payment.gateway;
		let gateway = self
			.gateway_factories
			.get(&gateway_config.implementation)
			.ok_or_else(|| {
				EngineError::Configuration(format!(
					"No factory for gateway implementation '{}'",
					gateway_config.implementation
				))
			})?(&gateway_config.settings_value())?;

		let default_chain = config
			.payment
			.default_chain
			.as_deref()
			.map(str::parse::<ChainRef>)
			.transpose()
			.map_err(|e| EngineError::Configuration(e.to_string()))?;

		let payment = Arc::new(PaymentService::new(
			rails,
			gateway,
			storage.clone(),
			PaymentSettings {
				request_timeout: Duration::from_secs(config.payment.request_timeout_secs),
				audit_failures: config.payment.audit_failures,
				default_chain,
			},
			self.events.clone(),
			shutdown.clone(),
		));

		Ok(Engine {
			config,
			storage,
			commerce,
			payment,
			events: self.events,
			shutdown,
		})
	}
}
