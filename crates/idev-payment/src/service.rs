//! Payment orchestrator.

use chrono::Utc;
use dashmap::DashMap;
use idev_storage::StorageService;
use idev_types::{
	chain_info, payment_methods, supported_chains, ChainInfo, ChainRef, EventBus, PaymentEvent,
	PaymentFailure, PaymentMethod, PaymentMethodCategory, PaymentRecord, PaymentRequest,
	WalletConnection, WalletType,
};
use idev_wallet::{WalletError, WalletInterface};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::PaymentLedger;
use crate::{GatewayInterface, PaymentError};

#[derive(Debug, Clone)]
pub struct PaymentSettings {
	/// Upper bound for every rail and gateway call.
	pub request_timeout: Duration,
	/// Persist rejected and failed attempts to the audit namespace.
	pub audit_failures: bool,
	/// Chain used by `connect_wallet` when the caller names none and the
	/// rail can reach it.
	pub default_chain: Option<ChainRef>,
}

impl Default for PaymentSettings {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
			audit_failures: true,
			default_chain: None,
		}
	}
}

/// Owns the wallet rails, the active-connection table and the ledger.
///
/// Connect, disconnect, chain switches and payments for one wallet type are
/// serialized by a per-wallet lock, so a payment never observes a connection
/// that is being replaced or removed.
pub struct PaymentService {
	rails: HashMap<WalletType, Arc<dyn WalletInterface>>,
	locks: HashMap<WalletType, Arc<Mutex<()>>>,
	connections: DashMap<WalletType, WalletConnection>,
	gateway: Box<dyn GatewayInterface>,
	ledger: PaymentLedger,
	settings: PaymentSettings,
	events: EventBus,
	shutdown: CancellationToken,
}

fn payment_id() -> String {
	let random = uuid::Uuid::new_v4().simple().to_string();
	format!("payment_{}_{}", idev_types::now_millis(), &random[..8])
}

fn validate_amount(request: &PaymentRequest) -> Result<(), PaymentError> {
	if request.amount <= Decimal::ZERO {
		return Err(PaymentError::InvalidRequest(format!(
			"amount must be positive, got {}",
			request.amount
		)));
	}
	if request.currency.trim().is_empty() {
		return Err(PaymentError::InvalidRequest("currency is required".to_string()));
	}
	Ok(())
}

fn parse_wallet(name: &str) -> Result<WalletType, PaymentError> {
	name.parse()
		.map_err(|_| PaymentError::UnsupportedWallet(name.to_string()))
}

fn parse_chain(name: &str) -> Result<ChainRef, PaymentError> {
	name.parse()
		.map_err(|_| PaymentError::UnsupportedChain(name.to_string()))
}

impl PaymentService {
	pub fn new(
		rails: Vec<Arc<dyn WalletInterface>>,
		gateway: Box<dyn GatewayInterface>,
		storage: Arc<StorageService>,
		settings: PaymentSettings,
		events: EventBus,
		shutdown: CancellationToken,
	) -> Self {
		let rails: HashMap<_, _> = rails.into_iter().map(|r| (r.wallet_type(), r)).collect();
		let locks = rails
			.keys()
			.map(|wallet| (*wallet, Arc::new(Mutex::new(()))))
			.collect();
		Self {
			rails,
			locks,
			connections: DashMap::new(),
			gateway,
			ledger: PaymentLedger::new(storage, settings.audit_failures),
			settings,
			events,
			shutdown,
		}
	}

	pub fn settings(&self) -> &PaymentSettings {
		&self.settings
	}

	/// Restores the ledger from storage.
	pub async fn init(&self) -> Result<(), PaymentError> {
		let restored = self.ledger.restore().await?;
		info!(
			rails = self.rails.len(),
			gateway = self.gateway.name(),
			restored,
			"Payment service initialized"
		);
		Ok(())
	}

	/// Races `fut` against the request timeout and the shutdown token.
	async fn call<T, E, F>(&self, fut: F) -> Result<T, PaymentError>
	where
		F: Future<Output = Result<T, E>>,
		PaymentError: From<E>,
	{
		tokio::select! {
			biased;
			_ = self.shutdown.cancelled() => Err(PaymentError::Cancelled),
			result = tokio::time::timeout(self.settings.request_timeout, fut) => {
				Ok(result.map_err(|_| PaymentError::Timeout)??)
			}
		}
	}

	fn rail(&self, wallet: WalletType) -> Result<&Arc<dyn WalletInterface>, PaymentError> {
		self.rails
			.get(&wallet)
			.ok_or_else(|| PaymentError::UnsupportedWallet(wallet.to_string()))
	}

	fn lock(&self, wallet: WalletType) -> Arc<Mutex<()>> {
		// Every registered rail has a lock; the fallback is never shared.
		self.locks
			.get(&wallet)
			.cloned()
			.unwrap_or_else(|| Arc::new(Mutex::new(())))
	}

	fn connection(&self, wallet: WalletType) -> Result<WalletConnection, PaymentError> {
		self.connections
			.get(&wallet)
			.map(|c| c.clone())
			.ok_or(PaymentError::NotConnected(wallet))
	}

	/// Connects `wallet` and stores the connection, replacing any previous
	/// one for the same wallet type. Nothing is stored on failure.
	pub async fn connect_wallet(
		&self,
		wallet: &str,
		chain: Option<&str>,
	) -> Result<WalletConnection, PaymentError> {
		let wallet = parse_wallet(wallet)?;
		let rail = self.rail(wallet)?;
		let chain = match chain {
			Some(chain) => Some(parse_chain(chain)?),
			None => self
				.settings
				.default_chain
				.filter(|chain| rail.chains().contains(chain)),
		};

		let lock = self.lock(wallet);
		let _guard = lock.lock().await;

		let connection = match self.call(rail.connect(chain)).await {
			Ok(connection) => connection,
			Err(e) => {
				warn!(wallet = %wallet, error = %e, "Wallet connection failed");
				return Err(e);
			}
		};
		if self.connections.insert(wallet, connection.clone()).is_some() {
			debug!(wallet = %wallet, "Replaced existing wallet connection");
		}
		info!(wallet = %wallet, chain = %connection.chain, address = %connection.address, "Wallet connected");
		self.events.payment(PaymentEvent::WalletConnected {
			wallet_type: wallet,
			chain: connection.chain,
			address: connection.address.clone(),
		});
		Ok(connection)
	}

	pub async fn disconnect_wallet(&self, wallet: &str) -> Result<(), PaymentError> {
		let wallet = parse_wallet(wallet)?;
		let rail = self.rail(wallet)?;
		let lock = self.lock(wallet);
		let _guard = lock.lock().await;

		if !self.connections.contains_key(&wallet) {
			return Err(PaymentError::NotConnected(wallet));
		}
		self.call(rail.disconnect()).await?;
		self.connections.remove(&wallet);

		info!(wallet = %wallet, "Wallet disconnected");
		self.events
			.payment(PaymentEvent::WalletDisconnected { wallet_type: wallet });
		Ok(())
	}

	/// Moves a connected wallet to `chain` and updates its connection.
	pub async fn switch_chain(
		&self,
		wallet: &str,
		chain: &str,
	) -> Result<WalletConnection, PaymentError> {
		let wallet = parse_wallet(wallet)?;
		let chain = parse_chain(chain)?;
		let rail = self.rail(wallet)?;
		let lock = self.lock(wallet);
		let _guard = lock.lock().await;

		self.connection(wallet)?;
		self.call(rail.switch_chain(chain)).await?;
		let mut entry = self
			.connections
			.get_mut(&wallet)
			.ok_or(PaymentError::NotConnected(wallet))?;
		entry.chain = chain;
		info!(wallet = %wallet, %chain, "Wallet switched chain");
		Ok(entry.clone())
	}

	/// Reads a balance on `chain` (Ethereum when absent).
	///
	/// A connected wallet of the chain's family answers when there is one;
	/// otherwise the first rail that can reach the chain does.
	pub async fn get_balance(
		&self,
		address: &str,
		currency: &str,
		chain: Option<&str>,
	) -> Result<Decimal, PaymentError> {
		let chain = match chain {
			Some(chain) => parse_chain(chain)?,
			None => ChainRef::Ethereum,
		};
		let connected = self
			.connections
			.iter()
			.map(|entry| *entry.key())
			.filter(|wallet| wallet.family() == chain.family())
			.min();
		let rail = connected
			.and_then(|wallet| self.rails.get(&wallet))
			.or_else(|| {
				WalletType::ALL
					.iter()
					.filter_map(|wallet| self.rails.get(wallet))
					.find(|rail| rail.chains().contains(&chain))
			})
			.ok_or_else(|| PaymentError::UnsupportedChain(chain.to_string()))?;

		self.call(rail.get_balance(address, currency, chain)).await
	}

	/// Validates, routes and records one payment.
	///
	/// Wallet-backed methods require an existing connection; nothing connects
	/// implicitly. Only successful payments reach the ledger; failures are
	/// audited separately when enabled.
	pub async fn process_payment(
		&self,
		request: &PaymentRequest,
	) -> Result<PaymentRecord, PaymentError> {
		match self.execute(request).await {
			Ok(record) => {
				self.ledger.append(record.clone()).await;
				info!(
					payment_id = %record.id,
					method = %record.payment_method,
					amount = %record.amount,
					currency = %record.currency,
					"Payment completed"
				);
				self.events.payment(PaymentEvent::Completed {
					payment_id: record.id.clone(),
					method: record.payment_method,
					amount: record.amount,
					currency: record.currency.clone(),
				});
				Ok(record)
			}
			Err(e) => {
				warn!(method = %request.payment_method, error = %e, "Payment failed");
				let failure = PaymentFailure::from_request(payment_id(), request, e.to_string());
				self.ledger.record_failure(&failure).await;
				self.events.payment(PaymentEvent::Failed {
					method: request.payment_method.clone(),
					reason: e.to_string(),
				});
				Err(e)
			}
		}
	}

	async fn execute(&self, request: &PaymentRequest) -> Result<PaymentRecord, PaymentError> {
		let method: PaymentMethod = request
			.payment_method
			.parse()
			.map_err(|_| PaymentError::UnsupportedPaymentMethod(request.payment_method.clone()))?;
		if method == PaymentMethod::Traditional {
			validate_amount(request)?;
			return self.charge(method, request).await;
		}

		// Wallet payments report a missing connection before anything else.
		let wallet = request
			.wallet_type
			.as_deref()
			.ok_or_else(|| PaymentError::InvalidRequest(format!("{} payments need a walletType", method)))
			.and_then(parse_wallet)?;
		let rail = self.rail(wallet)?;

		let lock = self.lock(wallet);
		let _guard = lock.lock().await;

		let mut connection = self.connection(wallet)?;
		validate_amount(request)?;
		if request.recipient_address.trim().is_empty() {
			return Err(PaymentError::InvalidRequest(
				"recipientAddress is required".to_string(),
			));
		}
		if !method.accepts(wallet) {
			return Err(PaymentError::UnsupportedWallet(format!(
				"{} cannot send {} payments",
				wallet, method
			)));
		}

		if let Some(chain) = request.chain_id.as_deref().map(parse_chain).transpose()? {
			if chain != connection.chain {
				self.call(rail.switch_chain(chain)).await?;
				connection.chain = chain;
				self.connections.insert(wallet, connection.clone());
				debug!(wallet = %wallet, %chain, "Switched chain for payment");
			}
		}

		// ICP rails only move ICP.
		let currency = match method {
			PaymentMethod::Icp => chain_info(ChainRef::Icp).native_currency.symbol.to_string(),
			_ => request.currency.trim().to_ascii_uppercase(),
		};
		let tx_hash = self
			.call(rail.send_transaction(
				&connection,
				request.recipient_address.trim(),
				request.amount,
				&currency,
			))
			.await?;

		Ok(PaymentRecord {
			id: payment_id(),
			payment_method: method,
			currency,
			amount: request.amount,
			recipient_address: request.recipient_address.trim().to_string(),
			wallet_type: Some(wallet),
			chain: Some(connection.chain),
			tx_hash: Some(tx_hash),
			transaction_id: None,
			gateway: None,
			features: method.features(),
			timestamp: Utc::now(),
		})
	}

	/// Traditional payments bypass wallet lookup entirely.
	async fn charge(
		&self,
		method: PaymentMethod,
		request: &PaymentRequest,
	) -> Result<PaymentRecord, PaymentError> {
		let receipt = self
			.call(self.gateway.charge(
				request.amount,
				&request.currency,
				request.gateway.as_deref(),
			))
			.await?;
		Ok(PaymentRecord {
			id: payment_id(),
			payment_method: method,
			currency: request.currency.trim().to_ascii_uppercase(),
			amount: request.amount,
			recipient_address: request.recipient_address.clone(),
			wallet_type: None,
			chain: None,
			tx_hash: None,
			transaction_id: Some(receipt.transaction_id),
			gateway: Some(receipt.gateway),
			features: method.features(),
			timestamp: Utc::now(),
		})
	}

	/// Active connections ordered by wallet type.
	pub fn active_connections(&self) -> Vec<WalletConnection> {
		let mut connections: Vec<_> = self.connections.iter().map(|c| c.value().clone()).collect();
		connections.sort_by_key(|c| c.wallet_type);
		connections
	}

	pub fn is_connected(&self, wallet: WalletType) -> bool {
		self.connections.contains_key(&wallet)
	}

	pub fn supported_wallets(&self) -> Vec<WalletType> {
		let mut wallets: Vec<_> = self.rails.keys().copied().collect();
		wallets.sort();
		wallets
	}

	pub fn supported_chains(&self) -> Vec<&'static ChainInfo> {
		supported_chains()
	}

	pub fn payment_methods(&self) -> Vec<PaymentMethodCategory> {
		payment_methods()
	}

	/// Successful payments in the order they were recorded.
	pub async fn get_payment_history(&self) -> Vec<PaymentRecord> {
		self.ledger.history().await
	}

	pub async fn failed_attempts(&self) -> Result<Vec<PaymentFailure>, PaymentError> {
		self.ledger.failures().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::simulated::SimulatedGateway;
	use async_trait::async_trait;
	use idev_types::{ConfigSchema, PlatformEvent, Schema};
	use idev_wallet::{create_rail, SimulatedProvider, WalletProvider};
	use serde_json::json;
	use std::str::FromStr;

	const RECIPIENT: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";

	struct Harness {
		service: PaymentService,
		storage: Arc<StorageService>,
		events: EventBus,
		providers: HashMap<WalletType, Arc<SimulatedProvider>>,
	}

	fn simulated_rail(wallet: WalletType) -> (Arc<dyn WalletInterface>, Arc<SimulatedProvider>) {
		let provider = Arc::new(SimulatedProvider::for_wallet(wallet));
		let dyn_provider: Arc<dyn WalletProvider> = provider.clone();
		let rail: Arc<dyn WalletInterface> = match wallet.family() {
			idev_types::RailFamily::Evm => Arc::new(idev_wallet::implementations::evm::EvmWallet::new(
				wallet,
				Some(dyn_provider),
			)),
			idev_types::RailFamily::Solana => Arc::new(
				idev_wallet::implementations::phantom::PhantomWallet::new(Some(dyn_provider)),
			),
			idev_types::RailFamily::InternetComputer => Arc::new(
				idev_wallet::implementations::icp::IcpWallet::new(wallet, Some(dyn_provider)),
			),
		};
		(rail, provider)
	}

	fn harness_with(storage: Arc<StorageService>, settings: PaymentSettings) -> Harness {
		let mut rails = Vec::new();
		let mut providers = HashMap::new();
		for wallet in WalletType::ALL {
			let (rail, provider) = simulated_rail(wallet);
			rails.push(rail);
			providers.insert(wallet, provider);
		}
		let events = EventBus::new(64);
		let service = PaymentService::new(
			rails,
			Box::new(SimulatedGateway::default()),
			storage.clone(),
			settings,
			events.clone(),
			CancellationToken::new(),
		);
		Harness {
			service,
			storage,
			events,
			providers,
		}
	}

	fn harness() -> Harness {
		harness_with(Arc::new(StorageService::in_memory()), PaymentSettings::default())
	}

	fn request(method: &str, wallet: Option<&str>, amount: &str, currency: &str) -> PaymentRequest {
		serde_json::from_value(json!({
			"amount": amount,
			"currency": currency,
			"recipientAddress": RECIPIENT,
			"paymentMethod": method,
			"walletType": wallet,
		}))
		.unwrap()
	}

	#[tokio::test]
	async fn test_unknown_method_never_touches_ledger() {
		let h = harness();
		h.service.connect_wallet("metamask", None).await.unwrap();

		for method in ["barter", "Crypto", ""] {
			let result = h
				.service
				.process_payment(&request(method, Some("metamask"), "1", "ETH"))
				.await;
			assert!(matches!(result, Err(PaymentError::UnsupportedPaymentMethod(_))));
		}
		assert!(h.service.get_payment_history().await.is_empty());
		assert_eq!(h.service.failed_attempts().await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn test_wallet_payment_requires_connection() {
		let h = harness();
		for (method, wallet) in [("crypto", "metamask"), ("web3", "coinbase"), ("icp", "plug")] {
			let result = h
				.service
				.process_payment(&request(method, Some(wallet), "1", "ETH"))
				.await;
			assert!(matches!(result, Err(PaymentError::NotConnected(_))), "{}", method);
		}
		assert!(h.service.get_payment_history().await.is_empty());
		assert!(h.service.active_connections().is_empty());
		// Nothing connected implicitly.
		assert!(h.providers[&WalletType::Metamask].calls().is_empty());
	}

	#[tokio::test]
	async fn test_not_connected_reported_before_request_checks() {
		let h = harness();
		let mut zero_amount = request("crypto", Some("metamask"), "0", "ETH");
		let mut no_recipient = request("web3", Some("coinbase"), "1", "ETH");
		no_recipient.recipient_address = String::new();
		let mut no_currency = request("icp", Some("plug"), "1", "");
		no_currency.currency = "  ".to_string();

		for req in [&zero_amount, &no_recipient, &no_currency] {
			assert!(
				matches!(h.service.process_payment(req).await, Err(PaymentError::NotConnected(_))),
				"{}",
				req.payment_method
			);
		}

		// Once connected, the same request fails validation instead.
		h.service.connect_wallet("metamask", None).await.unwrap();
		assert!(matches!(
			h.service.process_payment(&zero_amount).await,
			Err(PaymentError::InvalidRequest(_))
		));
		zero_amount.amount = Decimal::ONE;
		assert!(h.service.process_payment(&zero_amount).await.is_ok());
	}

	#[tokio::test]
	async fn test_crypto_payment_round_trip() {
		let h = harness();
		let mut rx = h.events.subscribe();
		h.service.connect_wallet("metamask", None).await.unwrap();

		let record = h
			.service
			.process_payment(&request("crypto", Some("metamask"), "0.5", "eth"))
			.await
			.unwrap();
		assert!(record.id.starts_with("payment_"));
		assert!(record.tx_hash.as_deref().unwrap().starts_with("0x"));
		assert!(record.features.is_empty());

		let history = h.service.get_payment_history().await;
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].wallet_type, Some(WalletType::Metamask));
		assert_eq!(history[0].currency, "ETH");
		assert_eq!(history[0].amount, Decimal::from_str("0.5").unwrap());
		assert_eq!(history[0].chain, Some(ChainRef::Ethereum));

		let mut completed = false;
		while let Ok(event) = rx.try_recv() {
			if let PlatformEvent::Payment(PaymentEvent::Completed { payment_id, .. }) = event {
				assert_eq!(payment_id, record.id);
				completed = true;
			}
		}
		assert!(completed);
	}

	#[tokio::test]
	async fn test_web3_payment_is_tagged() {
		let h = harness();
		h.service.connect_wallet("coinbase", None).await.unwrap();
		let record = h
			.service
			.process_payment(&request("web3", Some("coinbase"), "10", "USDC"))
			.await
			.unwrap();
		assert!(record.features.nft_support);
		assert!(record.features.defi_integration);
		assert!(record.features.smart_contract_interaction);
		let (_, params) = h.providers[&WalletType::Coinbase].calls().pop().unwrap();
		assert!(params[0]["data"].as_str().unwrap().starts_with("0xa9059cbb"));
	}

	#[tokio::test]
	async fn test_icp_payment_with_plug() {
		let h = harness();
		h.service.connect_wallet("plug", None).await.unwrap();
		let mut icp = request("icp", Some("plug"), "2", "ignored");
		icp.recipient_address = "2vxsx-fae".to_string();
		let record = h.service.process_payment(&icp).await.unwrap();
		assert_eq!(record.currency, "ICP");
		assert_eq!(record.chain, Some(ChainRef::Icp));
		assert!(record.features.canister_interaction);

		h.service.connect_wallet("metamask", None).await.unwrap();
		assert!(matches!(
			h.service
				.process_payment(&request("icp", Some("metamask"), "1", "ICP"))
				.await,
			Err(PaymentError::UnsupportedWallet(_))
		));
		assert_eq!(h.service.get_payment_history().await.len(), 1);
	}

	#[tokio::test]
	async fn test_traditional_payment_uses_gateway() {
		let h = harness();
		let mut card = request("traditional", None, "49.99", "usd");
		card.recipient_address = String::new();
		let record = h.service.process_payment(&card).await.unwrap();
		assert!(record.transaction_id.as_deref().unwrap().starts_with("tx_"));
		assert_eq!(record.gateway.as_deref(), Some("stripe"));
		assert!(record.wallet_type.is_none());
		assert!(record.features.refund_support);
		assert_eq!(h.service.get_payment_history().await.len(), 1);
	}

	#[tokio::test]
	async fn test_rail_failure_is_not_recorded() {
		let h = harness();
		h.service.connect_wallet("metamask", None).await.unwrap();
		let result = h
			.service
			.process_payment(&request("crypto", Some("metamask"), "1", "DOGE"))
			.await;
		assert!(matches!(
			result,
			Err(PaymentError::Wallet(WalletError::UnknownToken { .. }))
		));
		assert!(h.service.get_payment_history().await.is_empty());
		let failures = h.service.failed_attempts().await.unwrap();
		assert_eq!(failures.len(), 1);
		assert_eq!(failures[0].wallet_type.as_deref(), Some("metamask"));
	}

	#[tokio::test]
	async fn test_failures_not_audited_when_disabled() {
		let h = harness_with(
			Arc::new(StorageService::in_memory()),
			PaymentSettings {
				audit_failures: false,
				..Default::default()
			},
		);
		let _ = h
			.service
			.process_payment(&request("barter", None, "1", "ETH"))
			.await;
		assert!(h.service.failed_attempts().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_connect_and_disconnect() {
		let h = harness();
		assert!(matches!(
			h.service.connect_wallet("ledger", None).await,
			Err(PaymentError::UnsupportedWallet(_))
		));
		assert!(matches!(
			h.service.connect_wallet("metamask", Some("fantom")).await,
			Err(PaymentError::UnsupportedChain(_))
		));
		assert!(matches!(
			h.service.disconnect_wallet("phantom").await,
			Err(PaymentError::NotConnected(WalletType::Phantom))
		));

		let connection = h.service.connect_wallet("phantom", None).await.unwrap();
		assert_eq!(connection.chain, ChainRef::Solana);
		assert!(h.service.is_connected(WalletType::Phantom));

		h.service.disconnect_wallet("phantom").await.unwrap();
		assert!(!h.service.is_connected(WalletType::Phantom));
		assert!(matches!(
			h.service
				.process_payment(&request("crypto", Some("phantom"), "1", "SOL"))
				.await,
			Err(PaymentError::NotConnected(WalletType::Phantom))
		));
	}

	#[tokio::test]
	async fn test_failed_connect_stores_nothing() {
		let h = harness_with_missing_provider();
		assert!(matches!(
			h.connect_wallet("metamask", None).await,
			Err(PaymentError::Wallet(WalletError::ProviderMissing(WalletType::Metamask)))
		));
		assert!(h.active_connections().is_empty());
	}

	fn harness_with_missing_provider() -> PaymentService {
		let rails = WalletType::ALL
			.into_iter()
			.map(|wallet| create_rail(wallet, None).unwrap())
			.collect();
		PaymentService::new(
			rails,
			Box::new(SimulatedGateway::default()),
			Arc::new(StorageService::in_memory()),
			PaymentSettings::default(),
			EventBus::default(),
			CancellationToken::new(),
		)
	}

	#[tokio::test]
	async fn test_switch_chain_updates_connection() {
		let h = harness();
		h.service.connect_wallet("metamask", None).await.unwrap();
		let connection = h.service.switch_chain("metamask", "polygon").await.unwrap();
		assert_eq!(connection.chain, ChainRef::Polygon);
		assert_eq!(h.service.active_connections()[0].chain, ChainRef::Polygon);
		assert!(h.providers[&WalletType::Metamask]
			.methods()
			.contains(&"wallet_addEthereumChain".to_string()));

		h.service.connect_wallet("plug", None).await.unwrap();
		assert!(matches!(
			h.service.switch_chain("plug", "ethereum").await,
			Err(PaymentError::Wallet(WalletError::UnsupportedChain { .. }))
		));
		assert!(matches!(
			h.service.switch_chain("coinbase", "polygon").await,
			Err(PaymentError::NotConnected(WalletType::Coinbase))
		));
	}

	#[tokio::test]
	async fn test_payment_on_requested_chain() {
		let h = harness();
		h.service.connect_wallet("metamask", None).await.unwrap();
		let mut pay = request("crypto", Some("metamask"), "3", "MATIC");
		pay.chain_id = Some("0x89".to_string());
		let record = h.service.process_payment(&pay).await.unwrap();
		assert_eq!(record.chain, Some(ChainRef::Polygon));
		assert_eq!(h.service.active_connections()[0].chain, ChainRef::Polygon);
	}

	#[tokio::test]
	async fn test_default_chain_setting() {
		let h = harness_with(
			Arc::new(StorageService::in_memory()),
			PaymentSettings {
				default_chain: Some(ChainRef::Binance),
				..Default::default()
			},
		);
		let evm = h.service.connect_wallet("coinbase", None).await.unwrap();
		assert_eq!(evm.chain, ChainRef::Binance);
		// Not reachable by Phantom, so its own default applies.
		let solana = h.service.connect_wallet("phantom", None).await.unwrap();
		assert_eq!(solana.chain, ChainRef::Solana);
	}

	#[tokio::test]
	async fn test_balance_routing() {
		let h = harness();
		let eth = h
			.service
			.get_balance(RECIPIENT, "ETH", None)
			.await
			.unwrap();
		assert_eq!(eth, Decimal::ZERO);
		assert_eq!(
			h.providers[&WalletType::Metamask].methods(),
			vec!["eth_getBalance"]
		);

		h.service.connect_wallet("walletconnect", None).await.unwrap();
		h.service
			.get_balance(RECIPIENT, "ETH", Some("ethereum"))
			.await
			.unwrap();
		assert!(h.providers[&WalletType::WalletConnect]
			.methods()
			.contains(&"eth_getBalance".to_string()));

		assert!(h
			.service
			.get_balance("2vxsx-fae", "ICP", Some("icp"))
			.await
			.is_ok());
		assert!(matches!(
			h.service.get_balance(RECIPIENT, "ETH", Some("fantom")).await,
			Err(PaymentError::UnsupportedChain(_))
		));
	}

	#[tokio::test]
	async fn test_ledger_restored_on_init() {
		let storage = Arc::new(StorageService::in_memory());
		let first = harness_with(storage.clone(), PaymentSettings::default());
		first
			.service
			.process_payment(&request("traditional", None, "5", "USD"))
			.await
			.unwrap();

		let second = harness_with(first.storage.clone(), PaymentSettings::default());
		assert!(second.service.get_payment_history().await.is_empty());
		second.service.init().await.unwrap();
		assert_eq!(second.service.get_payment_history().await.len(), 1);
	}

	#[tokio::test]
	async fn test_concurrent_connects_leave_one_connection() {
		let h = Arc::new(harness());
		let a = {
			let h = h.clone();
			tokio::spawn(async move { h.service.connect_wallet("metamask", Some("ethereum")).await })
		};
		let b = {
			let h = h.clone();
			tokio::spawn(async move { h.service.connect_wallet("metamask", Some("polygon")).await })
		};
		let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

		let connections = h.service.active_connections();
		assert_eq!(connections.len(), 1);
		// The connect that took the lock last wins; the provider ends on its chain.
		let chain = connections[0].chain;
		assert!(chain == a.chain || chain == b.chain);
		let expected = chain_info(chain).chain_id;
		assert_eq!(h.providers[&WalletType::Metamask].current_chain_id(), expected);
	}

	struct StalledRail;

	#[async_trait]
	impl WalletInterface for StalledRail {
		fn wallet_type(&self) -> WalletType {
			WalletType::Metamask
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(Schema::default())
		}

		fn chains(&self) -> &'static [ChainRef] {
			&[ChainRef::Ethereum]
		}

		async fn connect(&self, _chain: Option<ChainRef>) -> Result<WalletConnection, WalletError> {
			tokio::time::sleep(Duration::from_secs(30)).await;
			Err(WalletError::NoAccounts(WalletType::Metamask))
		}

		async fn send_transaction(
			&self,
			_connection: &WalletConnection,
			_to: &str,
			_amount: Decimal,
			_currency: &str,
		) -> Result<String, WalletError> {
			unreachable!()
		}

		async fn get_balance(
			&self,
			_address: &str,
			_currency: &str,
			_chain: ChainRef,
		) -> Result<Decimal, WalletError> {
			unreachable!()
		}

		async fn disconnect(&self) -> Result<(), WalletError> {
			Ok(())
		}
	}

	fn stalled_service(shutdown: CancellationToken) -> PaymentService {
		PaymentService::new(
			vec![Arc::new(StalledRail)],
			Box::new(SimulatedGateway::default()),
			Arc::new(StorageService::in_memory()),
			PaymentSettings {
				request_timeout: Duration::from_millis(50),
				..Default::default()
			},
			EventBus::default(),
			shutdown,
		)
	}

	#[tokio::test]
	async fn test_stalled_rail_times_out() {
		let service = stalled_service(CancellationToken::new());
		assert!(matches!(
			service.connect_wallet("metamask", None).await,
			Err(PaymentError::Timeout)
		));
		assert!(service.active_connections().is_empty());
	}

	#[tokio::test]
	async fn test_shutdown_cancels_calls() {
		let shutdown = CancellationToken::new();
		let service = stalled_service(shutdown.clone());
		shutdown.cancel();
		assert!(matches!(
			service.connect_wallet("metamask", None).await,
			Err(PaymentError::Cancelled)
		));
	}
}
