//! Wallet rail adapters.
//!
//! A rail wraps one wallet product (MetaMask, Phantom, Plug, ...) behind
//! [`WalletInterface`]. Rails never talk to a chain directly; they speak the
//! wallet's own request vocabulary through a [`WalletProvider`], which is
//! either a JSON-RPC endpoint or an in-process simulated provider. A rail
//! built without a provider fails closed on every call.

use async_trait::async_trait;
use idev_types::{ChainRef, ConfigSchema, RailFamily, ValidationError, WalletConnection, WalletType};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

pub mod provider;
pub mod simulated;
pub mod units;

pub use provider::{JsonRpcProvider, ProviderError, WalletProvider};
pub use simulated::SimulatedProvider;

pub mod implementations {
	pub mod evm;
	pub mod icp;
	pub mod phantom;
}

#[derive(Debug, Error)]
pub enum WalletError {
	#[error("{0} provider is not available")]
	ProviderMissing(WalletType),
	#[error("Provider error: {0}")]
	Provider(#[from] ProviderError),
	#[error("No accounts returned by {0}")]
	NoAccounts(WalletType),
	#[error("Chain switch failed: {0}")]
	ChainSwitch(String),
	#[error("Unsupported wallet: {0}")]
	UnsupportedWallet(String),
	#[error("Unsupported chain {chain} for {wallet}")]
	UnsupportedChain { wallet: WalletType, chain: ChainRef },
	#[error("Unknown token {currency} on {chain}")]
	UnknownToken { currency: String, chain: ChainRef },
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
	#[error("Invalid address: {0}")]
	InvalidAddress(String),
	#[error("Unexpected provider response: {0}")]
	InvalidResponse(String),
	#[error("{0} is not connected")]
	NotConnected(WalletType),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<ValidationError> for WalletError {
	fn from(err: ValidationError) -> Self {
		WalletError::Configuration(err.to_string())
	}
}

/// Contract every wallet rail implements.
#[async_trait]
pub trait WalletInterface: Send + Sync {
	fn wallet_type(&self) -> WalletType;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Networks this rail can connect to.
	fn chains(&self) -> &'static [ChainRef];

	/// Requests account access and lands on `chain` (or the rail's default).
	async fn connect(&self, chain: Option<ChainRef>) -> Result<WalletConnection, WalletError>;

	/// Moves the provider to `chain`. Only EVM rails can switch networks.
	async fn switch_chain(&self, chain: ChainRef) -> Result<(), WalletError> {
		Err(WalletError::ChainSwitch(format!(
			"{} cannot switch to {}",
			self.wallet_type(),
			chain
		)))
	}

	/// Transfers `amount` of `currency` and returns the transaction hash or
	/// ledger block index.
	async fn send_transaction(
		&self,
		connection: &WalletConnection,
		to: &str,
		amount: Decimal,
		currency: &str,
	) -> Result<String, WalletError>;

	async fn get_balance(
		&self,
		address: &str,
		currency: &str,
		chain: ChainRef,
	) -> Result<Decimal, WalletError>;

	/// Forgets the local session. Provider-level permission is not revoked.
	async fn disconnect(&self) -> Result<(), WalletError>;
}

/// Resolves the chain a call targets, rejecting networks the rail cannot reach.
pub(crate) fn resolve_chain(
	rail: &dyn WalletInterface,
	chain: Option<ChainRef>,
) -> Result<ChainRef, WalletError> {
	let wallet = rail.wallet_type();
	let chain = chain.unwrap_or_else(|| wallet.default_chain());
	if !rail.chains().contains(&chain) {
		return Err(WalletError::UnsupportedChain { wallet, chain });
	}
	Ok(chain)
}

pub(crate) fn positive_amount(amount: Decimal) -> Result<(), WalletError> {
	if amount <= Decimal::ZERO {
		return Err(WalletError::InvalidAmount(format!(
			"{} must be greater than zero",
			amount
		)));
	}
	Ok(())
}

/// Builds the rail for `wallet_type`.
///
/// `config` is the `[payment.wallets.<type>]` table; without one the rail has
/// no provider and every connect fails with [`WalletError::ProviderMissing`].
pub fn create_rail(
	wallet_type: WalletType,
	config: Option<&toml::Value>,
) -> Result<Arc<dyn WalletInterface>, WalletError> {
	use implementations::*;

	let provider = match config {
		Some(config) => Some(provider::create_provider(wallet_type, config)?),
		None => None,
	};

	let rail: Arc<dyn WalletInterface> = match wallet_type.family() {
		RailFamily::Evm => Arc::new(evm::EvmWallet::new(wallet_type, provider)),
		RailFamily::Solana => Arc::new(phantom::PhantomWallet::new(provider)),
		RailFamily::InternetComputer => Arc::new(icp::IcpWallet::new(wallet_type, provider)),
	};
	Ok(rail)
}
