//! Payment orchestration.
//!
//! [`PaymentService`] routes a payment request to one of four rail
//! categories: crypto, web3 and icp go through a connected wallet rail, while
//! traditional payments go to a card gateway behind [`GatewayInterface`].
//! Successful payments are appended to the ledger; rejected ones never are.

use async_trait::async_trait;
use idev_storage::StorageError;
use idev_types::{ConfigSchema, ValidationError, WalletType};
use idev_wallet::WalletError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ledger;

mod service;

pub use ledger::PaymentLedger;
pub use service::{PaymentService, PaymentSettings};

pub mod implementations {
	pub mod simulated;
}

#[derive(Debug, Error)]
pub enum PaymentError {
	#[error("Unsupported payment method: {0}")]
	UnsupportedPaymentMethod(String),
	#[error("Unsupported wallet: {0}")]
	UnsupportedWallet(String),
	#[error("Unsupported chain: {0}")]
	UnsupportedChain(String),
	#[error("{0} wallet not connected")]
	NotConnected(WalletType),
	#[error("Invalid payment request: {0}")]
	InvalidRequest(String),
	#[error(transparent)]
	Wallet(#[from] WalletError),
	#[error("Gateway error: {0}")]
	Gateway(String),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Request timed out")]
	Timeout,
	#[error("Operation cancelled")]
	Cancelled,
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<ValidationError> for PaymentError {
	fn from(err: ValidationError) -> Self {
		PaymentError::Configuration(err.to_string())
	}
}

/// Settlement reference returned by a card gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayReceipt {
	pub transaction_id: String,
	pub gateway: String,
}

/// Card and bank processors used for traditional payments.
#[async_trait]
pub trait GatewayInterface: Send + Sync {
	fn name(&self) -> &str;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Charges `amount`. `gateway` names the processor the payer picked;
	/// implementations fall back to their default when it is absent.
	async fn charge(
		&self,
		amount: Decimal,
		currency: &str,
		gateway: Option<&str>,
	) -> Result<GatewayReceipt, PaymentError>;
}

/// Builds the traditional-payment gateway named in `[payment.gateway]`.
pub fn create_gateway(
	implementation: &str,
	config: &toml::Value,
) -> Result<Box<dyn GatewayInterface>, PaymentError> {
	match implementation {
		"simulated" => implementations::simulated::create_gateway(config),
		other => Err(PaymentError::Configuration(format!(
			"Unknown gateway implementation: {}",
			other
		))),
	}
}
