//! Payment requests and the records written to the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{ChainRef, RailFamily, WalletType};

/// Rail category a payment is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
	Crypto,
	Web3,
	Icp,
	Traditional,
}

impl PaymentMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			PaymentMethod::Crypto => "crypto",
			PaymentMethod::Web3 => "web3",
			PaymentMethod::Icp => "icp",
			PaymentMethod::Traditional => "traditional",
		}
	}

	pub fn requires_wallet(&self) -> bool {
		!matches!(self, PaymentMethod::Traditional)
	}

	/// Whether payments of this method can be sent from `wallet`.
	pub fn accepts(&self, wallet: WalletType) -> bool {
		match self {
			PaymentMethod::Crypto | PaymentMethod::Web3 => {
				matches!(wallet.family(), RailFamily::Evm | RailFamily::Solana)
			}
			PaymentMethod::Icp => wallet.family() == RailFamily::InternetComputer,
			PaymentMethod::Traditional => false,
		}
	}

	/// Capability markers attached to successful payments of this method.
	pub fn features(&self) -> PaymentFeatures {
		match self {
			PaymentMethod::Crypto => PaymentFeatures::default(),
			PaymentMethod::Web3 => PaymentFeatures {
				nft_support: true,
				defi_integration: true,
				smart_contract_interaction: true,
				..Default::default()
			},
			PaymentMethod::Icp => PaymentFeatures {
				canister_interaction: true,
				internet_identity: true,
				decentralized_storage: true,
				..Default::default()
			},
			PaymentMethod::Traditional => PaymentFeatures {
				instant_processing: true,
				refund_support: true,
				chargeback_protection: true,
				..Default::default()
			},
		}
	}
}

impl fmt::Display for PaymentMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("Unsupported payment method: {0}")]
pub struct UnknownPaymentMethod(pub String);

impl FromStr for PaymentMethod {
	type Err = UnknownPaymentMethod;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"crypto" => Ok(PaymentMethod::Crypto),
			"web3" => Ok(PaymentMethod::Web3),
			"icp" => Ok(PaymentMethod::Icp),
			"traditional" => Ok(PaymentMethod::Traditional),
			other => Err(UnknownPaymentMethod(other.to_string())),
		}
	}
}

/// Feature flags tagged onto a record. Only the flags relevant to the
/// payment's method are ever set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentFeatures {
	pub nft_support: bool,
	pub defi_integration: bool,
	pub smart_contract_interaction: bool,
	pub canister_interaction: bool,
	pub internet_identity: bool,
	pub decentralized_storage: bool,
	pub instant_processing: bool,
	pub refund_support: bool,
	pub chargeback_protection: bool,
}

impl PaymentFeatures {
	pub fn is_empty(&self) -> bool {
		*self == PaymentFeatures::default()
	}
}

/// Caller input to the payment orchestrator.
///
/// `payment_method` and `wallet_type` stay raw strings so that an unknown key
/// reaches the orchestrator and is rejected there with a typed error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
	pub amount: Decimal,
	pub currency: String,
	pub recipient_address: String,
	pub payment_method: String,
	#[serde(default)]
	pub wallet_type: Option<String>,
	#[serde(default)]
	pub chain_id: Option<String>,
	/// Card processor for traditional payments; the gateway default applies
	/// when absent.
	#[serde(default)]
	pub gateway: Option<String>,
}

/// Ledger entry for one successful payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
	pub id: String,
	pub payment_method: PaymentMethod,
	pub currency: String,
	pub amount: Decimal,
	pub recipient_address: String,
	pub wallet_type: Option<WalletType>,
	pub chain: Option<ChainRef>,
	/// On-chain transaction hash or ledger block index.
	pub tx_hash: Option<String>,
	/// Gateway transaction id for traditional payments.
	pub transaction_id: Option<String>,
	pub gateway: Option<String>,
	#[serde(default, skip_serializing_if = "PaymentFeatures::is_empty")]
	pub features: PaymentFeatures,
	pub timestamp: DateTime<Utc>,
}

/// Audit entry for a rejected or failed payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailure {
	pub id: String,
	pub payment_method: String,
	pub wallet_type: Option<String>,
	pub currency: String,
	pub amount: Decimal,
	pub recipient_address: String,
	pub error: String,
	pub timestamp: DateTime<Utc>,
}

impl PaymentFailure {
	pub fn from_request(id: String, request: &PaymentRequest, error: String) -> Self {
		Self {
			id,
			payment_method: request.payment_method.clone(),
			wallet_type: request.wallet_type.clone(),
			currency: request.currency.clone(),
			amount: request.amount,
			recipient_address: request.recipient_address.clone(),
			error,
			timestamp: Utc::now(),
		}
	}
}
