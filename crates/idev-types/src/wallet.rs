//! Wallet rail identifiers and connection records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the six wallet rails a payer can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalletType {
	Metamask,
	Coinbase,
	#[serde(rename = "walletconnect")]
	WalletConnect,
	Phantom,
	InternetIdentity,
	Plug,
}

/// The family of chain a rail settles on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RailFamily {
	Evm,
	Solana,
	InternetComputer,
}

impl WalletType {
	pub const ALL: [WalletType; 6] = [
		WalletType::Metamask,
		WalletType::Coinbase,
		WalletType::WalletConnect,
		WalletType::Phantom,
		WalletType::InternetIdentity,
		WalletType::Plug,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			WalletType::Metamask => "metamask",
			WalletType::Coinbase => "coinbase",
			WalletType::WalletConnect => "walletconnect",
			WalletType::Phantom => "phantom",
			WalletType::InternetIdentity => "internet-identity",
			WalletType::Plug => "plug",
		}
	}

	pub fn family(&self) -> RailFamily {
		match self {
			WalletType::Metamask | WalletType::Coinbase | WalletType::WalletConnect => RailFamily::Evm,
			WalletType::Phantom => RailFamily::Solana,
			WalletType::InternetIdentity | WalletType::Plug => RailFamily::InternetComputer,
		}
	}

	/// Chain a connect call lands on when the caller names none.
	pub fn default_chain(&self) -> ChainRef {
		match self.family() {
			RailFamily::Evm => ChainRef::Ethereum,
			RailFamily::Solana => ChainRef::Solana,
			RailFamily::InternetComputer => ChainRef::Icp,
		}
	}
}

impl fmt::Display for WalletType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("Unsupported wallet: {0}")]
pub struct UnknownWallet(pub String);

impl FromStr for WalletType {
	type Err = UnknownWallet;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		WalletType::ALL
			.into_iter()
			.find(|w| w.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| UnknownWallet(s.to_string()))
	}
}

/// Network a wallet connection or payment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainRef {
	Ethereum,
	Polygon,
	Binance,
	Solana,
	Icp,
}

impl ChainRef {
	pub fn as_str(&self) -> &'static str {
		match self {
			ChainRef::Ethereum => "ethereum",
			ChainRef::Polygon => "polygon",
			ChainRef::Binance => "binance",
			ChainRef::Solana => "solana",
			ChainRef::Icp => "icp",
		}
	}

	/// Numeric EVM chain id, `None` for non-EVM networks.
	pub fn evm_chain_id(&self) -> Option<u64> {
		match self {
			ChainRef::Ethereum => Some(1),
			ChainRef::Polygon => Some(137),
			ChainRef::Binance => Some(56),
			ChainRef::Solana | ChainRef::Icp => None,
		}
	}

	pub fn from_evm_chain_id(id: u64) -> Option<Self> {
		match id {
			1 => Some(ChainRef::Ethereum),
			137 => Some(ChainRef::Polygon),
			56 => Some(ChainRef::Binance),
			_ => None,
		}
	}

	pub fn family(&self) -> RailFamily {
		match self {
			ChainRef::Solana => RailFamily::Solana,
			ChainRef::Icp => RailFamily::InternetComputer,
			_ => RailFamily::Evm,
		}
	}
}

impl fmt::Display for ChainRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("Unsupported chain: {0}")]
pub struct UnknownChain(pub String);

impl FromStr for ChainRef {
	type Err = UnknownChain;

	/// Accepts chain keys, decimal EVM ids and `0x`-prefixed hex ids.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lowered = s.trim().to_ascii_lowercase();
		let by_name = match lowered.as_str() {
			"ethereum" | "eth" | "mainnet" => Some(ChainRef::Ethereum),
			"polygon" | "matic" => Some(ChainRef::Polygon),
			"binance" | "bsc" | "bnb" => Some(ChainRef::Binance),
			"solana" => Some(ChainRef::Solana),
			"icp" => Some(ChainRef::Icp),
			_ => None,
		};
		let by_id = || {
			let id = match lowered.strip_prefix("0x") {
				Some(hex) => u64::from_str_radix(hex, 16).ok(),
				None => lowered.parse::<u64>().ok(),
			};
			id.and_then(ChainRef::from_evm_chain_id)
		};
		by_name.or_else(by_id).ok_or_else(|| UnknownChain(s.to_string()))
	}
}

/// Live session between the service and one wallet rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnection {
	pub wallet_type: WalletType,
	pub chain: ChainRef,
	/// EVM/Solana address or Internet Computer principal.
	pub address: String,
	pub connected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_wallet_type_parsing() {
		assert_eq!("internet-identity".parse::<WalletType>().unwrap(), WalletType::InternetIdentity);
		assert_eq!("MetaMask".parse::<WalletType>().unwrap(), WalletType::Metamask);
		assert!("ledger".parse::<WalletType>().is_err());
		assert_eq!(
			serde_json::to_string(&WalletType::WalletConnect).unwrap(),
			"\"walletconnect\""
		);
		assert_eq!(
			serde_json::to_string(&WalletType::InternetIdentity).unwrap(),
			"\"internet-identity\""
		);
	}

	#[test]
	fn test_chain_ref_accepts_ids() {
		assert_eq!("polygon".parse::<ChainRef>().unwrap(), ChainRef::Polygon);
		assert_eq!("0x89".parse::<ChainRef>().unwrap(), ChainRef::Polygon);
		assert_eq!("56".parse::<ChainRef>().unwrap(), ChainRef::Binance);
		assert!("0x2a".parse::<ChainRef>().is_err());
		assert_eq!(WalletType::Plug.default_chain(), ChainRef::Icp);
	}
}
