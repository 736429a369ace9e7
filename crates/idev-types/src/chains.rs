//! Static network, token and payment-method tables.
//!
//! These are configuration data consulted by the wallet rails (RPC endpoints,
//! explorers, token contracts) and surfaced as-is by the payment API.

use serde::Serialize;

use crate::{ChainRef, PaymentMethod, WalletType};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
	pub name: &'static str,
	pub symbol: &'static str,
	pub decimals: u8,
}

/// Everything a provider needs to add or display a network.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
	pub key: ChainRef,
	pub name: &'static str,
	/// EVM chain id in `0x` hex form, or the network key for non-EVM chains.
	pub chain_id: &'static str,
	pub native_currency: NativeCurrency,
	pub rpc_urls: &'static [&'static str],
	pub block_explorer_urls: &'static [&'static str],
}

static CHAINS: [ChainInfo; 5] = [
	ChainInfo {
		key: ChainRef::Ethereum,
		name: "Ethereum Mainnet",
		chain_id: "0x1",
		native_currency: NativeCurrency {
			name: "Ether",
			symbol: "ETH",
			decimals: 18,
		},
		rpc_urls: &["https://ethereum-rpc.publicnode.com"],
		block_explorer_urls: &["https://etherscan.io"],
	},
	ChainInfo {
		key: ChainRef::Polygon,
		name: "Polygon Mainnet",
		chain_id: "0x89",
		native_currency: NativeCurrency {
			name: "MATIC",
			symbol: "MATIC",
			decimals: 18,
		},
		rpc_urls: &["https://polygon-rpc.com"],
		block_explorer_urls: &["https://polygonscan.com"],
	},
	ChainInfo {
		key: ChainRef::Binance,
		name: "Binance Smart Chain",
		chain_id: "0x38",
		native_currency: NativeCurrency {
			name: "BNB",
			symbol: "BNB",
			decimals: 18,
		},
		rpc_urls: &["https://bsc-dataseed.binance.org"],
		block_explorer_urls: &["https://bscscan.com"],
	},
	ChainInfo {
		key: ChainRef::Solana,
		name: "Solana",
		chain_id: "solana",
		native_currency: NativeCurrency {
			name: "Solana",
			symbol: "SOL",
			decimals: 9,
		},
		rpc_urls: &["https://api.mainnet-beta.solana.com"],
		block_explorer_urls: &["https://explorer.solana.com"],
	},
	ChainInfo {
		key: ChainRef::Icp,
		name: "Internet Computer",
		chain_id: "icp",
		native_currency: NativeCurrency {
			name: "Internet Computer",
			symbol: "ICP",
			decimals: 8,
		},
		rpc_urls: &["https://ic0.app"],
		block_explorer_urls: &["https://dashboard.internetcomputer.org"],
	},
];

pub fn chain_info(chain: ChainRef) -> &'static ChainInfo {
	// The table is indexed in declaration order of ChainRef.
	match chain {
		ChainRef::Ethereum => &CHAINS[0],
		ChainRef::Polygon => &CHAINS[1],
		ChainRef::Binance => &CHAINS[2],
		ChainRef::Solana => &CHAINS[3],
		ChainRef::Icp => &CHAINS[4],
	}
}

/// Chains offered to payers: the EVM networks plus the Internet Computer.
pub fn supported_chains() -> Vec<&'static ChainInfo> {
	[ChainRef::Ethereum, ChainRef::Polygon, ChainRef::Binance, ChainRef::Icp]
		.into_iter()
		.map(chain_info)
		.collect()
}

/// A fungible token deployed on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
	pub symbol: &'static str,
	pub chain: ChainRef,
	/// ERC-20 contract or SPL mint address.
	pub address: &'static str,
	pub decimals: u8,
}

static TOKENS: &[TokenInfo] = &[
	TokenInfo {
		symbol: "USDT",
		chain: ChainRef::Ethereum,
		address: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
		decimals: 6,
	},
	TokenInfo {
		symbol: "USDC",
		chain: ChainRef::Ethereum,
		address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
		decimals: 6,
	},
	TokenInfo {
		symbol: "USDT",
		chain: ChainRef::Polygon,
		address: "0xc2132D05D31c914a87C6611C10748AEb04B58e8F",
		decimals: 6,
	},
	TokenInfo {
		symbol: "USDC",
		chain: ChainRef::Polygon,
		address: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
		decimals: 6,
	},
	TokenInfo {
		symbol: "USDT",
		chain: ChainRef::Binance,
		address: "0x55d398326f99059fF775485246999027B3197955",
		decimals: 18,
	},
	TokenInfo {
		symbol: "USDC",
		chain: ChainRef::Binance,
		address: "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
		decimals: 18,
	},
	TokenInfo {
		symbol: "USDC",
		chain: ChainRef::Solana,
		address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
		decimals: 6,
	},
];

pub fn find_token(chain: ChainRef, symbol: &str) -> Option<&'static TokenInfo> {
	TOKENS
		.iter()
		.find(|t| t.chain == chain && t.symbol.eq_ignore_ascii_case(symbol))
}

/// Whether `currency` is the chain's native asset.
pub fn is_native(chain: ChainRef, currency: &str) -> bool {
	chain_info(chain)
		.native_currency
		.symbol
		.eq_ignore_ascii_case(currency)
}

/// One row of the payment-method picker.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodCategory {
	pub key: PaymentMethod,
	pub label: &'static str,
	pub icon: &'static str,
	pub methods: &'static [&'static str],
	pub wallets: &'static [WalletType],
}

pub fn payment_methods() -> Vec<PaymentMethodCategory> {
	vec![
		PaymentMethodCategory {
			key: PaymentMethod::Crypto,
			label: "Cryptocurrency",
			icon: "₿",
			methods: &["ETH", "USDT", "USDC", "MATIC", "BNB", "SOL"],
			wallets: &[
				WalletType::Metamask,
				WalletType::Coinbase,
				WalletType::WalletConnect,
				WalletType::Phantom,
			],
		},
		PaymentMethodCategory {
			key: PaymentMethod::Web3,
			label: "Web3 Payment",
			icon: "🌐",
			methods: &["NFT", "DeFi", "Smart Contract"],
			wallets: &[
				WalletType::Metamask,
				WalletType::Coinbase,
				WalletType::WalletConnect,
				WalletType::Phantom,
			],
		},
		PaymentMethodCategory {
			key: PaymentMethod::Icp,
			label: "Internet Computer",
			icon: "∞",
			methods: &["ICP", "Cycles"],
			wallets: &[WalletType::InternetIdentity, WalletType::Plug],
		},
		PaymentMethodCategory {
			key: PaymentMethod::Traditional,
			label: "Traditional Payment",
			icon: "💳",
			methods: &["Credit Card", "Bank Transfer", "PayPal"],
			wallets: &[],
		},
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_chain_table_is_consistent() {
		for chain in [ChainRef::Ethereum, ChainRef::Polygon, ChainRef::Binance] {
			let info = chain_info(chain);
			assert_eq!(info.key, chain);
			let id = u64::from_str_radix(info.chain_id.trim_start_matches("0x"), 16).unwrap();
			assert_eq!(Some(id), chain.evm_chain_id());
		}
		assert_eq!(chain_info(ChainRef::Icp).key, ChainRef::Icp);
		assert_eq!(supported_chains().len(), 4);
	}

	#[test]
	fn test_token_lookup() {
		let usdt = find_token(ChainRef::Ethereum, "usdt").unwrap();
		assert_eq!(usdt.decimals, 6);
		assert!(find_token(ChainRef::Solana, "USDT").is_none());
		assert!(is_native(ChainRef::Polygon, "matic"));
		assert!(!is_native(ChainRef::Polygon, "ETH"));
	}
}
