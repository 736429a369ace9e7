//! EVM rails: MetaMask, Coinbase Wallet and WalletConnect.
//!
//! All three speak EIP-1193. Injected wallets are asked for account access
//! with `eth_requestAccounts`; a WalletConnect session is approved at pairing
//! time, so its accounts are read with `eth_accounts`.

use alloy::primitives::{Address, U256};
use alloy::{sol, sol_types::SolCall};
use async_trait::async_trait;
use chrono::Utc;
use idev_types::{
	chain_info, find_token, is_native, ChainInfo, ChainRef, ConfigSchema, TokenInfo,
	WalletConnection, WalletType,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::provider::{ProviderError, ProviderSchema, WalletProvider};
use crate::units::{from_base_units, parse_quantity, to_base_units, to_quantity};
use crate::{positive_amount, resolve_chain, WalletError, WalletInterface};

sol! {
	interface IERC20 {
		function transfer(address to, uint256 amount) external returns (bool);
		function balanceOf(address owner) external view returns (uint256);
	}
}

const EVM_CHAINS: &[ChainRef] = &[ChainRef::Ethereum, ChainRef::Polygon, ChainRef::Binance];

pub struct EvmWallet {
	wallet_type: WalletType,
	provider: Option<Arc<dyn WalletProvider>>,
	session: RwLock<Option<WalletConnection>>,
}

impl EvmWallet {
	pub fn new(wallet_type: WalletType, provider: Option<Arc<dyn WalletProvider>>) -> Self {
		Self {
			wallet_type,
			provider,
			session: RwLock::new(None),
		}
	}

	pub async fn session(&self) -> Option<WalletConnection> {
		self.session.read().await.clone()
	}

	fn provider(&self) -> Result<&Arc<dyn WalletProvider>, WalletError> {
		self.provider
			.as_ref()
			.ok_or(WalletError::ProviderMissing(self.wallet_type))
	}

	fn account_method(&self) -> &'static str {
		match self.wallet_type {
			WalletType::WalletConnect => "eth_accounts",
			_ => "eth_requestAccounts",
		}
	}

	fn token(&self, chain: ChainRef, currency: &str) -> Result<&'static TokenInfo, WalletError> {
		find_token(chain, currency).ok_or_else(|| WalletError::UnknownToken {
			currency: currency.to_string(),
			chain,
		})
	}
}

fn parse_address(value: &str) -> Result<Address, WalletError> {
	Address::from_str(value.trim()).map_err(|_| WalletError::InvalidAddress(value.to_string()))
}

fn add_chain_params(info: &ChainInfo) -> Value {
	json!([{
		"chainId": info.chain_id,
		"chainName": info.name,
		"rpcUrls": info.rpc_urls,
		"nativeCurrency": info.native_currency,
		"blockExplorerUrls": info.block_explorer_urls,
	}])
}

fn expect_str(value: &Value, what: &str) -> Result<String, WalletError> {
	value
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| WalletError::InvalidResponse(format!("{}: {}", what, value)))
}

#[async_trait]
impl WalletInterface for EvmWallet {
	fn wallet_type(&self) -> WalletType {
		self.wallet_type
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ProviderSchema)
	}

	fn chains(&self) -> &'static [ChainRef] {
		EVM_CHAINS
	}

	async fn connect(&self, chain: Option<ChainRef>) -> Result<WalletConnection, WalletError> {
		let chain = resolve_chain(self, chain)?;
		let provider = self.provider()?;

		let accounts = provider.request(self.account_method(), json!([])).await?;
		let accounts: Vec<String> = serde_json::from_value(accounts)
			.map_err(|e| WalletError::InvalidResponse(format!("accounts: {}", e)))?;
		let account = accounts
			.into_iter()
			.next()
			.ok_or(WalletError::NoAccounts(self.wallet_type))?;
		let address = parse_address(&account)?;

		self.switch_chain(chain).await?;

		let connection = WalletConnection {
			wallet_type: self.wallet_type,
			chain,
			address: address.to_string(),
			connected_at: Utc::now(),
		};
		*self.session.write().await = Some(connection.clone());
		tracing::info!(wallet = %self.wallet_type, %chain, address = %connection.address, "Wallet connected");
		Ok(connection)
	}

	async fn switch_chain(&self, chain: ChainRef) -> Result<(), WalletError> {
		let chain = resolve_chain(self, Some(chain))?;
		let provider = self.provider()?;
		let info = chain_info(chain);
		let switch = json!([{ "chainId": info.chain_id }]);

		match provider.request("wallet_switchEthereumChain", switch.clone()).await {
			Ok(_) => {}
			Err(e) if e.code == ProviderError::UNRECOGNIZED_CHAIN => {
				tracing::info!(wallet = %self.wallet_type, %chain, "Chain unknown to wallet, adding it");
				provider
					.request("wallet_addEthereumChain", add_chain_params(info))
					.await
					.map_err(|e| WalletError::ChainSwitch(format!("adding {}: {}", chain, e)))?;
				provider
					.request("wallet_switchEthereumChain", switch)
					.await
					.map_err(|e| WalletError::ChainSwitch(format!("{}: {}", chain, e)))?;
			}
			Err(e) => return Err(WalletError::ChainSwitch(format!("{}: {}", chain, e))),
		}

		if let Some(session) = self.session.write().await.as_mut() {
			session.chain = chain;
		}
		Ok(())
	}

	async fn send_transaction(
		&self,
		connection: &WalletConnection,
		to: &str,
		amount: Decimal,
		currency: &str,
	) -> Result<String, WalletError> {
		positive_amount(amount)?;
		let chain = resolve_chain(self, Some(connection.chain))?;
		let provider = self.provider()?;
		let from = parse_address(&connection.address)?;
		let to = parse_address(to)?;

		let tx = if is_native(chain, currency) {
			let value = to_base_units(amount, chain_info(chain).native_currency.decimals)?;
			json!({
				"from": from.to_string(),
				"to": to.to_string(),
				"value": to_quantity(value),
			})
		} else {
			let token = self.token(chain, currency)?;
			let data = IERC20::transferCall {
				to,
				amount: to_base_units(amount, token.decimals)?,
			}
			.abi_encode();
			json!({
				"from": from.to_string(),
				"to": token.address,
				"data": format!("0x{}", hex::encode(data)),
			})
		};

		let hash = expect_str(&provider.request("eth_sendTransaction", json!([tx])).await?, "transaction hash")?;
		tracing::info!(wallet = %self.wallet_type, %chain, currency, tx_hash = %hash, "Transaction submitted");
		Ok(hash)
	}

	async fn get_balance(
		&self,
		address: &str,
		currency: &str,
		chain: ChainRef,
	) -> Result<Decimal, WalletError> {
		let chain = resolve_chain(self, Some(chain))?;
		let provider = self.provider()?;
		let owner = parse_address(address)?;

		if is_native(chain, currency) {
			let raw = provider
				.request("eth_getBalance", json!([owner.to_string(), "latest"]))
				.await?;
			let wei = parse_quantity(&expect_str(&raw, "balance")?)?;
			return from_base_units(wei, chain_info(chain).native_currency.decimals);
		}

		let token = self.token(chain, currency)?;
		let data = IERC20::balanceOfCall { owner }.abi_encode();
		let raw = provider
			.request(
				"eth_call",
				json!([{ "to": token.address, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
			)
			.await?;
		let raw = expect_str(&raw, "eth_call result")?;
		let bytes = hex::decode(raw.trim_start_matches("0x"))
			.map_err(|e| WalletError::InvalidResponse(format!("eth_call result: {}", e)))?;
		let balance = bytes
			.get(..32)
			.and_then(U256::try_from_be_slice)
			.ok_or_else(|| WalletError::InvalidResponse(format!("eth_call result: {}", raw)))?;
		from_base_units(balance, token.decimals)
	}

	async fn disconnect(&self) -> Result<(), WalletError> {
		self.session.write().await.take();
		tracing::info!(wallet = %self.wallet_type, "Wallet session cleared");
		Ok(())
	}
}
