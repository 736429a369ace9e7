//! In-process wallet provider.
//!
//! Answers the request vocabulary of every supported wallet (EIP-1193,
//! Phantom, Plug, Internet Identity with an ICRC-1 ledger) from local state
//! and records each call, so rails can be exercised without a browser
//! extension or a node. Token balances are tracked per token, not per owner.

use alloy::primitives::{keccak256, U256};
use async_trait::async_trait;
use idev_types::{chain_info, ChainRef, WalletType};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::provider::{ProviderError, WalletProvider};
use crate::units::{to_base_units, to_quantity};
use crate::WalletError;

pub const DEFAULT_EVM_ACCOUNT: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";
pub const DEFAULT_SOLANA_ACCOUNT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const DEFAULT_PRINCIPAL: &str = "rdmx6-jaaaa-aaaah-qcaiq-cai";

struct State {
	accounts: Vec<String>,
	chain_id: String,
	known_chains: HashSet<String>,
	connected: bool,
	balances: HashMap<String, U256>,
	token_balances: HashMap<String, U256>,
	failures: HashMap<String, ProviderError>,
	calls: Vec<(String, Value)>,
	sequence: u64,
}

impl State {
	fn account(&self) -> Result<String, ProviderError> {
		self.accounts
			.first()
			.cloned()
			.ok_or_else(|| ProviderError::new(ProviderError::USER_REJECTED, "No account available"))
	}

	fn next_sequence(&mut self) -> u64 {
		self.sequence += 1;
		self.sequence
	}

	fn next_hash(&mut self) -> String {
		let seq = self.next_sequence();
		keccak256(format!("simulated-tx-{}", seq)).to_string()
	}
}

/// EVM addresses are case-insensitive; Solana and ICP identifiers are not.
fn balance_key(address: &str) -> String {
	if address.starts_with("0x") {
		address.to_ascii_lowercase()
	} else {
		address.to_string()
	}
}

fn evm_chain_hex(chain: ChainRef) -> Option<String> {
	chain.evm_chain_id().map(|id| format!("0x{:x}", id))
}

fn chain_id_param(params: &Value) -> Result<String, ProviderError> {
	params
		.get(0)
		.and_then(|p| p.get("chainId"))
		.and_then(|v| v.as_str())
		.map(|s| s.to_ascii_lowercase())
		.ok_or_else(|| ProviderError::new(-32602, "Missing chainId"))
}

pub struct SimulatedProvider {
	state: Mutex<State>,
}

impl SimulatedProvider {
	/// Provider exposing one account and knowing only Ethereum mainnet.
	pub fn new(account: impl Into<String>) -> Self {
		Self {
			state: Mutex::new(State {
				accounts: vec![account.into()],
				chain_id: "0x1".to_string(),
				known_chains: HashSet::from(["0x1".to_string()]),
				connected: false,
				balances: HashMap::new(),
				token_balances: HashMap::new(),
				failures: HashMap::new(),
				calls: Vec::new(),
				sequence: 0,
			}),
		}
	}

	pub fn for_wallet(wallet_type: WalletType) -> Self {
		Self::new(default_account(wallet_type))
	}

	/// Provider that grants access but exposes no account.
	pub fn without_accounts() -> Self {
		let provider = Self::new("");
		provider.lock().accounts.clear();
		provider
	}

	pub fn with_known_chains(self, chains: &[ChainRef]) -> Self {
		{
			let mut state = self.lock();
			state.known_chains = chains.iter().filter_map(|c| evm_chain_hex(*c)).collect();
		}
		self
	}

	/// Native balance of `address`, in base units.
	pub fn with_balance(self, address: &str, base_units: U256) -> Self {
		self.lock().balances.insert(balance_key(address), base_units);
		self
	}

	/// Balance reported for any owner of `token` (contract or mint address).
	pub fn with_token_balance(self, token: &str, base_units: U256) -> Self {
		self.lock().token_balances.insert(balance_key(token), base_units);
		self
	}

	/// Makes every call to `method` fail with `error`.
	pub fn failing(self, method: &str, error: ProviderError) -> Self {
		self.lock().failures.insert(method.to_string(), error);
		self
	}

	pub fn calls(&self) -> Vec<(String, Value)> {
		self.lock().calls.clone()
	}

	/// Methods requested so far, in order.
	pub fn methods(&self) -> Vec<String> {
		self.lock().calls.iter().map(|(m, _)| m.clone()).collect()
	}

	pub fn current_chain_id(&self) -> String {
		self.lock().chain_id.clone()
	}

	/// Builds a provider from a `[payment.wallets.<type>]` table with
	/// `provider = "simulated"`.
	pub fn from_config(wallet_type: WalletType, config: &toml::Value) -> Result<Self, WalletError> {
		let account = config
			.get("address")
			.and_then(|v| v.as_str())
			.unwrap_or_else(|| default_account(wallet_type))
			.to_string();
		let mut provider = Self::new(account.clone());

		if let Some(chains) = config.get("known_chains").and_then(|v| v.as_array()) {
			let chains = chains
				.iter()
				.filter_map(|c| c.as_str())
				.map(|c| ChainRef::from_str(c).map_err(|e| WalletError::Configuration(e.to_string())))
				.collect::<Result<Vec<_>, _>>()?;
			provider = provider.with_known_chains(&chains);
		}

		if let Some(balance) = config.get("balance").and_then(|v| v.as_str()) {
			let amount = Decimal::from_str(balance)
				.map_err(|e| WalletError::Configuration(format!("balance: {}", e)))?;
			let decimals = chain_info(wallet_type.default_chain()).native_currency.decimals;
			provider = provider.with_balance(&account, to_base_units(amount, decimals)?);
		}

		Ok(provider)
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		// State stays consistent across a panicking test thread.
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

fn default_account(wallet_type: WalletType) -> &'static str {
	match wallet_type.family() {
		idev_types::RailFamily::Evm => DEFAULT_EVM_ACCOUNT,
		idev_types::RailFamily::Solana => DEFAULT_SOLANA_ACCOUNT,
		idev_types::RailFamily::InternetComputer => DEFAULT_PRINCIPAL,
	}
}

#[async_trait]
impl WalletProvider for SimulatedProvider {
	fn name(&self) -> &str {
		"simulated"
	}

	async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
		let mut state = self.lock();
		state.calls.push((method.to_string(), params.clone()));
		if let Some(error) = state.failures.get(method) {
			return Err(error.clone());
		}

		match method {
			// EIP-1193
			"eth_requestAccounts" | "eth_accounts" => {
				state.connected = true;
				Ok(json!(state.accounts))
			}
			"eth_chainId" => Ok(json!(state.chain_id)),
			"wallet_switchEthereumChain" => {
				let chain_id = chain_id_param(&params)?;
				if !state.known_chains.contains(&chain_id) {
					return Err(ProviderError::new(
						ProviderError::UNRECOGNIZED_CHAIN,
						format!("Unrecognized chain ID \"{}\"", chain_id),
					));
				}
				state.chain_id = chain_id;
				Ok(Value::Null)
			}
			"wallet_addEthereumChain" => {
				let chain_id = chain_id_param(&params)?;
				state.known_chains.insert(chain_id);
				Ok(Value::Null)
			}
			"eth_sendTransaction" => Ok(json!(state.next_hash())),
			"eth_getBalance" => {
				let address = params.get(0).and_then(|v| v.as_str()).unwrap_or_default();
				let balance = state.balances.get(&balance_key(address)).copied().unwrap_or_default();
				Ok(json!(to_quantity(balance)))
			}
			"eth_call" => {
				let token = params
					.get(0)
					.and_then(|p| p.get("to"))
					.and_then(|v| v.as_str())
					.unwrap_or_default();
				let balance = state
					.token_balances
					.get(&balance_key(token))
					.copied()
					.unwrap_or_default();
				Ok(json!(format!("0x{}", hex::encode(balance.to_be_bytes::<32>()))))
			}

			// Phantom and Solana JSON-RPC
			"connect" => {
				state.connected = true;
				Ok(json!({ "publicKey": state.account()? }))
			}
			"signAndSendTransaction" => {
				let signature = state.next_hash();
				Ok(json!({ "signature": signature.trim_start_matches("0x") }))
			}
			"getBalance" => {
				let address = params.get(0).and_then(|v| v.as_str()).unwrap_or_default();
				let balance = state.balances.get(&balance_key(address)).copied().unwrap_or_default();
				Ok(json!({ "context": { "slot": state.sequence }, "value": balance.to_string() }))
			}
			"getTokenAccountsByOwner" => {
				let mint = params
					.get(1)
					.and_then(|p| p.get("mint"))
					.and_then(|v| v.as_str())
					.unwrap_or_default();
				let accounts = match state.token_balances.get(&balance_key(mint)) {
					Some(amount) => vec![json!({
						"account": { "data": { "parsed": { "info": {
							"mint": mint,
							"tokenAmount": { "amount": amount.to_string() }
						}}}}
					})],
					None => Vec::new(),
				};
				Ok(json!({ "context": { "slot": state.sequence }, "value": accounts }))
			}

			// Plug and Internet Identity
			"isConnected" => Ok(json!(state.connected)),
			"requestConnect" | "login" => {
				state.connected = true;
				Ok(json!({ "principal": state.account()? }))
			}
			"getPrincipal" => Ok(json!(state.account()?)),
			"requestTransfer" => Ok(json!({ "height": state.next_sequence() })),
			"icrc1_transfer" => Ok(json!({ "Ok": state.next_sequence() })),
			"icrc1_balance_of" => {
				let owner = params
					.get("owner")
					.and_then(|v| v.as_str())
					.unwrap_or_default();
				let balance = state.balances.get(&balance_key(owner)).copied().unwrap_or_default();
				Ok(json!(balance.to_string()))
			}
			"disconnect" => {
				state.connected = false;
				Ok(Value::Null)
			}

			other => Err(ProviderError::new(
				ProviderError::METHOD_NOT_FOUND,
				format!("Method {} is not supported", other),
			)),
		}
	}
}
