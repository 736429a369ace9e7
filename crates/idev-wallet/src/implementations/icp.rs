//! Internet Computer rails: Internet Identity and Plug.
//!
//! Both settle ICP on the ledger canister and read balances through its
//! ICRC-1 interface. They differ in how a principal is obtained and how a
//! transfer is signed: Plug prompts through `requestConnect` and
//! `requestTransfer`, an Internet Identity session signs `icrc1_transfer`
//! calls itself after `login`.

use async_trait::async_trait;
use chrono::Utc;
use idev_types::{is_native, ChainRef, ConfigSchema, WalletConnection, WalletType};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::provider::{ProviderError, ProviderSchema, WalletProvider};
use crate::units::{from_base_units, parse_integer, to_base_units};
use crate::{positive_amount, resolve_chain, WalletError, WalletInterface};

const E8S_DECIMALS: u8 = 8;
const IC_HOST: &str = "https://ic0.app";

pub struct IcpWallet {
	wallet_type: WalletType,
	provider: Option<Arc<dyn WalletProvider>>,
	session: RwLock<Option<WalletConnection>>,
}

/// Textual principal: dash-separated groups of five lowercase base32
/// characters, the last group possibly shorter.
fn parse_principal(value: &str) -> Result<String, WalletError> {
	let principal = value.trim();
	let groups: Vec<&str> = principal.split('-').collect();
	let valid = groups.len() >= 2
		&& groups.iter().enumerate().all(|(i, group)| {
			let sized = if i + 1 == groups.len() {
				(1..=5).contains(&group.len())
			} else {
				group.len() == 5
			};
			sized && group.chars().all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c))
		});
	if !valid {
		return Err(WalletError::InvalidAddress(value.to_string()));
	}
	Ok(principal.to_string())
}

/// 64-hex-character ledger account identifier.
fn is_account_identifier(value: &str) -> bool {
	value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit())
}

impl IcpWallet {
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

	async fn request_principal(&self, provider: &Arc<dyn WalletProvider>) -> Result<String, WalletError> {
		let principal = match self.wallet_type {
			WalletType::Plug => {
				let connected = provider.request("isConnected", json!({})).await?;
				if !connected.as_bool().unwrap_or(false) {
					provider
						.request("requestConnect", json!({ "whitelist": [], "host": IC_HOST }))
						.await?;
				}
				provider.request("getPrincipal", json!({})).await?
			}
			_ => {
				let login = provider
					.request("login", json!({ "identityProvider": "https://identity.ic0.app" }))
					.await?;
				login.get("principal").cloned().unwrap_or(Value::Null)
			}
		};
		let principal = principal
			.as_str()
			.ok_or_else(|| WalletError::InvalidResponse(format!("principal: {}", principal)))?;
		parse_principal(principal)
	}

	async fn transfer(
		&self,
		provider: &Arc<dyn WalletProvider>,
		to: &str,
		e8s: u64,
	) -> Result<String, WalletError> {
		match self.wallet_type {
			WalletType::Plug => {
				let response = provider
					.request("requestTransfer", json!({ "to": to, "amount": e8s }))
					.await?;
				Ok(parse_integer(&response["height"])?.to_string())
			}
			_ => {
				let owner = parse_principal(to)?;
				let response = provider
					.request(
						"icrc1_transfer",
						json!({ "to": { "owner": owner, "subaccount": null }, "amount": e8s }),
					)
					.await?;
				if let Some(err) = response.get("Err") {
					return Err(WalletError::Provider(ProviderError::new(
						ProviderError::INTERNAL,
						format!("Ledger rejected transfer: {}", err),
					)));
				}
				Ok(parse_integer(&response["Ok"])?.to_string())
			}
		}
	}
}

#[async_trait]
impl WalletInterface for IcpWallet {
	fn wallet_type(&self) -> WalletType {
		self.wallet_type
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ProviderSchema)
	}

	fn chains(&self) -> &'static [ChainRef] {
		&[ChainRef::Icp]
	}

	async fn connect(&self, chain: Option<ChainRef>) -> Result<WalletConnection, WalletError> {
		let chain = resolve_chain(self, chain)?;
		let provider = self.provider()?;
		let principal = self.request_principal(provider).await?;

		let connection = WalletConnection {
			wallet_type: self.wallet_type,
			chain,
			address: principal,
			connected_at: Utc::now(),
		};
		*self.session.write().await = Some(connection.clone());
		tracing::info!(wallet = %self.wallet_type, principal = %connection.address, "Wallet connected");
		Ok(connection)
	}

	/// Returns the ledger block index of the transfer.
	async fn send_transaction(
		&self,
		_connection: &WalletConnection,
		to: &str,
		amount: Decimal,
		currency: &str,
	) -> Result<String, WalletError> {
		positive_amount(amount)?;
		if !is_native(ChainRef::Icp, currency) {
			return Err(WalletError::UnknownToken {
				currency: currency.to_string(),
				chain: ChainRef::Icp,
			});
		}
		if !is_account_identifier(to) {
			parse_principal(to)?;
		}
		let provider = self.provider()?;
		let e8s = to_base_units(amount, E8S_DECIMALS)?;
		let e8s = u64::try_from(e8s)
			.map_err(|_| WalletError::InvalidAmount(format!("{} ICP exceeds the ledger range", amount)))?;

		let block = self.transfer(provider, to.trim(), e8s).await?;
		tracing::info!(wallet = %self.wallet_type, block = %block, "ICP transfer submitted");
		Ok(block)
	}

	async fn get_balance(
		&self,
		address: &str,
		currency: &str,
		chain: ChainRef,
	) -> Result<Decimal, WalletError> {
		resolve_chain(self, Some(chain))?;
		if !is_native(ChainRef::Icp, currency) {
			return Err(WalletError::UnknownToken {
				currency: currency.to_string(),
				chain: ChainRef::Icp,
			});
		}
		let owner = parse_principal(address)?;
		let response = self
			.provider()?
			.request("icrc1_balance_of", json!({ "owner": owner, "subaccount": null }))
			.await?;
		from_base_units(parse_integer(&response)?, E8S_DECIMALS)
	}

	async fn disconnect(&self) -> Result<(), WalletError> {
		self.session.write().await.take();
		tracing::info!(wallet = %self.wallet_type, "Wallet session cleared");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::simulated::{SimulatedProvider, DEFAULT_PRINCIPAL};
	use alloy::primitives::U256;
	use std::str::FromStr;

	const RECIPIENT: &str = "2vxsx-fae";

	fn rail(wallet_type: WalletType, provider: &Arc<SimulatedProvider>) -> IcpWallet {
		let provider: Arc<dyn WalletProvider> = provider.clone();
		IcpWallet::new(wallet_type, Some(provider))
	}

	#[test]
	fn test_principal_format() {
		assert!(parse_principal(DEFAULT_PRINCIPAL).is_ok());
		assert!(parse_principal("2vxsx-fae").is_ok());
		assert!(parse_principal("RDMX6-jaaaa").is_err());
		assert!(parse_principal("rdmx6").is_err());
		assert!(parse_principal("rdmx6-jaaaaa-cai").is_err());
	}

	#[tokio::test]
	async fn test_plug_prompts_only_when_disconnected() {
		let provider = Arc::new(SimulatedProvider::for_wallet(WalletType::Plug));
		let plug = rail(WalletType::Plug, &provider);

		let connection = plug.connect(None).await.unwrap();
		assert_eq!(connection.chain, ChainRef::Icp);
		assert_eq!(connection.address, DEFAULT_PRINCIPAL);
		assert_eq!(provider.methods(), vec!["isConnected", "requestConnect", "getPrincipal"]);

		plug.connect(None).await.unwrap();
		assert_eq!(
			provider.methods()[3..].to_vec(),
			vec!["isConnected".to_string(), "getPrincipal".to_string()]
		);
	}

	#[tokio::test]
	async fn test_plug_transfer_in_e8s() {
		let provider = Arc::new(SimulatedProvider::for_wallet(WalletType::Plug));
		let plug = rail(WalletType::Plug, &provider);
		let connection = plug.connect(None).await.unwrap();

		let block = plug
			.send_transaction(&connection, RECIPIENT, Decimal::from_str("1.5").unwrap(), "ICP")
			.await
			.unwrap();
		assert_eq!(block, "1");
		let (method, params) = provider.calls().pop().unwrap();
		assert_eq!(method, "requestTransfer");
		assert_eq!(params["amount"], 150_000_000u64);

		assert!(matches!(
			plug.send_transaction(&connection, RECIPIENT, Decimal::ONE, "ETH").await,
			Err(WalletError::UnknownToken { .. })
		));
		assert!(matches!(
			plug.send_transaction(&connection, "Not A Principal", Decimal::ONE, "ICP").await,
			Err(WalletError::InvalidAddress(_))
		));
	}

	#[tokio::test]
	async fn test_internet_identity_uses_icrc1() {
		let provider = Arc::new(
			SimulatedProvider::for_wallet(WalletType::InternetIdentity)
				.with_balance(DEFAULT_PRINCIPAL, U256::from(1_234_000_000u64)),
		);
		let identity = rail(WalletType::InternetIdentity, &provider);
		let connection = identity.connect(None).await.unwrap();
		assert_eq!(provider.methods(), vec!["login"]);

		identity
			.send_transaction(&connection, RECIPIENT, Decimal::from_str("0.25").unwrap(), "ICP")
			.await
			.unwrap();
		let (method, params) = provider.calls().pop().unwrap();
		assert_eq!(method, "icrc1_transfer");
		assert_eq!(params["to"]["owner"], RECIPIENT);
		assert_eq!(params["amount"], 25_000_000u64);

		let balance = identity
			.get_balance(DEFAULT_PRINCIPAL, "ICP", ChainRef::Icp)
			.await
			.unwrap();
		assert_eq!(balance, Decimal::from_str("12.34").unwrap());
	}

	#[tokio::test]
	async fn test_ledger_rejection_surfaces() {
		let provider = Arc::new(SimulatedProvider::for_wallet(WalletType::InternetIdentity).failing(
			"icrc1_transfer",
			ProviderError::new(ProviderError::INTERNAL, "InsufficientFunds"),
		));
		let identity = rail(WalletType::InternetIdentity, &provider);
		let connection = identity.connect(None).await.unwrap();
		assert!(matches!(
			identity.send_transaction(&connection, RECIPIENT, Decimal::ONE, "ICP").await,
			Err(WalletError::Provider(_))
		));
	}
}
