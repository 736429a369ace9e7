//! Phantom rail on Solana.
//!
//! Account access and signing go through Phantom's `connect` and
//! `signAndSendTransaction`; balances use the standard Solana JSON-RPC reads,
//! so a node endpoint can serve them directly.

use async_trait::async_trait;
use chrono::Utc;
use idev_types::{find_token, is_native, ChainRef, ConfigSchema, WalletConnection, WalletType};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::provider::{ProviderSchema, WalletProvider};
use crate::units::{from_base_units, parse_integer, to_base_units};
use crate::{positive_amount, resolve_chain, WalletError, WalletInterface};

const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuWvf9Ss623VQ5DA";
const LAMPORT_DECIMALS: u8 = 9;
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

pub struct PhantomWallet {
	provider: Option<Arc<dyn WalletProvider>>,
	session: RwLock<Option<WalletConnection>>,
}

/// Base58 public key of 32 bytes (32 to 44 characters).
fn parse_public_key(value: &str) -> Result<String, WalletError> {
	let key = value.trim();
	let valid = (32..=44).contains(&key.len()) && key.chars().all(|c| BASE58_ALPHABET.contains(c));
	if !valid {
		return Err(WalletError::InvalidAddress(value.to_string()));
	}
	Ok(key.to_string())
}

impl PhantomWallet {
	pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
		Self {
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
			.ok_or(WalletError::ProviderMissing(WalletType::Phantom))
	}

	fn transfer_instruction(
		&self,
		from: &str,
		to: &str,
		amount: Decimal,
		currency: &str,
	) -> Result<Value, WalletError> {
		if is_native(ChainRef::Solana, currency) {
			let lamports = to_base_units(amount, LAMPORT_DECIMALS)?;
			return Ok(json!({
				"programId": SYSTEM_PROGRAM,
				"type": "transfer",
				"from": from,
				"to": to,
				"lamports": lamports.to_string(),
			}));
		}

		let token = find_token(ChainRef::Solana, currency).ok_or_else(|| WalletError::UnknownToken {
			currency: currency.to_string(),
			chain: ChainRef::Solana,
		})?;
		Ok(json!({
			"programId": TOKEN_PROGRAM,
			"type": "transferChecked",
			"mint": token.address,
			"from": from,
			"to": to,
			"amount": to_base_units(amount, token.decimals)?.to_string(),
			"decimals": token.decimals,
		}))
	}
}

#[async_trait]
impl WalletInterface for PhantomWallet {
	fn wallet_type(&self) -> WalletType {
		WalletType::Phantom
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ProviderSchema)
	}

	fn chains(&self) -> &'static [ChainRef] {
		&[ChainRef::Solana]
	}

	async fn connect(&self, chain: Option<ChainRef>) -> Result<WalletConnection, WalletError> {
		let chain = resolve_chain(self, chain)?;
		let response = self.provider()?.request("connect", json!({})).await?;
		let key = response
			.get("publicKey")
			.and_then(|v| v.as_str())
			.ok_or_else(|| WalletError::InvalidResponse(format!("connect: {}", response)))?;

		let connection = WalletConnection {
			wallet_type: WalletType::Phantom,
			chain,
			address: parse_public_key(key)?,
			connected_at: Utc::now(),
		};
		*self.session.write().await = Some(connection.clone());
		tracing::info!(wallet = "phantom", address = %connection.address, "Wallet connected");
		Ok(connection)
	}

	async fn send_transaction(
		&self,
		connection: &WalletConnection,
		to: &str,
		amount: Decimal,
		currency: &str,
	) -> Result<String, WalletError> {
		positive_amount(amount)?;
		let provider = self.provider()?;
		let from = parse_public_key(&connection.address)?;
		let to = parse_public_key(to)?;
		let instruction = self.transfer_instruction(&from, &to, amount, currency)?;

		let response = provider
			.request(
				"signAndSendTransaction",
				json!({ "transaction": { "feePayer": from, "instructions": [instruction] } }),
			)
			.await?;
		let signature = response
			.get("signature")
			.and_then(|v| v.as_str())
			.ok_or_else(|| WalletError::InvalidResponse(format!("signAndSendTransaction: {}", response)))?;
		tracing::info!(wallet = "phantom", currency, signature, "Transaction submitted");
		Ok(signature.to_string())
	}

	async fn get_balance(
		&self,
		address: &str,
		currency: &str,
		chain: ChainRef,
	) -> Result<Decimal, WalletError> {
		resolve_chain(self, Some(chain))?;
		let provider = self.provider()?;
		let owner = parse_public_key(address)?;

		if is_native(ChainRef::Solana, currency) {
			let response = provider.request("getBalance", json!([owner])).await?;
			let lamports = parse_integer(&response["value"])?;
			return from_base_units(lamports, LAMPORT_DECIMALS);
		}

		let token = find_token(ChainRef::Solana, currency).ok_or_else(|| WalletError::UnknownToken {
			currency: currency.to_string(),
			chain: ChainRef::Solana,
		})?;
		let response = provider
			.request(
				"getTokenAccountsByOwner",
				json!([owner, { "mint": token.address }, { "encoding": "jsonParsed" }]),
			)
			.await?;
		let accounts = response["value"]
			.as_array()
			.ok_or_else(|| WalletError::InvalidResponse(format!("getTokenAccountsByOwner: {}", response)))?;

		let mut total = alloy::primitives::U256::ZERO;
		for account in accounts {
			total += parse_integer(&account["account"]["data"]["parsed"]["info"]["tokenAmount"]["amount"])?;
		}
		from_base_units(total, token.decimals)
	}

	async fn disconnect(&self) -> Result<(), WalletError> {
		if self.session.write().await.take().is_some() {
			if let Some(provider) = &self.provider {
				// Phantom drops its own session too; failure leaves nothing to clean up locally.
				if let Err(e) = provider.request("disconnect", json!({})).await {
					tracing::debug!(error = %e, "Phantom disconnect request failed");
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::simulated::{SimulatedProvider, DEFAULT_SOLANA_ACCOUNT};
	use alloy::primitives::U256;
	use std::str::FromStr;

	const RECIPIENT: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

	fn phantom(provider: &Arc<SimulatedProvider>) -> PhantomWallet {
		let provider: Arc<dyn WalletProvider> = provider.clone();
		PhantomWallet::new(Some(provider))
	}

	#[tokio::test]
	async fn test_connect_and_send_sol() {
		let provider = Arc::new(SimulatedProvider::for_wallet(WalletType::Phantom));
		let wallet = phantom(&provider);

		let connection = wallet.connect(None).await.unwrap();
		assert_eq!(connection.chain, ChainRef::Solana);
		assert_eq!(connection.address, DEFAULT_SOLANA_ACCOUNT);

		let signature = wallet
			.send_transaction(&connection, RECIPIENT, Decimal::from_str("1.25").unwrap(), "SOL")
			.await
			.unwrap();
		assert!(!signature.is_empty());

		let (method, params) = provider.calls().pop().unwrap();
		assert_eq!(method, "signAndSendTransaction");
		let instruction = &params["transaction"]["instructions"][0];
		assert_eq!(instruction["programId"], SYSTEM_PROGRAM);
		assert_eq!(instruction["lamports"], "1250000000");
	}

	#[tokio::test]
	async fn test_usdc_transfer_uses_token_program() {
		let provider = Arc::new(SimulatedProvider::for_wallet(WalletType::Phantom));
		let wallet = phantom(&provider);
		let connection = wallet.connect(None).await.unwrap();

		wallet
			.send_transaction(&connection, RECIPIENT, Decimal::from(3), "USDC")
			.await
			.unwrap();
		let (_, params) = provider.calls().pop().unwrap();
		let instruction = &params["transaction"]["instructions"][0];
		assert_eq!(instruction["type"], "transferChecked");
		assert_eq!(instruction["amount"], "3000000");

		assert!(matches!(
			wallet.send_transaction(&connection, RECIPIENT, Decimal::ONE, "USDT").await,
			Err(WalletError::UnknownToken { .. })
		));
		assert!(matches!(
			wallet
				.send_transaction(&connection, "0x8ba1f109551bD432803012645Ac136ddd64DBA72", Decimal::ONE, "SOL")
				.await,
			Err(WalletError::InvalidAddress(_))
		));
	}

	#[tokio::test]
	async fn test_balances() {
		let usdc = find_token(ChainRef::Solana, "USDC").unwrap();
		let provider = Arc::new(
			SimulatedProvider::for_wallet(WalletType::Phantom)
				.with_balance(DEFAULT_SOLANA_ACCOUNT, U256::from(2_000_000_000u64))
				.with_token_balance(usdc.address, U256::from(7_500_000u64)),
		);
		let wallet = phantom(&provider);

		let sol = wallet
			.get_balance(DEFAULT_SOLANA_ACCOUNT, "SOL", ChainRef::Solana)
			.await
			.unwrap();
		assert_eq!(sol, Decimal::from(2));
		let tokens = wallet
			.get_balance(DEFAULT_SOLANA_ACCOUNT, "USDC", ChainRef::Solana)
			.await
			.unwrap();
		assert_eq!(tokens, Decimal::from_str("7.5").unwrap());
		assert!(matches!(
			wallet.get_balance(DEFAULT_SOLANA_ACCOUNT, "ETH", ChainRef::Ethereum).await,
			Err(WalletError::UnsupportedChain { .. })
		));
	}

	#[tokio::test]
	async fn test_disconnect_clears_session() {
		let provider = Arc::new(SimulatedProvider::for_wallet(WalletType::Phantom));
		let wallet = phantom(&provider);
		wallet.connect(None).await.unwrap();
		wallet.disconnect().await.unwrap();
		assert!(wallet.session().await.is_none());
		assert_eq!(provider.methods().last().unwrap(), "disconnect");
	}
}
