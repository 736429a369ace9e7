//! Wallet provider abstraction.
//!
//! Browser wallets expose a single `request({method, params})` entry point
//! and fail with EIP-1193 style `{code, message}` errors. [`WalletProvider`]
//! mirrors that shape so rails are written once against the wallet's own
//! vocabulary, whatever actually answers the request.

use async_trait::async_trait;
use idev_types::{ConfigSchema, Field, FieldType, Schema, ValidationError, WalletType};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::simulated::SimulatedProvider;
use crate::WalletError;

#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize)]
#[error("{message} (code {code})")]
pub struct ProviderError {
	pub code: i64,
	pub message: String,
}

impl ProviderError {
	/// The user rejected the request.
	pub const USER_REJECTED: i64 = 4001;
	/// The requested chain has not been added to the wallet.
	pub const UNRECOGNIZED_CHAIN: i64 = 4902;
	pub const METHOD_NOT_FOUND: i64 = -32601;
	pub const INTERNAL: i64 = -32603;

	pub fn new(code: i64, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
	fn name(&self) -> &str;

	async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// Provider backed by a JSON-RPC 2.0 endpoint: a node for read calls, or a
/// remote signing session bridged over HTTP.
pub struct JsonRpcProvider {
	client: reqwest::Client,
	url: String,
	next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<ProviderError>,
}

impl JsonRpcProvider {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WalletError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| WalletError::Configuration(format!("HTTP client: {}", e)))?;
		Ok(Self {
			client,
			url: url.into(),
			next_id: AtomicU64::new(1),
		})
	}
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
	fn name(&self) -> &str {
		"json-rpc"
	}

	async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		tracing::debug!(method, id, url = %self.url, "JSON-RPC request");

		let response = self
			.client
			.post(&self.url)
			.json(&json!({
				"jsonrpc": "2.0",
				"id": id,
				"method": method,
				"params": params,
			}))
			.send()
			.await
			.map_err(|e| ProviderError::new(ProviderError::INTERNAL, e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(ProviderError::new(
				ProviderError::INTERNAL,
				format!("HTTP {} from {}", status.as_u16(), self.url),
			));
		}

		let body: RpcResponse = response
			.json()
			.await
			.map_err(|e| ProviderError::new(ProviderError::INTERNAL, e.to_string()))?;
		if let Some(error) = body.error {
			return Err(error);
		}
		Ok(body.result.unwrap_or(Value::Null))
	}
}

/// Configuration schema for a `[payment.wallets.<type>]` table.
pub struct ProviderSchema;

impl ConfigSchema for ProviderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("provider", FieldType::OneOf(&["json-rpc", "simulated"])),
				Field::new("rpc_url", FieldType::String)
					.with_validator(idev_types::validation::http_url),
				Field::new(
					"timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
				Field::new("address", FieldType::String)
					.with_validator(idev_types::validation::non_empty),
				Field::new("known_chains", FieldType::Array(Box::new(FieldType::String))),
				Field::new("balance", FieldType::String),
			],
		)
		.validate(config)?;

		let kind = config.get("provider").and_then(|v| v.as_str()).unwrap_or("json-rpc");
		if kind == "json-rpc" && config.get("rpc_url").is_none() {
			return Err(ValidationError::MissingField("rpc_url".to_string()));
		}
		Ok(())
	}
}

/// Builds the provider described by a wallet table.
///
/// `provider = "json-rpc"` (the default) needs `rpc_url`;
/// `provider = "simulated"` answers in-process and is meant for local runs.
pub fn create_provider(
	wallet_type: WalletType,
	config: &toml::Value,
) -> Result<Arc<dyn WalletProvider>, WalletError> {
	ProviderSchema.validate(config)?;

	match config.get("provider").and_then(|v| v.as_str()).unwrap_or("json-rpc") {
		"simulated" => Ok(Arc::new(SimulatedProvider::from_config(wallet_type, config)?)),
		_ => {
			let url = config
				.get("rpc_url")
				.and_then(|v| v.as_str())
				.ok_or_else(|| WalletError::Configuration("rpc_url is required".to_string()))?;
			let timeout = config
				.get("timeout_secs")
				.and_then(|v| v.as_integer())
				.unwrap_or(30) as u64;
			Ok(Arc::new(JsonRpcProvider::new(url, Duration::from_secs(timeout))?))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_partial_json, method};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn table(src: &str) -> toml::Value {
		toml::Value::Table(toml::from_str::<toml::Table>(src).unwrap())
	}

	#[tokio::test]
	async fn test_json_rpc_result_and_error() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(body_partial_json(json!({ "method": "eth_chainId" })))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x89" })),
			)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(body_partial_json(json!({ "method": "wallet_switchEthereumChain" })))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"jsonrpc": "2.0",
				"id": 2,
				"error": { "code": 4902, "message": "Unrecognized chain ID" }
			})))
			.mount(&server)
			.await;

		let provider = JsonRpcProvider::new(server.uri(), Duration::from_secs(5)).unwrap();
		assert_eq!(
			provider.request("eth_chainId", json!([])).await.unwrap(),
			json!("0x89")
		);
		let err = provider
			.request("wallet_switchEthereumChain", json!([{ "chainId": "0x89" }]))
			.await
			.unwrap_err();
		assert_eq!(err.code, ProviderError::UNRECOGNIZED_CHAIN);
	}

	#[tokio::test]
	async fn test_json_rpc_http_failure() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503))
			.mount(&server)
			.await;
		let provider = JsonRpcProvider::new(server.uri(), Duration::from_secs(5)).unwrap();
		let err = provider.request("eth_blockNumber", json!([])).await.unwrap_err();
		assert_eq!(err.code, ProviderError::INTERNAL);
		assert!(err.message.contains("503"));
	}

	#[test]
	fn test_provider_config() {
		assert!(create_provider(WalletType::Metamask, &table("provider = \"json-rpc\"")).is_err());
		assert!(create_provider(WalletType::Metamask, &table("rpc_url = \"ws://node\"")).is_err());
		let provider =
			create_provider(WalletType::Metamask, &table("rpc_url = \"http://localhost:8545\"")).unwrap();
		assert_eq!(provider.name(), "json-rpc");
		let provider = create_provider(WalletType::Plug, &table("provider = \"simulated\"")).unwrap();
		assert_eq!(provider.name(), "simulated");
	}
}
