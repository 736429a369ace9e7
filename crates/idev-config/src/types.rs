//! Configuration file structure.

use idev_types::{PlatformKind, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub service: ServiceConfig,
	pub commerce: CommerceConfig,
	#[serde(default)]
	pub payment: PaymentConfig,
	#[serde(default)]
	pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	pub name: String,
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub http_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Externally reachable base URL; webhook delivery URLs are built from it.
	pub public_url: Option<String>,
}

impl ServiceConfig {
	pub fn webhook_base_url(&self) -> String {
		match &self.public_url {
			Some(url) => format!("{}/api/webhooks", url.trim_end_matches('/')),
			None => format!("http://{}:{}/api/webhooks", self.host, self.http_port),
		}
	}
}

/// One pluggable implementation: its name plus free-form settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImplementationConfig {
	pub implementation: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(flatten)]
	pub settings: toml::Table,
}

impl ImplementationConfig {
	pub fn new(implementation: impl Into<String>) -> Self {
		Self {
			implementation: implementation.into(),
			enabled: true,
			settings: toml::Table::new(),
		}
	}

	/// Settings as a table value, the shape factories validate against.
	pub fn settings_value(&self) -> toml::Value {
		toml::Value::Table(self.settings.clone())
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommerceConfig {
	#[serde(default = "default_timeout_secs")]
	pub request_timeout_secs: u64,
	#[serde(default)]
	pub reconnect_policy: ReconnectPolicy,
	/// Orders fetched per platform when computing analytics.
	#[serde(default = "default_analytics_sample")]
	pub analytics_sample_size: u32,
	pub platforms: BTreeMap<String, ImplementationConfig>,
}

impl CommerceConfig {
	/// Enabled platform entries keyed by their parsed kind.
	pub fn enabled_platforms(&self) -> impl Iterator<Item = (&str, &ImplementationConfig)> {
		self.platforms
			.iter()
			.filter(|(_, p)| p.enabled)
			.map(|(name, p)| (name.as_str(), p))
	}

	pub fn platform(&self, kind: PlatformKind) -> Option<&ImplementationConfig> {
		self.platforms.get(kind.as_str())
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
	#[serde(default = "default_timeout_secs")]
	pub request_timeout_secs: u64,
	/// Persist rejected and failed payment attempts for later review.
	#[serde(default = "default_true")]
	pub audit_failures: bool,
	pub default_chain: Option<String>,
	/// Rail provider settings keyed by wallet type.
	#[serde(default)]
	pub wallets: BTreeMap<String, toml::Table>,
	#[serde(default = "default_gateway")]
	pub gateway: ImplementationConfig,
}

impl Default for PaymentConfig {
	fn default() -> Self {
		Self {
			request_timeout_secs: default_timeout_secs(),
			audit_failures: true,
			default_chain: None,
			wallets: BTreeMap::new(),
			gateway: default_gateway(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	#[serde(flatten)]
	pub settings: toml::Table,
}

impl StorageConfig {
	pub fn settings_value(&self) -> toml::Value {
		toml::Value::Table(self.settings.clone())
	}
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_storage_backend(),
			settings: toml::Table::new(),
		}
	}
}

fn default_host() -> String {
	"127.0.0.1".to_string()
}

fn default_port() -> u16 {
	3000
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_true() -> bool {
	true
}

fn default_timeout_secs() -> u64 {
	30
}

fn default_analytics_sample() -> u32 {
	250
}

fn default_gateway() -> ImplementationConfig {
	ImplementationConfig::new("simulated")
}

fn default_storage_backend() -> String {
	"memory".to_string()
}
