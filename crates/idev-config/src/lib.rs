//! Configuration loading for the IDev orchestration service.
//!
//! The file is TOML. `${VAR}` placeholders are replaced from the environment
//! before parsing, a handful of `IDEV_*` variables override parsed values, and
//! the result is validated before anything is built from it.

use idev_types::PlatformKind;
use regex::Regex;
use std::env;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

mod types;

pub use types::*;

/// Implementation names a commerce platform entry may select.
pub const COMMERCE_IMPLEMENTATIONS: &[&str] = &["shopify", "woocommerce", "wix", "easyorder", "simulated"];

pub const STORAGE_BACKENDS: &[&str] = &["memory", "file"];

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Loads a [`Config`] from a file, with environment substitution and overrides.
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "IDEV_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self
			.file_path
			.as_ref()
			.ok_or_else(|| ConfigError::FileNotFound("No configuration file specified".to_string()))?;

		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.clone()))
			}
			Err(e) => return Err(e.into()),
		};

		let mut config = self.parse(&content)?;
		self.apply_env_overrides(&mut config)?;
		validate(&config)?;

		tracing::debug!(
			path = %file_path,
			platforms = config.commerce.platforms.len(),
			"Configuration loaded"
		);
		Ok(config)
	}

	/// Substitutes placeholders and parses without applying overrides.
	pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = substitute_env_vars(content)?;
		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.service.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Ok(public_url) = env::var(format!("{}PUBLIC_URL", self.env_prefix)) {
			config.service.public_url = Some(public_url);
		}

		Ok(())
	}
}

fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut missing = None;
	let result = re.replace_all(content, |caps: &regex::Captures<'_>| {
		let name = &caps[1];
		match env::var(name) {
			Ok(value) => value,
			Err(_) => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			}
		}
	});

	match missing {
		Some(name) => Err(ConfigError::EnvVarNotFound(name)),
		None => Ok(result.into_owned()),
	}
}

/// Structural checks; implementation tables are checked by their own schemas
/// when the implementations are built.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
	if config.service.http_port == 0 {
		return Err(ConfigError::ValidationError(
			"service.http_port must be non-zero".to_string(),
		));
	}

	if config.commerce.request_timeout_secs == 0 || config.payment.request_timeout_secs == 0 {
		return Err(ConfigError::ValidationError(
			"request_timeout_secs must be non-zero".to_string(),
		));
	}

	if config.commerce.enabled_platforms().next().is_none() {
		return Err(ConfigError::ValidationError(
			"At least one commerce platform must be enabled".to_string(),
		));
	}

	for (name, platform) in &config.commerce.platforms {
		PlatformKind::from_str(name).map_err(|e| ConfigError::ValidationError(e.to_string()))?;
		if !COMMERCE_IMPLEMENTATIONS.contains(&platform.implementation.as_str()) {
			return Err(ConfigError::ValidationError(format!(
				"Unknown implementation '{}' for platform '{}'",
				platform.implementation, name
			)));
		}
	}

	for wallet in config.payment.wallets.keys() {
		wallet
			.parse::<idev_types::WalletType>()
			.map_err(|e| ConfigError::ValidationError(e.to_string()))?;
	}

	if let Some(chain) = &config.payment.default_chain {
		chain
			.parse::<idev_types::ChainRef>()
			.map_err(|e| ConfigError::ValidationError(e.to_string()))?;
	}

	if !STORAGE_BACKENDS.contains(&config.storage.backend.as_str()) {
		return Err(ConfigError::ValidationError(format!(
			"Unknown storage backend '{}'",
			config.storage.backend
		)));
	}

	if config.storage.backend == "file" && !config.storage.settings.contains_key("path") {
		return Err(ConfigError::ValidationError(
			"storage.path is required for the file backend".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const BASE: &str = r#"
[service]
name = "idev-test"
http_port = 8080

[commerce]
reconnect_policy = "reject"

[commerce.platforms.shopify]
implementation = "shopify"
api_version = "2024-01"

[commerce.platforms.wix]
implementation = "simulated"
enabled = false

[payment.wallets.metamask]
rpc_url = "http://localhost:8545"
"#;

	#[test]
	fn test_parse_with_defaults() {
		let config = ConfigLoader::new().parse(BASE).unwrap();
		assert_eq!(config.service.host, "127.0.0.1");
		assert_eq!(config.commerce.request_timeout_secs, 30);
		assert_eq!(config.commerce.reconnect_policy, idev_types::ReconnectPolicy::Reject);
		assert_eq!(config.commerce.enabled_platforms().count(), 1);
		let shopify = config.commerce.platform(PlatformKind::Shopify).unwrap();
		assert_eq!(
			shopify.settings.get("api_version").and_then(|v| v.as_str()),
			Some("2024-01")
		);
		assert!(config.payment.audit_failures);
		assert_eq!(config.payment.gateway.implementation, "simulated");
		assert_eq!(config.storage.backend, "memory");
		assert_eq!(
			config.service.webhook_base_url(),
			"http://127.0.0.1:8080/api/webhooks"
		);
		validate(&config).unwrap();
	}

	#[test]
	fn test_placeholder_substitution() {
		env::set_var("IDEV_CFG_TEST_SHOP_TOKEN", "shpat_123");
		let content = format!(
			"{}\n[commerce.platforms.easyorder]\nimplementation = \"easyorder\"\napi_key = \"${{IDEV_CFG_TEST_SHOP_TOKEN}}\"\n",
			BASE
		);
		let config = ConfigLoader::new().parse(&content).unwrap();
		let easyorder = config.commerce.platform(PlatformKind::EasyOrder).unwrap();
		assert_eq!(
			easyorder.settings.get("api_key").and_then(|v| v.as_str()),
			Some("shpat_123")
		);

		let missing = "name = \"${IDEV_CFG_TEST_DEFINITELY_UNSET}\"";
		assert!(matches!(
			ConfigLoader::new().parse(missing),
			Err(ConfigError::EnvVarNotFound(name)) if name == "IDEV_CFG_TEST_DEFINITELY_UNSET"
		));
	}

	#[test]
	fn test_validation_failures() {
		let config = ConfigLoader::new()
			.parse(&BASE.replace("implementation = \"shopify\"", "implementation = \"magento\""))
			.unwrap();
		assert!(validate(&config).is_err());

		let config = ConfigLoader::new()
			.parse(&format!("{}\n[storage]\nbackend = \"file\"\n", BASE))
			.unwrap();
		assert!(validate(&config).is_err());

		let config = ConfigLoader::new()
			.parse(&BASE.replace("[commerce.platforms.shopify]", "[commerce.platforms.magento]"))
			.unwrap();
		assert!(validate(&config).is_err());
	}

	#[tokio::test]
	async fn test_load_applies_env_overrides() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(BASE.as_bytes()).unwrap();

		env::set_var("IDEV_CFG_OVERRIDE_HTTP_PORT", "9191");
		env::set_var("IDEV_CFG_OVERRIDE_PUBLIC_URL", "https://hooks.example.com/");
		let config = ConfigLoader::new()
			.with_file(file.path())
			.with_env_prefix("IDEV_CFG_OVERRIDE_")
			.load()
			.await
			.unwrap();
		assert_eq!(config.service.http_port, 9191);
		assert_eq!(
			config.service.webhook_base_url(),
			"https://hooks.example.com/api/webhooks"
		);
	}

	#[tokio::test]
	async fn test_missing_file() {
		let result = ConfigLoader::new()
			.with_file("/nonexistent/idev.toml")
			.load()
			.await;
		assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
	}
}
