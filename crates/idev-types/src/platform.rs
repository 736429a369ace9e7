//! Commerce platform identity, credentials and connection records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the e-commerce vendors the orchestrator can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
	Shopify,
	#[serde(rename = "woocommerce")]
	WooCommerce,
	Wix,
	#[serde(rename = "easyorder")]
	EasyOrder,
}

impl PlatformKind {
	pub const ALL: [PlatformKind; 4] = [
		PlatformKind::Shopify,
		PlatformKind::WooCommerce,
		PlatformKind::Wix,
		PlatformKind::EasyOrder,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			PlatformKind::Shopify => "shopify",
			PlatformKind::WooCommerce => "woocommerce",
			PlatformKind::Wix => "wix",
			PlatformKind::EasyOrder => "easyorder",
		}
	}
}

impl fmt::Display for PlatformKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("Unsupported platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for PlatformKind {
	type Err = UnknownPlatform;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"shopify" => Ok(PlatformKind::Shopify),
			"woocommerce" => Ok(PlatformKind::WooCommerce),
			"wix" => Ok(PlatformKind::Wix),
			"easyorder" => Ok(PlatformKind::EasyOrder),
			_ => Err(UnknownPlatform(s.to_string())),
		}
	}
}

/// Vendor-specific credential bag.
///
/// Each platform accepts exactly one shape; the adapter rejects any other.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformCredentials {
	/// Shopify Admin API access token bound to a shop domain.
	AccessToken {
		shop_domain: String,
		access_token: String,
	},
	/// WooCommerce REST consumer key/secret pair.
	ConsumerKey {
		site_url: String,
		consumer_key: String,
		consumer_secret: String,
	},
	/// Wix app instance with its access token.
	InstanceToken {
		instance_id: String,
		access_token: String,
	},
	/// EasyOrder OAuth2 client credentials.
	ClientCredentials {
		merchant_id: String,
		api_key: String,
		api_secret: String,
	},
}

impl PlatformCredentials {
	/// Public, non-secret part of the credential (domain, site, instance or merchant).
	pub fn subject(&self) -> &str {
		match self {
			PlatformCredentials::AccessToken { shop_domain, .. } => shop_domain,
			PlatformCredentials::ConsumerKey { site_url, .. } => site_url,
			PlatformCredentials::InstanceToken { instance_id, .. } => instance_id,
			PlatformCredentials::ClientCredentials { merchant_id, .. } => merchant_id,
		}
	}

	/// The secret half of the credential.
	pub fn secret(&self) -> &str {
		match self {
			PlatformCredentials::AccessToken { access_token, .. } => access_token,
			PlatformCredentials::ConsumerKey { consumer_secret, .. } => consumer_secret,
			PlatformCredentials::InstanceToken { access_token, .. } => access_token,
			PlatformCredentials::ClientCredentials { api_secret, .. } => api_secret,
		}
	}

	/// Credential shape each platform accepts.
	pub fn expected_kind(platform: PlatformKind) -> &'static str {
		match platform {
			PlatformKind::Shopify => "access_token",
			PlatformKind::WooCommerce => "consumer_key",
			PlatformKind::Wix => "instance_token",
			PlatformKind::EasyOrder => "client_credentials",
		}
	}

	pub fn kind_name(&self) -> &'static str {
		match self {
			PlatformCredentials::AccessToken { .. } => "access_token",
			PlatformCredentials::ConsumerKey { .. } => "consumer_key",
			PlatformCredentials::InstanceToken { .. } => "instance_token",
			PlatformCredentials::ClientCredentials { .. } => "client_credentials",
		}
	}
}

// Secrets never reach logs.
impl fmt::Debug for PlatformCredentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PlatformCredentials")
			.field("type", &self.kind_name())
			.field("subject", &self.subject())
			.field("secret", &"<redacted>")
			.finish()
	}
}

/// Lifecycle state of a connection record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
	Connected,
	Disconnected,
	Error,
}

/// What the vendor reported about the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformIdentity {
	pub platform: PlatformKind,
	/// Shop domain, site URL, instance id or merchant id.
	pub account: String,
	/// Human-readable store name when the vendor exposes one.
	pub display_name: Option<String>,
}

/// In-memory proof that a platform has been authenticated and is usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConnection {
	pub platform: PlatformKind,
	pub credentials: PlatformCredentials,
	pub identity: PlatformIdentity,
	pub connected_at: DateTime<Utc>,
	pub status: ConnectionStatus,
}

/// Per-platform entry returned by the connection status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
	pub connected: bool,
	pub connected_at: Option<DateTime<Utc>>,
	pub status: ConnectionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
	Healthy,
	Unhealthy,
}

/// Result of one liveness probe against a connected platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformHealth {
	pub status: HealthState,
	pub error: Option<String>,
	pub last_checked: DateTime<Utc>,
}

impl PlatformHealth {
	pub fn healthy() -> Self {
		Self {
			status: HealthState::Healthy,
			error: None,
			last_checked: Utc::now(),
		}
	}

	pub fn unhealthy(error: Option<String>) -> Self {
		Self {
			status: HealthState::Unhealthy,
			error,
			last_checked: Utc::now(),
		}
	}

	pub fn is_healthy(&self) -> bool {
		self.status == HealthState::Healthy
	}
}

/// What a connect call does when the platform already has a live connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectPolicy {
	/// Replace the existing connection; the last caller to take the lock wins.
	#[default]
	Overwrite,
	/// Fail with `AlreadyConnected` without touching the adapter.
	Reject,
}

/// Display metadata for a platform.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformInfo {
	pub key: PlatformKind,
	pub name: &'static str,
	pub description: &'static str,
	pub color: &'static str,
	pub supported_regions: &'static [&'static str],
	pub default_currency: Option<&'static str>,
}

pub fn platform_info(kind: PlatformKind) -> PlatformInfo {
	match kind {
		PlatformKind::Shopify => PlatformInfo {
			key: kind,
			name: "Shopify",
			description: "Global hosted e-commerce platform",
			color: "#96BF48",
			supported_regions: &["global"],
			default_currency: None,
		},
		PlatformKind::WooCommerce => PlatformInfo {
			key: kind,
			name: "WooCommerce",
			description: "WordPress e-commerce plugin",
			color: "#96588A",
			supported_regions: &["global"],
			default_currency: None,
		},
		PlatformKind::Wix => PlatformInfo {
			key: kind,
			name: "Wix",
			description: "Website builder with an e-commerce module",
			color: "#FF6B6B",
			supported_regions: &["global"],
			default_currency: None,
		},
		PlatformKind::EasyOrder => PlatformInfo {
			key: kind,
			name: "EasyOrder",
			description: "Regional Arabic-first e-commerce platform",
			color: "#00A651",
			supported_regions: &["SA", "AE", "KW", "QA", "BH"],
			default_currency: Some("SAR"),
		},
	}
}
