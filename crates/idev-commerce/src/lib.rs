//! Commerce platform integration.
//!
//! Each vendor (Shopify, WooCommerce, Wix, EasyOrder) is wrapped by an
//! adapter implementing [`CommerceInterface`]. Adapters own the vendor
//! session and translate vendor payloads into the canonical order model.
//! [`CommerceService`] holds the fixed adapter registry and the live
//! connection table, and fans aggregate calls out across connected platforms.

use async_trait::async_trait;
use chrono::Utc;
use idev_types::{
	AnalyticsPeriod, AnalyticsReport, ConfigSchema, CustomerAccount, Order, OrderLifecycleEvent,
	OrderQuery, PlatformCredentials, PlatformIdentity, PlatformKind, Product, ShipmentStatus,
	ShippingLabel, ShippingRequest, TopicTable, ValidationError, WebhookSetupResult, WebhookTopic,
};
use serde_json::Value;
use thiserror::Error;

pub mod analytics;
pub mod convert;
pub mod http;
pub mod signature;

mod service;

pub use service::{CommerceService, CommerceSettings};
pub use signature::{SignatureEncoding, SignatureScheme};

pub mod implementations {
	pub mod easyorder;
	pub mod shopify;
	pub mod simulated;
	pub mod wix;
	pub mod woocommerce;
}

#[derive(Debug, Error)]
pub enum CommerceError {
	#[error("Authentication failed: {0}")]
	Authentication(String),
	#[error("Network error: {0}")]
	Network(String),
	#[error("HTTP {status}: {message}")]
	Http { status: u16, message: String },
	#[error("Unsupported platform: {0}")]
	UnsupportedPlatform(String),
	#[error("Platform {0} is not connected")]
	NotConnected(PlatformKind),
	#[error("Platform {0} is already connected")]
	AlreadyConnected(PlatformKind),
	#[error("Unknown webhook topic: {0}")]
	UnknownWebhookTopic(String),
	#[error("Invalid webhook signature")]
	InvalidSignature,
	#[error("Invalid payload: {0}")]
	InvalidPayload(String),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Request timed out")]
	Timeout,
	#[error("Operation cancelled")]
	Cancelled,
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<ValidationError> for CommerceError {
	fn from(err: ValidationError) -> Self {
		CommerceError::Configuration(err.to_string())
	}
}

/// Contract every commerce platform adapter implements.
///
/// Adapters keep their own vendor session behind interior mutability; all
/// methods take `&self` so one instance can serve concurrent callers. No
/// method retries: a failed vendor call surfaces immediately.
#[async_trait]
pub trait CommerceInterface: Send + Sync {
	fn platform(&self) -> PlatformKind;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn init(&self) -> Result<(), CommerceError> {
		Ok(())
	}

	/// Verifies `credentials` with a live vendor call and, only on success,
	/// replaces the adapter session.
	async fn authenticate(
		&self,
		credentials: &PlatformCredentials,
	) -> Result<PlatformIdentity, CommerceError>;

	/// Liveness probe for the current session.
	async fn validate_session(&self) -> Result<bool, CommerceError>;

	async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, CommerceError>;

	async fn get_order(&self, order_id: &str) -> Result<Order, CommerceError>;

	/// Applies a vendor status string; the vocabulary is vendor-specific.
	async fn update_order_status(
		&self,
		order_id: &str,
		status: &str,
		note: Option<&str>,
	) -> Result<Order, CommerceError>;

	/// Creates the vendor fulfillment/tracking object and moves the order
	/// toward shipped.
	async fn create_shipping_label(
		&self,
		order_id: &str,
		request: &ShippingRequest,
	) -> Result<ShippingLabel, CommerceError>;

	async fn update_shipment_status(
		&self,
		order_id: &str,
		status: ShipmentStatus,
		tracking_number: Option<&str>,
	) -> Result<(), CommerceError>;

	async fn get_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError>;

	async fn get_customers(&self, limit: u32) -> Result<Vec<CustomerAccount>, CommerceError>;

	/// Vendor topic strings paired with their neutral topic.
	fn webhook_topics(&self) -> TopicTable;

	/// How inbound deliveries are signed; `None` means unsigned.
	fn signature_scheme(&self) -> Option<SignatureScheme> {
		None
	}

	fn webhook_secret(&self) -> Option<&str> {
		None
	}

	/// Registers every topic in [`Self::webhook_topics`] with delivery URLs
	/// under `delivery_base_url`. Failures are reported per topic.
	async fn setup_webhooks(
		&self,
		delivery_base_url: &str,
	) -> Result<Vec<WebhookSetupResult>, CommerceError>;

	/// Decodes a vendor order payload as delivered by a webhook.
	fn decode_order(&self, payload: &Value) -> Result<Order, CommerceError>;

	async fn process_webhook(
		&self,
		payload: &Value,
		topic: &str,
	) -> Result<OrderLifecycleEvent, CommerceError> {
		let neutral = self
			.webhook_topics()
			.iter()
			.find(|(vendor_topic, _)| *vendor_topic == topic)
			.map(|(_, neutral)| *neutral)
			.ok_or_else(|| CommerceError::UnknownWebhookTopic(topic.to_string()))?;

		match neutral {
			WebhookTopic::OrderCreated => self.handle_order_created(payload).await,
			WebhookTopic::OrderUpdated => self.handle_order_updated(payload).await,
			WebhookTopic::OrderPaid => self.handle_order_paid(payload).await,
			WebhookTopic::OrderCancelled => self.handle_order_cancelled(payload).await,
		}
	}

	async fn handle_order_created(&self, payload: &Value) -> Result<OrderLifecycleEvent, CommerceError> {
		let order = self.decode_order(payload)?;
		Ok(OrderLifecycleEvent::new(self.platform(), WebhookTopic::OrderCreated, order.id.clone())
			.with_order(order))
	}

	async fn handle_order_updated(&self, payload: &Value) -> Result<OrderLifecycleEvent, CommerceError> {
		let order_id = convert::payload_id(payload)?;
		Ok(OrderLifecycleEvent::new(self.platform(), WebhookTopic::OrderUpdated, order_id))
	}

	async fn handle_order_paid(&self, payload: &Value) -> Result<OrderLifecycleEvent, CommerceError> {
		let order_id = convert::payload_id(payload)?;
		Ok(OrderLifecycleEvent::new(self.platform(), WebhookTopic::OrderPaid, order_id))
	}

	async fn handle_order_cancelled(
		&self,
		payload: &Value,
	) -> Result<OrderLifecycleEvent, CommerceError> {
		let order_id = convert::payload_id(payload)?;
		Ok(OrderLifecycleEvent::new(self.platform(), WebhookTopic::OrderCancelled, order_id))
	}

	/// Summarizes recent orders. The default samples `sample_size` orders
	/// from the vendor and aggregates them locally.
	async fn get_analytics(
		&self,
		period: AnalyticsPeriod,
		sample_size: u32,
	) -> Result<AnalyticsReport, CommerceError> {
		let orders = self.get_orders(&OrderQuery::new(sample_size)).await?;
		Ok(analytics::summarize(period, &orders, Utc::now()))
	}

	/// Drops the local session. The credential is not revoked on the vendor.
	async fn disconnect(&self) -> Result<(), CommerceError>;
}

/// Builds an adapter for `platform` from the implementation named in config.
pub fn create_platform(
	platform: PlatformKind,
	implementation: &str,
	config: &toml::Value,
) -> Result<std::sync::Arc<dyn CommerceInterface>, CommerceError> {
	use implementations::*;

	match (implementation, platform) {
		("simulated", _) => simulated::create_platform(platform, config),
		("shopify", PlatformKind::Shopify) => shopify::create_platform(config),
		("woocommerce", PlatformKind::WooCommerce) => woocommerce::create_platform(config),
		("wix", PlatformKind::Wix) => wix::create_platform(config),
		("easyorder", PlatformKind::EasyOrder) => easyorder::create_platform(config),
		(other, platform) => Err(CommerceError::Configuration(format!(
			"Implementation '{}' cannot serve platform '{}'",
			other, platform
		))),
	}
}

/// Rejects credentials of the wrong shape for `platform`.
pub(crate) fn expect_credentials(
	platform: PlatformKind,
	credentials: &PlatformCredentials,
) -> Result<(), CommerceError> {
	let expected = PlatformCredentials::expected_kind(platform);
	if credentials.kind_name() != expected {
		return Err(CommerceError::Authentication(format!(
			"{} expects {} credentials, got {}",
			platform,
			expected,
			credentials.kind_name()
		)));
	}
	if credentials.secret().trim().is_empty() || credentials.subject().trim().is_empty() {
		return Err(CommerceError::Authentication("Empty credentials".to_string()));
	}
	Ok(())
}

/// Delivery URL for one vendor topic: `<base>/<platform>/<topic>`.
pub(crate) fn delivery_url(base: &str, platform: PlatformKind, topic: &str) -> String {
	format!("{}/{}/{}", base.trim_end_matches('/'), platform, topic)
}
