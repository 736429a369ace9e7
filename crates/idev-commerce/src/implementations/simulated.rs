//! In-memory stand-in for any commerce vendor.
//!
//! Serves seeded orders with the topic table and signature scheme of the
//! platform it impersonates. Used for local runs and for the orchestration
//! tests, where latency and failure switches make timing and error paths
//! reproducible.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use idev_types::{
	ConfigSchema, Customer, CustomerAccount, Field, FieldType, LineItem, Order, OrderQuery,
	OrderStage, PlatformCredentials, PlatformIdentity, PlatformKind, Product, Schema,
	ShipmentStatus, ShippingAddress, ShippingLabel, ShippingRequest, TopicTable,
	ValidationError, WebhookSetupResult,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{easyorder, shopify, wix, woocommerce};
use crate::{delivery_url, expect_credentials, CommerceError, CommerceInterface, SignatureScheme};

pub struct SimulatedPlatform {
	platform: PlatformKind,
	accepted_secret: Option<String>,
	webhook_secret: Option<String>,
	latency: Duration,
	failing_topics: Vec<String>,
	orders: RwLock<Vec<Order>>,
	session: RwLock<Option<String>>,
	fail_orders: AtomicBool,
	healthy: AtomicBool,
	fulfillments: AtomicU64,
}

impl SimulatedPlatform {
	pub fn new(platform: PlatformKind) -> Self {
		Self {
			platform,
			accepted_secret: None,
			webhook_secret: None,
			latency: Duration::ZERO,
			failing_topics: Vec::new(),
			orders: RwLock::new(Vec::new()),
			session: RwLock::new(None),
			fail_orders: AtomicBool::new(false),
			healthy: AtomicBool::new(true),
			fulfillments: AtomicU64::new(0),
		}
	}

	/// Only this secret authenticates; otherwise any non-empty secret does.
	pub fn with_accepted_secret(mut self, secret: impl Into<String>) -> Self {
		self.accepted_secret = Some(secret.into());
		self
	}

	pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
		self.webhook_secret = Some(secret.into());
		self
	}

	/// Delay applied before every simulated vendor call.
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = latency;
		self
	}

	pub fn with_orders(self, orders: Vec<Order>) -> Self {
		Self {
			orders: RwLock::new(orders),
			..self
		}
	}

	pub fn with_sample_orders(self) -> Self {
		let orders = sample_orders(self.platform);
		self.with_orders(orders)
	}

	/// Registration of `topic` fails during webhook setup.
	pub fn with_failing_topic(mut self, topic: impl Into<String>) -> Self {
		self.failing_topics.push(topic.into());
		self
	}

	/// Makes order reads fail with a vendor error.
	pub fn failing_orders(self) -> Self {
		self.fail_orders.store(true, Ordering::SeqCst);
		self
	}

	pub fn set_failing_orders(&self, failing: bool) {
		self.fail_orders.store(failing, Ordering::SeqCst);
	}

	pub fn set_healthy(&self, healthy: bool) {
		self.healthy.store(healthy, Ordering::SeqCst);
	}

	/// Secret of the credentials that currently back the session.
	pub async fn session_secret(&self) -> Option<String> {
		self.session.read().await.clone()
	}

	async fn vendor_call(&self) {
		if !self.latency.is_zero() {
			tokio::time::sleep(self.latency).await;
		}
	}

	async fn ensure_session(&self) -> Result<(), CommerceError> {
		if self.session.read().await.is_none() {
			return Err(CommerceError::NotConnected(self.platform));
		}
		Ok(())
	}

	async fn with_order<F>(&self, order_id: &str, mutate: F) -> Result<Order, CommerceError>
	where
		F: FnOnce(&mut Order) + Send,
	{
		let mut orders = self.orders.write().await;
		let order = orders
			.iter_mut()
			.find(|o| o.id == order_id)
			.ok_or_else(|| not_found(order_id))?;
		mutate(order);
		Ok(order.clone())
	}
}

fn not_found(order_id: &str) -> CommerceError {
	CommerceError::Http {
		status: 404,
		message: format!("order {} not found", order_id),
	}
}

fn stage_of(status: &str) -> OrderStage {
	match status.to_ascii_lowercase().as_str() {
		"pending" | "open" => OrderStage::Pending,
		"paid" => OrderStage::Paid,
		"processing" => OrderStage::Processing,
		"shipped" | "fulfilled" => OrderStage::Shipped,
		"delivered" | "completed" => OrderStage::Delivered,
		"cancelled" | "canceled" | "cancel" => OrderStage::Cancelled,
		_ => OrderStage::Unknown,
	}
}

pub struct SimulatedSchema;

impl ConfigSchema for SimulatedSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("accepted_secret", FieldType::String)
					.with_validator(idev_types::validation::non_empty),
				Field::new("webhook_secret", FieldType::String),
				Field::new(
					"latency_ms",
					FieldType::Integer {
						min: Some(0),
						max: Some(60_000),
					},
				),
				Field::new("seed_orders", FieldType::Boolean),
			],
		)
		.validate(config)
	}
}

#[async_trait]
impl CommerceInterface for SimulatedPlatform {
	fn platform(&self) -> PlatformKind {
		self.platform
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedSchema)
	}

	async fn authenticate(
		&self,
		credentials: &PlatformCredentials,
	) -> Result<PlatformIdentity, CommerceError> {
		expect_credentials(self.platform, credentials)?;
		self.vendor_call().await;
		if let Some(accepted) = &self.accepted_secret {
			if credentials.secret() != accepted.as_str() {
				return Err(CommerceError::Authentication(
					"vendor rejected credentials (401)".to_string(),
				));
			}
		}

		*self.session.write().await = Some(credentials.secret().to_string());
		Ok(PlatformIdentity {
			platform: self.platform,
			account: credentials.subject().to_string(),
			display_name: Some(format!("Simulated {}", self.platform)),
		})
	}

	async fn validate_session(&self) -> Result<bool, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		Ok(self.healthy.load(Ordering::SeqCst))
	}

	async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		if self.fail_orders.load(Ordering::SeqCst) {
			return Err(CommerceError::Http {
				status: 503,
				message: "simulated outage".to_string(),
			});
		}
		let orders = self.orders.read().await;
		Ok(orders
			.iter()
			.filter(|o| query.status.as_deref().map_or(true, |s| o.status == s))
			.take(query.limit as usize)
			.cloned()
			.collect())
	}

	async fn get_order(&self, order_id: &str) -> Result<Order, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		self.orders
			.read()
			.await
			.iter()
			.find(|o| o.id == order_id)
			.cloned()
			.ok_or_else(|| not_found(order_id))
	}

	async fn update_order_status(
		&self,
		order_id: &str,
		status: &str,
		_note: Option<&str>,
	) -> Result<Order, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		let status = status.to_string();
		self.with_order(order_id, move |order| {
			order.stage = stage_of(&status);
			order.status = status;
		})
		.await
	}

	async fn create_shipping_label(
		&self,
		order_id: &str,
		request: &ShippingRequest,
	) -> Result<ShippingLabel, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		let tracking_number = request.resolve_tracking_number();
		let number = tracking_number.clone();
		self.with_order(order_id, move |order| {
			order.status = "shipped".to_string();
			order.stage = OrderStage::Shipped;
			order.tracking_numbers.push(number);
		})
		.await?;

		let sequence = self.fulfillments.fetch_add(1, Ordering::SeqCst) + 1;
		Ok(ShippingLabel {
			order_id: order_id.to_string(),
			tracking_number,
			fulfillment_id: format!("sim-ful-{}", sequence),
			carrier: request.carrier().to_string(),
		})
	}

	async fn update_shipment_status(
		&self,
		order_id: &str,
		status: ShipmentStatus,
		tracking_number: Option<&str>,
	) -> Result<(), CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		let tracking_number = tracking_number.map(str::to_string);
		self.with_order(order_id, move |order| {
			order.stage = match status {
				ShipmentStatus::Pending => OrderStage::Pending,
				ShipmentStatus::Processing => OrderStage::Processing,
				ShipmentStatus::Shipped => OrderStage::Shipped,
				ShipmentStatus::Delivered => OrderStage::Delivered,
				ShipmentStatus::Cancelled => OrderStage::Cancelled,
			};
			order.status = format!("{:?}", status).to_ascii_lowercase();
			if let Some(number) = tracking_number {
				if !order.tracking_numbers.contains(&number) {
					order.tracking_numbers.push(number);
				}
			}
		})
		.await?;
		Ok(())
	}

	async fn get_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		let orders = self.orders.read().await;
		let mut products: BTreeMap<String, Product> = BTreeMap::new();
		for item in orders.iter().flat_map(|o| o.line_items.iter()) {
			let id = item.sku.clone().unwrap_or_else(|| item.name.clone());
			products.entry(id.clone()).or_insert_with(|| Product {
				id,
				name: item.name.clone(),
				sku: item.sku.clone(),
				price: Some(item.unit_price),
			});
		}
		Ok(products.into_values().take(limit as usize).collect())
	}

	async fn get_customers(&self, limit: u32) -> Result<Vec<CustomerAccount>, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		let orders = self.orders.read().await;
		let mut customers: BTreeMap<String, CustomerAccount> = BTreeMap::new();
		for customer in orders.iter().map(|o| &o.customer) {
			let id = customer.email.clone().unwrap_or_else(|| customer.name.clone());
			customers.entry(id.clone()).or_insert_with(|| CustomerAccount {
				id,
				name: customer.name.clone(),
				email: customer.email.clone(),
			});
		}
		Ok(customers.into_values().take(limit as usize).collect())
	}

	fn webhook_topics(&self) -> TopicTable {
		match self.platform {
			PlatformKind::Shopify => shopify::TOPICS,
			PlatformKind::WooCommerce => woocommerce::TOPICS,
			PlatformKind::Wix => wix::TOPICS,
			PlatformKind::EasyOrder => easyorder::TOPICS,
		}
	}

	fn signature_scheme(&self) -> Option<SignatureScheme> {
		match self.platform {
			PlatformKind::Shopify => Some(shopify::SIGNATURE),
			PlatformKind::WooCommerce => Some(woocommerce::SIGNATURE),
			PlatformKind::Wix => None,
			PlatformKind::EasyOrder => Some(easyorder::SIGNATURE),
		}
	}

	fn webhook_secret(&self) -> Option<&str> {
		self.webhook_secret.as_deref()
	}

	async fn setup_webhooks(
		&self,
		delivery_base_url: &str,
	) -> Result<Vec<WebhookSetupResult>, CommerceError> {
		self.ensure_session().await?;
		self.vendor_call().await;
		Ok(self
			.webhook_topics()
			.iter()
			.map(|(topic, _)| {
				let url = delivery_url(delivery_base_url, self.platform, topic);
				if self.failing_topics.iter().any(|t| t == topic) {
					WebhookSetupResult::failed(*topic, url, "HTTP 422: topic already taken")
				} else {
					WebhookSetupResult::registered(*topic, url, format!("sim-{}", topic.replace('/', "-")))
				}
			})
			.collect())
	}

	fn decode_order(&self, payload: &Value) -> Result<Order, CommerceError> {
		let payload = payload.get("order").unwrap_or(payload);
		let id = crate::convert::payload_id(payload)?;
		let status = payload
			.get("status")
			.and_then(Value::as_str)
			.unwrap_or("pending")
			.to_string();
		Ok(Order {
			id,
			platform: self.platform,
			number: None,
			customer: Customer {
				name: payload
					.get("customer_name")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string(),
				email: payload.get("email").and_then(Value::as_str).map(str::to_string),
				phone: None,
			},
			shipping_address: None,
			line_items: Vec::new(),
			total: payload
				.get("total")
				.and_then(crate::convert::decimal_of)
				.unwrap_or_default(),
			currency: payload
				.get("currency")
				.and_then(Value::as_str)
				.unwrap_or("USD")
				.to_string(),
			stage: stage_of(&status),
			status,
			tracking_numbers: Vec::new(),
			created_at: Some(Utc::now()),
		})
	}

	async fn disconnect(&self) -> Result<(), CommerceError> {
		self.session.write().await.take();
		Ok(())
	}
}

/// Three recent orders in the platform's home currency.
pub fn sample_orders(platform: PlatformKind) -> Vec<Order> {
	let currency = match platform {
		PlatformKind::EasyOrder => "SAR",
		_ => "USD",
	};
	let now = Utc::now();
	let order = |n: u32, stage: OrderStage, status: &str, days_ago: i64, items: Vec<(&str, u32, i64)>| {
		let line_items: Vec<LineItem> = items
			.into_iter()
			.map(|(name, quantity, cents)| LineItem {
				sku: Some(name.to_ascii_uppercase().replace(' ', "-")),
				name: name.to_string(),
				quantity,
				unit_price: Decimal::new(cents, 2),
			})
			.collect();
		let total = line_items
			.iter()
			.map(|i| i.unit_price * Decimal::from(i.quantity))
			.sum();
		Order {
			id: format!("{}-{}", platform, 1000 + n),
			platform,
			number: Some(format!("#{}", 1000 + n)),
			customer: Customer {
				name: format!("Customer {}", n),
				email: Some(format!("customer{}@example.com", n)),
				phone: None,
			},
			shipping_address: Some(ShippingAddress {
				name: Some(format!("Customer {}", n)),
				line1: format!("{} Market St", n),
				city: "Riyadh".to_string(),
				country: "SA".to_string(),
				..Default::default()
			}),
			line_items,
			total,
			currency: currency.to_string(),
			status: status.to_string(),
			stage,
			tracking_numbers: Vec::new(),
			created_at: Some(now - ChronoDuration::days(days_ago)),
		}
	};

	vec![
		order(1, OrderStage::Paid, "paid", 1, vec![("coffee mug", 2, 1250), ("tote bag", 1, 1800)]),
		order(2, OrderStage::Pending, "pending", 3, vec![("coffee mug", 1, 1250)]),
		order(3, OrderStage::Delivered, "delivered", 12, vec![("notebook", 3, 600)]),
	]
}

pub fn create_platform(
	platform: PlatformKind,
	config: &toml::Value,
) -> Result<Arc<dyn CommerceInterface>, CommerceError> {
	SimulatedSchema.validate(config)?;
	let mut adapter = SimulatedPlatform::new(platform);
	if let Some(secret) = config.get("accepted_secret").and_then(|v| v.as_str()) {
		adapter = adapter.with_accepted_secret(secret);
	}
	if let Some(secret) = config.get("webhook_secret").and_then(|v| v.as_str()) {
		adapter = adapter.with_webhook_secret(secret);
	}
	if let Some(ms) = config.get("latency_ms").and_then(|v| v.as_integer()) {
		adapter = adapter.with_latency(Duration::from_millis(ms as u64));
	}
	if config
		.get("seed_orders")
		.and_then(|v| v.as_bool())
		.unwrap_or(true)
	{
		adapter = adapter.with_sample_orders();
	}
	Ok(Arc::new(adapter))
}

#[cfg(test)]
mod tests {
	use super::*;
	use idev_types::WebhookTopic;
	use serde_json::json;

	fn credentials(secret: &str) -> PlatformCredentials {
		PlatformCredentials::AccessToken {
			shop_domain: "demo.myshopify.com".into(),
			access_token: secret.into(),
		}
	}

	#[tokio::test]
	async fn test_accepted_secret_gate() {
		let sim = SimulatedPlatform::new(PlatformKind::Shopify).with_accepted_secret("open-sesame");
		assert!(sim.authenticate(&credentials("guess")).await.is_err());
		assert!(sim.session_secret().await.is_none());
		sim.authenticate(&credentials("open-sesame")).await.unwrap();
		assert_eq!(sim.session_secret().await.as_deref(), Some("open-sesame"));
	}

	#[tokio::test]
	async fn test_label_marks_order_shipped() {
		let sim = SimulatedPlatform::new(PlatformKind::Shopify).with_sample_orders();
		sim.authenticate(&credentials("tok")).await.unwrap();

		let label = sim
			.create_shipping_label("shopify-1001", &ShippingRequest::with_tracking_number("T-1"))
			.await
			.unwrap();
		assert_eq!(label.fulfillment_id, "sim-ful-1");
		let order = sim.get_order("shopify-1001").await.unwrap();
		assert_eq!(order.stage, OrderStage::Shipped);
		assert_eq!(order.tracking_numbers, vec!["T-1".to_string()]);

		assert!(matches!(
			sim.get_order("missing").await,
			Err(CommerceError::Http { status: 404, .. })
		));
	}

	#[tokio::test]
	async fn test_uses_vendor_topic_table() {
		let sim = SimulatedPlatform::new(PlatformKind::WooCommerce).with_failing_topic("order.paid");
		sim.authenticate(&PlatformCredentials::ConsumerKey {
			site_url: "https://shop.example.com".into(),
			consumer_key: "ck".into(),
			consumer_secret: "cs".into(),
		})
		.await
		.unwrap();

		let results = sim.setup_webhooks("http://localhost:3000/api/webhooks").await.unwrap();
		assert_eq!(results.len(), 3);
		assert_eq!(results.iter().filter(|r| r.success).count(), 2);

		let event = sim.process_webhook(&json!({ "id": 7 }), "order.paid").await.unwrap();
		assert_eq!(event.topic, WebhookTopic::OrderPaid);
	}

	#[test]
	fn test_factory_reads_settings() {
		let config: toml::Value = toml::Value::Table(
			toml::from_str::<toml::Table>("latency_ms = 5\nseed_orders = false").unwrap(),
		);
		assert!(create_platform(PlatformKind::Wix, &config).is_ok());

		let bad = toml::Value::Table(toml::from_str::<toml::Table>("latency_ms = -1").unwrap());
		assert!(create_platform(PlatformKind::Wix, &bad).is_err());
	}
}
