//! WooCommerce REST API (v3) adapter.
//!
//! Uses HTTP Basic authentication with the store's consumer key and secret.
//! WooCommerce webhooks are configured in the store admin, so registration
//! only records local subscriptions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use idev_types::{
	ConfigSchema, Customer, CustomerAccount, Field, FieldType, LineItem, Order, OrderQuery,
	OrderStage, PlatformCredentials, PlatformIdentity, PlatformKind, Product, Schema,
	ShipmentStatus, ShippingAddress, ShippingLabel, ShippingRequest, TopicTable,
	ValidationError, WebhookSetupResult, WebhookTopic,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::convert::{self, lenient_datetime, lenient_decimal, lenient_id};
use crate::http::{Auth, VendorClient};
use crate::{
	delivery_url, expect_credentials, CommerceError, CommerceInterface, SignatureScheme,
};

pub const TOPICS: TopicTable = &[
	("order.created", WebhookTopic::OrderCreated),
	("order.updated", WebhookTopic::OrderUpdated),
	("order.paid", WebhookTopic::OrderPaid),
];

pub const SIGNATURE: SignatureScheme = SignatureScheme::base64("X-WC-Webhook-Signature");

const DEFAULT_SHIPPED_STATUS: &str = "completed";

#[derive(Clone)]
struct Session {
	base_url: String,
	auth: Auth,
}

pub struct WooCommercePlatform {
	http: VendorClient,
	shipped_status: String,
	webhook_secret: Option<String>,
	session: RwLock<Option<Session>>,
}

impl WooCommercePlatform {
	pub fn new(
		http: VendorClient,
		shipped_status: impl Into<String>,
		webhook_secret: Option<String>,
	) -> Self {
		Self {
			http,
			shipped_status: shipped_status.into(),
			webhook_secret,
			session: RwLock::new(None),
		}
	}

	async fn session(&self) -> Result<Session, CommerceError> {
		self.session
			.read()
			.await
			.clone()
			.ok_or(CommerceError::NotConnected(PlatformKind::WooCommerce))
	}

	async fn set_status(&self, session: &Session, order_id: &str, status: &str) -> Result<Order, CommerceError> {
		let order: WooOrder = self
			.http
			.put(
				&format!("{}/orders/{}", session.base_url, order_id),
				&session.auth,
				&json!({ "status": status }),
			)
			.await?;
		Ok(order.into_order())
	}

	async fn add_note(&self, session: &Session, order_id: &str, note: &str) -> Result<String, CommerceError> {
		let created: NoteResponse = self
			.http
			.post(
				&format!("{}/orders/{}/notes", session.base_url, order_id),
				&session.auth,
				&json!({ "note": note, "customer_note": false }),
			)
			.await?;
		Ok(created.id)
	}
}

pub struct WooCommerceSchema;

impl ConfigSchema for WooCommerceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("shipped_status", FieldType::String)
					.with_validator(idev_types::validation::non_empty),
				Field::new("webhook_secret", FieldType::String),
				Field::new(
					"request_timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: Some(300),
					},
				),
			],
		)
		.validate(config)
	}
}

#[async_trait]
impl CommerceInterface for WooCommercePlatform {
	fn platform(&self) -> PlatformKind {
		PlatformKind::WooCommerce
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WooCommerceSchema)
	}

	async fn authenticate(
		&self,
		credentials: &PlatformCredentials,
	) -> Result<PlatformIdentity, CommerceError> {
		expect_credentials(PlatformKind::WooCommerce, credentials)?;
		let PlatformCredentials::ConsumerKey {
			site_url,
			consumer_key,
			consumer_secret,
		} = credentials
		else {
			return Err(CommerceError::Authentication("expected consumer_key".into()));
		};

		let candidate = Session {
			base_url: format!("{}/wp-json/wc/v3", site_url.trim_end_matches('/')),
			auth: Auth::Basic {
				username: consumer_key.clone(),
				password: consumer_secret.clone(),
			},
		};
		let status: SystemStatus = self
			.http
			.get(&format!("{}/system_status", candidate.base_url), &candidate.auth, &[])
			.await?;

		*self.session.write().await = Some(candidate);
		Ok(PlatformIdentity {
			platform: PlatformKind::WooCommerce,
			account: site_url.clone(),
			display_name: status.environment.and_then(|e| e.site_title),
		})
	}

	async fn validate_session(&self) -> Result<bool, CommerceError> {
		let session = self.session().await?;
		let probe: Result<Value, _> = self
			.http
			.get(&format!("{}/system_status", session.base_url), &session.auth, &[])
			.await;
		match probe {
			Ok(_) => Ok(true),
			Err(CommerceError::Authentication(_)) | Err(CommerceError::Http { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, CommerceError> {
		let session = self.session().await?;
		let params = [
			("per_page", query.limit.min(100).to_string()),
			("status", query.status.clone().unwrap_or_else(|| "any".to_string())),
		];
		let orders: Vec<WooOrder> = self
			.http
			.get(&format!("{}/orders", session.base_url), &session.auth, &params)
			.await?;
		Ok(orders.into_iter().map(WooOrder::into_order).collect())
	}

	async fn get_order(&self, order_id: &str) -> Result<Order, CommerceError> {
		let session = self.session().await?;
		let order: WooOrder = self
			.http
			.get(&format!("{}/orders/{}", session.base_url, order_id), &session.auth, &[])
			.await?;
		Ok(order.into_order())
	}

	async fn update_order_status(
		&self,
		order_id: &str,
		status: &str,
		note: Option<&str>,
	) -> Result<Order, CommerceError> {
		let session = self.session().await?;
		let order = self.set_status(&session, order_id, status).await?;
		if let Some(note) = note {
			self.add_note(&session, order_id, note).await?;
		}
		Ok(order)
	}

	/// WooCommerce has no fulfillment object: tracking goes into an order
	/// note and the order moves to the configured shipped status.
	async fn create_shipping_label(
		&self,
		order_id: &str,
		request: &ShippingRequest,
	) -> Result<ShippingLabel, CommerceError> {
		let session = self.session().await?;
		let tracking_number = request.resolve_tracking_number();
		let mut note = format!("Shipped via {}. Tracking number: {}", request.carrier(), tracking_number);
		if let Some(url) = &request.tracking_url {
			note.push_str(&format!(" ({})", url));
		}
		let note_id = self.add_note(&session, order_id, &note).await?;
		self.set_status(&session, order_id, &self.shipped_status).await?;

		Ok(ShippingLabel {
			order_id: order_id.to_string(),
			tracking_number,
			fulfillment_id: note_id,
			carrier: request.carrier().to_string(),
		})
	}

	async fn update_shipment_status(
		&self,
		order_id: &str,
		status: ShipmentStatus,
		tracking_number: Option<&str>,
	) -> Result<(), CommerceError> {
		let session = self.session().await?;
		let vendor_status = match status {
			ShipmentStatus::Pending => "pending",
			ShipmentStatus::Processing => "processing",
			ShipmentStatus::Shipped => "shipped",
			ShipmentStatus::Delivered => "completed",
			ShipmentStatus::Cancelled => "cancelled",
		};
		self.set_status(&session, order_id, vendor_status).await?;
		if let Some(number) = tracking_number {
			self.add_note(&session, order_id, &format!("Tracking number: {}", number))
				.await?;
		}
		Ok(())
	}

	async fn get_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError> {
		let session = self.session().await?;
		let products: Vec<WooProduct> = self
			.http
			.get(
				&format!("{}/products", session.base_url),
				&session.auth,
				&[("per_page", limit.min(100).to_string())],
			)
			.await?;
		Ok(products
			.into_iter()
			.map(|p| Product {
				id: p.id,
				name: p.name,
				sku: convert::non_empty(p.sku),
				price: p.price.as_ref().and_then(convert::decimal_of),
			})
			.collect())
	}

	async fn get_customers(&self, limit: u32) -> Result<Vec<CustomerAccount>, CommerceError> {
		let session = self.session().await?;
		let customers: Vec<WooCustomer> = self
			.http
			.get(
				&format!("{}/customers", session.base_url),
				&session.auth,
				&[("per_page", limit.min(100).to_string())],
			)
			.await?;
		Ok(customers
			.into_iter()
			.map(|c| CustomerAccount {
				name: convert::full_name(c.first_name.as_deref(), c.last_name.as_deref()),
				id: c.id,
				email: c.email,
			})
			.collect())
	}

	fn webhook_topics(&self) -> TopicTable {
		TOPICS
	}

	fn signature_scheme(&self) -> Option<SignatureScheme> {
		Some(SIGNATURE)
	}

	fn webhook_secret(&self) -> Option<&str> {
		self.webhook_secret.as_deref()
	}

	async fn setup_webhooks(
		&self,
		delivery_base_url: &str,
	) -> Result<Vec<WebhookSetupResult>, CommerceError> {
		self.session().await?;
		let stamp = Utc::now().timestamp_millis();
		Ok(TOPICS
			.iter()
			.enumerate()
			.map(|(i, (topic, _))| {
				WebhookSetupResult::registered(
					*topic,
					delivery_url(delivery_base_url, PlatformKind::WooCommerce, topic),
					format!("wc-local-{}-{}", stamp, i),
				)
			})
			.collect())
	}

	fn decode_order(&self, payload: &Value) -> Result<Order, CommerceError> {
		convert::decode::<WooOrder>(payload).map(WooOrder::into_order)
	}

	async fn disconnect(&self) -> Result<(), CommerceError> {
		self.session.write().await.take();
		Ok(())
	}
}

#[derive(Deserialize)]
struct SystemStatus {
	environment: Option<Environment>,
}

#[derive(Deserialize)]
struct Environment {
	site_title: Option<String>,
}

#[derive(Deserialize)]
struct NoteResponse {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
}

#[derive(Deserialize)]
struct WooProduct {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	name: String,
	sku: Option<String>,
	price: Option<Value>,
}

#[derive(Deserialize)]
struct WooCustomer {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	first_name: Option<String>,
	last_name: Option<String>,
	email: Option<String>,
}

#[derive(Deserialize, Default)]
struct WooBilling {
	first_name: Option<String>,
	last_name: Option<String>,
	email: Option<String>,
	phone: Option<String>,
}

#[derive(Deserialize)]
struct WooShipping {
	first_name: Option<String>,
	last_name: Option<String>,
	address_1: Option<String>,
	address_2: Option<String>,
	city: Option<String>,
	state: Option<String>,
	postcode: Option<String>,
	country: Option<String>,
	phone: Option<String>,
}

#[derive(Deserialize)]
struct WooLineItem {
	sku: Option<String>,
	name: String,
	quantity: u32,
	#[serde(default, deserialize_with = "lenient_decimal")]
	price: Decimal,
}

#[derive(Deserialize)]
struct WooMeta {
	key: String,
	value: Value,
}

#[derive(Deserialize)]
struct WooOrder {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	#[serde(default, deserialize_with = "convert::lenient_opt_id")]
	number: Option<String>,
	#[serde(default)]
	status: String,
	#[serde(default)]
	billing: WooBilling,
	shipping: Option<WooShipping>,
	#[serde(default)]
	line_items: Vec<WooLineItem>,
	#[serde(default, deserialize_with = "lenient_decimal")]
	total: Decimal,
	#[serde(default)]
	currency: String,
	#[serde(default)]
	meta_data: Vec<WooMeta>,
	#[serde(default, deserialize_with = "lenient_datetime")]
	date_created: Option<DateTime<Utc>>,
}

impl WooOrder {
	fn into_order(self) -> Order {
		let tracking_numbers = self
			.meta_data
			.iter()
			.filter(|m| m.key == "_tracking_number" || m.key == "tracking_number")
			.filter_map(|m| m.value.as_str().map(str::to_string))
			.collect();
		let shipping_address = self.shipping.and_then(|s| {
			let line1 = s.address_1.unwrap_or_default();
			if line1.trim().is_empty() {
				return None;
			}
			let name = convert::full_name(s.first_name.as_deref(), s.last_name.as_deref());
			Some(ShippingAddress {
				name: convert::non_empty(Some(name)),
				line1,
				line2: convert::non_empty(s.address_2),
				city: s.city.unwrap_or_default(),
				region: convert::non_empty(s.state),
				postal_code: convert::non_empty(s.postcode),
				country: s.country.unwrap_or_default(),
				phone: convert::non_empty(s.phone),
			})
		});

		Order {
			stage: stage_of(&self.status),
			id: self.id,
			platform: PlatformKind::WooCommerce,
			number: self.number,
			customer: Customer {
				name: convert::full_name(
					self.billing.first_name.as_deref(),
					self.billing.last_name.as_deref(),
				),
				email: convert::non_empty(self.billing.email),
				phone: convert::non_empty(self.billing.phone),
			},
			shipping_address,
			line_items: self
				.line_items
				.into_iter()
				.map(|item| LineItem {
					sku: convert::non_empty(item.sku),
					name: item.name,
					quantity: item.quantity,
					unit_price: item.price,
				})
				.collect(),
			total: self.total,
			currency: self.currency,
			status: self.status,
			tracking_numbers,
			created_at: self.date_created,
		}
	}
}

fn stage_of(status: &str) -> OrderStage {
	match status {
		"pending" | "on-hold" => OrderStage::Pending,
		"processing" => OrderStage::Processing,
		"shipped" => OrderStage::Shipped,
		"completed" => OrderStage::Delivered,
		"cancelled" | "refunded" | "failed" => OrderStage::Cancelled,
		_ => OrderStage::Unknown,
	}
}

pub fn create_platform(config: &toml::Value) -> Result<Arc<dyn CommerceInterface>, CommerceError> {
	WooCommerceSchema.validate(config)?;
	let shipped_status = config
		.get("shipped_status")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_SHIPPED_STATUS);
	let webhook_secret = config
		.get("webhook_secret")
		.and_then(|v| v.as_str())
		.map(str::to_string);
	let timeout = config
		.get("request_timeout_secs")
		.and_then(|v| v.as_integer())
		.unwrap_or(30) as u64;

	Ok(Arc::new(WooCommercePlatform::new(
		VendorClient::new(Duration::from_secs(timeout))?,
		shipped_status,
		webhook_secret,
	)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{basic_auth, body_partial_json, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn platform() -> WooCommercePlatform {
		WooCommercePlatform::new(
			VendorClient::new(Duration::from_secs(5)).unwrap(),
			DEFAULT_SHIPPED_STATUS,
			None,
		)
	}

	fn credentials(server: &MockServer) -> PlatformCredentials {
		PlatformCredentials::ConsumerKey {
			site_url: server.uri(),
			consumer_key: "ck_live".into(),
			consumer_secret: "cs_live".into(),
		}
	}

	async fn connected(server: &MockServer) -> WooCommercePlatform {
		Mock::given(method("GET"))
			.and(path("/wp-json/wc/v3/system_status"))
			.and(basic_auth("ck_live", "cs_live"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"environment": { "site_title": "Corner Store" }
			})))
			.mount(server)
			.await;
		let woo = platform();
		woo.authenticate(&credentials(server)).await.unwrap();
		woo
	}

	fn order_json() -> Value {
		json!({
			"id": 733,
			"number": "733",
			"status": "processing",
			"currency": "USD",
			"total": "40.00",
			"date_created": "2024-05-02T08:30:00",
			"billing": { "first_name": "Omar", "last_name": "Saleh", "email": "omar@example.com", "phone": "" },
			"shipping": { "first_name": "Omar", "last_name": "Saleh", "address_1": "5 Elm Rd", "city": "Austin", "state": "TX", "postcode": "73301", "country": "US" },
			"line_items": [{ "name": "Tee", "sku": "TEE-M", "quantity": 2, "price": 20 }],
			"meta_data": [{ "key": "_tracking_number", "value": "1Z999" }]
		})
	}

	#[tokio::test]
	async fn test_authenticate_with_consumer_key() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/wp-json/wc/v3/system_status"))
			.respond_with(ResponseTemplate::new(401))
			.mount(&server)
			.await;

		let woo = platform();
		assert!(matches!(
			woo.authenticate(&credentials(&server)).await,
			Err(CommerceError::Authentication(_))
		));
		assert!(matches!(woo.validate_session().await, Err(CommerceError::NotConnected(_))));
	}

	#[tokio::test]
	async fn test_orders_are_normalized() {
		let server = MockServer::start().await;
		let woo = connected(&server).await;
		Mock::given(method("GET"))
			.and(path("/wp-json/wc/v3/orders"))
			.and(query_param("per_page", "5"))
			.and(query_param("status", "any"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!([order_json()])))
			.mount(&server)
			.await;

		let orders = woo.get_orders(&OrderQuery::new(5)).await.unwrap();
		let order = &orders[0];
		assert_eq!(order.id, "733");
		assert_eq!(order.stage, OrderStage::Processing);
		assert_eq!(order.customer.name, "Omar Saleh");
		assert!(order.customer.phone.is_none());
		assert_eq!(order.total, Decimal::new(4000, 2));
		assert_eq!(order.line_items[0].unit_price, Decimal::from(20));
		assert_eq!(order.tracking_numbers, vec!["1Z999".to_string()]);
		assert!(order.created_at.is_some());
		assert_eq!(order.shipping_address.as_ref().unwrap().region.as_deref(), Some("TX"));
	}

	#[tokio::test]
	async fn test_shipping_label_adds_note_then_completes() {
		let server = MockServer::start().await;
		let woo = connected(&server).await;
		Mock::given(method("POST"))
			.and(path("/wp-json/wc/v3/orders/733/notes"))
			.respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 901 })))
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("PUT"))
			.and(path("/wp-json/wc/v3/orders/733"))
			.and(body_partial_json(json!({ "status": "completed" })))
			.respond_with(ResponseTemplate::new(200).set_body_json(order_json()))
			.expect(1)
			.mount(&server)
			.await;

		let label = woo
			.create_shipping_label("733", &ShippingRequest::default())
			.await
			.unwrap();
		assert_eq!(label.fulfillment_id, "901");
		assert!(label.tracking_number.starts_with("IDV"));
	}

	#[tokio::test]
	async fn test_webhooks_are_recorded_locally() {
		let server = MockServer::start().await;
		let woo = connected(&server).await;
		let results = woo.setup_webhooks("http://localhost:3000/api/webhooks").await.unwrap();
		assert_eq!(results.len(), 3);
		assert!(results.iter().all(|r| r.success));
		assert!(results[0]
			.vendor_webhook_id
			.as_deref()
			.unwrap()
			.starts_with("wc-local-"));
		assert_eq!(
			results[1].delivery_url,
			"http://localhost:3000/api/webhooks/woocommerce/order.updated"
		);
	}

	#[tokio::test]
	async fn test_process_order_created() {
		let woo = platform();
		let event = woo.process_webhook(&order_json(), "order.created").await.unwrap();
		assert_eq!(event.order_id, "733");
		assert_eq!(event.order.unwrap().platform, PlatformKind::WooCommerce);
		assert!(matches!(
			woo.process_webhook(&order_json(), "order.cancelled").await,
			Err(CommerceError::UnknownWebhookTopic(_))
		));
	}
}
