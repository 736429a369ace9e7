//! Shopify Admin REST API adapter.
//!
//! Authenticates with a shop domain plus an Admin API access token sent in
//! the `X-Shopify-Access-Token` header.

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

pub const DEFAULT_API_VERSION: &str = "2024-01";

pub const TOPICS: TopicTable = &[
	("orders/create", WebhookTopic::OrderCreated),
	("orders/updated", WebhookTopic::OrderUpdated),
	("orders/paid", WebhookTopic::OrderPaid),
	("orders/cancelled", WebhookTopic::OrderCancelled),
];

pub const SIGNATURE: SignatureScheme = SignatureScheme::base64("X-Shopify-Hmac-Sha256");

#[derive(Clone)]
struct Session {
	base_url: String,
	shop_domain: String,
	auth: Auth,
}

pub struct ShopifyPlatform {
	http: VendorClient,
	api_version: String,
	webhook_secret: Option<String>,
	session: RwLock<Option<Session>>,
}

impl ShopifyPlatform {
	pub fn new(http: VendorClient, api_version: impl Into<String>, webhook_secret: Option<String>) -> Self {
		Self {
			http,
			api_version: api_version.into(),
			webhook_secret,
			session: RwLock::new(None),
		}
	}

	/// Admin API root. A domain given with a scheme is used verbatim.
	fn base_url(&self, shop_domain: &str) -> String {
		let domain = shop_domain.trim_end_matches('/');
		if domain.starts_with("http://") || domain.starts_with("https://") {
			format!("{}/admin/api/{}", domain, self.api_version)
		} else {
			format!("https://{}/admin/api/{}", domain, self.api_version)
		}
	}

	async fn session(&self) -> Result<Session, CommerceError> {
		self.session
			.read()
			.await
			.clone()
			.ok_or(CommerceError::NotConnected(PlatformKind::Shopify))
	}

	async fn fetch_shop(&self, session: &Session) -> Result<ShopEnvelope, CommerceError> {
		self.http
			.get(&format!("{}/shop.json", session.base_url), &session.auth, &[])
			.await
	}

	async fn order_action(&self, order_id: &str, action: &str) -> Result<Order, CommerceError> {
		let session = self.session().await?;
		let envelope: OrderEnvelope = self
			.http
			.post(
				&format!("{}/orders/{}/{}.json", session.base_url, order_id, action),
				&session.auth,
				&json!({}),
			)
			.await?;
		Ok(envelope.order.into_order())
	}

	async fn latest_fulfillment_id(&self, order_id: &str) -> Result<Option<String>, CommerceError> {
		let order = self.raw_order(order_id).await?;
		Ok(order.fulfillments.last().map(|f| f.id.clone()))
	}

	async fn raw_order(&self, order_id: &str) -> Result<ShopifyOrder, CommerceError> {
		let session = self.session().await?;
		let envelope: OrderEnvelope = self
			.http
			.get(
				&format!("{}/orders/{}.json", session.base_url, order_id),
				&session.auth,
				&[],
			)
			.await?;
		Ok(envelope.order)
	}
}

pub struct ShopifySchema;

impl ConfigSchema for ShopifySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("api_version", FieldType::String),
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
impl CommerceInterface for ShopifyPlatform {
	fn platform(&self) -> PlatformKind {
		PlatformKind::Shopify
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ShopifySchema)
	}

	async fn authenticate(
		&self,
		credentials: &PlatformCredentials,
	) -> Result<PlatformIdentity, CommerceError> {
		expect_credentials(PlatformKind::Shopify, credentials)?;
		let PlatformCredentials::AccessToken {
			shop_domain,
			access_token,
		} = credentials
		else {
			return Err(CommerceError::Authentication("expected access_token".into()));
		};

		let candidate = Session {
			base_url: self.base_url(shop_domain),
			shop_domain: shop_domain.clone(),
			auth: Auth::Header("X-Shopify-Access-Token", access_token.clone()),
		};
		let shop = self.fetch_shop(&candidate).await?.shop;

		*self.session.write().await = Some(candidate);
		Ok(PlatformIdentity {
			platform: PlatformKind::Shopify,
			account: shop.domain.unwrap_or_else(|| shop_domain.clone()),
			display_name: shop.name,
		})
	}

	async fn validate_session(&self) -> Result<bool, CommerceError> {
		let session = self.session().await?;
		match self.fetch_shop(&session).await {
			Ok(_) => Ok(true),
			Err(CommerceError::Authentication(_)) | Err(CommerceError::Http { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, CommerceError> {
		let session = self.session().await?;
		let params = [
			("limit", query.limit.min(250).to_string()),
			("status", query.status.clone().unwrap_or_else(|| "any".to_string())),
		];
		let envelope: OrdersEnvelope = self
			.http
			.get(&format!("{}/orders.json", session.base_url), &session.auth, &params)
			.await?;
		Ok(envelope.orders.into_iter().map(ShopifyOrder::into_order).collect())
	}

	async fn get_order(&self, order_id: &str) -> Result<Order, CommerceError> {
		Ok(self.raw_order(order_id).await?.into_order())
	}

	/// Shopify has no free-form status field: `cancelled`, `closed` and `open`
	/// map onto the corresponding order actions.
	async fn update_order_status(
		&self,
		order_id: &str,
		status: &str,
		note: Option<&str>,
	) -> Result<Order, CommerceError> {
		let action = match status {
			"cancel" | "cancelled" => "cancel",
			"close" | "closed" => "close",
			"open" | "reopen" => "open",
			other => {
				return Err(CommerceError::InvalidRequest(format!(
					"Shopify cannot set order status '{}'",
					other
				)))
			}
		};
		let mut order = self.order_action(order_id, action).await?;

		if let Some(note) = note {
			let session = self.session().await?;
			let envelope: OrderEnvelope = self
				.http
				.put(
					&format!("{}/orders/{}.json", session.base_url, order_id),
					&session.auth,
					&json!({ "order": { "id": order_id, "note": note } }),
				)
				.await?;
			order = envelope.order.into_order();
		}
		Ok(order)
	}

	async fn create_shipping_label(
		&self,
		order_id: &str,
		request: &ShippingRequest,
	) -> Result<ShippingLabel, CommerceError> {
		let session = self.session().await?;
		let tracking_number = request.resolve_tracking_number();
		let body = json!({
			"fulfillment": {
				"tracking_number": tracking_number,
				"tracking_company": request.carrier(),
				"tracking_url": request.tracking_url,
				"notify_customer": request.notify_customer,
			}
		});
		let envelope: FulfillmentEnvelope = self
			.http
			.post(
				&format!("{}/orders/{}/fulfillments.json", session.base_url, order_id),
				&session.auth,
				&body,
			)
			.await?;

		Ok(ShippingLabel {
			order_id: order_id.to_string(),
			tracking_number,
			fulfillment_id: envelope.fulfillment.id,
			carrier: request.carrier().to_string(),
		})
	}

	async fn update_shipment_status(
		&self,
		order_id: &str,
		status: ShipmentStatus,
		tracking_number: Option<&str>,
	) -> Result<(), CommerceError> {
		let shipment_status = match status {
			ShipmentStatus::Cancelled => {
				self.order_action(order_id, "cancel").await?;
				return Ok(());
			}
			ShipmentStatus::Pending | ShipmentStatus::Processing => {
				self.order_action(order_id, "open").await?;
				return Ok(());
			}
			ShipmentStatus::Shipped => "in_transit",
			ShipmentStatus::Delivered => "delivered",
		};

		match self.latest_fulfillment_id(order_id).await? {
			Some(fulfillment_id) => {
				let session = self.session().await?;
				let mut fulfillment = json!({ "shipment_status": shipment_status });
				if let Some(number) = tracking_number {
					fulfillment["tracking_number"] = json!(number);
				}
				let _: FulfillmentEnvelope = self
					.http
					.put(
						&format!(
							"{}/orders/{}/fulfillments/{}.json",
							session.base_url, order_id, fulfillment_id
						),
						&session.auth,
						&json!({ "fulfillment": fulfillment }),
					)
					.await?;
			}
			None => {
				let request = ShippingRequest {
					tracking_number: tracking_number.map(str::to_string),
					notify_customer: true,
					..Default::default()
				};
				self.create_shipping_label(order_id, &request).await?;
			}
		}
		Ok(())
	}

	async fn get_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError> {
		let session = self.session().await?;
		let envelope: ProductsEnvelope = self
			.http
			.get(
				&format!("{}/products.json", session.base_url),
				&session.auth,
				&[("limit", limit.min(250).to_string())],
			)
			.await?;
		Ok(envelope
			.products
			.into_iter()
			.map(|p| {
				let variant = p.variants.into_iter().next();
				Product {
					id: p.id,
					name: p.title,
					sku: variant.as_ref().and_then(|v| convert::non_empty(v.sku.clone())),
					price: variant.map(|v| v.price),
				}
			})
			.collect())
	}

	async fn get_customers(&self, limit: u32) -> Result<Vec<CustomerAccount>, CommerceError> {
		let session = self.session().await?;
		let envelope: CustomersEnvelope = self
			.http
			.get(
				&format!("{}/customers.json", session.base_url),
				&session.auth,
				&[("limit", limit.min(250).to_string())],
			)
			.await?;
		Ok(envelope
			.customers
			.into_iter()
			.map(|c| CustomerAccount {
				id: c.id.clone().unwrap_or_default(),
				name: c.display_name(),
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
		let session = self.session().await?;
		let mut results = Vec::with_capacity(TOPICS.len());
		for (topic, _) in TOPICS {
			let address = delivery_url(delivery_base_url, PlatformKind::Shopify, topic);
			let body = json!({
				"webhook": { "topic": topic, "address": address, "format": "json" }
			});
			let result: Result<WebhookEnvelope, _> = self
				.http
				.post(&format!("{}/webhooks.json", session.base_url), &session.auth, &body)
				.await;
			results.push(match result {
				Ok(envelope) => WebhookSetupResult::registered(*topic, address, envelope.webhook.id),
				Err(e) => WebhookSetupResult::failed(*topic, address, e),
			});
		}
		tracing::debug!(shop = %session.shop_domain, "Shopify webhook registration finished");
		Ok(results)
	}

	fn decode_order(&self, payload: &Value) -> Result<Order, CommerceError> {
		convert::decode::<ShopifyOrder>(payload).map(ShopifyOrder::into_order)
	}

	async fn disconnect(&self) -> Result<(), CommerceError> {
		self.session.write().await.take();
		Ok(())
	}
}

#[derive(Deserialize)]
struct ShopEnvelope {
	shop: Shop,
}

#[derive(Deserialize)]
struct Shop {
	name: Option<String>,
	domain: Option<String>,
}

#[derive(Deserialize)]
struct OrdersEnvelope {
	orders: Vec<ShopifyOrder>,
}

#[derive(Deserialize)]
struct OrderEnvelope {
	order: ShopifyOrder,
}

#[derive(Deserialize)]
struct FulfillmentEnvelope {
	fulfillment: ShopifyFulfillment,
}

#[derive(Deserialize)]
struct WebhookEnvelope {
	webhook: IdOnly,
}

#[derive(Deserialize)]
struct IdOnly {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
}

#[derive(Deserialize)]
struct ProductsEnvelope {
	products: Vec<ShopifyProduct>,
}

#[derive(Deserialize)]
struct ShopifyProduct {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	title: String,
	#[serde(default)]
	variants: Vec<ShopifyVariant>,
}

#[derive(Deserialize)]
struct ShopifyVariant {
	sku: Option<String>,
	#[serde(default, deserialize_with = "lenient_decimal")]
	price: Decimal,
}

#[derive(Deserialize)]
struct CustomersEnvelope {
	customers: Vec<ShopifyCustomer>,
}

#[derive(Deserialize)]
struct ShopifyCustomer {
	#[serde(default, deserialize_with = "convert::lenient_opt_id")]
	id: Option<String>,
	first_name: Option<String>,
	last_name: Option<String>,
	email: Option<String>,
	phone: Option<String>,
}

impl ShopifyCustomer {
	fn display_name(&self) -> String {
		convert::full_name(self.first_name.as_deref(), self.last_name.as_deref())
	}
}

#[derive(Deserialize)]
struct ShopifyAddress {
	name: Option<String>,
	address1: Option<String>,
	address2: Option<String>,
	city: Option<String>,
	province: Option<String>,
	zip: Option<String>,
	country: Option<String>,
	phone: Option<String>,
}

#[derive(Deserialize)]
struct ShopifyLineItem {
	sku: Option<String>,
	title: String,
	quantity: u32,
	#[serde(default, deserialize_with = "lenient_decimal")]
	price: Decimal,
}

#[derive(Deserialize)]
struct ShopifyFulfillment {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	tracking_number: Option<String>,
	#[serde(default)]
	tracking_numbers: Vec<String>,
}

#[derive(Deserialize)]
struct ShopifyOrder {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	name: Option<String>,
	email: Option<String>,
	customer: Option<ShopifyCustomer>,
	shipping_address: Option<ShopifyAddress>,
	#[serde(default)]
	line_items: Vec<ShopifyLineItem>,
	#[serde(default, deserialize_with = "lenient_decimal")]
	total_price: Decimal,
	#[serde(default)]
	currency: String,
	financial_status: Option<String>,
	fulfillment_status: Option<String>,
	cancelled_at: Option<String>,
	#[serde(default)]
	fulfillments: Vec<ShopifyFulfillment>,
	#[serde(default, deserialize_with = "lenient_datetime")]
	created_at: Option<DateTime<Utc>>,
}

impl ShopifyOrder {
	/// Shopify splits state over financial and fulfillment status; the more
	/// advanced of the two wins.
	fn status(&self) -> String {
		if self.cancelled_at.is_some() {
			return "cancelled".to_string();
		}
		self.fulfillment_status
			.clone()
			.or_else(|| self.financial_status.clone())
			.unwrap_or_else(|| "pending".to_string())
	}

	fn into_order(self) -> Order {
		let status = self.status();
		let stage = stage_of(&status);
		let mut tracking_numbers: Vec<String> = Vec::new();
		for f in &self.fulfillments {
			for number in f.tracking_number.iter().chain(f.tracking_numbers.iter()) {
				if !tracking_numbers.contains(number) {
					tracking_numbers.push(number.clone());
				}
			}
		}
		let customer = match &self.customer {
			Some(c) => Customer {
				name: c.display_name(),
				email: c.email.clone().or(self.email.clone()),
				phone: c.phone.clone(),
			},
			None => Customer {
				email: self.email.clone(),
				..Default::default()
			},
		};

		Order {
			id: self.id,
			platform: PlatformKind::Shopify,
			number: self.name,
			customer,
			shipping_address: self.shipping_address.map(|a| ShippingAddress {
				name: a.name,
				line1: a.address1.unwrap_or_default(),
				line2: convert::non_empty(a.address2),
				city: a.city.unwrap_or_default(),
				region: a.province,
				postal_code: a.zip,
				country: a.country.unwrap_or_default(),
				phone: a.phone,
			}),
			line_items: self
				.line_items
				.into_iter()
				.map(|item| LineItem {
					sku: convert::non_empty(item.sku),
					name: item.title,
					quantity: item.quantity,
					unit_price: item.price,
				})
				.collect(),
			total: self.total_price,
			currency: self.currency,
			status,
			stage,
			tracking_numbers,
			created_at: self.created_at,
		}
	}
}

fn stage_of(status: &str) -> OrderStage {
	match status {
		"cancelled" | "voided" | "refunded" => OrderStage::Cancelled,
		"fulfilled" | "shipped" => OrderStage::Shipped,
		"delivered" => OrderStage::Delivered,
		"partial" | "partially_fulfilled" | "in_progress" => OrderStage::Processing,
		"paid" | "partially_paid" => OrderStage::Paid,
		"pending" | "authorized" | "unfulfilled" => OrderStage::Pending,
		_ => OrderStage::Unknown,
	}
}

pub fn create_platform(config: &toml::Value) -> Result<Arc<dyn CommerceInterface>, CommerceError> {
	ShopifySchema.validate(config)?;
	let api_version = config
		.get("api_version")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_API_VERSION);
	let webhook_secret = config
		.get("webhook_secret")
		.and_then(|v| v.as_str())
		.map(str::to_string);
	let timeout = config
		.get("request_timeout_secs")
		.and_then(|v| v.as_integer())
		.unwrap_or(30) as u64;

	Ok(Arc::new(ShopifyPlatform::new(
		VendorClient::new(Duration::from_secs(timeout))?,
		api_version,
		webhook_secret,
	)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_partial_json, header, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const API: &str = "/admin/api/2024-01";

	fn platform() -> ShopifyPlatform {
		ShopifyPlatform::new(
			VendorClient::new(Duration::from_secs(5)).unwrap(),
			DEFAULT_API_VERSION,
			Some("hush".to_string()),
		)
	}

	fn credentials(server: &MockServer, token: &str) -> PlatformCredentials {
		PlatformCredentials::AccessToken {
			shop_domain: server.uri(),
			access_token: token.to_string(),
		}
	}

	fn order_json(id: u64, fulfillment_status: Option<&str>) -> Value {
		json!({
			"id": id,
			"name": format!("#{}", id),
			"email": "buyer@example.com",
			"customer": { "id": 9, "first_name": "Lina", "last_name": "Haddad", "email": "lina@example.com" },
			"shipping_address": {
				"name": "Lina Haddad", "address1": "1 King St", "city": "Riyadh",
				"zip": "12211", "country": "SA"
			},
			"line_items": [{ "sku": "MUG-1", "title": "Mug", "quantity": 2, "price": "12.50" }],
			"total_price": "25.00",
			"currency": "SAR",
			"financial_status": "paid",
			"fulfillment_status": fulfillment_status,
			"fulfillments": [],
			"created_at": "2024-03-01T10:00:00-05:00"
		})
	}

	async fn mount_shop(server: &MockServer) {
		Mock::given(method("GET"))
			.and(path(format!("{}/shop.json", API)))
			.and(header("X-Shopify-Access-Token", "good"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"shop": { "name": "Demo Shop", "domain": "demo.myshopify.com" }
			})))
			.mount(server)
			.await;
		Mock::given(method("GET"))
			.and(path(format!("{}/shop.json", API)))
			.and(header("X-Shopify-Access-Token", "bad"))
			.respond_with(ResponseTemplate::new(401))
			.mount(server)
			.await;
	}

	#[tokio::test]
	async fn test_authenticate_verifies_token() {
		let server = MockServer::start().await;
		mount_shop(&server).await;
		let shopify = platform();

		let err = shopify.authenticate(&credentials(&server, "bad")).await;
		assert!(matches!(err, Err(CommerceError::Authentication(_))));
		assert!(matches!(
			shopify.get_orders(&OrderQuery::default()).await,
			Err(CommerceError::NotConnected(_))
		));

		let identity = shopify.authenticate(&credentials(&server, "good")).await.unwrap();
		assert_eq!(identity.account, "demo.myshopify.com");
		assert_eq!(identity.display_name.as_deref(), Some("Demo Shop"));
		assert!(shopify.validate_session().await.unwrap());

		// A failed re-authentication keeps the previous session.
		assert!(shopify.authenticate(&credentials(&server, "bad")).await.is_err());
		assert!(shopify.validate_session().await.unwrap());
	}

	#[tokio::test]
	async fn test_orders_are_normalized() {
		let server = MockServer::start().await;
		mount_shop(&server).await;
		Mock::given(method("GET"))
			.and(path(format!("{}/orders.json", API)))
			.and(query_param("limit", "10"))
			.and(query_param("status", "any"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"orders": [order_json(1001, None), order_json(1002, Some("fulfilled"))]
			})))
			.mount(&server)
			.await;

		let shopify = platform();
		shopify.authenticate(&credentials(&server, "good")).await.unwrap();
		let orders = shopify.get_orders(&OrderQuery::new(10)).await.unwrap();
		assert_eq!(orders.len(), 2);

		let first = &orders[0];
		assert_eq!(first.id, "1001");
		assert_eq!(first.customer.name, "Lina Haddad");
		assert_eq!(first.total, Decimal::new(2500, 2));
		assert_eq!(first.line_items[0].unit_price, Decimal::new(1250, 2));
		assert_eq!(first.stage, OrderStage::Paid);
		assert_eq!(first.shipping_address.as_ref().unwrap().city, "Riyadh");
		assert_eq!(orders[1].stage, OrderStage::Shipped);
	}

	#[tokio::test]
	async fn test_shipping_label_creates_fulfillment() {
		let server = MockServer::start().await;
		mount_shop(&server).await;
		Mock::given(method("POST"))
			.and(path(format!("{}/orders/1001/fulfillments.json", API)))
			.and(body_partial_json(json!({
				"fulfillment": { "tracking_number": "TRK1", "tracking_company": "IDev Shipping" }
			})))
			.respond_with(ResponseTemplate::new(201).set_body_json(json!({
				"fulfillment": { "id": 555, "tracking_number": "TRK1" }
			})))
			.mount(&server)
			.await;

		let shopify = platform();
		shopify.authenticate(&credentials(&server, "good")).await.unwrap();
		let label = shopify
			.create_shipping_label("1001", &ShippingRequest::with_tracking_number("TRK1"))
			.await
			.unwrap();
		assert_eq!(label.fulfillment_id, "555");
		assert_eq!(label.tracking_number, "TRK1");
	}

	#[tokio::test]
	async fn test_webhook_setup_reports_per_topic() {
		let server = MockServer::start().await;
		mount_shop(&server).await;
		Mock::given(method("POST"))
			.and(path(format!("{}/webhooks.json", API)))
			.and(body_partial_json(json!({ "webhook": { "topic": "orders/paid" } })))
			.respond_with(ResponseTemplate::new(422).set_body_string("taken"))
			.with_priority(1)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(path(format!("{}/webhooks.json", API)))
			.respond_with(ResponseTemplate::new(201).set_body_json(json!({ "webhook": { "id": 77 } })))
			.mount(&server)
			.await;

		let shopify = platform();
		shopify.authenticate(&credentials(&server, "good")).await.unwrap();
		let results = shopify.setup_webhooks("https://hooks.example.com/api/webhooks").await.unwrap();
		assert_eq!(results.len(), 4);
		let paid = results.iter().find(|r| r.topic == "orders/paid").unwrap();
		assert!(!paid.success);
		let created = results.iter().find(|r| r.topic == "orders/create").unwrap();
		assert!(created.success);
		assert_eq!(created.vendor_webhook_id.as_deref(), Some("77"));
		assert_eq!(
			created.delivery_url,
			"https://hooks.example.com/api/webhooks/shopify/orders/create"
		);
	}

	#[tokio::test]
	async fn test_process_webhook_dispatch() {
		let shopify = platform();
		let event = shopify
			.process_webhook(&order_json(42, None), "orders/create")
			.await
			.unwrap();
		assert_eq!(event.topic, WebhookTopic::OrderCreated);
		assert_eq!(event.order.unwrap().id, "42");

		let event = shopify
			.process_webhook(&json!({ "id": 42 }), "orders/cancelled")
			.await
			.unwrap();
		assert_eq!(event.action, "cancelled");
		assert!(event.order.is_none());

		assert!(matches!(
			shopify.process_webhook(&json!({ "id": 42 }), "orders/deleted").await,
			Err(CommerceError::UnknownWebhookTopic(_))
		));
	}
}
