//! EasyOrder merchant API adapter.
//!
//! Credentials are exchanged for a short-lived bearer token through the
//! OAuth client-credentials grant. Status labels are Arabic on the vendor
//! side; both the Arabic and English forms are understood when decoding.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
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

pub const DEFAULT_BASE_URL: &str = "https://api.easyorder.sa";

pub const TOPICS: TopicTable = &[
	("order.created", WebhookTopic::OrderCreated),
	("order.updated", WebhookTopic::OrderUpdated),
	("order.paid", WebhookTopic::OrderPaid),
	("order.cancelled", WebhookTopic::OrderCancelled),
];

pub const SIGNATURE: SignatureScheme = SignatureScheme::hex("X-EasyOrder-Signature");

const DEFAULT_CURRENCY: &str = "SAR";

#[derive(Clone)]
struct Session {
	merchant_id: String,
	auth: Auth,
	expires_at: Option<DateTime<Utc>>,
}

impl Session {
	fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

pub struct EasyOrderPlatform {
	http: VendorClient,
	base_url: String,
	webhook_secret: Option<String>,
	session: RwLock<Option<Session>>,
}

impl EasyOrderPlatform {
	pub fn new(http: VendorClient, base_url: impl Into<String>, webhook_secret: Option<String>) -> Self {
		Self {
			http,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			webhook_secret,
			session: RwLock::new(None),
		}
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	async fn session(&self) -> Result<Session, CommerceError> {
		let session = self
			.session
			.read()
			.await
			.clone()
			.ok_or(CommerceError::NotConnected(PlatformKind::EasyOrder))?;
		if session.is_expired(Utc::now()) {
			return Err(CommerceError::Authentication("EasyOrder token expired".to_string()));
		}
		Ok(session)
	}

	async fn set_status(
		&self,
		session: &Session,
		order_id: &str,
		status: &str,
		notes: Option<&str>,
	) -> Result<Order, CommerceError> {
		let envelope: OrderEnvelope = self
			.http
			.put(
				&self.url(&format!("/v1/orders/{}/status", order_id)),
				&session.auth,
				&json!({ "status": status, "notes": notes }),
			)
			.await?;
		Ok(envelope.order.into_order())
	}
}

pub struct EasyOrderSchema;

impl ConfigSchema for EasyOrderSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("base_url", FieldType::String)
					.with_validator(idev_types::validation::http_url),
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
impl CommerceInterface for EasyOrderPlatform {
	fn platform(&self) -> PlatformKind {
		PlatformKind::EasyOrder
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(EasyOrderSchema)
	}

	async fn authenticate(
		&self,
		credentials: &PlatformCredentials,
	) -> Result<PlatformIdentity, CommerceError> {
		expect_credentials(PlatformKind::EasyOrder, credentials)?;
		let PlatformCredentials::ClientCredentials {
			merchant_id,
			api_key,
			api_secret,
		} = credentials
		else {
			return Err(CommerceError::Authentication("expected client_credentials".into()));
		};

		let token: TokenResponse = self
			.http
			.post_form(
				&self.url("/oauth/token"),
				&Auth::Basic {
					username: api_key.clone(),
					password: api_secret.clone(),
				},
				&[("grant_type", "client_credentials")],
			)
			.await?;
		let expires_at = match token.expires_in {
			Some(secs) => Some(
				ChronoDuration::try_seconds(secs)
					.and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
					.ok_or_else(|| {
						CommerceError::InvalidPayload(format!("token expires_in out of range: {}", secs))
					})?,
			),
			None => None,
		};
		let candidate = Session {
			merchant_id: merchant_id.clone(),
			auth: Auth::Bearer(token.access_token),
			expires_at,
		};
		let merchant: MerchantEnvelope = self
			.http
			.get(&self.url("/v1/merchant"), &candidate.auth, &[])
			.await?;

		*self.session.write().await = Some(candidate);
		Ok(PlatformIdentity {
			platform: PlatformKind::EasyOrder,
			account: merchant
				.merchant
				.as_ref()
				.and_then(|m| m.id.clone())
				.unwrap_or_else(|| merchant_id.clone()),
			display_name: merchant.merchant.and_then(|m| m.name),
		})
	}

	/// Token presence and expiry only; no vendor round trip.
	async fn validate_session(&self) -> Result<bool, CommerceError> {
		match self.session.read().await.as_ref() {
			Some(session) => Ok(!session.is_expired(Utc::now())),
			None => Err(CommerceError::NotConnected(PlatformKind::EasyOrder)),
		}
	}

	async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, CommerceError> {
		let session = self.session().await?;
		let params = [
			("limit", query.limit.to_string()),
			("status", query.status.clone().unwrap_or_else(|| "all".to_string())),
		];
		let envelope: OrdersEnvelope = self
			.http
			.get(&self.url("/v1/orders"), &session.auth, &params)
			.await?;
		Ok(envelope.orders.into_iter().map(EasyOrder::into_order).collect())
	}

	async fn get_order(&self, order_id: &str) -> Result<Order, CommerceError> {
		let session = self.session().await?;
		let envelope: OrderEnvelope = self
			.http
			.get(&self.url(&format!("/v1/orders/{}", order_id)), &session.auth, &[])
			.await?;
		Ok(envelope.order.into_order())
	}

	async fn update_order_status(
		&self,
		order_id: &str,
		status: &str,
		note: Option<&str>,
	) -> Result<Order, CommerceError> {
		let session = self.session().await?;
		self.set_status(&session, order_id, status, note).await
	}

	async fn create_shipping_label(
		&self,
		order_id: &str,
		request: &ShippingRequest,
	) -> Result<ShippingLabel, CommerceError> {
		let session = self.session().await?;
		let tracking_number = request.resolve_tracking_number();
		let body = json!({
			"shipment": {
				"carrier": request.carrier(),
				"service_type": request.service_type.as_deref().unwrap_or("standard"),
				"tracking_number": tracking_number,
				"tracking_url": request.tracking_url,
			}
		});
		let envelope: ShipmentEnvelope = self
			.http
			.post(
				&self.url(&format!("/v1/orders/{}/shipments", order_id)),
				&session.auth,
				&body,
			)
			.await?;
		self.set_status(
			&session,
			order_id,
			"shipped",
			Some(&format!("Shipped with tracking number {}", tracking_number)),
		)
		.await?;

		Ok(ShippingLabel {
			order_id: order_id.to_string(),
			tracking_number,
			fulfillment_id: envelope.shipment.id,
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
		let notes = tracking_number.map(|n| format!("Tracking number: {}", n));
		self.set_status(&session, order_id, arabic_label(status), notes.as_deref())
			.await?;
		Ok(())
	}

	async fn get_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError> {
		let session = self.session().await?;
		let envelope: ProductsEnvelope = self
			.http
			.get(&self.url("/v1/products"), &session.auth, &[("limit", limit.to_string())])
			.await?;
		Ok(envelope
			.products
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
		let envelope: CustomersEnvelope = self
			.http
			.get(&self.url("/v1/customers"), &session.auth, &[("limit", limit.to_string())])
			.await?;
		Ok(envelope
			.customers
			.into_iter()
			.map(|c| CustomerAccount {
				name: c.customer.name(),
				id: c.id,
				email: c.customer.email,
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
			let url = delivery_url(delivery_base_url, PlatformKind::EasyOrder, topic);
			let body = json!({
				"webhook": {
					"event": topic,
					"url": url,
					"secret": self.webhook_secret,
					"merchant_id": session.merchant_id,
				}
			});
			let result: Result<WebhookEnvelope, _> = self
				.http
				.post(&self.url("/v1/webhooks"), &session.auth, &body)
				.await;
			results.push(match result {
				Ok(envelope) => WebhookSetupResult::registered(*topic, url, envelope.webhook.id),
				Err(e) => WebhookSetupResult::failed(*topic, url, e),
			});
		}
		Ok(results)
	}

	fn decode_order(&self, payload: &Value) -> Result<Order, CommerceError> {
		let order = payload.get("order").unwrap_or(payload);
		convert::decode::<EasyOrder>(order).map(EasyOrder::into_order)
	}

	async fn disconnect(&self) -> Result<(), CommerceError> {
		self.session.write().await.take();
		Ok(())
	}
}

/// Vendor label written when a shipment status changes.
fn arabic_label(status: ShipmentStatus) -> &'static str {
	match status {
		ShipmentStatus::Pending => "قيد الانتظار",
		ShipmentStatus::Processing => "قيد المعالجة",
		ShipmentStatus::Shipped => "تم الشحن",
		ShipmentStatus::Delivered => "تم التسليم",
		ShipmentStatus::Cancelled => "ملغي",
	}
}

fn stage_of(status: &str) -> OrderStage {
	match status.trim() {
		"pending" | "new" | "قيد الانتظار" => OrderStage::Pending,
		"paid" | "confirmed" | "مدفوع" => OrderStage::Paid,
		"processing" | "قيد المعالجة" => OrderStage::Processing,
		"shipped" | "تم الشحن" => OrderStage::Shipped,
		"delivered" | "تم التسليم" => OrderStage::Delivered,
		"cancelled" | "canceled" | "ملغي" => OrderStage::Cancelled,
		_ => OrderStage::Unknown,
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct MerchantEnvelope {
	merchant: Option<Merchant>,
}

#[derive(Deserialize)]
struct Merchant {
	#[serde(default, deserialize_with = "convert::lenient_opt_id")]
	id: Option<String>,
	name: Option<String>,
}

#[derive(Deserialize)]
struct OrdersEnvelope {
	#[serde(default)]
	orders: Vec<EasyOrder>,
}

#[derive(Deserialize)]
struct OrderEnvelope {
	order: EasyOrder,
}

#[derive(Deserialize)]
struct ShipmentEnvelope {
	shipment: IdOnly,
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
	#[serde(default)]
	products: Vec<EasyProduct>,
}

#[derive(Deserialize)]
struct EasyProduct {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	name: String,
	sku: Option<String>,
	price: Option<Value>,
}

#[derive(Deserialize)]
struct CustomersEnvelope {
	#[serde(default)]
	customers: Vec<EasyCustomerRecord>,
}

#[derive(Deserialize)]
struct EasyCustomerRecord {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	#[serde(flatten)]
	customer: EasyCustomer,
}

#[derive(Deserialize, Default)]
struct EasyCustomer {
	first_name: Option<String>,
	last_name: Option<String>,
	email: Option<String>,
	phone: Option<String>,
}

impl EasyCustomer {
	fn name(&self) -> String {
		convert::full_name(self.first_name.as_deref(), self.last_name.as_deref())
	}
}

#[derive(Deserialize)]
struct EasyAddress {
	street: Option<String>,
	district: Option<String>,
	city: Option<String>,
	region: Option<String>,
	postal_code: Option<String>,
	country: Option<String>,
}

#[derive(Deserialize)]
struct EasyItem {
	sku: Option<String>,
	#[serde(alias = "product_name")]
	name: String,
	quantity: u32,
	#[serde(default, deserialize_with = "lenient_decimal", alias = "unit_price")]
	price: Decimal,
}

#[derive(Deserialize)]
struct EasyOrder {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	#[serde(default, deserialize_with = "convert::lenient_opt_id")]
	order_number: Option<String>,
	#[serde(default)]
	status: String,
	#[serde(default)]
	customer: EasyCustomer,
	shipping_address: Option<EasyAddress>,
	#[serde(default)]
	items: Vec<EasyItem>,
	#[serde(default, deserialize_with = "lenient_decimal")]
	total_amount: Decimal,
	currency: Option<String>,
	tracking_number: Option<String>,
	#[serde(default, deserialize_with = "lenient_datetime")]
	created_at: Option<DateTime<Utc>>,
}

impl EasyOrder {
	fn into_order(self) -> Order {
		let customer_name = self.customer.name();
		Order {
			stage: stage_of(&self.status),
			id: self.id,
			platform: PlatformKind::EasyOrder,
			number: self.order_number,
			customer: Customer {
				name: customer_name,
				email: self.customer.email,
				phone: self.customer.phone.clone(),
			},
			shipping_address: self.shipping_address.map(|a| ShippingAddress {
				name: None,
				line1: a.street.unwrap_or_default(),
				line2: a.district,
				city: a.city.unwrap_or_default(),
				region: a.region,
				postal_code: a.postal_code,
				country: a.country.unwrap_or_else(|| "SA".to_string()),
				phone: self.customer.phone,
			}),
			line_items: self
				.items
				.into_iter()
				.map(|item| LineItem {
					sku: convert::non_empty(item.sku),
					name: item.name,
					quantity: item.quantity,
					unit_price: item.price,
				})
				.collect(),
			total: self.total_amount,
			currency: self.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
			status: self.status,
			tracking_numbers: self.tracking_number.into_iter().collect(),
			created_at: self.created_at,
		}
	}
}

pub fn create_platform(config: &toml::Value) -> Result<Arc<dyn CommerceInterface>, CommerceError> {
	EasyOrderSchema.validate(config)?;
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);
	let webhook_secret = config
		.get("webhook_secret")
		.and_then(|v| v.as_str())
		.map(str::to_string);
	let timeout = config
		.get("request_timeout_secs")
		.and_then(|v| v.as_integer())
		.unwrap_or(30) as u64;

	Ok(Arc::new(EasyOrderPlatform::new(
		VendorClient::new(Duration::from_secs(timeout))?,
		base_url,
		webhook_secret,
	)))
}
