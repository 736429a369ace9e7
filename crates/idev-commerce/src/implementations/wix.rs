//! Wix eCommerce API adapter.
//!
//! Wix access tokens are sent verbatim in the `Authorization` header. Webhook
//! deliveries are not signed.

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
use crate::{delivery_url, expect_credentials, CommerceError, CommerceInterface};

pub const DEFAULT_BASE_URL: &str = "https://www.wixapis.com";

pub const TOPICS: TopicTable = &[
	("orders/created", WebhookTopic::OrderCreated),
	("orders/updated", WebhookTopic::OrderUpdated),
	("orders/paid", WebhookTopic::OrderPaid),
];

#[derive(Clone)]
struct Session {
	auth: Auth,
}

pub struct WixPlatform {
	http: VendorClient,
	base_url: String,
	session: RwLock<Option<Session>>,
}

impl WixPlatform {
	pub fn new(http: VendorClient, base_url: impl Into<String>) -> Self {
		Self {
			http,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			session: RwLock::new(None),
		}
	}

	async fn session(&self) -> Result<Session, CommerceError> {
		self.session
			.read()
			.await
			.clone()
			.ok_or(CommerceError::NotConnected(PlatformKind::Wix))
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}", self.base_url, path)
	}

	async fn patch_status(&self, session: &Session, order_id: &str, status: &str) -> Result<Order, CommerceError> {
		let envelope: OrderEnvelope = self
			.http
			.patch(
				&self.url(&format!("/v1/orders/{}", order_id)),
				&session.auth,
				&json!({ "status": status }),
			)
			.await?;
		Ok(envelope.order.into_order())
	}

	async fn create_fulfillment(
		&self,
		session: &Session,
		order_id: &str,
		tracking_number: &str,
		carrier: &str,
		tracking_url: Option<&str>,
		notify_customer: bool,
	) -> Result<String, CommerceError> {
		let body = json!({
			"fulfillment": {
				"trackingInfo": {
					"trackingNumber": tracking_number,
					"carrier": carrier,
					"trackingUrl": tracking_url,
				},
				"notifyCustomer": notify_customer,
			}
		});
		let envelope: FulfillmentEnvelope = self
			.http
			.post(
				&self.url(&format!("/v1/orders/{}/fulfillments", order_id)),
				&session.auth,
				&body,
			)
			.await?;
		Ok(envelope.fulfillment.id)
	}
}

pub struct WixSchema;

impl ConfigSchema for WixSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("base_url", FieldType::String)
					.with_validator(idev_types::validation::http_url),
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
impl CommerceInterface for WixPlatform {
	fn platform(&self) -> PlatformKind {
		PlatformKind::Wix
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(WixSchema)
	}

	async fn authenticate(
		&self,
		credentials: &PlatformCredentials,
	) -> Result<PlatformIdentity, CommerceError> {
		expect_credentials(PlatformKind::Wix, credentials)?;
		let PlatformCredentials::InstanceToken {
			instance_id,
			access_token,
		} = credentials
		else {
			return Err(CommerceError::Authentication("expected instance_token".into()));
		};

		let candidate = Session {
			auth: Auth::Raw(access_token.clone()),
		};
		let site: SiteEnvelope = self
			.http
			.get(&self.url("/v1/site"), &candidate.auth, &[])
			.await?;

		*self.session.write().await = Some(candidate);
		Ok(PlatformIdentity {
			platform: PlatformKind::Wix,
			account: instance_id.clone(),
			display_name: site.site.and_then(|s| s.display_name),
		})
	}

	async fn validate_session(&self) -> Result<bool, CommerceError> {
		let session = self.session().await?;
		let probe: Result<Value, _> = self.http.get(&self.url("/v1/site"), &session.auth, &[]).await;
		match probe {
			Ok(_) => Ok(true),
			Err(CommerceError::Authentication(_)) | Err(CommerceError::Http { .. }) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn get_orders(&self, query: &OrderQuery) -> Result<Vec<Order>, CommerceError> {
		let session = self.session().await?;
		let mut params = vec![("limit", query.limit.min(100).to_string())];
		if let Some(status) = &query.status {
			params.push(("status", status.clone()));
		}
		let envelope: OrdersEnvelope = self
			.http
			.get(&self.url("/v1/orders"), &session.auth, &params)
			.await?;
		Ok(envelope.orders.into_iter().map(WixOrder::into_order).collect())
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
		if note.is_some() {
			tracing::debug!(order_id, "Wix order notes are not supported; note dropped");
		}
		self.patch_status(&session, order_id, status).await
	}

	async fn create_shipping_label(
		&self,
		order_id: &str,
		request: &ShippingRequest,
	) -> Result<ShippingLabel, CommerceError> {
		let session = self.session().await?;
		let tracking_number = request.resolve_tracking_number();
		let fulfillment_id = self
			.create_fulfillment(
				&session,
				order_id,
				&tracking_number,
				request.carrier(),
				request.tracking_url.as_deref(),
				request.notify_customer,
			)
			.await?;
		self.patch_status(&session, order_id, "SHIPPED").await?;

		Ok(ShippingLabel {
			order_id: order_id.to_string(),
			tracking_number,
			fulfillment_id,
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
		if let Some(number) = tracking_number {
			self.create_fulfillment(
				&session,
				order_id,
				number,
				ShippingRequest::DEFAULT_CARRIER,
				None,
				true,
			)
			.await?;
		}
		let vendor_status = match status {
			ShipmentStatus::Pending => "PENDING",
			ShipmentStatus::Processing => "PROCESSING",
			ShipmentStatus::Shipped => "SHIPPED",
			ShipmentStatus::Delivered => "DELIVERED",
			ShipmentStatus::Cancelled => "CANCELED",
		};
		self.patch_status(&session, order_id, vendor_status).await?;
		Ok(())
	}

	async fn get_products(&self, limit: u32) -> Result<Vec<Product>, CommerceError> {
		let session = self.session().await?;
		let envelope: ProductsEnvelope = self
			.http
			.get(
				&self.url("/v1/products"),
				&session.auth,
				&[("limit", limit.min(100).to_string())],
			)
			.await?;
		Ok(envelope
			.products
			.into_iter()
			.map(|p| Product {
				id: p.id,
				name: p.name,
				sku: convert::non_empty(p.sku),
				price: p
					.price_data
					.and_then(|d| d.price)
					.as_ref()
					.and_then(convert::decimal_of),
			})
			.collect())
	}

	async fn get_customers(&self, limit: u32) -> Result<Vec<CustomerAccount>, CommerceError> {
		let session = self.session().await?;
		let envelope: MembersEnvelope = self
			.http
			.get(
				&self.url("/v1/members"),
				&session.auth,
				&[("limit", limit.min(100).to_string())],
			)
			.await?;
		Ok(envelope
			.members
			.into_iter()
			.map(|m| CustomerAccount {
				id: m.id,
				name: m
					.profile
					.as_ref()
					.and_then(|p| p.nickname.clone())
					.unwrap_or_default(),
				email: m.login_email,
			})
			.collect())
	}

	fn webhook_topics(&self) -> TopicTable {
		TOPICS
	}

	async fn setup_webhooks(
		&self,
		delivery_base_url: &str,
	) -> Result<Vec<WebhookSetupResult>, CommerceError> {
		let session = self.session().await?;
		let mut results = Vec::with_capacity(TOPICS.len());
		for (topic, _) in TOPICS {
			let callback = delivery_url(delivery_base_url, PlatformKind::Wix, topic);
			let result: Result<WebhookEnvelope, _> = self
				.http
				.post(
					&self.url("/v1/webhooks"),
					&session.auth,
					&json!({ "topic": topic, "callbackUrl": callback }),
				)
				.await;
			results.push(match result {
				Ok(envelope) => WebhookSetupResult::registered(*topic, callback, envelope.webhook.id),
				Err(e) => WebhookSetupResult::failed(*topic, callback, e),
			});
		}
		Ok(results)
	}

	fn decode_order(&self, payload: &Value) -> Result<Order, CommerceError> {
		// Wix wraps webhook orders in `{ "order": ... }`; list responses do not.
		let order = payload.get("order").unwrap_or(payload);
		convert::decode::<WixOrder>(order).map(WixOrder::into_order)
	}

	async fn disconnect(&self) -> Result<(), CommerceError> {
		self.session.write().await.take();
		Ok(())
	}
}

#[derive(Deserialize)]
struct SiteEnvelope {
	site: Option<Site>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Site {
	display_name: Option<String>,
}

#[derive(Deserialize)]
struct OrdersEnvelope {
	#[serde(default)]
	orders: Vec<WixOrder>,
}

#[derive(Deserialize)]
struct OrderEnvelope {
	order: WixOrder,
}

#[derive(Deserialize)]
struct FulfillmentEnvelope {
	fulfillment: IdOnly,
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
	products: Vec<WixProduct>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixProduct {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	name: String,
	sku: Option<String>,
	price_data: Option<PriceData>,
}

#[derive(Deserialize)]
struct PriceData {
	price: Option<Value>,
}

#[derive(Deserialize)]
struct MembersEnvelope {
	#[serde(default)]
	members: Vec<WixMember>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixMember {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	login_email: Option<String>,
	profile: Option<WixProfile>,
}

#[derive(Deserialize)]
struct WixProfile {
	nickname: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BuyerInfo {
	first_name: Option<String>,
	last_name: Option<String>,
	email: Option<String>,
	phone: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PriceSummary {
	#[serde(default, deserialize_with = "lenient_decimal")]
	total: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixLineItem {
	sku: Option<String>,
	#[serde(alias = "productName")]
	name: String,
	#[serde(default = "one")]
	quantity: u32,
	#[serde(default, deserialize_with = "lenient_decimal")]
	price: Decimal,
}

fn one() -> u32 {
	1
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixAddress {
	address_line1: Option<String>,
	address_line2: Option<String>,
	city: Option<String>,
	subdivision: Option<String>,
	postal_code: Option<String>,
	country: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixShippingInfo {
	shipment_details: Option<WixShipmentDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixShipmentDetails {
	address: Option<WixAddress>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixFulfillment {
	tracking_info: Option<WixTrackingInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixTrackingInfo {
	tracking_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WixOrder {
	#[serde(deserialize_with = "lenient_id")]
	id: String,
	#[serde(default, deserialize_with = "convert::lenient_opt_id")]
	number: Option<String>,
	#[serde(default)]
	status: String,
	#[serde(default)]
	buyer_info: BuyerInfo,
	#[serde(default)]
	price_summary: PriceSummary,
	#[serde(default)]
	currency: String,
	#[serde(default)]
	line_items: Vec<WixLineItem>,
	shipping_info: Option<WixShippingInfo>,
	#[serde(default)]
	fulfillments: Vec<WixFulfillment>,
	#[serde(default, deserialize_with = "lenient_datetime")]
	date_created: Option<DateTime<Utc>>,
}

impl WixOrder {
	fn into_order(self) -> Order {
		let shipping_address = self
			.shipping_info
			.and_then(|s| s.shipment_details)
			.and_then(|d| d.address)
			.map(|a| ShippingAddress {
				name: None,
				line1: a.address_line1.unwrap_or_default(),
				line2: convert::non_empty(a.address_line2),
				city: a.city.unwrap_or_default(),
				region: a.subdivision,
				postal_code: a.postal_code,
				country: a.country.unwrap_or_default(),
				phone: None,
			});
		let tracking_numbers = self
			.fulfillments
			.into_iter()
			.filter_map(|f| f.tracking_info.and_then(|t| t.tracking_number))
			.collect();

		Order {
			stage: stage_of(&self.status),
			id: self.id,
			platform: PlatformKind::Wix,
			number: self.number,
			customer: Customer {
				name: convert::full_name(
					self.buyer_info.first_name.as_deref(),
					self.buyer_info.last_name.as_deref(),
				),
				email: self.buyer_info.email,
				phone: self.buyer_info.phone,
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
			total: self.price_summary.total,
			currency: self.currency,
			status: self.status,
			tracking_numbers,
			created_at: self.date_created,
		}
	}
}

fn stage_of(status: &str) -> OrderStage {
	match status.to_ascii_uppercase().as_str() {
		"PENDING" | "INITIALIZED" | "NOT_PAID" => OrderStage::Pending,
		"PAID" | "APPROVED" => OrderStage::Paid,
		"PROCESSING" | "PARTIALLY_FULFILLED" => OrderStage::Processing,
		"SHIPPED" | "FULFILLED" => OrderStage::Shipped,
		"DELIVERED" => OrderStage::Delivered,
		"CANCELED" | "CANCELLED" | "REFUNDED" => OrderStage::Cancelled,
		_ => OrderStage::Unknown,
	}
}

pub fn create_platform(config: &toml::Value) -> Result<Arc<dyn CommerceInterface>, CommerceError> {
	WixSchema.validate(config)?;
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_BASE_URL);
	let timeout = config
		.get("request_timeout_secs")
		.and_then(|v| v.as_integer())
		.unwrap_or(30) as u64;

	Ok(Arc::new(WixPlatform::new(
		VendorClient::new(Duration::from_secs(timeout))?,
		base_url,
	)))
}
