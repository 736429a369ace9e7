//! Canonical order model.
//!
//! Commerce adapters map their vendor payloads into these types at the adapter
//! boundary, so nothing above the adapter layer sees a vendor shape.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::PlatformKind;

/// Normalized position of an order in its lifecycle.
///
/// Derived by each adapter from its vendor status vocabulary. The raw vendor
/// string is always kept alongside in [`Order::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStage {
	Pending,
	Paid,
	Processing,
	Shipped,
	Delivered,
	Cancelled,
	Unknown,
}

impl OrderStage {
	/// True once the order has left the warehouse.
	pub fn is_shipped_or_later(&self) -> bool {
		matches!(self, OrderStage::Shipped | OrderStage::Delivered)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
	pub name: String,
	pub email: Option<String>,
	pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
	pub name: Option<String>,
	pub line1: String,
	pub line2: Option<String>,
	pub city: String,
	pub region: Option<String>,
	pub postal_code: Option<String>,
	pub country: String,
	pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
	pub sku: Option<String>,
	pub name: String,
	pub quantity: u32,
	pub unit_price: Decimal,
}

/// Vendor-independent order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	pub id: String,
	pub platform: PlatformKind,
	/// Merchant-facing order number, when different from the id.
	pub number: Option<String>,
	pub customer: Customer,
	pub shipping_address: Option<ShippingAddress>,
	pub line_items: Vec<LineItem>,
	pub total: Decimal,
	pub currency: String,
	/// Vendor status string, untranslated.
	pub status: String,
	pub stage: OrderStage,
	pub tracking_numbers: Vec<String>,
	pub created_at: Option<DateTime<Utc>>,
}

/// Filter passed through to the vendor when listing orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
	pub limit: u32,
	/// Vendor status filter; `None` means the vendor's "any".
	pub status: Option<String>,
}

impl OrderQuery {
	pub const DEFAULT_LIMIT: u32 = 50;

	pub fn new(limit: u32) -> Self {
		Self {
			limit,
			status: None,
		}
	}

	pub fn with_status(mut self, status: impl Into<String>) -> Self {
		self.status = Some(status.into());
		self
	}
}

impl Default for OrderQuery {
	fn default() -> Self {
		Self::new(Self::DEFAULT_LIMIT)
	}
}

/// Platform-neutral shipment status, mapped onto each vendor's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentStatus {
	Pending,
	Processing,
	Shipped,
	Delivered,
	Cancelled,
}

impl FromStr for ShipmentStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(ShipmentStatus::Pending),
			"processing" => Ok(ShipmentStatus::Processing),
			"shipped" => Ok(ShipmentStatus::Shipped),
			"delivered" => Ok(ShipmentStatus::Delivered),
			"cancelled" => Ok(ShipmentStatus::Cancelled),
			other => Err(format!("Unknown shipment status: {}", other)),
		}
	}
}

/// Input for creating a fulfillment / tracking object on the vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingRequest {
	pub tracking_number: Option<String>,
	pub carrier: Option<String>,
	pub tracking_url: Option<String>,
	pub service_type: Option<String>,
	#[serde(default = "default_notify")]
	pub notify_customer: bool,
}

fn default_notify() -> bool {
	true
}

impl ShippingRequest {
	pub const DEFAULT_CARRIER: &'static str = "IDev Shipping";

	pub fn with_tracking_number(tracking_number: impl Into<String>) -> Self {
		Self {
			tracking_number: Some(tracking_number.into()),
			notify_customer: true,
			..Default::default()
		}
	}

	pub fn carrier(&self) -> &str {
		self.carrier.as_deref().unwrap_or(Self::DEFAULT_CARRIER)
	}

	/// Returns the requested tracking number or generates an `IDV`-prefixed one.
	pub fn resolve_tracking_number(&self) -> String {
		match &self.tracking_number {
			Some(number) if !number.trim().is_empty() => number.clone(),
			_ => {
				let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
				format!("IDV{}", &id[..12])
			}
		}
	}
}

/// Outcome of a successful shipping-label request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingLabel {
	pub order_id: String,
	pub tracking_number: String,
	pub fulfillment_id: String,
	pub carrier: String,
}

#[derive(Debug, Error)]
#[error("Invalid analytics period '{0}': expected <n>h or <n>d")]
pub struct InvalidPeriod(pub String);

/// Lookback window for analytics, written as `24h` or `30d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyticsPeriod {
	hours: u32,
}

impl AnalyticsPeriod {
	pub fn days(days: u32) -> Self {
		Self { hours: days * 24 }
	}

	pub fn hours(hours: u32) -> Self {
		Self { hours }
	}

	pub fn duration(&self) -> Duration {
		Duration::hours(i64::from(self.hours))
	}

	/// Earliest creation time that falls inside the window.
	pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
		now - self.duration()
	}
}

impl Default for AnalyticsPeriod {
	fn default() -> Self {
		Self::days(30)
	}
}

impl fmt::Display for AnalyticsPeriod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.hours % 24 == 0 {
			write!(f, "{}d", self.hours / 24)
		} else {
			write!(f, "{}h", self.hours)
		}
	}
}

impl FromStr for AnalyticsPeriod {
	type Err = InvalidPeriod;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let trimmed = s.trim();
		if trimmed.len() < 2 {
			return Err(InvalidPeriod(s.to_string()));
		}
		let (value, unit) = trimmed.split_at(trimmed.len() - 1);
		let value: u32 = value.parse().map_err(|_| InvalidPeriod(s.to_string()))?;
		if value == 0 {
			return Err(InvalidPeriod(s.to_string()));
		}
		match unit {
			"d" => Ok(Self::days(value)),
			"h" => Ok(Self::hours(value)),
			_ => Err(InvalidPeriod(s.to_string())),
		}
	}
}

impl Serialize for AnalyticsPeriod {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for AnalyticsPeriod {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(serde::de::Error::custom)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
	pub name: String,
	pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
	pub period: AnalyticsPeriod,
	pub total_orders: u64,
	pub total_revenue: Decimal,
	pub average_order_value: Decimal,
	pub currency: Option<String>,
	pub top_products: Vec<TopProduct>,
}

/// Catalog entry as exposed by a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
	pub id: String,
	pub name: String,
	pub sku: Option<String>,
	pub price: Option<Decimal>,
}

/// Customer account as exposed by a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerAccount {
	pub id: String,
	pub name: String,
	pub email: Option<String>,
}
