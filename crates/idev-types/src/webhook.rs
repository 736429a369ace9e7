//! Webhook topics, registrations and the normalized lifecycle event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Order, PlatformKind};

/// Platform-neutral order webhook topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookTopic {
	OrderCreated,
	OrderUpdated,
	OrderPaid,
	OrderCancelled,
}

impl WebhookTopic {
	pub fn as_str(&self) -> &'static str {
		match self {
			WebhookTopic::OrderCreated => "order_created",
			WebhookTopic::OrderUpdated => "order_updated",
			WebhookTopic::OrderPaid => "order_paid",
			WebhookTopic::OrderCancelled => "order_cancelled",
		}
	}

	/// Past-tense action reported in the lifecycle event.
	pub fn action(&self) -> &'static str {
		match self {
			WebhookTopic::OrderCreated => "created",
			WebhookTopic::OrderUpdated => "updated",
			WebhookTopic::OrderPaid => "paid",
			WebhookTopic::OrderCancelled => "cancelled",
		}
	}
}

impl fmt::Display for WebhookTopic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Pairing of a vendor topic string with its neutral topic.
pub type TopicTable = &'static [(&'static str, WebhookTopic)];

/// Locally held record of a webhook subscription on a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
	pub platform: PlatformKind,
	/// Vendor topic string, e.g. `orders/create`.
	pub topic: String,
	pub delivery_url: String,
	#[serde(skip_serializing)]
	pub secret: Option<String>,
	pub vendor_webhook_id: String,
}

/// Per-topic outcome of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSetupResult {
	pub topic: String,
	pub delivery_url: String,
	pub success: bool,
	pub vendor_webhook_id: Option<String>,
	pub error: Option<String>,
}

impl WebhookSetupResult {
	pub fn registered(
		topic: impl Into<String>,
		delivery_url: impl Into<String>,
		vendor_webhook_id: impl Into<String>,
	) -> Self {
		Self {
			topic: topic.into(),
			delivery_url: delivery_url.into(),
			success: true,
			vendor_webhook_id: Some(vendor_webhook_id.into()),
			error: None,
		}
	}

	pub fn failed(
		topic: impl Into<String>,
		delivery_url: impl Into<String>,
		error: impl fmt::Display,
	) -> Self {
		Self {
			topic: topic.into(),
			delivery_url: delivery_url.into(),
			success: false,
			vendor_webhook_id: None,
			error: Some(error.to_string()),
		}
	}
}

/// Result of decoding one inbound webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLifecycleEvent {
	pub platform: PlatformKind,
	pub topic: WebhookTopic,
	pub order_id: String,
	/// Fully decoded order; populated for creation events.
	pub order: Option<Order>,
	pub action: String,
	pub received_at: DateTime<Utc>,
}

impl OrderLifecycleEvent {
	pub fn new(platform: PlatformKind, topic: WebhookTopic, order_id: impl Into<String>) -> Self {
		Self {
			platform,
			topic,
			order_id: order_id.into(),
			order: None,
			action: topic.action().to_string(),
			received_at: Utc::now(),
		}
	}

	pub fn with_order(mut self, order: Order) -> Self {
		self.order = Some(order);
		self
	}
}
