//! Lenient decoding helpers shared by the vendor payload types.
//!
//! Vendors disagree on whether ids are numbers or strings, whether amounts are
//! JSON numbers, decimal strings or `{amount}` objects, and whether timestamps
//! carry an offset.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

use crate::CommerceError;

pub fn decimal_of(value: &Value) -> Option<Decimal> {
	match value {
		Value::Null => Some(Decimal::ZERO),
		Value::String(s) if s.trim().is_empty() => Some(Decimal::ZERO),
		Value::String(s) => Decimal::from_str(s.trim()).ok(),
		Value::Number(n) => {
			let s = n.to_string();
			Decimal::from_str(&s)
				.or_else(|_| Decimal::from_scientific(&s))
				.ok()
		}
		Value::Object(map) => map
			.get("amount")
			.or_else(|| map.get("value"))
			.and_then(decimal_of),
		_ => None,
	}
}

pub fn id_of(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

pub fn lenient_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
	let value = Value::deserialize(deserializer)?;
	decimal_of(&value).ok_or_else(|| de::Error::custom(format!("invalid amount: {}", value)))
}

pub fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
	let value = Value::deserialize(deserializer)?;
	id_of(&value).ok_or_else(|| de::Error::custom(format!("invalid id: {}", value)))
}

pub fn lenient_opt_id<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<String>, D::Error> {
	let value = Value::deserialize(deserializer)?;
	Ok(id_of(&value))
}

/// Accepts RFC 3339 timestamps and offset-less ones, which are taken as UTC.
pub fn lenient_datetime<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
	let raw: Option<String> = Option::deserialize(deserializer)?;
	Ok(raw.as_deref().and_then(parse_datetime))
}

pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.ok()
		.or_else(|| {
			NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
				.ok()
				.map(|naive| naive.and_utc())
		})
}

/// Extracts the order id from a webhook payload.
pub fn payload_id(payload: &Value) -> Result<String, CommerceError> {
	payload
		.get("id")
		.or_else(|| payload.get("order_id"))
		.or_else(|| payload.pointer("/order/id"))
		.and_then(id_of)
		.ok_or_else(|| CommerceError::InvalidPayload("webhook payload has no order id".to_string()))
}

/// Decodes a vendor payload type, mapping failures to `InvalidPayload`.
pub fn decode<T: de::DeserializeOwned>(value: &Value) -> Result<T, CommerceError> {
	T::deserialize(value).map_err(|e| CommerceError::InvalidPayload(e.to_string()))
}

pub fn full_name(first: Option<&str>, last: Option<&str>) -> String {
	[first, last]
		.into_iter()
		.flatten()
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.collect::<Vec<_>>()
		.join(" ")
}

pub fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|s| !s.trim().is_empty())
}
