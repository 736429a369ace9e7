//! Simulated card gateway.
//!
//! There is no settlement behind this gateway: it fabricates a transaction
//! id for every accepted charge. Charges above `decline_above` and processors
//! outside `processors` are declined, which is enough to exercise the
//! failure paths of the orchestrator.

use async_trait::async_trait;
use idev_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::{GatewayInterface, GatewayReceipt, PaymentError};

pub const DEFAULT_PROCESSOR: &str = "stripe";
const PROCESSORS: &[&str] = &["stripe", "paypal", "visa", "mastercard", "apple-pay", "google-pay"];

pub struct SimulatedGateway {
	default_processor: String,
	decline_above: Option<Decimal>,
}

impl SimulatedGateway {
	pub fn new(default_processor: impl Into<String>, decline_above: Option<Decimal>) -> Self {
		Self {
			default_processor: default_processor.into(),
			decline_above,
		}
	}
}

impl Default for SimulatedGateway {
	fn default() -> Self {
		Self::new(DEFAULT_PROCESSOR, None)
	}
}

/// `tx_<millis>_<7 random chars>`
fn transaction_id() -> String {
	let random = uuid::Uuid::new_v4().simple().to_string();
	format!("tx_{}_{}", idev_types::now_millis(), &random[..7])
}

pub struct SimulatedGatewaySchema;

impl ConfigSchema for SimulatedGatewaySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("default_processor", FieldType::OneOf(PROCESSORS)),
				Field::new("decline_above", FieldType::String).with_validator(|v| {
					v.as_str()
						.and_then(|s| Decimal::from_str(s).ok())
						.filter(|d| *d > Decimal::ZERO)
						.map(|_| ())
						.ok_or_else(|| "must be a positive decimal".to_string())
				}),
			],
		)
		.validate(config)
	}
}

#[async_trait]
impl GatewayInterface for SimulatedGateway {
	fn name(&self) -> &str {
		"simulated"
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedGatewaySchema)
	}

	async fn charge(
		&self,
		amount: Decimal,
		currency: &str,
		gateway: Option<&str>,
	) -> Result<GatewayReceipt, PaymentError> {
		let processor = gateway
			.map(|g| g.trim().to_ascii_lowercase())
			.unwrap_or_else(|| self.default_processor.clone());
		if !PROCESSORS.contains(&processor.as_str()) {
			return Err(PaymentError::Gateway(format!(
				"Unsupported processor: {}",
				processor
			)));
		}
		if let Some(limit) = self.decline_above.filter(|limit| amount > *limit) {
			return Err(PaymentError::Gateway(format!(
				"Charge of {} {} declined: above limit {}",
				amount, currency, limit
			)));
		}

		let receipt = GatewayReceipt {
			transaction_id: transaction_id(),
			gateway: processor,
		};
		tracing::debug!(
			gateway = %receipt.gateway,
			transaction_id = %receipt.transaction_id,
			"Simulated charge accepted"
		);
		Ok(receipt)
	}
}

pub fn create_gateway(config: &toml::Value) -> Result<Box<dyn GatewayInterface>, PaymentError> {
	SimulatedGatewaySchema.validate(config)?;
	let default_processor = config
		.get("default_processor")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_PROCESSOR);
	let decline_above = config
		.get("decline_above")
		.and_then(|v| v.as_str())
		.and_then(|s| Decimal::from_str(s).ok());
	Ok(Box::new(SimulatedGateway::new(default_processor, decline_above)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_charge_fabricates_transaction_id() {
		let gateway = SimulatedGateway::default();
		let receipt = gateway.charge(Decimal::from(40), "USD", None).await.unwrap();
		assert_eq!(receipt.gateway, "stripe");
		let parts: Vec<&str> = receipt.transaction_id.split('_').collect();
		assert_eq!(parts.len(), 3);
		assert_eq!(parts[0], "tx");
		assert_eq!(parts[2].len(), 7);

		let other = gateway.charge(Decimal::from(40), "USD", Some("PayPal")).await.unwrap();
		assert_eq!(other.gateway, "paypal");
		assert_ne!(other.transaction_id, receipt.transaction_id);
	}

	#[tokio::test]
	async fn test_declines() {
		let gateway = SimulatedGateway::new("visa", Some(Decimal::from(100)));
		assert!(matches!(
			gateway.charge(Decimal::from(101), "USD", None).await,
			Err(PaymentError::Gateway(_))
		));
		assert!(matches!(
			gateway.charge(Decimal::from(1), "USD", Some("bitpay")).await,
			Err(PaymentError::Gateway(_))
		));
	}

	#[test]
	fn test_config() {
		let config = toml::Value::Table(
			toml::from_str::<toml::Table>("default_processor = \"visa\"\ndecline_above = \"500\"").unwrap(),
		);
		assert!(create_gateway(&config).is_ok());
		let bad = toml::Value::Table(toml::from_str::<toml::Table>("decline_above = \"-5\"").unwrap());
		assert!(create_gateway(&bad).is_err());
	}
}
