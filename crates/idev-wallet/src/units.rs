//! Conversions between display amounts and on-chain base units.

use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::WalletError;

/// Scales `amount` by `10^decimals`. Amounts with more fractional digits than
/// the asset supports are rejected rather than truncated.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, WalletError> {
	if amount.is_sign_negative() {
		return Err(WalletError::InvalidAmount(format!("{} is negative", amount)));
	}
	let amount = amount.normalize();
	let scale = amount.scale();
	if scale > u32::from(decimals) {
		return Err(WalletError::InvalidAmount(format!(
			"{} has more than {} decimal places",
			amount, decimals
		)));
	}
	let mantissa = u128::try_from(amount.mantissa())
		.map_err(|_| WalletError::InvalidAmount(amount.to_string()))?;
	let factor = U256::from(10u64).pow(U256::from(u32::from(decimals) - scale));
	U256::from(mantissa)
		.checked_mul(factor)
		.ok_or_else(|| WalletError::InvalidAmount(format!("{} overflows", amount)))
}

pub fn from_base_units(value: U256, decimals: u8) -> Result<Decimal, WalletError> {
	let digits = value.to_string();
	let decimals = usize::from(decimals);
	let text = if decimals == 0 {
		digits
	} else {
		let padded = format!("{:0>width$}", digits, width = decimals + 1);
		let (int, frac) = padded.split_at(padded.len() - decimals);
		format!("{}.{}", int, frac)
	};
	Decimal::from_str(&text)
		.map(|d| d.normalize())
		.map_err(|e| WalletError::InvalidResponse(format!("{} base units: {}", value, e)))
}

/// Parses an Ethereum JSON-RPC hex quantity such as `0x1bc16d674ec80000`.
pub fn parse_quantity(value: &str) -> Result<U256, WalletError> {
	let digits = value
		.strip_prefix("0x")
		.or_else(|| value.strip_prefix("0X"))
		.ok_or_else(|| WalletError::InvalidResponse(format!("'{}' is not a hex quantity", value)))?;
	if digits.is_empty() {
		return Ok(U256::ZERO);
	}
	U256::from_str_radix(digits, 16)
		.map_err(|e| WalletError::InvalidResponse(format!("'{}': {}", value, e)))
}

pub fn to_quantity(value: U256) -> String {
	format!("0x{:x}", value)
}

/// Reads a non-negative integer that a provider may send as a JSON number or
/// as a decimal string (large ledger amounts overflow JSON numbers).
pub fn parse_integer(value: &serde_json::Value) -> Result<U256, WalletError> {
	let text = match value {
		serde_json::Value::Number(n) => n.to_string(),
		serde_json::Value::String(s) => s.trim().to_string(),
		other => return Err(WalletError::InvalidResponse(format!("expected an integer, got {}", other))),
	};
	U256::from_str_radix(&text, 10)
		.map_err(|e| WalletError::InvalidResponse(format!("'{}': {}", text, e)))
}
