//! Shared types for the IDev commerce and payment orchestration layer.
//!
//! Every other crate in the workspace speaks in terms of these types: the
//! canonical order model that commerce adapters normalize into, the wallet and
//! payment records owned by the payment orchestrator, the static chain and
//! payment-method tables, the event bus and the configuration schema helpers.

pub mod chains;
pub mod events;
pub mod order;
pub mod payment;
pub mod platform;
pub mod validation;
pub mod wallet;
pub mod webhook;

pub use chains::*;
pub use events::*;
pub use order::*;
pub use payment::*;
pub use platform::*;
pub use validation::*;
pub use wallet::*;
pub use webhook::*;

/// Returns the current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
	chrono::Utc::now().timestamp_millis()
}
