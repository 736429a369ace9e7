//! Append-only payment ledger.
//!
//! Records are held in memory in append order and mirrored to storage so a
//! restarted service can restore its history. Failed attempts live in a
//! separate namespace and never enter the history.

use idev_storage::StorageService;
use idev_types::{PaymentFailure, PaymentRecord};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::PaymentError;

pub const PAYMENTS_NAMESPACE: &str = "payments";
pub const FAILURES_NAMESPACE: &str = "payment_failures";

pub struct PaymentLedger {
	records: RwLock<Vec<PaymentRecord>>,
	storage: Arc<StorageService>,
	audit_failures: bool,
}

impl PaymentLedger {
	pub fn new(storage: Arc<StorageService>, audit_failures: bool) -> Self {
		Self {
			records: RwLock::new(Vec::new()),
			storage,
			audit_failures,
		}
	}

	/// Replaces the in-memory history with what storage holds, oldest first.
	pub async fn restore(&self) -> Result<usize, PaymentError> {
		let mut stored: Vec<PaymentRecord> = self.storage.list(PAYMENTS_NAMESPACE).await?;
		stored.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
		let count = stored.len();
		*self.records.write().await = stored;
		Ok(count)
	}

	/// Appends a successful payment.
	///
	/// The transfer has already happened when this runs, so a storage failure
	/// is logged and the record is kept in memory regardless.
	pub async fn append(&self, record: PaymentRecord) {
		if let Err(e) = self.storage.store(PAYMENTS_NAMESPACE, &record.id, &record).await {
			tracing::error!(payment_id = %record.id, error = %e, "Failed to persist payment record");
		}
		self.records.write().await.push(record);
	}

	pub async fn history(&self) -> Vec<PaymentRecord> {
		self.records.read().await.clone()
	}

	pub async fn len(&self) -> usize {
		self.records.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.records.read().await.is_empty()
	}

	/// Persists a rejected or failed attempt when auditing is enabled.
	pub async fn record_failure(&self, failure: &PaymentFailure) {
		if !self.audit_failures {
			return;
		}
		if let Err(e) = self.storage.store(FAILURES_NAMESPACE, &failure.id, failure).await {
			tracing::warn!(error = %e, "Failed to persist payment failure");
		}
	}

	pub async fn failures(&self) -> Result<Vec<PaymentFailure>, PaymentError> {
		let mut failures: Vec<PaymentFailure> = self.storage.list(FAILURES_NAMESPACE).await?;
		failures.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
		Ok(failures)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, Utc};
	use idev_storage::implementations::file::FileStorage;
	use idev_types::{PaymentFeatures, PaymentMethod, PaymentRequest};
	use rust_decimal::Decimal;

	fn record(id: &str, minutes_ago: i64) -> PaymentRecord {
		PaymentRecord {
			id: id.to_string(),
			payment_method: PaymentMethod::Traditional,
			currency: "USD".to_string(),
			amount: Decimal::from(10),
			recipient_address: "merchant".to_string(),
			wallet_type: None,
			chain: None,
			tx_hash: None,
			transaction_id: Some(format!("tx_{}", id)),
			gateway: Some("stripe".to_string()),
			features: PaymentFeatures::default(),
			timestamp: Utc::now() - Duration::minutes(minutes_ago),
		}
	}

	#[tokio::test]
	async fn test_history_survives_restart() {
		let dir = tempfile::tempdir().unwrap();
		let storage = || Arc::new(StorageService::new(Box::new(FileStorage::new(dir.path().to_path_buf()))));

		let ledger = PaymentLedger::new(storage(), true);
		ledger.append(record("payment_b", 1)).await;
		ledger.append(record("payment_a", 5)).await;
		assert_eq!(ledger.len().await, 2);

		let restored = PaymentLedger::new(storage(), true);
		assert_eq!(restored.restore().await.unwrap(), 2);
		let ids: Vec<String> = restored.history().await.into_iter().map(|r| r.id).collect();
		assert_eq!(ids, vec!["payment_a", "payment_b"]);
	}

	#[tokio::test]
	async fn test_failures_only_when_audited() {
		let request: PaymentRequest = serde_json::from_value(serde_json::json!({
			"amount": "5",
			"currency": "ETH",
			"recipientAddress": "0xabc",
			"paymentMethod": "barter"
		}))
		.unwrap();
		let failure = PaymentFailure::from_request("f1".into(), &request, "unsupported".into());

		let audited = PaymentLedger::new(Arc::new(StorageService::in_memory()), true);
		audited.record_failure(&failure).await;
		assert_eq!(audited.failures().await.unwrap().len(), 1);
		assert!(audited.is_empty().await);

		let silent = PaymentLedger::new(Arc::new(StorageService::in_memory()), false);
		silent.record_failure(&failure).await;
		assert!(silent.failures().await.unwrap().is_empty());
	}
}
