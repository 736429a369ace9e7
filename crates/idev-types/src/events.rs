//! In-process event bus shared by the orchestrators.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{ChainRef, PaymentMethod, PlatformKind, WalletType, WebhookTopic};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlatformEvent {
	Commerce(CommerceEvent),
	Payment(PaymentEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommerceEvent {
	Connected {
		platform: PlatformKind,
		account: String,
	},
	Disconnected {
		platform: PlatformKind,
	},
	Evicted {
		platform: PlatformKind,
		reason: String,
	},
	WebhookProcessed {
		platform: PlatformKind,
		topic: WebhookTopic,
		order_id: String,
	},
	WebhookRejected {
		platform: PlatformKind,
		topic: String,
		reason: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentEvent {
	WalletConnected {
		wallet_type: WalletType,
		chain: ChainRef,
		address: String,
	},
	WalletDisconnected {
		wallet_type: WalletType,
	},
	Completed {
		payment_id: String,
		method: PaymentMethod,
		amount: Decimal,
		currency: String,
	},
	Failed {
		method: String,
		reason: String,
	},
}

/// Broadcast channel of [`PlatformEvent`]s.
///
/// Publishing never fails the caller; with no subscribers the event is dropped.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
		self.sender.subscribe()
	}

	pub fn publish(&self, event: PlatformEvent) {
		let _ = self.sender.send(event);
	}

	pub fn commerce(&self, event: CommerceEvent) {
		self.publish(PlatformEvent::Commerce(event));
	}

	pub fn payment(&self, event: PaymentEvent) {
		self.publish(PlatformEvent::Payment(event));
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}
