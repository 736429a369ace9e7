//! Commerce orchestrator.

use chrono::Utc;
use dashmap::DashMap;
use futures::future::{join_all, try_join_all};
use idev_types::{
	platform_info, AnalyticsPeriod, AnalyticsReport, CommerceEvent, ConnectionState,
	ConnectionStatus, CustomerAccount, EventBus, Order, OrderLifecycleEvent, OrderQuery,
	PlatformConnection, PlatformCredentials, PlatformHealth, PlatformInfo, PlatformKind, Product,
	ReconnectPolicy, ShipmentStatus, ShippingLabel, ShippingRequest, WebhookRegistration,
	WebhookSetupResult,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{CommerceError, CommerceInterface};

/// Runtime knobs for [`CommerceService`].
#[derive(Debug, Clone)]
pub struct CommerceSettings {
	/// Upper bound for every adapter call made by the orchestrator.
	pub request_timeout: Duration,
	pub reconnect_policy: ReconnectPolicy,
	/// Orders sampled per platform when computing analytics.
	pub analytics_sample_size: u32,
	/// Root under which per-platform, per-topic delivery URLs are built.
	pub webhook_base_url: String,
}

impl Default for CommerceSettings {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
			reconnect_policy: ReconnectPolicy::default(),
			analytics_sample_size: 250,
			webhook_base_url: "http://127.0.0.1:3000/api/webhooks".to_string(),
		}
	}
}

/// Owns the adapter registry and the live connection table.
///
/// The registry is fixed at construction. Connect and disconnect for one
/// platform are serialized by a per-platform lock, so the adapter session and
/// the connection record never disagree. Aggregate calls fan out across
/// connected platforms concurrently and isolate failures per platform.
pub struct CommerceService {
	adapters: HashMap<PlatformKind, Arc<dyn CommerceInterface>>,
	locks: HashMap<PlatformKind, Arc<Mutex<()>>>,
	connections: DashMap<PlatformKind, PlatformConnection>,
	webhooks: DashMap<PlatformKind, Vec<WebhookRegistration>>,
	settings: CommerceSettings,
	events: EventBus,
	shutdown: CancellationToken,
}

impl CommerceService {
	pub fn new(
		adapters: Vec<Arc<dyn CommerceInterface>>,
		settings: CommerceSettings,
		events: EventBus,
		shutdown: CancellationToken,
	) -> Self {
		let adapters: HashMap<_, _> = adapters.into_iter().map(|a| (a.platform(), a)).collect();
		let locks = adapters
			.keys()
			.map(|kind| (*kind, Arc::new(Mutex::new(()))))
			.collect();
		Self {
			adapters,
			locks,
			connections: DashMap::new(),
			webhooks: DashMap::new(),
			settings,
			events,
			shutdown,
		}
	}

	pub fn settings(&self) -> &CommerceSettings {
		&self.settings
	}

	/// Runs every adapter's `init` concurrently; the first failure aborts.
	pub async fn init(&self) -> Result<(), CommerceError> {
		try_join_all(self.adapters.values().map(|adapter| self.call(adapter.init()))).await?;
		info!(platforms = self.adapters.len(), "Commerce adapters initialized");
		Ok(())
	}

	/// Races `fut` against the request timeout and the shutdown token.
	async fn call<T, F>(&self, fut: F) -> Result<T, CommerceError>
	where
		F: Future<Output = Result<T, CommerceError>>,
	{
		tokio::select! {
			biased;
			_ = self.shutdown.cancelled() => Err(CommerceError::Cancelled),
			result = tokio::time::timeout(self.settings.request_timeout, fut) => {
				result.map_err(|_| CommerceError::Timeout)?
			}
		}
	}

	fn resolve(&self, name: &str) -> Result<(PlatformKind, &Arc<dyn CommerceInterface>), CommerceError> {
		let kind: PlatformKind = name
			.parse()
			.map_err(|_| CommerceError::UnsupportedPlatform(name.to_string()))?;
		let adapter = self
			.adapters
			.get(&kind)
			.ok_or_else(|| CommerceError::UnsupportedPlatform(name.to_string()))?;
		Ok((kind, adapter))
	}

	fn connected(&self, name: &str) -> Result<(PlatformKind, &Arc<dyn CommerceInterface>), CommerceError> {
		let (kind, adapter) = self.resolve(name)?;
		if !self.connections.contains_key(&kind) {
			return Err(CommerceError::NotConnected(kind));
		}
		Ok((kind, adapter))
	}

	fn lock(&self, kind: PlatformKind) -> Arc<Mutex<()>> {
		// Every registered platform has a lock; the fallback is never shared.
		self.locks
			.get(&kind)
			.cloned()
			.unwrap_or_else(|| Arc::new(Mutex::new(())))
	}

	/// Authenticates against the vendor and records the connection.
	///
	/// On failure nothing is created or changed. With
	/// [`ReconnectPolicy::Reject`] a connected platform fails fast with
	/// `AlreadyConnected`.
	pub async fn connect_platform(
		&self,
		name: &str,
		credentials: PlatformCredentials,
	) -> Result<PlatformConnection, CommerceError> {
		let (kind, adapter) = self.resolve(name)?;
		let lock = self.lock(kind);
		let _guard = lock.lock().await;

		if self.settings.reconnect_policy == ReconnectPolicy::Reject
			&& self.connections.contains_key(&kind)
		{
			return Err(CommerceError::AlreadyConnected(kind));
		}

		let identity = match self.call(adapter.authenticate(&credentials)).await {
			Ok(identity) => identity,
			Err(e) => {
				warn!(platform = %kind, error = %e, "Platform authentication failed");
				return Err(e);
			}
		};

		let connection = PlatformConnection {
			platform: kind,
			credentials,
			identity: identity.clone(),
			connected_at: Utc::now(),
			status: ConnectionStatus::Connected,
		};
		if self.connections.insert(kind, connection.clone()).is_some() {
			debug!(platform = %kind, "Replaced existing connection");
		}
		info!(platform = %kind, account = %identity.account, "Platform connected");
		self.events.commerce(CommerceEvent::Connected {
			platform: kind,
			account: identity.account,
		});
		Ok(connection)
	}

	/// Drops the adapter session, then the connection record.
	///
	/// The record is kept when the adapter fails to disconnect.
	pub async fn disconnect_platform(&self, name: &str) -> Result<(), CommerceError> {
		let (kind, adapter) = self.resolve(name)?;
		let lock = self.lock(kind);
		let _guard = lock.lock().await;

		if !self.connections.contains_key(&kind) {
			return Err(CommerceError::NotConnected(kind));
		}
		self.call(adapter.disconnect()).await?;
		self.connections.remove(&kind);

		info!(platform = %kind, "Platform disconnected");
		self.events.commerce(CommerceEvent::Disconnected { platform: kind });
		Ok(())
	}

	/// Removes a connection after a failed health probe. The probe itself
	/// never evicts; callers decide.
	pub async fn evict(&self, kind: PlatformKind, reason: &str) -> Result<(), CommerceError> {
		let adapter = self
			.adapters
			.get(&kind)
			.ok_or_else(|| CommerceError::UnsupportedPlatform(kind.to_string()))?;
		let lock = self.lock(kind);
		let _guard = lock.lock().await;

		if self.connections.remove(&kind).is_none() {
			return Err(CommerceError::NotConnected(kind));
		}
		if let Err(e) = self.call(adapter.disconnect()).await {
			warn!(platform = %kind, error = %e, "Adapter disconnect failed during eviction");
		}
		warn!(platform = %kind, reason, "Platform evicted");
		self.events.commerce(CommerceEvent::Evicted {
			platform: kind,
			reason: reason.to_string(),
		});
		Ok(())
	}

	pub async fn get_platform_orders(
		&self,
		name: &str,
		query: &OrderQuery,
	) -> Result<Vec<Order>, CommerceError> {
		let (_, adapter) = self.connected(name)?;
		self.call(adapter.get_orders(query)).await
	}

	pub async fn get_order(&self, name: &str, order_id: &str) -> Result<Order, CommerceError> {
		let (_, adapter) = self.connected(name)?;
		self.call(adapter.get_order(order_id)).await
	}

	/// Passes `status` through untranslated; the vocabulary is the vendor's.
	pub async fn update_order_status(
		&self,
		name: &str,
		order_id: &str,
		status: &str,
		note: Option<&str>,
	) -> Result<Order, CommerceError> {
		let (kind, adapter) = self.connected(name)?;
		let order = self
			.call(adapter.update_order_status(order_id, status, note))
			.await?;
		info!(platform = %kind, order_id, status, "Order status updated");
		Ok(order)
	}

	pub async fn create_shipment(
		&self,
		name: &str,
		order_id: &str,
		request: &ShippingRequest,
	) -> Result<ShippingLabel, CommerceError> {
		let (kind, adapter) = self.connected(name)?;
		let label = self
			.call(adapter.create_shipping_label(order_id, request))
			.await?;
		info!(
			platform = %kind,
			order_id,
			tracking_number = %label.tracking_number,
			"Shipping label created"
		);
		Ok(label)
	}

	pub async fn update_shipment_status(
		&self,
		name: &str,
		order_id: &str,
		status: ShipmentStatus,
		tracking_number: Option<&str>,
	) -> Result<(), CommerceError> {
		let (_, adapter) = self.connected(name)?;
		self.call(adapter.update_shipment_status(order_id, status, tracking_number))
			.await
	}

	pub async fn get_platform_analytics(
		&self,
		name: &str,
		period: AnalyticsPeriod,
	) -> Result<AnalyticsReport, CommerceError> {
		let (_, adapter) = self.connected(name)?;
		self.call(adapter.get_analytics(period, self.settings.analytics_sample_size))
			.await
	}

	pub async fn get_platform_products(
		&self,
		name: &str,
		limit: u32,
	) -> Result<Vec<Product>, CommerceError> {
		let (_, adapter) = self.connected(name)?;
		self.call(adapter.get_products(limit)).await
	}

	pub async fn get_platform_customers(
		&self,
		name: &str,
		limit: u32,
	) -> Result<Vec<CustomerAccount>, CommerceError> {
		let (_, adapter) = self.connected(name)?;
		self.call(adapter.get_customers(limit)).await
	}

	/// Adapters of connected platforms, in a stable order.
	fn connected_adapters(&self) -> Vec<(PlatformKind, Arc<dyn CommerceInterface>)> {
		let mut connected: Vec<_> = self
			.connections
			.iter()
			.filter_map(|entry| {
				let kind = *entry.key();
				self.adapters.get(&kind).map(|a| (kind, a.clone()))
			})
			.collect();
		connected.sort_by_key(|(kind, _)| *kind);
		connected
	}

	/// Runs `op` against every connected platform concurrently. A failing
	/// platform maps to `None` and is logged; it never fails the batch.
	async fn fan_out<T, F, Fut>(&self, what: &str, op: F) -> BTreeMap<PlatformKind, Option<T>>
	where
		F: Fn(Arc<dyn CommerceInterface>) -> Fut,
		Fut: Future<Output = Result<T, CommerceError>>,
	{
		let calls = self.connected_adapters().into_iter().map(|(kind, adapter)| {
			let fut = self.call(op(adapter));
			async move {
				let result = fut.await;
				if let Err(e) = &result {
					warn!(platform = %kind, error = %e, "{} failed", what);
				}
				(kind, result.ok())
			}
		});
		join_all(calls).await.into_iter().collect()
	}

	/// Orders from every connected platform, keyed by platform.
	pub async fn get_all_orders(&self, limit: u32) -> BTreeMap<PlatformKind, Option<Vec<Order>>> {
		let query = OrderQuery::new(limit);
		self.fan_out("Order fetch", |adapter| {
			let query = query.clone();
			async move { adapter.get_orders(&query).await }
		})
		.await
	}

	pub async fn get_all_analytics(
		&self,
		period: AnalyticsPeriod,
	) -> BTreeMap<PlatformKind, Option<AnalyticsReport>> {
		let sample = self.settings.analytics_sample_size;
		self.fan_out("Analytics", |adapter| async move {
			adapter.get_analytics(period, sample).await
		})
		.await
	}

	/// Registers every topic for one platform and records the successful
	/// subscriptions, replacing earlier ones for that platform.
	pub async fn setup_platform_webhooks(
		&self,
		name: &str,
	) -> Result<Vec<WebhookSetupResult>, CommerceError> {
		let (kind, adapter) = self.connected(name)?;
		let results = self
			.call(adapter.setup_webhooks(&self.settings.webhook_base_url))
			.await?;
		self.record_registrations(kind, adapter.as_ref(), &results);
		Ok(results)
	}

	fn record_registrations(
		&self,
		kind: PlatformKind,
		adapter: &dyn CommerceInterface,
		results: &[WebhookSetupResult],
	) {
		let registrations: Vec<WebhookRegistration> = results
			.iter()
			.filter(|r| r.success)
			.map(|r| WebhookRegistration {
				platform: kind,
				topic: r.topic.clone(),
				delivery_url: r.delivery_url.clone(),
				secret: adapter.webhook_secret().map(str::to_string),
				vendor_webhook_id: r.vendor_webhook_id.clone().unwrap_or_default(),
			})
			.collect();
		let failed = results.len() - registrations.len();
		if failed > 0 {
			warn!(platform = %kind, failed, "Some webhook topics failed to register");
		}
		info!(platform = %kind, registered = registrations.len(), "Webhooks set up");
		self.webhooks.insert(kind, registrations);
	}

	pub async fn setup_all_webhooks(&self) -> BTreeMap<PlatformKind, Option<Vec<WebhookSetupResult>>> {
		let base_url = self.settings.webhook_base_url.clone();
		let results = self
			.fan_out("Webhook setup", |adapter| {
				let base_url = base_url.clone();
				async move { adapter.setup_webhooks(&base_url).await }
			})
			.await;
		for (kind, outcome) in &results {
			if let (Some(outcome), Some(adapter)) = (outcome, self.adapters.get(kind)) {
				self.record_registrations(*kind, adapter.as_ref(), outcome);
			}
		}
		results
	}

	/// Entry point for raw inbound deliveries: checks the signature against
	/// the exact body bytes, then decodes and dispatches.
	pub async fn receive_webhook(
		&self,
		name: &str,
		topic: &str,
		body: &[u8],
		signature: Option<&str>,
	) -> Result<OrderLifecycleEvent, CommerceError> {
		let (kind, adapter) = self.connected(name)?;
		let verified = self.verify_delivery(adapter.as_ref(), body, signature).and_then(|_| {
			serde_json::from_slice::<Value>(body)
				.map_err(|e| CommerceError::InvalidPayload(e.to_string()))
		});
		match verified {
			Ok(payload) => self.dispatch_webhook(kind, adapter, &payload, topic).await,
			Err(e) => Err(self.reject_webhook(kind, topic, e)),
		}
	}

	fn verify_delivery(
		&self,
		adapter: &dyn CommerceInterface,
		body: &[u8],
		signature: Option<&str>,
	) -> Result<(), CommerceError> {
		// Only platforms without a signing scheme are accepted unsigned.
		let Some(scheme) = adapter.signature_scheme() else {
			return Ok(());
		};
		let Some(secret) = adapter.webhook_secret() else {
			warn!(
				platform = %adapter.platform(),
				"No webhook secret configured for a signed platform"
			);
			return Err(CommerceError::InvalidSignature);
		};
		match signature {
			Some(provided) if scheme.verify(secret, body, provided) => Ok(()),
			_ => Err(CommerceError::InvalidSignature),
		}
	}

	/// Dispatches an already decoded payload. The platform must be connected.
	pub async fn process_webhook(
		&self,
		name: &str,
		payload: &Value,
		topic: &str,
	) -> Result<OrderLifecycleEvent, CommerceError> {
		let (kind, adapter) = self.connected(name)?;
		self.dispatch_webhook(kind, adapter, payload, topic).await
	}

	async fn dispatch_webhook(
		&self,
		kind: PlatformKind,
		adapter: &Arc<dyn CommerceInterface>,
		payload: &Value,
		topic: &str,
	) -> Result<OrderLifecycleEvent, CommerceError> {
		match self.call(adapter.process_webhook(payload, topic)).await {
			Ok(event) => {
				debug!(platform = %kind, topic, order_id = %event.order_id, "Webhook processed");
				self.events.commerce(CommerceEvent::WebhookProcessed {
					platform: kind,
					topic: event.topic,
					order_id: event.order_id.clone(),
				});
				Ok(event)
			}
			Err(e) => Err(self.reject_webhook(kind, topic, e)),
		}
	}

	fn reject_webhook(&self, kind: PlatformKind, topic: &str, error: CommerceError) -> CommerceError {
		warn!(platform = %kind, topic, error = %error, "Webhook rejected");
		self.events.commerce(CommerceEvent::WebhookRejected {
			platform: kind,
			topic: topic.to_string(),
			reason: error.to_string(),
		});
		error
	}

	/// Liveness probe for every connected platform. Unhealthy platforms stay
	/// connected.
	pub async fn get_platform_health(&self) -> BTreeMap<PlatformKind, PlatformHealth> {
		let probes = self.connected_adapters().into_iter().map(|(kind, adapter)| async move {
			let health = match self.call(adapter.validate_session()).await {
				Ok(true) => PlatformHealth::healthy(),
				Ok(false) => PlatformHealth::unhealthy(Some("session rejected by vendor".to_string())),
				Err(e) => PlatformHealth::unhealthy(Some(e.to_string())),
			};
			(kind, health)
		});
		join_all(probes).await.into_iter().collect()
	}

	/// Connection state for every registered platform, connected or not.
	pub fn get_connection_status(&self) -> BTreeMap<PlatformKind, ConnectionState> {
		self.adapters
			.keys()
			.map(|kind| {
				let state = match self.connections.get(kind) {
					Some(connection) => ConnectionState {
						connected: connection.status == ConnectionStatus::Connected,
						connected_at: Some(connection.connected_at),
						status: connection.status,
					},
					None => ConnectionState {
						connected: false,
						connected_at: None,
						status: ConnectionStatus::Disconnected,
					},
				};
				(*kind, state)
			})
			.collect()
	}

	pub fn supported_platforms(&self) -> Vec<PlatformKind> {
		let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
		kinds.sort();
		kinds
	}

	pub fn platform_info(&self, name: &str) -> Result<PlatformInfo, CommerceError> {
		let (kind, _) = self.resolve(name)?;
		Ok(platform_info(kind))
	}

	/// Header an inbound delivery for `name` carries its signature in, if the
	/// platform signs deliveries at all.
	pub fn signature_header(&self, name: &str) -> Result<Option<&'static str>, CommerceError> {
		let (_, adapter) = self.resolve(name)?;
		Ok(adapter.signature_scheme().map(|scheme| scheme.header))
	}

	pub fn connected_platforms(&self) -> Vec<PlatformKind> {
		let mut kinds: Vec<_> = self.connections.iter().map(|e| *e.key()).collect();
		kinds.sort();
		kinds
	}

	pub fn is_connected(&self, kind: PlatformKind) -> bool {
		self.connections.contains_key(&kind)
	}

	pub fn connection(&self, kind: PlatformKind) -> Option<PlatformConnection> {
		self.connections.get(&kind).map(|c| c.clone())
	}

	pub fn webhook_registrations(&self) -> Vec<WebhookRegistration> {
		let mut all: Vec<_> = self
			.webhooks
			.iter()
			.flat_map(|entry| entry.value().clone())
			.collect();
		all.sort_by(|a, b| a.platform.cmp(&b.platform).then_with(|| a.topic.cmp(&b.topic)));
		all
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::simulated::SimulatedPlatform;
	use crate::SignatureScheme;
	use idev_types::{PlatformEvent, WebhookTopic};
	use serde_json::json;

	fn shopify_creds(token: &str) -> PlatformCredentials {
		PlatformCredentials::AccessToken {
			shop_domain: "demo.myshopify.com".into(),
			access_token: token.into(),
		}
	}

	fn wix_creds() -> PlatformCredentials {
		PlatformCredentials::InstanceToken {
			instance_id: "inst".into(),
			access_token: "wix-token".into(),
		}
	}

	fn service_with(
		adapters: Vec<Arc<dyn CommerceInterface>>,
		settings: CommerceSettings,
	) -> CommerceService {
		CommerceService::new(adapters, settings, EventBus::default(), CancellationToken::new())
	}

	fn all_simulated() -> Vec<Arc<dyn CommerceInterface>> {
		PlatformKind::ALL
			.iter()
			.map(|kind| {
				Arc::new(
					SimulatedPlatform::new(*kind)
						.with_sample_orders()
						.with_accepted_secret("good"),
				) as Arc<dyn CommerceInterface>
			})
			.collect()
	}

	#[tokio::test]
	async fn test_bad_credentials_never_create_entry() {
		let service = service_with(all_simulated(), CommerceSettings::default());
		for kind in PlatformKind::ALL {
			let creds = match kind {
				PlatformKind::Shopify => shopify_creds("bad"),
				PlatformKind::WooCommerce => PlatformCredentials::ConsumerKey {
					site_url: "https://shop.example.com".into(),
					consumer_key: "ck".into(),
					consumer_secret: "bad".into(),
				},
				PlatformKind::Wix => wix_creds(),
				PlatformKind::EasyOrder => PlatformCredentials::ClientCredentials {
					merchant_id: "m".into(),
					api_key: "k".into(),
					api_secret: "bad".into(),
				},
			};
			assert!(service.connect_platform(kind.as_str(), creds).await.is_err());
			assert!(!service.is_connected(kind));
		}
		// Wrong credential shape is an authentication failure too.
		assert!(matches!(
			service.connect_platform("shopify", wix_creds()).await,
			Err(CommerceError::Authentication(_))
		));
		assert!(service.connected_platforms().is_empty());
	}

	#[tokio::test]
	async fn test_connect_then_disconnect() {
		let service = service_with(all_simulated(), CommerceSettings::default());
		let mut events = service.events.subscribe();

		service.connect_platform("shopify", shopify_creds("good")).await.unwrap();
		assert!(service.get_connection_status()[&PlatformKind::Shopify].connected);
		assert!(matches!(
			events.recv().await.unwrap(),
			PlatformEvent::Commerce(CommerceEvent::Connected { .. })
		));

		service.disconnect_platform("shopify").await.unwrap();
		let status = service.get_connection_status();
		assert!(!status[&PlatformKind::Shopify].connected);
		assert_eq!(status[&PlatformKind::Shopify].status, ConnectionStatus::Disconnected);
		assert_eq!(status.len(), 4);

		assert!(matches!(
			service.disconnect_platform("shopify").await,
			Err(CommerceError::NotConnected(PlatformKind::Shopify))
		));
		assert!(matches!(
			service.connect_platform("magento", shopify_creds("good")).await,
			Err(CommerceError::UnsupportedPlatform(_))
		));
	}

	#[tokio::test]
	async fn test_aggregates_cover_connected_platforms_only() {
		let failing = Arc::new(
			SimulatedPlatform::new(PlatformKind::Wix)
				.with_sample_orders()
				.failing_orders(),
		);
		let adapters: Vec<Arc<dyn CommerceInterface>> = vec![
			Arc::new(SimulatedPlatform::new(PlatformKind::Shopify).with_sample_orders()),
			failing.clone(),
			Arc::new(SimulatedPlatform::new(PlatformKind::EasyOrder).with_sample_orders()),
		];
		let service = service_with(adapters, CommerceSettings::default());
		service.connect_platform("shopify", shopify_creds("tok")).await.unwrap();
		service.connect_platform("wix", wix_creds()).await.unwrap();

		let orders = service.get_all_orders(2).await;
		assert_eq!(orders.len(), 2);
		assert_eq!(orders[&PlatformKind::Shopify].as_ref().unwrap().len(), 2);
		assert!(orders[&PlatformKind::Wix].is_none());
		assert!(!orders.contains_key(&PlatformKind::EasyOrder));

		let analytics = service.get_all_analytics(AnalyticsPeriod::days(30)).await;
		assert_eq!(analytics[&PlatformKind::Shopify].as_ref().unwrap().total_orders, 3);
		assert!(analytics[&PlatformKind::Wix].is_none());

		failing.set_failing_orders(false);
		let orders = service.get_all_orders(10).await;
		assert_eq!(orders[&PlatformKind::Wix].as_ref().unwrap().len(), 3);
	}

	#[tokio::test]
	async fn test_reject_policy() {
		let settings = CommerceSettings {
			reconnect_policy: ReconnectPolicy::Reject,
			..Default::default()
		};
		let service = service_with(all_simulated(), settings);
		service.connect_platform("shopify", shopify_creds("good")).await.unwrap();
		assert!(matches!(
			service.connect_platform("shopify", shopify_creds("good")).await,
			Err(CommerceError::AlreadyConnected(PlatformKind::Shopify))
		));
	}

	#[tokio::test]
	async fn test_concurrent_connects_leave_one_consistent_record() {
		let adapter = Arc::new(
			SimulatedPlatform::new(PlatformKind::Shopify).with_latency(Duration::from_millis(20)),
		);
		let service = service_with(vec![adapter.clone()], CommerceSettings::default());

		let (a, b) = tokio::join!(
			service.connect_platform("shopify", shopify_creds("token-a")),
			service.connect_platform("shopify", shopify_creds("token-b")),
		);
		assert!(a.is_ok() && b.is_ok());
		assert_eq!(service.connected_platforms(), vec![PlatformKind::Shopify]);

		let recorded = service.connection(PlatformKind::Shopify).unwrap();
		let session = adapter.session_secret().await.unwrap();
		assert_eq!(recorded.credentials.secret(), session);
	}

	#[tokio::test]
	async fn test_slow_vendor_times_out() {
		let adapter = Arc::new(
			SimulatedPlatform::new(PlatformKind::Shopify).with_latency(Duration::from_millis(200)),
		);
		let settings = CommerceSettings {
			request_timeout: Duration::from_millis(20),
			..Default::default()
		};
		let service = service_with(vec![adapter], settings);
		assert!(matches!(
			service.connect_platform("shopify", shopify_creds("tok")).await,
			Err(CommerceError::Timeout)
		));
		assert!(!service.is_connected(PlatformKind::Shopify));
	}

	#[tokio::test]
	async fn test_cancelled_service_refuses_calls() {
		let shutdown = CancellationToken::new();
		let service = CommerceService::new(
			all_simulated(),
			CommerceSettings::default(),
			EventBus::default(),
			shutdown.clone(),
		);
		shutdown.cancel();
		assert!(matches!(
			service.connect_platform("shopify", shopify_creds("good")).await,
			Err(CommerceError::Cancelled)
		));
	}

	#[tokio::test]
	async fn test_webhooks_recorded_and_verified() {
		let adapter = Arc::new(
			SimulatedPlatform::new(PlatformKind::Shopify)
				.with_webhook_secret("hush")
				.with_failing_topic("orders/paid"),
		);
		let service = service_with(vec![adapter], CommerceSettings::default());

		assert!(matches!(
			service.process_webhook("shopify", &json!({ "id": 1 }), "orders/create").await,
			Err(CommerceError::NotConnected(_))
		));

		service.connect_platform("shopify", shopify_creds("tok")).await.unwrap();
		let results = service.setup_platform_webhooks("shopify").await.unwrap();
		assert_eq!(results.len(), 4);
		let registrations = service.webhook_registrations();
		assert_eq!(registrations.len(), 3);
		assert!(registrations
			.iter()
			.all(|r| r.delivery_url.starts_with("http://127.0.0.1:3000/api/webhooks/shopify/")));

		let body = br#"{"id": 99, "status": "paid", "total": "10.00"}"#;
		let scheme = SignatureScheme::base64("X-Shopify-Hmac-Sha256");
		let signature = scheme.sign("hush", body).unwrap();

		let event = service
			.receive_webhook("shopify", "orders/create", body, Some(&signature))
			.await
			.unwrap();
		assert_eq!(event.topic, WebhookTopic::OrderCreated);
		assert_eq!(event.order.unwrap().id, "99");

		assert!(matches!(
			service.receive_webhook("shopify", "orders/create", body, Some("forged")).await,
			Err(CommerceError::InvalidSignature)
		));
		assert!(matches!(
			service.receive_webhook("shopify", "orders/create", body, None).await,
			Err(CommerceError::InvalidSignature)
		));
		assert!(matches!(
			service.process_webhook("shopify", &json!({ "id": 1 }), "orders/deleted").await,
			Err(CommerceError::UnknownWebhookTopic(_))
		));
	}

	#[tokio::test]
	async fn test_signed_platform_without_secret_rejects_deliveries() {
		let service = service_with(all_simulated(), CommerceSettings::default());
		let signed = [
			(PlatformKind::Shopify, "orders/create", shopify_creds("good")),
			(
				PlatformKind::WooCommerce,
				"order.created",
				PlatformCredentials::ConsumerKey {
					site_url: "https://shop.example".into(),
					consumer_key: "ck".into(),
					consumer_secret: "good".into(),
				},
			),
			(
				PlatformKind::EasyOrder,
				"order.created",
				PlatformCredentials::ClientCredentials {
					merchant_id: "m-1".into(),
					api_key: "key".into(),
					api_secret: "good".into(),
				},
			),
		];
		let body = br#"{"id": 7, "status": "pending"}"#;
		let scheme = SignatureScheme::base64("X-Any");
		let forged = scheme.sign("guess", body).unwrap();

		for (kind, topic, credentials) in signed {
			service.connect_platform(kind.as_str(), credentials).await.unwrap();
			assert!(
				matches!(
					service.receive_webhook(kind.as_str(), topic, body, None).await,
					Err(CommerceError::InvalidSignature)
				),
				"{} accepted an unsigned delivery",
				kind
			);
			assert!(matches!(
				service.receive_webhook(kind.as_str(), topic, body, Some(&forged)).await,
				Err(CommerceError::InvalidSignature)
			));
		}

		// Wix has no signing scheme and stays accepted unsigned.
		let wix = PlatformCredentials::InstanceToken {
			instance_id: "inst".into(),
			access_token: "good".into(),
		};
		service.connect_platform("wix", wix).await.unwrap();
		assert!(service
			.receive_webhook("wix", "orders/created", body, None)
			.await
			.is_ok());
	}

	#[tokio::test]
	async fn test_health_probe_does_not_evict() {
		let adapter = Arc::new(SimulatedPlatform::new(PlatformKind::Shopify));
		let service = service_with(vec![adapter.clone()], CommerceSettings::default());
		service.connect_platform("shopify", shopify_creds("tok")).await.unwrap();

		adapter.set_healthy(false);
		let health = service.get_platform_health().await;
		assert!(!health[&PlatformKind::Shopify].is_healthy());
		assert!(service.is_connected(PlatformKind::Shopify));

		service.evict(PlatformKind::Shopify, "health probe failed").await.unwrap();
		assert!(!service.is_connected(PlatformKind::Shopify));
		assert!(adapter.session_secret().await.is_none());
	}

	#[tokio::test]
	async fn test_shipment_flow() {
		let service = service_with(all_simulated(), CommerceSettings::default());
		service.connect_platform("shopify", shopify_creds("good")).await.unwrap();

		let orders = service
			.get_platform_orders("shopify", &OrderQuery::new(10))
			.await
			.unwrap();
		assert!(orders.len() <= 10);
		let order_id = orders[0].id.clone();

		let label = service
			.create_shipment("shopify", &order_id, &ShippingRequest::with_tracking_number("TRK1"))
			.await
			.unwrap();
		assert_eq!(label.tracking_number, "TRK1");
		let order = service.get_order("shopify", &order_id).await.unwrap();
		assert!(order.stage.is_shipped_or_later());

		service
			.update_shipment_status("shopify", &order_id, ShipmentStatus::Delivered, None)
			.await
			.unwrap();
		let order = service.get_order("shopify", &order_id).await.unwrap();
		assert_eq!(order.stage, idev_types::OrderStage::Delivered);
	}

	#[test]
	fn test_signature_headers() {
		let service = service_with(all_simulated(), CommerceSettings::default());
		assert_eq!(
			service.signature_header("shopify").unwrap(),
			Some("X-Shopify-Hmac-Sha256")
		);
		assert_eq!(service.signature_header("wix").unwrap(), None);
		assert!(matches!(
			service.signature_header("magento"),
			Err(CommerceError::UnsupportedPlatform(_))
		));
	}
}
