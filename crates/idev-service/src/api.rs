//! HTTP API over the commerce and payment orchestrators.

use axum::{
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use bytes::Bytes;
use idev_commerce::CommerceError;
use idev_core::Engine;
use idev_payment::PaymentError;
use idev_types::{
	AnalyticsPeriod, InvalidPeriod, OrderQuery, PaymentRequest, PlatformCredentials,
	ShipmentStatus, ShippingRequest,
};
use idev_wallet::{ProviderError, WalletError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument};

#[derive(Clone)]
struct AppState {
	engine: Arc<Engine>,
}

pub fn router(engine: Arc<Engine>) -> Router {
	Router::new()
		.route("/health", get(health_check))
		// Commerce
		.route("/api/platforms", get(list_platforms))
		.route("/api/platforms/status", get(connection_status))
		.route("/api/platforms/{platform}/connect", post(connect_platform))
		.route("/api/platforms/{platform}/disconnect", post(disconnect_platform))
		.route("/api/platforms/{platform}/orders", get(platform_orders))
		.route("/api/platforms/{platform}/orders/{order_id}", get(platform_order))
		.route(
			"/api/platforms/{platform}/orders/{order_id}/status",
			post(update_order_status),
		)
		.route(
			"/api/platforms/{platform}/orders/{order_id}/shipments",
			post(create_shipment),
		)
		.route(
			"/api/platforms/{platform}/orders/{order_id}/shipment-status",
			post(update_shipment_status),
		)
		.route("/api/platforms/{platform}/analytics", get(platform_analytics))
		.route("/api/platforms/{platform}/products", get(platform_products))
		.route("/api/platforms/{platform}/customers", get(platform_customers))
		.route("/api/platforms/{platform}/webhooks", post(setup_platform_webhooks))
		.route("/api/orders", get(all_orders))
		.route("/api/analytics", get(all_analytics))
		.route("/api/webhooks", get(webhook_registrations))
		.route("/api/webhooks/setup", post(setup_webhooks))
		.route("/api/webhooks/{platform}/{*topic}", post(receive_webhook))
		// Payments
		.route("/api/wallets", get(active_wallets))
		.route("/api/wallets/{wallet}/connect", post(connect_wallet))
		.route("/api/wallets/{wallet}/disconnect", post(disconnect_wallet))
		.route("/api/wallets/{wallet}/switch-chain", post(switch_chain))
		.route("/api/balance", get(balance))
		.route("/api/payments", get(payment_history).post(process_payment))
		.route("/api/payments/failures", get(payment_failures))
		.route("/api/chains", get(supported_chains))
		.route("/api/payment-methods", get(payment_methods))
		.with_state(AppState { engine })
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

#[instrument(skip(engine))]
pub async fn start_http_server(engine: Arc<Engine>, host: String, port: u16) -> anyhow::Result<()> {
	let app = router(engine);
	let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

	info!("API server listening on {}:{}", host, port);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Error body: `{"error": <code>, "message": <text>}`.
#[derive(Debug)]
pub enum ApiError {
	Commerce(CommerceError),
	Payment(PaymentError),
	BadRequest(String),
}

impl From<CommerceError> for ApiError {
	fn from(err: CommerceError) -> Self {
		ApiError::Commerce(err)
	}
}

impl From<PaymentError> for ApiError {
	fn from(err: PaymentError) -> Self {
		ApiError::Payment(err)
	}
}

fn classify_wallet(err: &WalletError) -> (StatusCode, &'static str) {
	match err {
		WalletError::Provider(e) if e.code == ProviderError::USER_REJECTED => {
			(StatusCode::BAD_REQUEST, "user_rejected")
		}
		WalletError::Provider(_) | WalletError::InvalidResponse(_) | WalletError::NoAccounts(_) => {
			(StatusCode::BAD_GATEWAY, "wallet_provider_error")
		}
		WalletError::ChainSwitch(_) => (StatusCode::BAD_GATEWAY, "chain_switch_failed"),
		WalletError::ProviderMissing(_) => (StatusCode::SERVICE_UNAVAILABLE, "provider_missing"),
		WalletError::NotConnected(_) => (StatusCode::NOT_FOUND, "not_connected"),
		WalletError::UnsupportedWallet(_) => (StatusCode::BAD_REQUEST, "unsupported_wallet"),
		WalletError::UnsupportedChain { .. } => (StatusCode::BAD_REQUEST, "unsupported_chain"),
		WalletError::UnknownToken { .. }
		| WalletError::InvalidAmount(_)
		| WalletError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
		WalletError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
	}
}

impl ApiError {
	fn classify(&self) -> (StatusCode, &'static str) {
		match self {
			ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
			ApiError::Commerce(err) => match err {
				CommerceError::Authentication(_) => (StatusCode::UNAUTHORIZED, "authentication_failed"),
				CommerceError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
				CommerceError::Network(_) | CommerceError::Http { .. } => {
					(StatusCode::BAD_GATEWAY, "vendor_error")
				}
				CommerceError::UnsupportedPlatform(_) => (StatusCode::NOT_FOUND, "unsupported_platform"),
				CommerceError::NotConnected(_) => (StatusCode::NOT_FOUND, "not_connected"),
				CommerceError::UnknownWebhookTopic(_) => (StatusCode::NOT_FOUND, "unknown_webhook_topic"),
				CommerceError::AlreadyConnected(_) => (StatusCode::CONFLICT, "already_connected"),
				CommerceError::InvalidPayload(_) | CommerceError::InvalidRequest(_) => {
					(StatusCode::BAD_REQUEST, "invalid_request")
				}
				CommerceError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
				CommerceError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
				CommerceError::Configuration(_) => {
					(StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
				}
			},
			ApiError::Payment(err) => match err {
				PaymentError::UnsupportedPaymentMethod(_) => {
					(StatusCode::BAD_REQUEST, "unsupported_payment_method")
				}
				PaymentError::UnsupportedWallet(_) => (StatusCode::BAD_REQUEST, "unsupported_wallet"),
				PaymentError::UnsupportedChain(_) => (StatusCode::BAD_REQUEST, "unsupported_chain"),
				PaymentError::NotConnected(_) => (StatusCode::NOT_FOUND, "not_connected"),
				PaymentError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
				PaymentError::Wallet(e) => classify_wallet(e),
				PaymentError::Gateway(_) => (StatusCode::BAD_GATEWAY, "gateway_error"),
				PaymentError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
				PaymentError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
				PaymentError::Storage(_) | PaymentError::Configuration(_) => {
					(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
				}
			},
		}
	}

	fn message(&self) -> String {
		match self {
			ApiError::Commerce(e) => e.to_string(),
			ApiError::Payment(e) => e.to_string(),
			ApiError::BadRequest(message) => message.clone(),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, code) = self.classify();
		let body = Json(json!({ "error": code, "message": self.message() }));
		(status, body).into_response()
	}
}

type ApiResult<T> = Result<T, ApiError>;

/// Connected platforms are probed; the service itself is always up unless
/// shutting down.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
	let engine = &state.engine;
	let status = if engine.is_shut_down() {
		StatusCode::SERVICE_UNAVAILABLE
	} else {
		StatusCode::OK
	};
	let platforms = engine.commerce().get_platform_health().await;
	(
		status,
		Json(json!({
			"status": if status == StatusCode::OK { "ok" } else { "shutting_down" },
			"platforms": platforms,
			"wallets": engine.payment().active_connections().len(),
			"timestamp": chrono::Utc::now().timestamp(),
		})),
	)
}

async fn list_platforms(State(state): State<AppState>) -> Json<Value> {
	let commerce = state.engine.commerce();
	let platforms: Vec<Value> = commerce
		.supported_platforms()
		.into_iter()
		.map(|kind| {
			json!({
				"platform": kind,
				"info": idev_types::platform_info(kind),
				"connected": commerce.is_connected(kind),
			})
		})
		.collect();
	Json(json!({ "platforms": platforms }))
}

async fn connection_status(State(state): State<AppState>) -> Json<Value> {
	Json(json!(state.engine.commerce().get_connection_status()))
}

async fn connect_platform(
	State(state): State<AppState>,
	Path(platform): Path<String>,
	Json(credentials): Json<PlatformCredentials>,
) -> ApiResult<Json<Value>> {
	let connection = state
		.engine
		.commerce()
		.connect_platform(&platform, credentials)
		.await?;
	// Never echo credentials back.
	Ok(Json(json!({
		"platform": connection.platform,
		"identity": connection.identity,
		"status": connection.status,
		"connectedAt": connection.connected_at,
	})))
}

async fn disconnect_platform(
	State(state): State<AppState>,
	Path(platform): Path<String>,
) -> ApiResult<StatusCode> {
	state.engine.commerce().disconnect_platform(&platform).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct OrdersParams {
	limit: Option<u32>,
	status: Option<String>,
}

impl OrdersParams {
	fn query(&self) -> OrderQuery {
		OrderQuery {
			limit: self.limit.unwrap_or(OrderQuery::DEFAULT_LIMIT),
			status: self.status.clone(),
		}
	}
}

async fn platform_orders(
	State(state): State<AppState>,
	Path(platform): Path<String>,
	Query(params): Query<OrdersParams>,
) -> ApiResult<Json<Value>> {
	let orders = state
		.engine
		.commerce()
		.get_platform_orders(&platform, &params.query())
		.await?;
	Ok(Json(json!({ "orders": orders })))
}

async fn platform_order(
	State(state): State<AppState>,
	Path((platform, order_id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
	let order = state.engine.commerce().get_order(&platform, &order_id).await?;
	Ok(Json(json!(order)))
}

#[derive(Debug, Deserialize)]
struct OrderStatusUpdate {
	status: String,
	note: Option<String>,
}

async fn update_order_status(
	State(state): State<AppState>,
	Path((platform, order_id)): Path<(String, String)>,
	Json(update): Json<OrderStatusUpdate>,
) -> ApiResult<Json<Value>> {
	let order = state
		.engine
		.commerce()
		.update_order_status(&platform, &order_id, &update.status, update.note.as_deref())
		.await?;
	Ok(Json(json!(order)))
}

#[derive(Debug, Deserialize)]
struct LimitParams {
	limit: Option<u32>,
}

async fn platform_products(
	State(state): State<AppState>,
	Path(platform): Path<String>,
	Query(params): Query<LimitParams>,
) -> ApiResult<Json<Value>> {
	let limit = params.limit.unwrap_or(OrderQuery::DEFAULT_LIMIT);
	let products = state
		.engine
		.commerce()
		.get_platform_products(&platform, limit)
		.await?;
	Ok(Json(json!({ "products": products })))
}

async fn platform_customers(
	State(state): State<AppState>,
	Path(platform): Path<String>,
	Query(params): Query<LimitParams>,
) -> ApiResult<Json<Value>> {
	let limit = params.limit.unwrap_or(OrderQuery::DEFAULT_LIMIT);
	let customers = state
		.engine
		.commerce()
		.get_platform_customers(&platform, limit)
		.await?;
	Ok(Json(json!({ "customers": customers })))
}

async fn all_orders(
	State(state): State<AppState>,
	Query(params): Query<OrdersParams>,
) -> Json<Value> {
	let limit = params.limit.unwrap_or(OrderQuery::DEFAULT_LIMIT);
	Json(json!(state.engine.commerce().get_all_orders(limit).await))
}

async fn create_shipment(
	State(state): State<AppState>,
	Path((platform, order_id)): Path<(String, String)>,
	Json(request): Json<ShippingRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
	let label = state
		.engine
		.commerce()
		.create_shipment(&platform, &order_id, &request)
		.await?;
	Ok((StatusCode::CREATED, Json(json!(label))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShipmentStatusUpdate {
	status: ShipmentStatus,
	tracking_number: Option<String>,
}

async fn update_shipment_status(
	State(state): State<AppState>,
	Path((platform, order_id)): Path<(String, String)>,
	Json(update): Json<ShipmentStatusUpdate>,
) -> ApiResult<StatusCode> {
	state
		.engine
		.commerce()
		.update_shipment_status(
			&platform,
			&order_id,
			update.status,
			update.tracking_number.as_deref(),
		)
		.await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PeriodParams {
	period: Option<String>,
}

impl PeriodParams {
	fn period(&self) -> ApiResult<AnalyticsPeriod> {
		match &self.period {
			Some(raw) => raw
				.parse()
				.map_err(|e: InvalidPeriod| ApiError::BadRequest(e.to_string())),
			None => Ok(AnalyticsPeriod::default()),
		}
	}
}

async fn platform_analytics(
	State(state): State<AppState>,
	Path(platform): Path<String>,
	Query(params): Query<PeriodParams>,
) -> ApiResult<Json<Value>> {
	let report = state
		.engine
		.commerce()
		.get_platform_analytics(&platform, params.period()?)
		.await?;
	Ok(Json(json!(report)))
}

async fn all_analytics(
	State(state): State<AppState>,
	Query(params): Query<PeriodParams>,
) -> ApiResult<Json<Value>> {
	let period = params.period()?;
	Ok(Json(json!(state.engine.commerce().get_all_analytics(period).await)))
}

async fn setup_webhooks(State(state): State<AppState>) -> Json<Value> {
	Json(json!(state.engine.commerce().setup_all_webhooks().await))
}

async fn setup_platform_webhooks(
	State(state): State<AppState>,
	Path(platform): Path<String>,
) -> ApiResult<Json<Value>> {
	let results = state
		.engine
		.commerce()
		.setup_platform_webhooks(&platform)
		.await?;
	Ok(Json(json!({ "results": results })))
}

async fn webhook_registrations(State(state): State<AppState>) -> Json<Value> {
	let registrations: Vec<Value> = state
		.engine
		.commerce()
		.webhook_registrations()
		.into_iter()
		.map(|r| {
			json!({
				"platform": r.platform,
				"topic": r.topic,
				"deliveryUrl": r.delivery_url,
				"vendorWebhookId": r.vendor_webhook_id,
			})
		})
		.collect();
	Json(json!({ "webhooks": registrations }))
}

/// Raw body in, so the signature is checked against the exact bytes the
/// vendor signed.
async fn receive_webhook(
	State(state): State<AppState>,
	Path((platform, topic)): Path<(String, String)>,
	headers: HeaderMap,
	body: Bytes,
) -> ApiResult<Json<Value>> {
	let commerce = state.engine.commerce();
	let signature = commerce
		.signature_header(&platform)?
		.and_then(|header| headers.get(header))
		.and_then(|value| value.to_str().ok());
	let event = commerce
		.receive_webhook(&platform, &topic, &body, signature)
		.await?;
	Ok(Json(json!(event)))
}

async fn active_wallets(State(state): State<AppState>) -> Json<Value> {
	Json(json!({ "connections": state.engine.payment().active_connections() }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectWalletBody {
	#[serde(default)]
	chain_id: Option<String>,
}

async fn connect_wallet(
	State(state): State<AppState>,
	Path(wallet): Path<String>,
	Json(body): Json<ConnectWalletBody>,
) -> ApiResult<Json<Value>> {
	let connection = state
		.engine
		.payment()
		.connect_wallet(&wallet, body.chain_id.as_deref())
		.await?;
	Ok(Json(json!(connection)))
}

async fn disconnect_wallet(
	State(state): State<AppState>,
	Path(wallet): Path<String>,
) -> ApiResult<StatusCode> {
	state.engine.payment().disconnect_wallet(&wallet).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchChainBody {
	chain_id: String,
}

async fn switch_chain(
	State(state): State<AppState>,
	Path(wallet): Path<String>,
	Json(body): Json<SwitchChainBody>,
) -> ApiResult<Json<Value>> {
	let connection = state
		.engine
		.payment()
		.switch_chain(&wallet, &body.chain_id)
		.await?;
	Ok(Json(json!(connection)))
}

#[derive(Debug, Deserialize)]
struct BalanceParams {
	address: String,
	currency: String,
	chain: Option<String>,
}

async fn balance(
	State(state): State<AppState>,
	Query(params): Query<BalanceParams>,
) -> ApiResult<Json<Value>> {
	let balance = state
		.engine
		.payment()
		.get_balance(&params.address, &params.currency, params.chain.as_deref())
		.await?;
	Ok(Json(json!({
		"address": params.address,
		"currency": params.currency,
		"chain": params.chain.unwrap_or_else(|| "ethereum".to_string()),
		"balance": balance,
	})))
}

async fn process_payment(
	State(state): State<AppState>,
	Json(request): Json<PaymentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
	let record = state.engine.payment().process_payment(&request).await?;
	Ok((StatusCode::CREATED, Json(json!(record))))
}

async fn payment_history(State(state): State<AppState>) -> Json<Value> {
	Json(json!({ "payments": state.engine.payment().get_payment_history().await }))
}

async fn payment_failures(State(state): State<AppState>) -> ApiResult<Json<Value>> {
	let failures = state.engine.payment().failed_attempts().await?;
	Ok(Json(json!({ "failures": failures })))
}

async fn supported_chains(State(state): State<AppState>) -> Json<Value> {
	Json(json!({ "chains": state.engine.payment().supported_chains() }))
}

async fn payment_methods(State(state): State<AppState>) -> Json<Value> {
	Json(json!({ "methods": state.engine.payment().payment_methods() }))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use idev_config::ConfigLoader;
	use idev_core::EngineBuilder;
	use tower::ServiceExt;

	const CONFIG: &str = r#"
[service]
name = "idev-api-test"

[commerce.platforms.shopify]
implementation = "simulated"
accepted_secret = "good"
webhook_secret = "hush"

[commerce.platforms.wix]
implementation = "simulated"

[payment.wallets.metamask]
provider = "simulated"
"#;

	async fn app() -> Router {
		let config = ConfigLoader::new().parse(CONFIG).unwrap();
		let engine = EngineBuilder::new(config).build().unwrap();
		engine.init().await.unwrap();
		router(Arc::new(engine))
	}

	async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
		let request = Request::builder()
			.method(method)
			.uri(uri)
			.header("content-type", "application/json");
		let body = match body {
			Some(body) => Body::from(body.to_string()),
			None => Body::empty(),
		};
		let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let value = if bytes.is_empty() {
			Value::Null
		} else {
			serde_json::from_slice(&bytes).unwrap()
		};
		(status, value)
	}

	fn shopify_credentials(token: &str) -> Value {
		json!({ "type": "access_token", "shop_domain": "demo.myshopify.com", "access_token": token })
	}

	#[tokio::test]
	async fn test_error_statuses() {
		let app = app().await;

		let (status, body) = send(&app, "POST", "/api/platforms/shopify/connect", Some(shopify_credentials("bad"))).await;
		assert_eq!(status, StatusCode::UNAUTHORIZED);
		assert_eq!(body["error"], "authentication_failed");

		let (status, body) = send(&app, "GET", "/api/platforms/shopify/orders", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "not_connected");

		let (status, _) = send(&app, "GET", "/api/platforms/magento/orders", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);

		let (status, body) = send(&app, "GET", "/api/analytics?period=fortnight", None).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "invalid_request");
	}

	#[tokio::test]
	async fn test_connect_does_not_echo_credentials() {
		let app = app().await;
		let (status, body) = send(&app, "POST", "/api/platforms/shopify/connect", Some(shopify_credentials("good"))).await;
		assert_eq!(status, StatusCode::OK);
		assert!(body.get("credentials").is_none());
		assert_eq!(body["platform"], "shopify");

		let (_, status_body) = send(&app, "GET", "/api/platforms/status", None).await;
		assert_eq!(status_body["shopify"]["connected"], true);
		assert_eq!(status_body["wix"]["connected"], false);
	}

	#[tokio::test]
	async fn test_webhook_signature_checked() {
		let app = app().await;
		send(&app, "POST", "/api/platforms/shopify/connect", Some(shopify_credentials("good"))).await;

		let payload = json!({ "id": 4242, "total_price": "10.00", "currency": "USD" }).to_string();
		let unsigned = Request::builder()
			.method("POST")
			.uri("/api/webhooks/shopify/orders/create")
			.body(Body::from(payload.clone()))
			.unwrap();
		let response = app.clone().oneshot(unsigned).await.unwrap();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

		let signature = idev_commerce::implementations::shopify::SIGNATURE
			.sign("hush", payload.as_bytes())
			.unwrap();
		let signed = Request::builder()
			.method("POST")
			.uri("/api/webhooks/shopify/orders/create")
			.header("X-Shopify-Hmac-Sha256", signature)
			.body(Body::from(payload))
			.unwrap();
		let response = app.clone().oneshot(signed).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn test_payment_flow() {
		let app = app().await;
		let request = json!({
			"amount": "0.1",
			"currency": "ETH",
			"recipientAddress": "0x8ba1f109551bD432803012645Ac136ddd64DBA72",
			"paymentMethod": "crypto",
			"walletType": "metamask"
		});

		let (status, body) = send(&app, "POST", "/api/payments", Some(request.clone())).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "not_connected");

		let (status, _) = send(&app, "POST", "/api/wallets/metamask/connect", Some(json!({}))).await;
		assert_eq!(status, StatusCode::OK);

		let (status, body) = send(&app, "POST", "/api/payments", Some(request)).await;
		assert_eq!(status, StatusCode::CREATED);
		assert_eq!(body["walletType"], "metamask");

		let (_, history) = send(&app, "GET", "/api/payments", None).await;
		assert_eq!(history["payments"].as_array().unwrap().len(), 1);

		let (status, body) = send(
			&app,
			"POST",
			"/api/payments",
			Some(json!({ "amount": "1", "currency": "ETH", "recipientAddress": "x", "paymentMethod": "barter" })),
		)
		.await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["error"], "unsupported_payment_method");
	}

	#[tokio::test]
	async fn test_static_tables() {
		let app = app().await;
		let (_, chains) = send(&app, "GET", "/api/chains", None).await;
		assert!(chains["chains"].as_array().unwrap().len() >= 4);
		let (_, methods) = send(&app, "GET", "/api/payment-methods", None).await;
		assert_eq!(methods["methods"].as_array().unwrap().len(), 4);
	}
}
