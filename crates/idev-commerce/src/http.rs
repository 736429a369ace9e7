//! Thin JSON client shared by the vendor adapters.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::CommerceError;

/// How a request authenticates against the vendor.
#[derive(Clone)]
pub enum Auth {
	/// Token in a vendor-specific header.
	Header(&'static str, String),
	Bearer(String),
	Basic { username: String, password: String },
	/// Raw `Authorization` header value.
	Raw(String),
}

impl std::fmt::Debug for Auth {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let kind = match self {
			Auth::Header(name, _) => *name,
			Auth::Bearer(_) => "bearer",
			Auth::Basic { .. } => "basic",
			Auth::Raw(_) => "raw",
		};
		write!(f, "Auth({})", kind)
	}
}

#[derive(Clone)]
pub struct VendorClient {
	client: reqwest::Client,
}

const MAX_ERROR_BODY: usize = 256;

impl VendorClient {
	pub fn new(timeout: Duration) -> Result<Self, CommerceError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.user_agent(concat!("idev-commerce/", env!("CARGO_PKG_VERSION")))
			.build()
			.map_err(|e| CommerceError::Configuration(format!("HTTP client: {}", e)))?;
		Ok(Self { client })
	}

	pub async fn get<T: DeserializeOwned>(
		&self,
		url: &str,
		auth: &Auth,
		query: &[(&str, String)],
	) -> Result<T, CommerceError> {
		self.send(Method::GET, url, auth, query, None).await
	}

	pub async fn post<T: DeserializeOwned>(
		&self,
		url: &str,
		auth: &Auth,
		body: &Value,
	) -> Result<T, CommerceError> {
		self.send(Method::POST, url, auth, &[], Some(body)).await
	}

	pub async fn put<T: DeserializeOwned>(
		&self,
		url: &str,
		auth: &Auth,
		body: &Value,
	) -> Result<T, CommerceError> {
		self.send(Method::PUT, url, auth, &[], Some(body)).await
	}

	pub async fn patch<T: DeserializeOwned>(
		&self,
		url: &str,
		auth: &Auth,
		body: &Value,
	) -> Result<T, CommerceError> {
		self.send(Method::PATCH, url, auth, &[], Some(body)).await
	}

	/// Form-encoded POST, used for OAuth token exchanges.
	pub async fn post_form<T: DeserializeOwned>(
		&self,
		url: &str,
		auth: &Auth,
		form: &[(&str, &str)],
	) -> Result<T, CommerceError> {
		let request = authorize(self.client.post(url), auth).form(form);
		execute(request).await
	}

	pub async fn send<T: DeserializeOwned>(
		&self,
		method: Method,
		url: &str,
		auth: &Auth,
		query: &[(&str, String)],
		body: Option<&Value>,
	) -> Result<T, CommerceError> {
		tracing::debug!(%method, url, "Vendor request");
		let mut request = authorize(self.client.request(method, url), auth);
		if !query.is_empty() {
			request = request.query(query);
		}
		if let Some(body) = body {
			request = request.json(body);
		}
		execute(request).await
	}
}

fn authorize(request: RequestBuilder, auth: &Auth) -> RequestBuilder {
	match auth {
		Auth::Header(name, token) => request.header(*name, token),
		Auth::Bearer(token) => request.bearer_auth(token),
		Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
		Auth::Raw(value) => request.header(reqwest::header::AUTHORIZATION, value),
	}
}

async fn execute<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, CommerceError> {
	let response = request.send().await.map_err(transport_error)?;
	let status = response.status();

	if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
		return Err(CommerceError::Authentication(format!(
			"vendor rejected credentials ({})",
			status.as_u16()
		)));
	}

	if !status.is_success() {
		let mut message = response.text().await.unwrap_or_default();
		if message.len() > MAX_ERROR_BODY {
			let cut = (0..=MAX_ERROR_BODY)
				.rev()
				.find(|i| message.is_char_boundary(*i))
				.unwrap_or(0);
			message.truncate(cut);
		}
		return Err(CommerceError::Http {
			status: status.as_u16(),
			message,
		});
	}

	let bytes = response.bytes().await.map_err(transport_error)?;
	// Some vendors answer 201/204 with an empty body.
	let slice: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
	serde_json::from_slice(slice).map_err(|e| CommerceError::InvalidPayload(e.to_string()))
}

fn transport_error(err: reqwest::Error) -> CommerceError {
	if err.is_timeout() {
		CommerceError::Timeout
	} else {
		CommerceError::Network(err.to_string())
	}
}
