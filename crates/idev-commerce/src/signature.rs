//! HMAC-SHA256 webhook signatures.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
	Base64,
	Hex,
}

/// Header carrying the signature and how the digest is encoded in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureScheme {
	pub header: &'static str,
	pub encoding: SignatureEncoding,
}

impl SignatureScheme {
	pub const fn base64(header: &'static str) -> Self {
		Self {
			header,
			encoding: SignatureEncoding::Base64,
		}
	}

	pub const fn hex(header: &'static str) -> Self {
		Self {
			header,
			encoding: SignatureEncoding::Hex,
		}
	}

	pub fn sign(&self, secret: &str, body: &[u8]) -> Option<String> {
		let digest = mac(secret, body)?.finalize().into_bytes();
		Some(match self.encoding {
			SignatureEncoding::Base64 => STANDARD.encode(digest),
			SignatureEncoding::Hex => hex::encode(digest),
		})
	}

	/// Constant-time check of `provided` against the body digest.
	pub fn verify(&self, secret: &str, body: &[u8], provided: &str) -> bool {
		let provided = provided.trim();
		let decoded = match self.encoding {
			SignatureEncoding::Base64 => STANDARD.decode(provided).ok(),
			SignatureEncoding::Hex => hex::decode(provided.trim_start_matches("sha256=")).ok(),
		};
		match (decoded, mac(secret, body)) {
			(Some(bytes), Some(mac)) => mac.verify_slice(&bytes).is_ok(),
			_ => false,
		}
	}
}

fn mac(secret: &str, body: &[u8]) -> Option<HmacSha256> {
	let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()?;
	mac.update(body);
	Some(mac)
}
