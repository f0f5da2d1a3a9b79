//! Access and refresh token values.
//!
//! Tokens travel inside the session payload and the login response, so they must serialize
//! as plain strings, yet nothing that formats a [`TokenRecord`](super::record::TokenRecord)
//! for a log line may print them.

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Bearer or refresh token whose formatters never reveal the value.
///
/// Serializes transparently as the raw token string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a token issued by the identity provider.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw token for the wire (form bodies, login payloads). Never log it.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Lowercase hex SHA-256 of the token.
	///
	/// Stable per token value, so it can key the per-refresh-token single-flight map without
	/// keeping the secret itself in memory twice.
	pub fn fingerprint(&self) -> String {
		Sha256::digest(self.0.as_bytes()).iter().map(|byte| format!("{byte:02x}")).collect()
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
