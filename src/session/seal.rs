//! Signed, client-held session tokens.
//!
//! Format: `base64url(json) "." base64url(HMAC-SHA256(base64url(json)))`. The payload is
//! signed, not encrypted; anyone holding the token can read the tokens inside it, so it
//! belongs in an `HttpOnly` cookie.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
// self
use crate::{
	_prelude::*,
	auth::token::record::{duration_millis, now_millis},
	config::SessionConfig,
	session::SessionState,
};

type HmacSha256 = Hmac<Sha256>;

/// Failures while sealing or opening a session token.
#[derive(Debug, ThisError)]
pub enum SessionError {
	/// The token is not `<payload>.<signature>` in base64url.
	#[error("Session token is malformed.")]
	Malformed,
	/// The signing key was rejected by the MAC.
	#[error("Session signing key is unusable.")]
	InvalidKey,
	/// The signature does not match the payload.
	#[error("Session token signature is invalid.")]
	BadSignature,
	/// The absolute session lifetime elapsed.
	#[error("Session has expired.")]
	Expired,
	/// The payload could not be (de)serialized.
	#[error("Session payload could not be serialized.")]
	Serialization(#[source] serde_json::Error),
}

/// Seals [`SessionState`] into signed tokens and opens them again.
#[derive(Clone)]
pub struct SessionSealer {
	mac: HmacSha256,
	max_age: Duration,
}
impl SessionSealer {
	/// Creates a sealer keyed with `secret`.
	pub fn new(secret: &[u8], max_age: Duration) -> Result<Self, SessionError> {
		let mac = HmacSha256::new_from_slice(secret).map_err(|_| SessionError::InvalidKey)?;

		Ok(Self { mac, max_age })
	}

	/// Creates a sealer from validated session settings.
	pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
		Self::new(config.secret.as_bytes(), config.max_age)
	}

	/// Absolute session lifetime.
	pub fn max_age(&self) -> Duration {
		self.max_age
	}

	/// Serializes and signs `state`.
	pub fn seal(&self, state: &SessionState) -> Result<String, SessionError> {
		let json = serde_json::to_vec(state).map_err(SessionError::Serialization)?;
		let payload = URL_SAFE_NO_PAD.encode(json);
		let mut mac = self.mac.clone();

		mac.update(payload.as_bytes());

		let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

		Ok(format!("{payload}.{signature}"))
	}

	/// Verifies and decodes a token using the current clock.
	pub fn open(&self, token: &str) -> Result<SessionState, SessionError> {
		self.open_at(token, now_millis())
	}

	/// [`SessionSealer::open`] evaluated at `now` (epoch ms).
	///
	/// The signature is checked in constant time before the payload is parsed.
	pub fn open_at(&self, token: &str, now: i64) -> Result<SessionState, SessionError> {
		let (payload, signature) = token.split_once('.').ok_or(SessionError::Malformed)?;
		let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| SessionError::Malformed)?;
		let mut mac = self.mac.clone();

		mac.update(payload.as_bytes());
		mac.verify_slice(&signature).map_err(|_| SessionError::BadSignature)?;

		let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| SessionError::Malformed)?;
		let state: SessionState =
			serde_json::from_slice(&json).map_err(SessionError::Serialization)?;

		if state.issued_at.saturating_add(duration_millis(self.max_age)) <= now {
			return Err(SessionError::Expired);
		}

		Ok(state)
	}
}
impl Debug for SessionSealer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionSealer").field("max_age", &self.max_age).finish_non_exhaustive()
	}
}
