//! Resource-owner password login.
//!
//! Credentials are validated locally first; only a well-formed pair reaches the token
//! endpoint. The issued expiries are `now + lifetime` without skew. The skew is applied once
//! the tokens enter a session.

// self
use crate::{
	_prelude::*,
	auth::{
		Credentials, ScopeSet, TokenRecord,
		token::record::{default_expiry, expiry_after, now_millis},
	},
	error::ConfigError,
	flows::{Broker, common},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TokenGrant, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

/// Tokens issued by a successful password login.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedTokens {
	/// Access/refresh pair with absolute expiries (epoch ms).
	pub record: TokenRecord,
	/// OIDC ID token.
	pub id_token: Option<String>,
	/// Keycloak session identifier.
	pub session_state: Option<String>,
	/// Granted scopes.
	pub scope: Option<ScopeSet>,
}
impl IssuedTokens {
	/// Builds the record from a token endpoint answer received at `now`.
	pub(crate) fn from_grant(grant: TokenGrant, now: i64) -> Result<Self> {
		let mut builder = TokenRecord::builder()
			.access_token(grant.access_token)
			.access_expires_at(expiry_after(now, grant.expires_in))
			.refresh_expires_at(
				grant
					.refresh_expires_in
					.map(|secs| expiry_after(now, secs))
					.unwrap_or_else(|| default_expiry(now)),
			);

		if let Some(refresh) = grant.refresh_token {
			builder = builder.refresh_token(refresh);
		}

		Ok(Self {
			record: builder.build().map_err(ConfigError::from)?,
			id_token: grant.id_token,
			session_state: grant.session_state,
			scope: grant.scope,
		})
	}

	/// Wire payload returned by the login endpoint.
	pub fn to_payload(&self) -> TokensPayload {
		TokensPayload {
			access_token: self.record.access_token.expose().to_owned(),
			refresh_token: self.record.refresh_token.as_ref().map(|token| token.expose().to_owned()),
			id_token: self.id_token.clone(),
			expires_at: self.record.access_expires_at,
			refresh_expires_at: self.record.refresh_expires_at,
			session_state: self.session_state.clone(),
			scope: self.scope.as_ref().map(ScopeSet::normalized),
		}
	}
}
impl Debug for IssuedTokens {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IssuedTokens")
			.field("record", &self.record)
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.field("session_state", &self.session_state)
			.field("scope", &self.scope)
			.finish()
	}
}

/// `tokens` object of a successful login response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensPayload {
	/// Access token.
	pub access_token: String,
	/// Refresh token.
	pub refresh_token: Option<String>,
	/// OIDC ID token.
	pub id_token: Option<String>,
	/// Access expiry (epoch ms).
	pub expires_at: i64,
	/// Refresh expiry (epoch ms).
	pub refresh_expires_at: i64,
	/// Keycloak session identifier.
	pub session_state: Option<String>,
	/// Space-delimited granted scopes.
	pub scope: Option<String>,
}
impl Debug for TokensPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokensPayload")
			.field("expires_at", &self.expires_at)
			.field("refresh_expires_at", &self.refresh_expires_at)
			.field("session_state", &self.session_state)
			.field("scope", &self.scope)
			.finish_non_exhaustive()
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Validates the raw credential pair and exchanges it for tokens.
	///
	/// Blank or oversized input fails with [`Error::InvalidInput`] before any network call.
	pub async fn exchange_password(&self, username: &str, password: &str) -> Result<IssuedTokens> {
		let credentials = Credentials::new(username, password)?;

		self.exchange_credentials(&credentials).await
	}

	/// Exchanges already-validated credentials for tokens.
	pub async fn exchange_credentials(&self, credentials: &Credentials) -> Result<IssuedTokens> {
		const KIND: FlowKind = FlowKind::Password;

		let span = FlowSpan::new(KIND, "exchange_credentials");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.ensure_grant_supported(GrantType::Password)?;

				let facade = self.facade()?;
				let grant = facade
					.exchange_password(self.strategy.as_ref(), credentials, &self.descriptor.login_scopes)
					.await
					.map_err(|err| common::scrub_rejection(err, self.environment))?;

				obs::audit_idp_latency(KIND, grant.elapsed);

				IssuedTokens::from_grant(grant, now_millis())
			})
			.await;

		obs::record_flow_outcome(KIND, span.settle(&result));

		result
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn grant(refresh_expires_in: Option<i64>) -> TokenGrant {
		TokenGrant {
			access_token: "access".into(),
			refresh_token: Some("refresh".into()),
			expires_in: 300,
			refresh_expires_in,
			id_token: Some("id".into()),
			session_state: Some("session".into()),
			scope: Some(ScopeSet::login_default()),
			elapsed: None,
		}
	}

	#[test]
	fn issued_expiries_are_unskewed() {
		let issued = IssuedTokens::from_grant(grant(Some(1_800)), 1_000_000)
			.expect("Grant fixture should convert.");

		assert_eq!(issued.record.access_expires_at, 1_300_000);
		assert_eq!(issued.record.refresh_expires_at, 2_800_000);

		let payload = issued.to_payload();

		assert_eq!(payload.expires_at, 1_300_000);
		assert_eq!(payload.scope.as_deref(), Some("openid profile email"));
		assert_eq!(payload.refresh_token.as_deref(), Some("refresh"));
	}

	#[test]
	fn missing_refresh_lifetime_uses_default_policy() {
		let issued =
			IssuedTokens::from_grant(grant(None), 0).expect("Grant fixture should convert.");

		assert_eq!(issued.record.refresh_expires_at, default_expiry(0));
	}

	#[test]
	fn debug_output_hides_tokens() {
		let issued =
			IssuedTokens::from_grant(grant(None), 0).expect("Grant fixture should convert.");

		assert!(!format!("{issued:?}").contains("access\""));
		assert!(!format!("{:?}", issued.to_payload()).contains("refresh\""));
	}
}
