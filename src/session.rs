//! Session callbacks that turn issued tokens into client-held session state.
//!
//! [`SessionCallbacks::on_sign_in`] normalizes whatever token shape the sign-in path produced
//! into one [`TokenRecord`]; [`SessionCallbacks::on_session_read`] runs on every read and
//! routes the record through [`Broker::ensure_valid`]. The state itself travels inside a
//! [`SessionSealer`] token, so nothing is persisted server side.

pub mod seal;

pub use seal::*;

// self
use crate::{
	_prelude::*,
	auth::{
		ErrorState, TokenRecord, TokenSecret, jwt,
		token::record::{default_expiry, expiry_after, now_millis, skewed},
	},
	flows::{Broker, IssuedTokens},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
};

/// Tokens handed over by an OAuth account link (authorization-code sign-in).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthAccountTokens {
	/// Access token.
	pub access_token: String,
	/// Refresh token.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Access lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Absolute access expiry in epoch **seconds**.
	#[serde(default)]
	pub expires_at: Option<i64>,
	/// Refresh lifetime in seconds.
	#[serde(default)]
	pub refresh_expires_in: Option<i64>,
}

/// Tokens returned by the credential login endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialUserTokens {
	/// Access token.
	pub access_token: String,
	/// Refresh token.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Absolute access expiry in epoch **milliseconds**.
	#[serde(default)]
	pub expires_at: Option<i64>,
	/// Absolute refresh expiry in epoch milliseconds.
	#[serde(default)]
	pub refresh_expires_at: Option<i64>,
}

/// Token material available at sign-in, tagged by the path that produced it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenSource {
	/// OAuth provider account.
	OAuthAccount(OAuthAccountTokens),
	/// Credential login.
	CredentialUser(CredentialUserTokens),
}
impl TokenSource {
	fn access_token(&self) -> &str {
		match self {
			TokenSource::OAuthAccount(tokens) => &tokens.access_token,
			TokenSource::CredentialUser(tokens) => &tokens.access_token,
		}
	}

	/// Normalizes the source into a record at `now` (epoch ms).
	///
	/// Access expiry precedence: the JWT `exp` claim, then the explicit absolute expiry, then
	/// `now + expires_in`, then the default lifetime. Refresh expiry follows the same order
	/// without the JWT step. Every candidate has the fixed skew subtracted.
	pub fn normalize_at(&self, now: i64) -> TokenRecord {
		let from_jwt = Some(jwt::expiry_millis(self.access_token())).filter(|exp| *exp > 0);
		let (refresh_token, access_absolute, access_relative, refresh_absolute, refresh_relative) =
			match self {
				TokenSource::OAuthAccount(tokens) => (
					tokens.refresh_token.as_deref(),
					positive(tokens.expires_at).map(|secs| secs.saturating_mul(1_000)),
					positive(tokens.expires_in),
					None,
					positive(tokens.refresh_expires_in),
				),
				TokenSource::CredentialUser(tokens) => (
					tokens.refresh_token.as_deref(),
					positive(tokens.expires_at),
					None,
					positive(tokens.refresh_expires_at),
					None,
				),
			};
		let access_expires_at = from_jwt
			.or(access_absolute)
			.or_else(|| access_relative.map(|secs| expiry_after(now, secs)))
			.map(skewed)
			.unwrap_or_else(|| default_expiry(now));
		let refresh_expires_at = refresh_absolute
			.or_else(|| refresh_relative.map(|secs| expiry_after(now, secs)))
			.map(skewed)
			.unwrap_or_else(|| default_expiry(now));

		TokenRecord {
			access_token: TokenSecret::new(self.access_token()),
			refresh_token: refresh_token.map(TokenSecret::new),
			access_expires_at,
			refresh_expires_at,
			error_state: ErrorState::None,
		}
	}
}
impl From<&IssuedTokens> for TokenSource {
	fn from(issued: &IssuedTokens) -> Self {
		TokenSource::CredentialUser(CredentialUserTokens {
			access_token: issued.record.access_token.expose().to_owned(),
			refresh_token: issued.record.refresh_token.as_ref().map(|token| token.expose().to_owned()),
			expires_at: Some(issued.record.access_expires_at),
			refresh_expires_at: Some(issued.record.refresh_expires_at),
		})
	}
}
impl Debug for TokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			TokenSource::OAuthAccount(tokens) => f
				.debug_struct("OAuthAccount")
				.field("expires_in", &tokens.expires_in)
				.field("expires_at", &tokens.expires_at)
				.field("refresh_expires_in", &tokens.refresh_expires_in)
				.finish_non_exhaustive(),
			TokenSource::CredentialUser(tokens) => f
				.debug_struct("CredentialUser")
				.field("expires_at", &tokens.expires_at)
				.field("refresh_expires_at", &tokens.refresh_expires_at)
				.finish_non_exhaustive(),
		}
	}
}

/// Profile shown alongside the session, read from unverified access token claims.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
	/// Subject identifier.
	pub id: String,
	/// Display name or preferred username.
	pub name: Option<String>,
	/// Email address.
	pub email: Option<String>,
	/// Avatar URL.
	pub image: Option<String>,
}
impl SessionUser {
	/// Best-effort extraction; `None` when the token is not a decodable JWT with a subject.
	pub fn from_access_token(access_token: &str) -> Option<Self> {
		let claims = jwt::decode(access_token).ok()?;

		Some(Self {
			id: claims.sub.clone()?,
			name: claims.display_name().map(ToOwned::to_owned),
			email: claims.email,
			image: claims.picture,
		})
	}
}

/// Client-held session payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
	/// Current token pair and failure marker.
	#[serde(flatten)]
	pub record: TokenRecord,
	/// Signed-in user.
	#[serde(default)]
	pub user: Option<SessionUser>,
	/// Sign-in instant (epoch ms); the absolute session lifetime counts from here.
	pub issued_at: i64,
}
impl SessionState {
	/// Projection handed to the client.
	pub fn view(&self) -> SessionView {
		SessionView {
			access_token: self.record.access_token.expose().to_owned(),
			access_expires_at: self.record.access_expires_at,
			refresh_expires_at: self.record.refresh_expires_at,
			user: self.user.clone(),
			error: self.record.error_state.as_label().map(ToOwned::to_owned),
			requires_reauthentication: self.record.is_refresh_failed(),
		}
	}
}
impl Debug for SessionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionState")
			.field("record", &self.record)
			.field("user", &self.user)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

/// Session data exposed to the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
	/// Access token for calling downstream APIs.
	pub access_token: String,
	/// Access expiry (epoch ms).
	pub access_expires_at: i64,
	/// Refresh expiry (epoch ms).
	pub refresh_expires_at: i64,
	/// Signed-in user.
	pub user: Option<SessionUser>,
	/// `RefreshAccessTokenError` once refreshing failed.
	pub error: Option<String>,
	/// `true` when the user has to sign in again.
	pub requires_reauthentication: bool,
}
impl Debug for SessionView {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionView")
			.field("access_expires_at", &self.access_expires_at)
			.field("refresh_expires_at", &self.refresh_expires_at)
			.field("user", &self.user)
			.field("error", &self.error)
			.field("requires_reauthentication", &self.requires_reauthentication)
			.finish_non_exhaustive()
	}
}

/// Sign-in and session-read hooks bound to a broker.
pub struct SessionCallbacks<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	broker: Arc<Broker<C, M>>,
}
impl<C, M> SessionCallbacks<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Binds the callbacks to `broker`.
	pub fn new(broker: impl Into<Arc<Broker<C, M>>>) -> Self {
		Self { broker: broker.into() }
	}

	/// Broker used for refreshes.
	pub fn broker(&self) -> &Broker<C, M> {
		&self.broker
	}

	/// Builds the initial session state from the sign-in tokens.
	pub fn on_sign_in(&self, source: &TokenSource) -> SessionState {
		self.on_sign_in_at(source, now_millis())
	}

	/// [`SessionCallbacks::on_sign_in`] evaluated at `now` (epoch ms).
	pub fn on_sign_in_at(&self, source: &TokenSource, now: i64) -> SessionState {
		SessionState {
			record: source.normalize_at(now),
			user: SessionUser::from_access_token(source.access_token()),
			issued_at: now,
		}
	}

	/// Revalidates the session on read, refreshing the access token when it expired.
	///
	/// The caller must persist the returned state.
	pub async fn on_session_read(&self, state: SessionState) -> SessionState {
		self.on_session_read_at(state, now_millis()).await
	}

	/// [`SessionCallbacks::on_session_read`] evaluated at `now` (epoch ms).
	pub async fn on_session_read_at(&self, state: SessionState, now: i64) -> SessionState {
		let SessionState { record, user, issued_at } = state;
		let record = self.broker.ensure_valid_at(record, now).await;

		SessionState { record, user, issued_at }
	}
}

impl<C, M> Clone for SessionCallbacks<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { broker: self.broker.clone() }
	}
}
impl<C, M> Debug for SessionCallbacks<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCallbacks").field("broker", &self.broker).finish()
	}
}

fn positive(value: Option<i64>) -> Option<i64> {
	value.filter(|value| *value > 0)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{
			ProviderId,
			token::record::{DEFAULT_TOKEN_LIFETIME, duration_millis},
		},
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{GrantType, ProviderDescriptor},
	};

	const NOW: i64 = 1_700_000_000_000;

	fn callbacks() -> SessionCallbacks<ReqwestHttpClient, ReqwestTransportErrorMapper> {
		let descriptor = ProviderDescriptor::builder(
			ProviderId::new("keycloak").expect("Provider id fixture should be valid."),
		)
		.token_endpoint(
			Url::parse("http://127.0.0.1:1/token").expect("Token URL fixture should parse."),
		)
		.support_grants([GrantType::Password, GrantType::RefreshToken])
		.build()
		.expect("Descriptor fixture should build.");

		SessionCallbacks::new(build_reqwest_test_broker(descriptor, "portal", "secret"))
	}

	fn oauth(access_token: String) -> OAuthAccountTokens {
		OAuthAccountTokens {
			access_token,
			refresh_token: Some("refresh".into()),
			expires_in: None,
			expires_at: None,
			refresh_expires_in: None,
		}
	}

	#[test]
	fn jwt_expiry_takes_precedence() {
		let token = fake_jwt(&json!({ "sub": "u-1", "exp": 1_700_000_600 }));
		let source = TokenSource::OAuthAccount(OAuthAccountTokens {
			expires_at: Some(1_700_009_999),
			expires_in: Some(60),
			..oauth(token)
		});
		let record = source.normalize_at(NOW);

		assert_eq!(record.access_expires_at, 1_700_000_600_000 - 15_000);
	}

	#[test]
	fn unusual_claims_keep_the_jwt_expiry() {
		for claims in [
			json!({ "exp": 1_700_000_600.5 }),
			json!({ "exp": 1_700_000_600, "email_verified": "true" }),
			json!({ "exp": 1_700_000_600, "realm_access": { "roles": null } }),
		] {
			let record = TokenSource::OAuthAccount(oauth(fake_jwt(&claims))).normalize_at(NOW);

			assert_eq!(record.access_expires_at, 1_700_000_600_000 - 15_000, "{claims}");
		}
	}

	#[test]
	fn oauth_fallbacks_follow_precedence() {
		let opaque = || "opaque-token".to_owned();
		let absolute = TokenSource::OAuthAccount(OAuthAccountTokens {
			expires_at: Some(1_700_000_300),
			expires_in: Some(60),
			refresh_expires_in: Some(1_800),
			..oauth(opaque())
		})
		.normalize_at(NOW);

		assert_eq!(absolute.access_expires_at, 1_700_000_300_000 - 15_000);
		assert_eq!(absolute.refresh_expires_at, NOW + 1_800_000 - 15_000);

		let relative = TokenSource::OAuthAccount(OAuthAccountTokens {
			expires_in: Some(60),
			..oauth(opaque())
		})
		.normalize_at(NOW);

		assert_eq!(relative.access_expires_at, NOW + 60_000 - 15_000);

		let fallback = TokenSource::OAuthAccount(oauth(opaque())).normalize_at(NOW);
		let default = NOW + duration_millis(DEFAULT_TOKEN_LIFETIME) - 15_000;

		assert_eq!(fallback.access_expires_at, default);
		assert_eq!(fallback.refresh_expires_at, default);
	}

	#[test]
	fn credential_user_expiries_are_milliseconds() {
		let record = TokenSource::CredentialUser(CredentialUserTokens {
			access_token: "opaque".into(),
			refresh_token: Some("refresh".into()),
			expires_at: Some(NOW + 300_000),
			refresh_expires_at: Some(NOW + 1_800_000),
		})
		.normalize_at(NOW);

		assert_eq!(record.access_expires_at, NOW + 300_000 - 15_000);
		assert_eq!(record.refresh_expires_at, NOW + 1_800_000 - 15_000);
	}

	#[test]
	fn sign_in_extracts_user_best_effort() {
		let callbacks = callbacks();
		let token = fake_jwt(&json!({
			"sub": "u-1",
			"preferred_username": "alice",
			"email": "alice@example.com",
			"picture": "https://example.com/a.png",
			"exp": 1_700_000_600,
		}));
		let state = callbacks.on_sign_in_at(&TokenSource::OAuthAccount(oauth(token)), NOW);
		let user = state.user.expect("User should be extracted from claims.");

		assert_eq!(user.id, "u-1");
		assert_eq!(user.name.as_deref(), Some("alice"));
		assert_eq!(user.image.as_deref(), Some("https://example.com/a.png"));
		assert_eq!(state.issued_at, NOW);

		let opaque = callbacks.on_sign_in_at(&TokenSource::OAuthAccount(oauth("x".into())), NOW);

		assert_eq!(opaque.user, None);
	}

	#[tokio::test]
	async fn session_read_flags_expired_refresh_without_network() {
		let callbacks = callbacks();
		let mut state =
			callbacks.on_sign_in_at(&TokenSource::OAuthAccount(oauth("opaque".into())), NOW);

		state.record.access_expires_at = NOW - 1;
		state.record.refresh_expires_at = NOW - 1;

		let read = callbacks.on_session_read_at(state, NOW).await;
		let view = read.view();

		assert_eq!(view.error.as_deref(), Some("RefreshAccessTokenError"));
		assert!(view.requires_reauthentication);
		assert_eq!(callbacks.broker().refresh_metrics.attempts(), 0);
	}

	#[test]
	fn state_serializes_flat_session_shape() {
		let source = TokenSource::OAuthAccount(oauth("opaque".into()));
		let state = callbacks().on_sign_in_at(&source, NOW);
		let json = serde_json::to_value(&state).expect("Session state should serialize.");

		assert_eq!(json["accessToken"], "opaque");
		assert_eq!(json["errorState"], "None");
		assert_eq!(json["issuedAt"], NOW);
		assert!(!format!("{state:?}").contains("opaque"));
	}
}
