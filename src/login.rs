//! Framework-agnostic JSON login endpoint.
//!
//! [`LoginEndpoint::post`] takes the request headers and raw body and always produces a
//! [`LoginResponse`]; nothing escapes as an error. Steps run in a fixed order: client
//! identity, rate limit, JSON parsing, credential validation, password exchange.

// crates.io
use oauth2::http::{HeaderMap, HeaderValue, Response, StatusCode, header::CONTENT_TYPE};
use serde_json::{Value, json};
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{Credentials, InputError},
	config::Environment,
	error::{ConfigError, CredentialRejection},
	flows::{Broker, IssuedTokens},
	http::TokenHttpClient,
	messages::{self, Locale, MessageKey},
	oauth::TransportErrorMapper,
	obs,
	rate_limit::{self, RateLimiter},
};
#[cfg(feature = "reqwest")]
use crate::{config::Settings, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Name reported by the health check.
pub const ENDPOINT_NAME: &str = "keycloak-login";

/// Status and JSON body produced by the endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct LoginResponse {
	/// HTTP status.
	pub status: StatusCode,
	/// JSON body.
	pub body: Value,
}
impl LoginResponse {
	fn new(status: StatusCode, body: Value) -> Self {
		Self { status, body }
	}

	fn error(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
		Self::new(status, json!({ "error": error, "message": message.into() }))
	}

	/// Serializes into an `application/json` HTTP response.
	pub fn into_http_response(self) -> Result<Response<Vec<u8>>> {
		Ok(Response::builder()
			.status(self.status)
			.header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.body(self.body.to_string().into_bytes())
			.map_err(ConfigError::from)?)
	}
}

/// Credential login endpoint backed by a [`Broker`] and a [`RateLimiter`].
pub struct LoginEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	broker: Arc<Broker<C, M>>,
	limiter: RateLimiter,
	locale: Locale,
}
impl<C, M> LoginEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an endpoint with English messages.
	pub fn new(broker: impl Into<Arc<Broker<C, M>>>, limiter: RateLimiter) -> Self {
		Self { broker: broker.into(), limiter, locale: Locale::default() }
	}

	/// Overrides the message language.
	pub fn with_locale(mut self, locale: Locale) -> Self {
		self.locale = locale;

		self
	}

	/// Broker used for password exchanges.
	pub fn broker(&self) -> &Broker<C, M> {
		&self.broker
	}

	/// Rate limiter guarding submissions.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	fn environment(&self) -> Environment {
		self.broker.environment
	}

	fn text(&self, key: MessageKey) -> String {
		key.text(self.locale).into_owned()
	}

	/// Handles `POST` with a `{"username", "password"}` JSON body.
	pub async fn post(&self, headers: &HeaderMap, body: &[u8]) -> LoginResponse {
		let identity = rate_limit::client_identity(headers);

		match self.limiter.check(&identity).await {
			Ok(()) => {},
			Err(Error::RateLimited { .. }) => {
				let window = self.limiter.policy().window;
				let retry_after_minutes = (window.whole_seconds() + 59).div_euclid(60);

				return LoginResponse::error(
					StatusCode::TOO_MANY_REQUESTS,
					"Too many login attempts",
					self.text(MessageKey::TooManyAttempts { retry_after_minutes }),
				);
			},
			Err(err) => {
				obs::audit_store_failure(&identity, "admit", err.code());

				return self.internal_error();
			},
		}

		let Ok(request) = serde_json::from_slice::<Value>(body) else {
			return LoginResponse::error(
				StatusCode::BAD_REQUEST,
				"Invalid JSON body",
				self.text(MessageKey::InvalidJson),
			);
		};
		let credentials = match parse_credentials(&request) {
			Ok(credentials) => credentials,
			Err(InputError::MissingCredentials) =>
				return LoginResponse::error(
					StatusCode::BAD_REQUEST,
					"Missing credentials",
					self.text(MessageKey::MissingCredentials),
				),
			Err(InputError::TooLong { .. } | InputError::NotText { .. }) =>
				return self.invalid_format(),
		};

		match self.broker.exchange_credentials(&credentials).await {
			Ok(issued) => self.succeeded(&identity, &credentials, &issued).await,
			Err(err) => self.failed(&identity, &credentials, err),
		}
	}

	/// Handles `GET`: liveness probe.
	pub fn health(&self) -> LoginResponse {
		health_at(OffsetDateTime::now_utc())
	}

	async fn succeeded(
		&self,
		identity: &str,
		credentials: &Credentials,
		issued: &IssuedTokens,
	) -> LoginResponse {
		obs::audit_login_success(identity, credentials.username());

		if let Err(err) = self.limiter.clear(identity).await {
			obs::audit_store_failure(identity, "clear", err.code());
		}

		LoginResponse::new(
			StatusCode::OK,
			json!({
				"success": true,
				"message": self.text(MessageKey::LoginSuccess),
				"tokens": issued.to_payload(),
			}),
		)
	}

	fn failed(&self, identity: &str, credentials: &Credentials, err: Error) -> LoginResponse {
		let oauth_error = match &err {
			Error::InvalidCredentials(rejection) => Some(rejection.oauth_error.as_str()),
			_ => None,
		};

		obs::audit_login_failure(identity, credentials.username(), err.code(), oauth_error);

		match err {
			Error::InvalidCredentials(rejection) => self.rejected(&rejection),
			Error::IdpUnavailable(_) => LoginResponse::error(
				StatusCode::SERVICE_UNAVAILABLE,
				"Authentication service unavailable",
				self.text(MessageKey::ServiceUnavailable),
			),
			Error::MalformedUpstreamResponse(_) => LoginResponse::error(
				StatusCode::BAD_GATEWAY,
				"Invalid response from authentication service",
				self.text(MessageKey::InvalidUpstreamResponse),
			),
			Error::InvalidInput(_) => self.invalid_format(),
			_ => self.internal_error(),
		}
	}

	fn rejected(&self, rejection: &CredentialRejection) -> LoginResponse {
		let environment = self.environment();
		let mut body = json!({
			"error": rejection.oauth_error,
			"message": messages::rejection_message(rejection, environment, self.locale),
		});

		if environment.is_development() {
			body["details"] = json!({
				"error": rejection.oauth_error,
				"error_description": rejection.description,
			});
		}

		LoginResponse::new(StatusCode::UNAUTHORIZED, body)
	}

	fn invalid_format(&self) -> LoginResponse {
		LoginResponse::error(
			StatusCode::BAD_REQUEST,
			"Invalid credentials",
			self.text(MessageKey::InvalidCredentialFormat),
		)
	}

	fn internal_error(&self) -> LoginResponse {
		LoginResponse::error(
			StatusCode::INTERNAL_SERVER_ERROR,
			"Internal server error",
			self.text(MessageKey::InternalError),
		)
	}
}
#[cfg(feature = "reqwest")]
impl LoginEndpoint<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Wires a reqwest broker and an in-memory limiter from `settings`.
	pub fn from_settings(settings: &Settings) -> Result<Self> {
		let broker = settings.keycloak.broker(settings.environment)?;

		Ok(Self::new(broker, RateLimiter::in_memory(settings.rate_limit))
			.with_locale(settings.locale))
	}
}
impl<C, M> Clone for LoginEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self { broker: self.broker.clone(), limiter: self.limiter.clone(), locale: self.locale }
	}
}
impl<C, M> Debug for LoginEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginEndpoint")
			.field("broker", &self.broker)
			.field("limiter", &self.limiter)
			.field("locale", &self.locale)
			.finish()
	}
}

/// Health payload stamped with `now`.
pub fn health_at(now: OffsetDateTime) -> LoginResponse {
	LoginResponse::new(
		StatusCode::OK,
		json!({
			"status": "ok",
			"endpoint": ENDPOINT_NAME,
			"timestamp": now.format(&Rfc3339).unwrap_or_default(),
		}),
	)
}

/// Reads `username`/`password` from a JSON body.
///
/// Absent, `null` or empty members count as missing; members of any other JSON type are
/// treated as malformed input.
fn parse_credentials(request: &Value) -> Result<Credentials, InputError> {
	let field = |name: &'static str| match request.get(name) {
		None | Some(Value::Null) => Ok(""),
		Some(Value::String(value)) => Ok(value.as_str()),
		Some(_) => Err(InputError::NotText { field: name }),
	};
	let username = field("username")?;
	let password = field("password")?;

	Credentials::new(username, password)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn credentials_are_read_leniently() {
		let ok = parse_credentials(&json!({ "username": " alice ", "password": "pw" }))
			.expect("Well-formed credentials should parse.");

		assert_eq!(ok.username(), "alice");
		assert_eq!(
			parse_credentials(&json!({ "username": "alice" })).expect_err("Password is required."),
			InputError::MissingCredentials
		);
		assert_eq!(
			parse_credentials(&json!([])).expect_err("Arrays carry no credentials."),
			InputError::MissingCredentials
		);
		assert_eq!(
			parse_credentials(&json!({ "username": 42, "password": "pw" }))
				.expect_err("Numbers are not usernames."),
			InputError::NotText { field: "username" }
		);
		assert!(matches!(
			parse_credentials(&json!({ "username": "a".repeat(101), "password": "pw" })),
			Err(InputError::TooLong { field: "username", .. })
		));
	}

	#[test]
	fn health_reports_rfc3339_timestamp() {
		let response = health_at(macros::datetime!(2025-01-01 08:30 UTC));

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(
			response.body,
			json!({
				"status": "ok",
				"endpoint": "keycloak-login",
				"timestamp": "2025-01-01T08:30:00Z",
			})
		);
	}

	#[test]
	fn responses_convert_into_json_http_responses() {
		let response = LoginResponse::error(StatusCode::BAD_REQUEST, "Invalid JSON body", "bad")
			.into_http_response()
			.expect("Response should build.");

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

		let body: Value =
			serde_json::from_slice(response.body()).expect("Body should be valid JSON.");

		assert_eq!(body["error"], "Invalid JSON body");
	}
}
