//! Deployment settings and environment loading.
//!
//! [`Settings::from_env`] reads the process environment; [`Settings::from_lookup`] accepts any
//! lookup function so configuration can be assembled without touching global state.

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, token::record::DEFAULT_TOKEN_LIFETIME},
	error::ConfigError,
	http::DEFAULT_REQUEST_TIMEOUT,
	messages::Locale,
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor},
	rate_limit::RateLimitPolicy,
};
#[cfg(feature = "reqwest")]
use crate::{
	flows::{Broker, ReqwestBroker},
	provider::DefaultProviderStrategy,
};

/// Path suffix Keycloak appends to a realm URL for its OIDC endpoints.
const OIDC_PATH: &str = "/protocol/openid-connect";

/// Unrecognized value for a textual setting.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unrecognized value `{0}`.")]
pub struct UnknownValue(pub String);

/// Deployment environment.
///
/// Provider error descriptions reach callers only in [`Environment::Development`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	/// Local development; diagnostic details are exposed.
	Development,
	/// Production deployment.
	#[default]
	Production,
	/// Automated tests.
	Test,
}
impl Environment {
	/// Returns `true` in development.
	pub fn is_development(self) -> bool {
		matches!(self, Environment::Development)
	}

	/// Lowercase label.
	pub fn as_str(self) -> &'static str {
		match self {
			Environment::Development => "development",
			Environment::Production => "production",
			Environment::Test => "test",
		}
	}
}
impl FromStr for Environment {
	type Err = UnknownValue;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"development" | "dev" => Ok(Environment::Development),
			"production" | "prod" => Ok(Environment::Production),
			"test" => Ok(Environment::Test),
			other => Err(UnknownValue(other.to_owned())),
		}
	}
}
impl Display for Environment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Keycloak realm connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakConfig {
	/// Realm URL, e.g. `https://sso.example.com/realms/main`.
	pub base_url: String,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Client secret for confidential clients.
	#[serde(default)]
	pub client_secret: Option<String>,
	/// Upper bound for every token endpoint call.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: std::time::Duration,
}
impl KeycloakConfig {
	/// Creates settings for a public client with the default timeout.
	pub fn new(base_url: impl Into<String>, client_id: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			client_id: client_id.into(),
			client_secret: None,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}

	/// Attaches a client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the token endpoint timeout.
	pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Realm URL without trailing slashes or a trailing `/protocol/openid-connect` segment.
	pub fn normalized_base_url(&self) -> &str {
		let trimmed = self.base_url.trim().trim_end_matches('/');

		trimmed.strip_suffix(OIDC_PATH).unwrap_or(trimmed).trim_end_matches('/')
	}

	/// `<realm>/protocol/openid-connect/token`.
	pub fn token_url(&self) -> Result<Url, ConfigError> {
		Url::parse(&format!("{}{OIDC_PATH}/token", self.normalized_base_url()))
			.map_err(|source| ConfigError::InvalidDescriptor { source })
	}

	/// Descriptor enabling the password and refresh grants against this realm.
	///
	/// Confidential clients authenticate with `client_secret_post`; public clients send only
	/// their identifier.
	pub fn descriptor(&self) -> Result<ProviderDescriptor, ConfigError> {
		let auth_method = if self.client_secret.is_some() {
			ClientAuthMethod::ClientSecretPost
		} else {
			ClientAuthMethod::None
		};

		Ok(ProviderDescriptor::builder(ProviderId::new("keycloak")?)
			.token_endpoint(self.token_url()?)
			.support_grants([GrantType::Password, GrantType::RefreshToken])
			.preferred_client_auth_method(auth_method)
			.build()?)
	}

	/// Builds a reqwest-backed broker for this realm.
	#[cfg(feature = "reqwest")]
	pub fn broker(&self, environment: Environment) -> Result<ReqwestBroker> {
		let broker = Broker::new(
			self.descriptor()?,
			Arc::new(DefaultProviderStrategy),
			self.client_id.clone(),
			self.request_timeout,
		)?
		.with_environment(environment);

		Ok(match &self.client_secret {
			Some(secret) => broker.with_client_secret(secret.clone()),
			None => broker,
		})
	}
}
impl Debug for KeycloakConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeycloakConfig")
			.field("base_url", &self.base_url)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("request_timeout", &self.request_timeout)
			.finish()
	}
}

/// Session token signing settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// HMAC key material.
	pub secret: String,
	/// Absolute session lifetime.
	#[serde(default = "default_session_max_age")]
	pub max_age: Duration,
}
impl SessionConfig {
	/// Creates settings with the default 30 day lifetime.
	pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
		let secret = secret.into();

		if secret.trim().is_empty() {
			return Err(ConfigError::EmptySessionSecret);
		}

		Ok(Self { secret, max_age: DEFAULT_TOKEN_LIFETIME })
	}

	/// Overrides the absolute lifetime.
	pub fn with_max_age(mut self, max_age: Duration) -> Self {
		self.max_age = max_age;

		self
	}
}
impl Debug for SessionConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionConfig")
			.field("secret", &"<redacted>")
			.field("max_age", &self.max_age)
			.finish()
	}
}

/// Everything the login endpoint and session callbacks need.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
	/// Identity provider connection.
	pub keycloak: KeycloakConfig,
	/// Login attempt budget.
	#[serde(default)]
	pub rate_limit: RateLimitPolicy,
	/// Session signing.
	pub session: SessionConfig,
	/// Deployment environment.
	#[serde(default)]
	pub environment: Environment,
	/// Language of user-facing messages.
	#[serde(default)]
	pub locale: Locale,
}
impl Settings {
	/// Loads settings from the process environment.
	///
	/// # Required env vars
	/// - `KEYCLOAK_BASE_URL`: realm URL
	/// - `KEYCLOAK_CLIENT_ID`: OAuth 2.0 client ID
	/// - `SESSION_SECRET` (or `NEXTAUTH_SECRET`): session signing key
	///
	/// # Optional env vars
	/// - `KEYCLOAK_CLIENT_SECRET`: confidential client secret
	/// - `KEYCLOAK_TIMEOUT_SECS`: token endpoint timeout (default 10)
	/// - `LOGIN_MAX_ATTEMPTS`: attempts per window (default 5)
	/// - `LOGIN_WINDOW_SECS`: rate-limit window (default 900)
	/// - `APP_ENV`: `development`, `production` (default) or `test`
	/// - `APP_LOCALE`: `en` (default) or `zh-CN`
	///
	/// # Errors
	///
	/// Returns [`ConfigError::MissingEnv`] or [`ConfigError::InvalidEnv`] when a variable is
	/// absent or unusable.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Loads settings through `lookup`, which maps a variable name to its value.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
		let require = |name: &'static str| get(name).ok_or(ConfigError::MissingEnv { name });
		let mut keycloak =
			KeycloakConfig::new(require("KEYCLOAK_BASE_URL")?, require("KEYCLOAK_CLIENT_ID")?);

		keycloak.token_url().map_err(|err| ConfigError::InvalidEnv {
			name: "KEYCLOAK_BASE_URL",
			reason: err.to_string(),
		})?;

		if let Some(secret) = get("KEYCLOAK_CLIENT_SECRET") {
			keycloak = keycloak.with_client_secret(secret);
		}
		if let Some(secs) = parse_positive::<u64>(&get, "KEYCLOAK_TIMEOUT_SECS")? {
			keycloak = keycloak.with_request_timeout(std::time::Duration::from_secs(secs));
		}

		let mut rate_limit = RateLimitPolicy::default();

		if let Some(max) = parse_positive::<u32>(&get, "LOGIN_MAX_ATTEMPTS")? {
			rate_limit.max_attempts = max;
		}
		if let Some(secs) = parse_positive::<i64>(&get, "LOGIN_WINDOW_SECS")? {
			rate_limit.window = Duration::seconds(secs);
		}

		let secret = get("SESSION_SECRET")
			.or_else(|| get("NEXTAUTH_SECRET"))
			.ok_or(ConfigError::MissingEnv { name: "SESSION_SECRET" })?;
		let session = SessionConfig::new(secret)?;
		let environment = match get("APP_ENV") {
			Some(value) => value
				.parse()
				.map_err(|err: UnknownValue| invalid("APP_ENV", err))?,
			None => Environment::default(),
		};
		let locale = match get("APP_LOCALE") {
			Some(value) => value
				.parse()
				.map_err(|err: UnknownValue| invalid("APP_LOCALE", err))?,
			None => Locale::default(),
		};

		Ok(Self { keycloak, rate_limit, session, environment, locale })
	}
}

fn default_request_timeout() -> std::time::Duration {
	DEFAULT_REQUEST_TIMEOUT
}

fn default_session_max_age() -> Duration {
	DEFAULT_TOKEN_LIFETIME
}

fn invalid(name: &'static str, reason: impl Display) -> ConfigError {
	ConfigError::InvalidEnv { name, reason: reason.to_string() }
}

fn parse_positive<T>(
	get: &impl Fn(&str) -> Option<String>,
	name: &'static str,
) -> Result<Option<T>, ConfigError>
where
	T: FromStr + PartialOrd + Default,
	T::Err: Display,
{
	let Some(raw) = get(name) else {
		return Ok(None);
	};
	let value = raw.trim().parse::<T>().map_err(|err| invalid(name, err))?;

	if value <= T::default() {
		return Err(invalid(name, "must be greater than zero"));
	}

	Ok(Some(value))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars = pairs
			.iter()
			.map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
			.collect::<HashMap<_, _>>();

		move |name| vars.get(name).cloned()
	}

	const REQUIRED: [(&str, &str); 3] = [
		("KEYCLOAK_BASE_URL", "https://sso.example.com/realms/main"),
		("KEYCLOAK_CLIENT_ID", "portal"),
		("SESSION_SECRET", "s3cret"),
	];

	#[test]
	fn base_url_normalization_strips_oidc_suffix() {
		for base in [
			"https://sso.example.com/realms/main",
			"https://sso.example.com/realms/main/",
			"https://sso.example.com/realms/main/protocol/openid-connect",
			"https://sso.example.com/realms/main/protocol/openid-connect/",
		] {
			let config = KeycloakConfig::new(base, "portal");

			assert_eq!(config.normalized_base_url(), "https://sso.example.com/realms/main");
			assert_eq!(
				config.token_url().expect("Token URL should parse.").as_str(),
				"https://sso.example.com/realms/main/protocol/openid-connect/token"
			);
		}
	}

	#[test]
	fn descriptor_picks_auth_method_from_secret() {
		let public = KeycloakConfig::new("https://sso.example.com/realms/main", "portal");
		let confidential = public.clone().with_client_secret("secret");

		assert_eq!(
			public.descriptor().expect("Descriptor should build.").preferred_client_auth_method,
			ClientAuthMethod::None
		);

		let descriptor = confidential.descriptor().expect("Descriptor should build.");

		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert!(descriptor.supports(GrantType::Password));
		assert!(descriptor.supports(GrantType::RefreshToken));
	}

	#[test]
	fn from_lookup_applies_defaults() {
		let settings = Settings::from_lookup(lookup(&REQUIRED)).expect("Settings should load.");

		assert_eq!(settings.keycloak.request_timeout, DEFAULT_REQUEST_TIMEOUT);
		assert_eq!(settings.keycloak.client_secret, None);
		assert_eq!(settings.rate_limit, RateLimitPolicy::default());
		assert_eq!(settings.session.max_age, Duration::days(30));
		assert_eq!(settings.environment, Environment::Production);
		assert_eq!(settings.locale, Locale::En);
	}

	#[test]
	fn from_lookup_reads_overrides_and_fallback_secret() {
		let settings = Settings::from_lookup(lookup(&[
			("KEYCLOAK_BASE_URL", "http://localhost:8080/realms/dev/protocol/openid-connect"),
			("KEYCLOAK_CLIENT_ID", "portal"),
			("KEYCLOAK_CLIENT_SECRET", "client-secret"),
			("KEYCLOAK_TIMEOUT_SECS", "3"),
			("NEXTAUTH_SECRET", "fallback"),
			("LOGIN_MAX_ATTEMPTS", "3"),
			("LOGIN_WINDOW_SECS", "60"),
			("APP_ENV", "dev"),
			("APP_LOCALE", "zh-CN"),
		]))
		.expect("Settings should load.");

		assert_eq!(settings.keycloak.client_secret.as_deref(), Some("client-secret"));
		assert_eq!(settings.keycloak.request_timeout, std::time::Duration::from_secs(3));
		assert_eq!(settings.session.secret, "fallback");
		assert_eq!(settings.rate_limit, RateLimitPolicy::new(3, Duration::seconds(60)));
		assert_eq!(settings.environment, Environment::Development);
		assert_eq!(settings.locale, Locale::ZhCn);
	}

	#[test]
	fn from_lookup_reports_missing_and_invalid_values() {
		let err = Settings::from_lookup(lookup(&REQUIRED[1..])).expect_err("Base URL is required.");

		assert!(matches!(err, ConfigError::MissingEnv { name: "KEYCLOAK_BASE_URL" }));

		let err = Settings::from_lookup(lookup(&REQUIRED[..2])).expect_err("Secret is required.");

		assert!(matches!(err, ConfigError::MissingEnv { name: "SESSION_SECRET" }));

		let mut pairs = REQUIRED.to_vec();

		pairs.push(("LOGIN_MAX_ATTEMPTS", "0"));

		let err = Settings::from_lookup(lookup(&pairs)).expect_err("Zero attempts is invalid.");

		assert!(matches!(err, ConfigError::InvalidEnv { name: "LOGIN_MAX_ATTEMPTS", .. }));

		let mut pairs = REQUIRED.to_vec();

		pairs.push(("APP_ENV", "staging"));

		let err = Settings::from_lookup(lookup(&pairs)).expect_err("Unknown environment.");

		assert!(matches!(err, ConfigError::InvalidEnv { name: "APP_ENV", .. }));
	}

	#[test]
	fn debug_output_hides_secrets() {
		let settings = Settings::from_lookup(lookup(&REQUIRED)).expect("Settings should load.");

		assert!(!format!("{settings:?}").contains("s3cret"));
	}
}
