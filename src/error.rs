//! Broker-level error taxonomy shared by flows, the rate limiter, sessions, and the login
//! endpoint.

// self
use crate::{_prelude::*, provider::RejectionKind};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
///
/// Local failures ([`Error::InvalidInput`], [`Error::RateLimited`]) are raised before the
/// identity provider is contacted. Nothing in the taxonomy is fatal to the process.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Rate-limit storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Session token could not be sealed or opened.
	#[error(transparent)]
	Session(#[from] crate::session::SessionError),
	/// Credentials were missing or oversized; no network call was made.
	#[error(transparent)]
	InvalidInput(#[from] crate::auth::InputError),
	/// Too many attempts from one client identity inside the current window.
	#[error("Too many login attempts from `{identity}`.")]
	RateLimited {
		/// Client identity that exhausted its budget.
		identity: String,
	},
	/// The token endpoint could not be reached or timed out.
	#[error(transparent)]
	IdpUnavailable(#[from] TransportError),
	/// The identity provider rejected the grant.
	#[error(transparent)]
	InvalidCredentials(#[from] CredentialRejection),
	/// The identity provider answered with a body that does not match the token shape.
	#[error(transparent)]
	MalformedUpstreamResponse(#[from] UpstreamError),
	/// A JWT could not be decoded.
	#[error(transparent)]
	TokenParse(#[from] crate::auth::MalformedToken),
	/// Refresh was requested after the refresh token's own lifetime elapsed.
	#[error("Refresh token has expired; re-authentication is required.")]
	RefreshTokenExpired,
}
impl Error {
	/// Stable snake_case code suitable for logs and API payloads.
	pub fn code(&self) -> &'static str {
		match self {
			Error::Config(_) => "configuration_error",
			Error::Storage(_) => "storage_error",
			Error::Session(_) => "session_invalid",
			Error::InvalidInput(_) => "invalid_input",
			Error::RateLimited { .. } => "rate_limited",
			Error::IdpUnavailable(_) => "idp_unavailable",
			Error::InvalidCredentials(_) => "invalid_credentials",
			Error::MalformedUpstreamResponse(_) => "malformed_upstream_response",
			Error::TokenParse(_) => "token_parse_error",
			Error::RefreshTokenExpired => "refresh_token_expired",
		}
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Provider identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// A required environment variable is not set.
	#[error("Environment variable `{name}` is required.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable holds an unusable value.
	#[error("Environment variable `{name}` is invalid: {reason}.")]
	InvalidEnv {
		/// Variable name.
		name: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// Session signing secret is empty.
	#[error("Session secret must not be empty.")]
	EmptySessionSecret,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures reaching the token endpoint.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// The request exceeded the configured timeout.
	#[error("Request timed out while calling the token endpoint.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// The HTTP client failed without a structured error.
	#[error("HTTP client error occurred while calling the token endpoint: {message}.")]
	Other {
		/// Client-supplied message.
		message: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Returns `true` when the failure was a timeout.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}

/// Token endpoint responded, but not with a usable token payload.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Body could not be parsed into the expected token shape.
	#[error("Token endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Body was empty or carried an unexpected content type.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Unexpected {
		/// Summary of the mismatch.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token response declared a lifetime that is zero, negative, or out of range.
	#[error("Token endpoint response declared an unusable expires_in.")]
	InvalidExpiresIn,
}

/// Identity provider rejection of a password or refresh grant.
///
/// `kind` subdivides the rejection for user messaging; callers branch on the variant
/// [`Error::InvalidCredentials`] alone. `description` is only populated when the broker runs
/// in development mode so provider internals never reach production callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("Identity provider rejected the credentials ({oauth_error}).")]
pub struct CredentialRejection {
	/// Classified rejection category.
	pub kind: RejectionKind,
	/// Provider-supplied OAuth `error` code (or `unknown_error`).
	pub oauth_error: String,
	/// Provider-supplied `error_description`, withheld outside development.
	pub description: Option<String>,
	/// HTTP status returned by the token endpoint.
	pub status: Option<u16>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn codes_are_stable() {
		assert_eq!(Error::RefreshTokenExpired.code(), "refresh_token_expired");
		assert_eq!(Error::RateLimited { identity: "10.0.0.1".into() }.code(), "rate_limited");
		assert_eq!(
			Error::from(TransportError::Other { message: "boom".into() }).code(),
			"idp_unavailable"
		);
		assert_eq!(Error::from(UpstreamError::MissingExpiresIn).code(), "malformed_upstream_response");
	}

	#[test]
	fn rejection_display_omits_description() {
		let rejection = CredentialRejection {
			kind: RejectionKind::InvalidGrant,
			oauth_error: "invalid_grant".into(),
			description: Some("Invalid user credentials".into()),
			status: Some(401),
		};
		let rendered = Error::from(rejection).to_string();

		assert!(rendered.contains("invalid_grant"));
		assert!(!rendered.contains("Invalid user credentials"));
	}
}
