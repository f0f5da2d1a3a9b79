//! Provider strategy hooks that customize token exchanges.
//!
//! Implementations decorate outgoing token requests and classify rejections without tying
//! flows to any particular HTTP client.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that lets providers decorate requests and classify rejections.
///
/// Implementors must be `Send + Sync`. The hooks use crate-owned data types so downstream
/// crates never depend on reqwest-specific structures. `augment_token_request` defaults to a
/// no-op.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a provider rejection onto a [`RejectionKind`] for user messaging.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> RejectionKind;

	/// Adds provider-specific form parameters before dispatching.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Rejection categories reported by the identity provider.
///
/// Every kind surfaces as [`Error::InvalidCredentials`]; the kind only selects the message
/// shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
	/// `invalid_grant`: wrong password or a revoked/expired refresh token.
	InvalidGrant,
	/// `invalid_client`: client authentication failed.
	InvalidClient,
	/// `account_disabled`.
	AccountDisabled,
	/// `account_temporarily_disabled`: brute-force lockout on the provider side.
	AccountTemporarilyDisabled,
	/// `invalid_user_credentials`.
	InvalidUserCredentials,
	/// Any other or missing error code.
	Other,
}

/// Context passed to provider strategies when classifying token errors.
///
/// Only primitive data is kept so strategies stay decoupled from any HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
}
impl ProviderErrorContext {
	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self { grant_type, http_status: None, oauth_error: None, error_description: None }
	}

	/// Adds an HTTP status code (e.g., 400, 401).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// Strategy that understands Keycloak's token endpoint error codes.
///
/// Only the `error` member is consulted; descriptions are free text and vary by locale.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("keycloak-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> RejectionKind {
		ctx.oauth_error.as_deref().map(classify_oauth_error).unwrap_or(RejectionKind::Other)
	}
}

fn classify_oauth_error(code: &str) -> RejectionKind {
	match code {
		"invalid_grant" => RejectionKind::InvalidGrant,
		"invalid_client" => RejectionKind::InvalidClient,
		"account_disabled" => RejectionKind::AccountDisabled,
		"account_temporarily_disabled" => RejectionKind::AccountTemporarilyDisabled,
		"invalid_user_credentials" => RejectionKind::InvalidUserCredentials,
		_ => RejectionKind::Other,
	}
}
