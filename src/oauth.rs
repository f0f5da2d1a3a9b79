//! Internal OAuth client facade over the `oauth2` crate.
//!
//! The facade owns a token-endpoint-only `oauth2` client typed for Keycloak's token response
//! (which carries `refresh_expires_in`, `id_token` and `session_state` next to the standard
//! members) and converts every outcome into either a [`TokenGrant`] or a broker [`Error`]:
//!
//! - transport failures and timeouts become [`Error::IdpUnavailable`];
//! - an OAuth error body becomes [`Error::InvalidCredentials`], classified by the strategy;
//! - any other non-2xx answer becomes an `unknown_error` rejection;
//! - a 2xx answer that is not a usable token body becomes
//!   [`Error::MalformedUpstreamResponse`].

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, RefreshToken, RequestTokenError, ResourceOwnerPassword,
	ResourceOwnerUsername, Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse,
	TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, ScopeSet},
	error::{ConfigError, CredentialRejection, TransportError, UpstreamError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderStrategy,
		RejectionKind,
	},
};

/// OAuth `error` reported when the provider's error body cannot be read.
pub const UNKNOWN_ERROR_CODE: &str = "unknown_error";
/// Description paired with [`UNKNOWN_ERROR_CODE`].
pub const UNKNOWN_ERROR_DESCRIPTION: &str = "Unknown authentication error";

type KeycloakTokenResponse = StandardTokenResponse<KeycloakTokenFields, BasicTokenType>;
type KeycloakClient = Client<
	BasicErrorResponse,
	KeycloakTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Keycloak-specific members of a token response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakTokenFields {
	/// Refresh token lifetime in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_expires_in: Option<i64>,
	/// OIDC ID token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
	/// Keycloak session identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_state: Option<String>,
	/// Realm not-before policy.
	#[serde(default, rename = "not-before-policy", skip_serializing_if = "Option::is_none")]
	pub not_before_policy: Option<i64>,
}
impl ExtraTokenFields for KeycloakTokenFields {}

/// Validated token endpoint answer, before any expiry arithmetic.
#[derive(Clone)]
pub struct TokenGrant {
	/// Access token.
	pub access_token: String,
	/// Refresh token, when issued.
	pub refresh_token: Option<String>,
	/// Access lifetime in seconds; always positive.
	pub expires_in: i64,
	/// Refresh lifetime in seconds; `None` when absent or non-positive.
	pub refresh_expires_in: Option<i64>,
	/// OIDC ID token.
	pub id_token: Option<String>,
	/// Keycloak session identifier.
	pub session_state: Option<String>,
	/// Granted scopes, when echoed.
	pub scope: Option<ScopeSet>,
	/// Token endpoint round-trip time.
	pub elapsed: Option<std::time::Duration>,
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("expires_in", &self.expires_in)
			.field("refresh_expires_in", &self.refresh_expires_in)
			.field("has_refresh_token", &self.refresh_token.is_some())
			.field("has_id_token", &self.id_token.is_some())
			.field("scope", &self.scope)
			.finish()
	}
}

/// Maps HTTP transport failures into broker [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a broker error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_grant: GrantType,
		_meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) =>
				if inner.is_builder() {
					ConfigError::from(*inner).into()
				} else {
					TransportError::from(*inner).into()
				},
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => TransportError::Other { message }.into(),
			_ => TransportError::Other { message: "unrecognized transport failure".into() }.into(),
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_password<'a, 'strategy, 'credentials>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		credentials: &'credentials Credentials,
		scopes: &'a ScopeSet,
	) -> FacadeFuture<'a, TokenGrant>
	where
		'strategy: 'a,
		'credentials: 'a;

	fn refresh_token<'a, 'strategy, 'refresh>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		refresh_token: &'refresh str,
	) -> FacadeFuture<'a, TokenGrant>
	where
		'strategy: 'a,
		'refresh: 'a;
}

pub(crate) struct KeycloakFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: KeycloakClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> KeycloakFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client: KeycloakClient =
			Client::new(ClientId::new(client_id.to_owned())).set_token_uri(token_url);
		let secret = match descriptor.preferred_client_auth_method {
			ClientAuthMethod::None => None,
			ClientAuthMethod::ClientSecretPost | ClientAuthMethod::ClientSecretBasic => client_secret,
		};

		if let Some(secret) = secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		// Public clients also need `client_id` in the body, which `RequestBody` guarantees.
		if !matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretBasic) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, http_client, error_mapper })
	}
}
impl<C, M> OAuth2Facade for KeycloakFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_password<'a, 'strategy, 'credentials>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		credentials: &'credentials Credentials,
		scopes: &'a ScopeSet,
	) -> FacadeFuture<'a, TokenGrant>
	where
		'strategy: 'a,
		'credentials: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let username = ResourceOwnerUsername::new(credentials.username().to_owned());
			let password = ResourceOwnerPassword::new(credentials.expose_password().to_owned());
			let mut form = BTreeMap::new();
			let mut request = self.oauth_client.exchange_password(&username, &password);

			for scope in scopes.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}

			strategy.augment_token_request(GrantType::Password, &mut form);

			for (key, value) in form {
				request = request.add_extra_param(key, value);
			}

			let result = request.request_async(&instrumented).await;
			let meta = meta.take();

			match result {
				Ok(response) => map_token_response(response, meta.as_ref()),
				Err(err) => Err(map_request_error(
					strategy,
					GrantType::Password,
					meta.as_ref(),
					err,
					self.error_mapper.as_ref(),
				)),
			}
		})
	}

	fn refresh_token<'a, 'strategy, 'refresh>(
		&'a self,
		strategy: &'strategy dyn ProviderStrategy,
		refresh_token: &'refresh str,
	) -> FacadeFuture<'a, TokenGrant>
	where
		'strategy: 'a,
		'refresh: 'a,
	{
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let mut form = BTreeMap::new();
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			strategy.augment_token_request(GrantType::RefreshToken, &mut form);

			for (key, value) in form {
				request = request.add_extra_param(key, value);
			}

			let result = request.request_async(&instrumented).await;
			let meta = meta.take();

			match result {
				Ok(response) => map_token_response(response, meta.as_ref()),
				Err(err) => Err(map_request_error(
					strategy,
					GrantType::RefreshToken,
					meta.as_ref(),
					err,
					self.error_mapper.as_ref(),
				)),
			}
		})
	}
}

fn map_token_response(
	response: KeycloakTokenResponse,
	meta: Option<&ResponseMetadata>,
) -> Result<TokenGrant> {
	let expires_in = response.expires_in().ok_or(UpstreamError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| UpstreamError::InvalidExpiresIn)?;

	if expires_in <= 0 {
		return Err(UpstreamError::InvalidExpiresIn.into());
	}

	let scope = match response.scopes() {
		Some(scopes) => Some(
			ScopeSet::new(scopes.iter().map(|scope| scope.as_str())).map_err(ConfigError::from)?,
		),
		None => None,
	};
	let extra = response.extra_fields();

	Ok(TokenGrant {
		access_token: response.access_token().secret().to_owned(),
		refresh_token: response.refresh_token().map(|token| token.secret().to_owned()),
		expires_in,
		refresh_expires_in: extra.refresh_expires_in.filter(|secs| *secs > 0),
		id_token: extra.id_token.clone(),
		session_state: extra.session_state.clone(),
		scope,
		elapsed: meta.and_then(|value| value.elapsed),
	})
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<&ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta.and_then(|value| value.status);
	let answered_success = meta.is_some_and(ResponseMetadata::is_success);

	match err {
		RequestTokenError::ServerResponse(response) => {
			let mut ctx = ProviderErrorContext::new(grant)
				.with_oauth_error(response.error().as_ref().to_owned());

			if let Some(description) = response.error_description() {
				ctx = ctx.with_error_description(description.clone());
			}
			if let Some(status) = status {
				ctx = ctx.with_http_status(status);
			}

			CredentialRejection {
				kind: strategy.classify_token_error(&ctx),
				oauth_error: response.error().as_ref().to_owned(),
				description: response.error_description().cloned(),
				status,
			}
			.into()
		},
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta, error),
		RequestTokenError::Parse(source, _body) if answered_success =>
			UpstreamError::Parse { source, status }.into(),
		RequestTokenError::Other(message) if answered_success =>
			UpstreamError::Unexpected { message, status }.into(),
		RequestTokenError::Parse(..) | RequestTokenError::Other(_) => unknown_rejection(status).into(),
	}
}

fn unknown_rejection(status: Option<u16>) -> CredentialRejection {
	CredentialRejection {
		kind: RejectionKind::Other,
		oauth_error: UNKNOWN_ERROR_CODE.into(),
		description: Some(UNKNOWN_ERROR_DESCRIPTION.into()),
		status,
	}
}
