//! Flow orchestrators: credential login and refresh scheduling.

pub mod common;
pub mod password;
pub mod refresh;

pub use password::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::TokenRecord,
	config::Environment,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	provider::{ProviderDescriptor, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Per-refresh-token slot: the leader stores the outcome, followers read it.
pub(crate) type RefreshSlot = Arc<AsyncMutex<Option<TokenRecord>>>;

/// Talks to one identity provider on behalf of the login endpoint and session callbacks.
///
/// The broker owns the HTTP transport, provider descriptor, strategy, and client
/// credentials, so the password and refresh flows only carry grant-specific logic. Clones
/// share the refresh guards and metrics.
#[derive(Clone)]
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Provider descriptor that defines the token endpoint and client auth.
	pub descriptor: ProviderDescriptor,
	/// Strategy responsible for request decoration and rejection classification.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier used in every grant.
	pub client_id: String,
	/// Optional client secret for confidential clients.
	pub client_secret: Option<String>,
	/// Deployment environment; provider error descriptions are kept only in development.
	pub environment: Environment,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	refresh_guards: Arc<Mutex<HashMap<String, RefreshSlot>>>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			environment: Environment::default(),
			refresh_metrics: Default::default(),
			refresh_guards: Default::default(),
		}
	}

	/// Sets or replaces the client secret used by confidential clients.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Overrides the deployment environment.
	pub fn with_environment(mut self, environment: Environment) -> Self {
		self.environment = environment;

		self
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest transport bounded by `timeout`.
	///
	/// Use [`Broker::with_client_secret`] to attach a confidential client secret.
	pub fn new(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		timeout: std::time::Duration,
	) -> Result<Self> {
		let http_client = ReqwestHttpClient::new(timeout)?;

		Ok(Self::with_http_client(
			descriptor,
			strategy,
			client_id,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("environment", &self.environment)
			.finish()
	}
}
