// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet},
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor, ProviderEndpoints, SupportedGrants},
};

/// Hosts allowed to serve the token endpoint over plain HTTP.
const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Token endpoint is mandatory for all flows.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// At least one grant must be supported.
	#[error("Descriptor must enable at least one grant type.")]
	NoSupportedGrants,
	/// Non-loopback endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: ProviderId,
	/// Token endpoint used for exchanges and refreshes.
	pub token_endpoint: Option<Url>,
	/// Grants enabled for the provider.
	pub supported_grants: SupportedGrants,
	/// Preferred client authentication method for the token endpoint.
	pub preferred_client_auth_method: ClientAuthMethod,
	/// Scopes requested by the password grant.
	pub login_scopes: ScopeSet,
}
impl ProviderDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: ProviderId) -> Self {
		Self {
			id,
			token_endpoint: None,
			supported_grants: SupportedGrants::default(),
			preferred_client_auth_method: ClientAuthMethod::default(),
			login_scopes: ScopeSet::login_default(),
		}
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Marks a single grant type as supported.
	pub fn support_grant(mut self, grant: GrantType) -> Self {
		self.supported_grants = self.supported_grants.enable(grant);

		self
	}

	/// Marks multiple grants as supported.
	pub fn support_grants<I>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = GrantType>,
	{
		for grant in grants {
			self.supported_grants = self.supported_grants.enable(grant);
		}

		self
	}

	/// Overrides the preferred client authentication method.
	pub fn preferred_client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.preferred_client_auth_method = method;

		self
	}

	/// Overrides the scopes sent with password logins.
	pub fn login_scopes(mut self, scopes: ScopeSet) -> Self {
		self.login_scopes = scopes;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let descriptor = ProviderDescriptor {
			id: self.id,
			endpoints: ProviderEndpoints { token },
			supported_grants: self.supported_grants,
			preferred_client_auth_method: self.preferred_client_auth_method,
			login_scopes: self.login_scopes,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		if self.supported_grants.is_empty() {
			return Err(ProviderDescriptorError::NoSupportedGrants);
		}

		validate_endpoint("token", &self.endpoints.token)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	let loopback = url.host_str().is_some_and(|host| LOOPBACK_HOSTS.contains(&host));

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptor::builder(
			ProviderId::new("keycloak").expect("Provider identifier fixture should be valid."),
		)
	}

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("URL fixture should parse.")
	}

	#[test]
	fn build_requires_token_endpoint_and_grants() {
		assert_eq!(
			builder().support_grant(GrantType::Password).build(),
			Err(ProviderDescriptorError::MissingTokenEndpoint)
		);
		assert_eq!(
			builder().token_endpoint(url("https://idp.example.com/token")).build(),
			Err(ProviderDescriptorError::NoSupportedGrants)
		);
	}

	#[test]
	fn plain_http_is_limited_to_loopback_hosts() {
		let insecure = builder()
			.token_endpoint(url("http://idp.example.com/token"))
			.support_grant(GrantType::Password)
			.build();

		assert!(matches!(insecure, Err(ProviderDescriptorError::InsecureEndpoint { .. })));

		for raw in ["http://localhost:8080/token", "http://127.0.0.1:1/token", "http://[::1]/t"] {
			let descriptor = builder()
				.token_endpoint(url(raw))
				.support_grants([GrantType::Password, GrantType::RefreshToken])
				.build()
				.expect("Loopback endpoints should be accepted.");

			assert!(descriptor.supports(GrantType::RefreshToken));
		}
	}

	#[test]
	fn defaults_target_keycloak_confidential_clients() {
		let descriptor = builder()
			.token_endpoint(url("https://idp.example.com/realms/demo/protocol/openid-connect/token"))
			.support_grant(GrantType::Password)
			.build()
			.expect("Descriptor fixture should build.");

		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert_eq!(descriptor.login_scopes.normalized(), "openid profile email");
		assert!(!descriptor.supports(GrantType::RefreshToken));
	}
}
