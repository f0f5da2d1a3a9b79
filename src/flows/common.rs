//! Shared helpers for flow implementations (facade construction, grant checks, guards).

// self
use crate::{
	_prelude::*,
	config::Environment,
	error::ConfigError,
	flows::{Broker, RefreshSlot},
	http::TokenHttpClient,
	oauth::{KeycloakFacade, TransportErrorMapper},
	provider::GrantType,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn facade(&self) -> Result<KeycloakFacade<C, M>> {
		KeycloakFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}

	pub(crate) fn ensure_grant_supported(&self, grant: GrantType) -> Result<()> {
		if self.descriptor.supports(grant) {
			Ok(())
		} else {
			Err(ConfigError::UnsupportedGrant {
				descriptor: self.descriptor.id.to_string(),
				grant: grant.as_str(),
			}
			.into())
		}
	}

	/// Returns (and creates on demand) the single-flight slot for a refresh token.
	pub(crate) fn refresh_slot(&self, key: &str) -> RefreshSlot {
		let mut guards = self.refresh_guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(None))).clone()
	}

	/// Drops the slot once its leader finished, unless a newer slot replaced it.
	pub(crate) fn release_refresh_slot(&self, key: &str, slot: &RefreshSlot) {
		let mut guards = self.refresh_guards.lock();

		if guards.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
			guards.remove(key);
		}
	}

	#[cfg(test)]
	pub(crate) fn pending_refresh_slots(&self) -> usize {
		self.refresh_guards.lock().len()
	}
}

/// Drops provider error descriptions outside development.
pub(crate) fn scrub_rejection(err: Error, environment: Environment) -> Error {
	match err {
		Error::InvalidCredentials(mut rejection) if !environment.is_development() => {
			rejection.description = None;

			Error::InvalidCredentials(rejection)
		},
		other => other,
	}
}
