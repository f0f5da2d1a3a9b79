//! Refresh scheduling with single-flight guards and failure propagation.
//!
//! [`Broker::ensure_valid`] is called on every session read. It returns the record untouched
//! while the access token is valid, flags it [`ErrorState::RefreshFailed`] without a network
//! call once the refresh token is gone or expired, and otherwise performs exactly one
//! `grant_type=refresh_token` call per refresh token, no matter how many readers ask at
//! once. A failed record is terminal and is never retried.
//!
//! [`ErrorState::RefreshFailed`]: crate::auth::ErrorState::RefreshFailed

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{
		TokenRecord, TokenSecret,
		token::record::{default_expiry, expiry_after, now_millis, skewed},
	},
	error::ConfigError,
	flows::{Broker, common},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Sends one refresh grant and builds the replacement record.
	///
	/// Both expiries are skewed. The refresh token is rotated when the provider returns a new
	/// one and kept otherwise; a missing `refresh_expires_in` falls back to the default
	/// lifetime.
	pub async fn exchange_refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
		self.exchange_refresh_at(refresh_token, now_millis()).await
	}

	/// [`Broker::exchange_refresh`] with expiries computed from `now` (epoch ms).
	pub async fn exchange_refresh_at(&self, refresh_token: &str, now: i64) -> Result<TokenRecord> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "exchange_refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(async move {
				self.ensure_grant_supported(GrantType::RefreshToken)?;

				let facade = self.facade()?;
				let grant = facade
					.refresh_token(self.strategy.as_ref(), refresh_token)
					.await
					.map_err(|err| common::scrub_rejection(err, self.environment))?;

				obs::audit_idp_latency(KIND, grant.elapsed);

				let refresh_expires_at = grant
					.refresh_expires_in
					.map(|secs| skewed(expiry_after(now, secs)))
					.unwrap_or_else(|| default_expiry(now));

				TokenRecord::builder()
					.access_token(grant.access_token)
					.refresh_token(grant.refresh_token.unwrap_or_else(|| refresh_token.to_owned()))
					.access_expires_at(skewed(expiry_after(now, grant.expires_in)))
					.refresh_expires_at(refresh_expires_at)
					.build()
					.map_err(|err| ConfigError::from(err).into())
			})
			.await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		obs::record_flow_outcome(KIND, span.settle(&result));

		result
	}

	/// Refreshes `record` regardless of its access expiry, exposing the typed failure.
	///
	/// Fails with [`Error::RefreshTokenExpired`] without a network call when the record is
	/// already failed, carries no refresh token, or its refresh token expired at `now`.
	pub async fn refresh_at(&self, record: &TokenRecord, now: i64) -> Result<TokenRecord> {
		let refresh_token = self.refreshable_token(record, now)?;

		self.exchange_refresh_at(refresh_token.expose(), now).await
	}

	/// Returns a record that is valid now, refreshing it when needed.
	pub async fn ensure_valid(&self, record: TokenRecord) -> TokenRecord {
		self.ensure_valid_at(record, now_millis()).await
	}

	/// [`Broker::ensure_valid`] evaluated at `now` (epoch ms).
	///
	/// Never fails: refresh errors are folded into [`ErrorState::RefreshFailed`] with the stale
	/// tokens preserved. Concurrent calls for the same refresh token share one upstream call;
	/// callers must persist the returned record so later reads see the rotated token.
	///
	/// [`ErrorState::RefreshFailed`]: crate::auth::ErrorState::RefreshFailed
	pub async fn ensure_valid_at(&self, record: TokenRecord, now: i64) -> TokenRecord {
		if record.is_refresh_failed() || record.is_access_valid_at(now) {
			return record;
		}

		let key = match self.refreshable_token(&record, now) {
			Ok(refresh_token) => refresh_token.fingerprint(),
			Err(err) => {
				obs::audit_refresh_failure(err.code());

				return record.into_refresh_failed();
			},
		};
		let slot = self.refresh_slot(&key);
		let mut outcome = slot.lock().await;

		if let Some(shared) = outcome.as_ref() {
			self.refresh_metrics.record_coalesced();
			obs::record_flow_outcome(FlowKind::Refresh, FlowOutcome::Coalesced);

			return shared.clone();
		}

		let refreshed = match self.refresh_at(&record, now).await {
			Ok(refreshed) => refreshed,
			Err(err) => {
				obs::audit_refresh_failure(err.code());

				record.into_refresh_failed()
			},
		};

		*outcome = Some(refreshed.clone());

		drop(outcome);
		self.release_refresh_slot(&key, &slot);

		refreshed
	}

	fn refreshable_token<'r>(&self, record: &'r TokenRecord, now: i64) -> Result<&'r TokenSecret> {
		match record.refresh_token.as_ref() {
			Some(token) if !record.is_refresh_failed() && record.refresh_expires_at > now => Ok(token),
			_ => {
				self.refresh_metrics.record_failure();

				Err(Error::RefreshTokenExpired)
			},
		}
	}
}
