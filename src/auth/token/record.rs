//! Session token records, expiry arithmetic, and builders.
//!
//! All instants are epoch milliseconds. Expiries produced by the refresh path and by session
//! normalization have [`EXPIRY_SKEW`] subtracted so consumers never hold a token the identity
//! provider already considers expired.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Negative offset applied to provider-declared expiries.
pub const EXPIRY_SKEW: Duration = Duration::seconds(15);
/// Lifetime assumed when the provider declares none.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::days(30);

/// Converts an instant into epoch milliseconds.
pub fn unix_millis(instant: OffsetDateTime) -> i64 {
	(instant.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Current wall-clock reading in epoch milliseconds.
pub fn now_millis() -> i64 {
	unix_millis(OffsetDateTime::now_utc())
}

/// Whole milliseconds in `duration`, saturating at the `i64` range.
pub fn duration_millis(duration: Duration) -> i64 {
	i64::try_from(duration.whole_milliseconds()).unwrap_or(if duration.is_negative() {
		i64::MIN
	} else {
		i64::MAX
	})
}

/// Subtracts [`EXPIRY_SKEW`] from an absolute expiry.
pub fn skewed(expires_at: i64) -> i64 {
	expires_at.saturating_sub(duration_millis(EXPIRY_SKEW))
}

/// Absolute expiry for a relative lifetime in seconds, without skew.
pub fn expiry_after(now: i64, lifetime_secs: i64) -> i64 {
	now.saturating_add(lifetime_secs.saturating_mul(1_000))
}

/// Skewed fallback expiry used whenever the provider declares no lifetime.
///
/// Both access and refresh fallbacks go through here so the default is `30 days - 15 s`
/// everywhere.
pub fn default_expiry(now: i64) -> i64 {
	skewed(now.saturating_add(duration_millis(DEFAULT_TOKEN_LIFETIME)))
}

/// Failure marker persisted alongside the tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorState {
	/// No failure recorded.
	#[default]
	None,
	/// The refresh token expired or was rejected; re-authentication is required.
	#[serde(rename = "RefreshAccessTokenError")]
	RefreshFailed,
}
impl ErrorState {
	/// Label used in session payloads; `None` for a healthy record.
	pub fn as_label(self) -> Option<&'static str> {
		match self {
			ErrorState::None => None,
			ErrorState::RefreshFailed => Some("RefreshAccessTokenError"),
		}
	}
}

/// Lifecycle status of a record at an instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
	/// Access token is still valid.
	Active,
	/// Access token expired, but the refresh token can still be exchanged.
	Refreshable,
	/// Both tokens are unusable.
	Expired,
	/// The record is flagged [`ErrorState::RefreshFailed`].
	Failed,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when an expiry was not configured.
	#[error("The {which} token expiry is required.")]
	MissingExpiry {
		/// Which expiry is missing (`access` or `refresh`).
		which: &'static str,
	},
}

/// Token pair persisted in the session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
	/// Access token issued by the provider.
	pub access_token: TokenSecret,
	/// Refresh token, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Access token expiry (epoch ms).
	pub access_expires_at: i64,
	/// Refresh token expiry (epoch ms).
	pub refresh_expires_at: i64,
	/// Failure marker.
	#[serde(default)]
	pub error_state: ErrorState,
}
impl TokenRecord {
	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Computes the lifecycle status at `now` (epoch ms).
	pub fn status_at(&self, now: i64) -> TokenStatus {
		if self.is_refresh_failed() {
			return TokenStatus::Failed;
		}
		if self.access_expires_at > now {
			return TokenStatus::Active;
		}
		if self.refresh_token.is_some() && self.refresh_expires_at > now {
			return TokenStatus::Refreshable;
		}

		TokenStatus::Expired
	}

	/// Convenience helper that checks the status using the current clock.
	pub fn status(&self) -> TokenStatus {
		self.status_at(now_millis())
	}

	/// Returns `true` if the access token is still valid at `now`.
	pub fn is_access_valid_at(&self, now: i64) -> bool {
		self.access_expires_at > now
	}

	/// Returns `true` if the record carries [`ErrorState::RefreshFailed`].
	pub fn is_refresh_failed(&self) -> bool {
		matches!(self.error_state, ErrorState::RefreshFailed)
	}

	/// Flags the record as permanently failed, keeping the stale tokens.
	pub fn into_refresh_failed(mut self) -> Self {
		self.error_state = ErrorState::RefreshFailed;

		self
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("access_expires_at", &self.access_expires_at)
			.field("refresh_expires_at", &self.refresh_expires_at)
			.field("error_state", &self.error_state)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	access_expires_at: Option<i64>,
	refresh_expires_at: Option<i64>,
}
impl TokenRecordBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the absolute access expiry (epoch ms).
	pub fn access_expires_at(mut self, expires_at: i64) -> Self {
		self.access_expires_at = Some(expires_at);

		self
	}

	/// Sets the absolute refresh expiry (epoch ms).
	pub fn refresh_expires_at(mut self, expires_at: i64) -> Self {
		self.refresh_expires_at = Some(expires_at);

		self
	}

	/// Consumes the builder and produces a healthy [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let access_expires_at = self
			.access_expires_at
			.ok_or(TokenRecordBuilderError::MissingExpiry { which: "access" })?;
		let refresh_expires_at = self
			.refresh_expires_at
			.ok_or(TokenRecordBuilderError::MissingExpiry { which: "refresh" })?;

		Ok(TokenRecord {
			access_token,
			refresh_token: self.refresh_token,
			access_expires_at,
			refresh_expires_at,
			error_state: ErrorState::None,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn record(access_expires_at: i64, refresh_expires_at: i64) -> TokenRecord {
		TokenRecord::builder()
			.access_token("access")
			.refresh_token("refresh")
			.access_expires_at(access_expires_at)
			.refresh_expires_at(refresh_expires_at)
			.build()
			.expect("Token record builder should succeed for fixtures.")
	}

	#[test]
	fn status_transitions_cover_all_states() {
		let record = record(2_000, 5_000);

		assert_eq!(record.status_at(1_999), TokenStatus::Active);
		assert_eq!(record.status_at(2_000), TokenStatus::Refreshable);
		assert_eq!(record.status_at(5_000), TokenStatus::Expired);
		assert_eq!(record.clone().into_refresh_failed().status_at(0), TokenStatus::Failed);
	}

	#[test]
	fn missing_refresh_token_is_never_refreshable() {
		let record = TokenRecord::builder()
			.access_token("access")
			.access_expires_at(1_000)
			.refresh_expires_at(9_000)
			.build()
			.expect("Record without refresh token should build.");

		assert_eq!(record.status_at(2_000), TokenStatus::Expired);
	}

	#[test]
	fn builder_requires_token_and_expiries() {
		assert_eq!(
			TokenRecord::builder().build().expect_err("Empty builder must fail."),
			TokenRecordBuilderError::MissingAccessToken
		);
		assert_eq!(
			TokenRecord::builder()
				.access_token("a")
				.access_expires_at(1)
				.build()
				.expect_err("Refresh expiry is required."),
			TokenRecordBuilderError::MissingExpiry { which: "refresh" }
		);
	}

	#[test]
	fn expiry_helpers_apply_fixed_skew() {
		let now = unix_millis(macros::datetime!(2025-01-01 00:00 UTC));

		assert_eq!(now, 1_735_689_600_000);
		assert_eq!(skewed(now), now - 15_000);
		assert_eq!(expiry_after(now, 300), now + 300_000);
		assert_eq!(default_expiry(now), now + 30 * 24 * 3_600 * 1_000 - 15_000);
	}

	#[test]
	fn serialized_shape_uses_session_field_names() {
		let failed = record(1, 2).into_refresh_failed();
		let json = serde_json::to_value(&failed).expect("Record should serialize.");

		assert_eq!(json["accessToken"], "access");
		assert_eq!(json["refreshExpiresAt"], 2);
		assert_eq!(json["errorState"], "RefreshAccessTokenError");

		let round_trip: TokenRecord =
			serde_json::from_value(json).expect("Record should deserialize.");

		assert_eq!(round_trip, failed);
		assert!(!format!("{failed:?}").contains("access\""));
	}
}
