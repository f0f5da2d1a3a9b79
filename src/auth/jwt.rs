//! Unverified JWT inspection.
//!
//! These helpers decode the payload segment of a three-part token to read expiry and role
//! claims. **No signature is checked.** Claims extracted here are fit for display and expiry
//! bookkeeping only; any access-control decision based on roles must first verify the token
//! against the identity provider's published key set.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserializer, de::DeserializeOwned};
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, auth::token::record::now_millis};

/// Reasons a token could not be decoded.
#[derive(Debug, ThisError)]
pub enum MalformedToken {
	/// The token did not split into exactly three `.`-separated segments.
	#[error("Token must have exactly three segments, found {found}.")]
	SegmentCount {
		/// Number of segments observed.
		found: usize,
	},
	/// The payload segment is not valid base64url.
	#[error("Token payload is not valid base64url.")]
	Encoding(#[source] base64::DecodeError),
	/// The decoded payload is not a JSON object.
	#[error("Token payload is not valid claim JSON.")]
	Payload(#[source] serde_json::Error),
}

/// Role list wrapper used by `realm_access` and `resource_access` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet {
	/// Role names; non-string entries are skipped.
	#[serde(default, deserialize_with = "string_list")]
	pub roles: Vec<String>,
}

/// Claims read from an access token payload.
///
/// Any JSON object decodes. A known member whose value has an unexpected type reads as
/// `None` (or empty) instead of failing the whole token; unknown members are kept verbatim in
/// `other`. NumericDate members accept fractional seconds and are floored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedClaims {
	/// Subject identifier.
	#[serde(default, deserialize_with = "lenient")]
	pub sub: Option<String>,
	/// Preferred username.
	#[serde(default, deserialize_with = "lenient")]
	pub preferred_username: Option<String>,
	/// User locale.
	#[serde(default, deserialize_with = "lenient")]
	pub locale: Option<String>,
	/// Realm-level roles.
	#[serde(default, deserialize_with = "lenient")]
	pub realm_access: Option<RoleSet>,
	/// Roles per client/resource.
	#[serde(default, deserialize_with = "role_map")]
	pub resource_access: BTreeMap<String, RoleSet>,
	/// Issued-at (epoch seconds).
	#[serde(default, deserialize_with = "numeric_date")]
	pub iat: Option<i64>,
	/// Expiry (epoch seconds).
	#[serde(default, deserialize_with = "numeric_date")]
	pub exp: Option<i64>,
	/// Display name.
	#[serde(default, deserialize_with = "lenient")]
	pub name: Option<String>,
	/// Email address.
	#[serde(default, deserialize_with = "lenient")]
	pub email: Option<String>,
	/// Avatar URL.
	#[serde(default, deserialize_with = "lenient")]
	pub picture: Option<String>,
	/// Given name.
	#[serde(default, deserialize_with = "lenient")]
	pub given_name: Option<String>,
	/// Family name.
	#[serde(default, deserialize_with = "lenient")]
	pub family_name: Option<String>,
	/// Whether the email address has been verified.
	#[serde(default, deserialize_with = "lenient")]
	pub email_verified: Option<bool>,
	/// Remaining payload members.
	#[serde(flatten)]
	pub other: Map<String, Value>,
}
impl DecodedClaims {
	/// Expiry in epoch milliseconds, when present.
	pub fn expires_at_millis(&self) -> Option<i64> {
		self.exp.map(|exp| exp.saturating_mul(1_000))
	}

	/// Issue instant in epoch milliseconds, when present.
	pub fn issued_at_millis(&self) -> Option<i64> {
		self.iat.map(|iat| iat.saturating_mul(1_000))
	}

	/// Realm-level roles (empty when absent).
	pub fn realm_roles(&self) -> &[String] {
		self.realm_access.as_ref().map(|access| access.roles.as_slice()).unwrap_or_default()
	}

	/// Roles granted on `resource` (empty when absent).
	pub fn resource_roles(&self, resource: &str) -> &[String] {
		self.resource_access.get(resource).map(|access| access.roles.as_slice()).unwrap_or_default()
	}

	/// Returns `true` when the realm roles include `role`.
	///
	/// The claim is unverified; see the module docs before using this for access control.
	pub fn has_realm_role(&self, role: &str) -> bool {
		self.realm_roles().iter().any(|candidate| candidate == role)
	}

	/// Realm and resource roles grouped for display.
	pub fn roles(&self) -> UserRoles {
		UserRoles {
			realm_roles: self.realm_roles().to_vec(),
			resource_roles: self
				.resource_access
				.iter()
				.map(|(resource, access)| (resource.clone(), access.roles.clone()))
				.collect(),
		}
	}

	/// Display name, falling back to the preferred username.
	pub fn display_name(&self) -> Option<&str> {
		self.name.as_deref().or(self.preferred_username.as_deref())
	}
}

/// Role summary derived from [`DecodedClaims`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoles {
	/// Realm-level roles.
	pub realm_roles: Vec<String>,
	/// Roles keyed by resource.
	pub resource_roles: BTreeMap<String, Vec<String>>,
}

/// Decodes the payload segment into its exact JSON value.
pub fn decode_payload(token: &str) -> Result<Value, MalformedToken> {
	let segments = token.split('.').collect::<Vec<_>>();

	if segments.len() != 3 {
		return Err(MalformedToken::SegmentCount { found: segments.len() });
	}

	let mut standard = segments[1].replace('-', "+").replace('_', "/");
	let padding = (4 - standard.len() % 4) % 4;

	standard.extend(std::iter::repeat_n('=', padding));

	let bytes = STANDARD.decode(standard).map_err(MalformedToken::Encoding)?;

	serde_json::from_slice(&bytes).map_err(MalformedToken::Payload)
}

/// Decodes the payload segment into [`DecodedClaims`].
pub fn decode(token: &str) -> Result<DecodedClaims, MalformedToken> {
	serde_json::from_value(decode_payload(token)?).map_err(MalformedToken::Payload)
}

/// Returns `true` when `exp` lies before the current second; undecodable tokens count as
/// expired.
pub fn is_expired(token: &str) -> bool {
	is_expired_at(token, now_millis())
}

/// [`is_expired`] evaluated at `now` (epoch ms).
pub fn is_expired_at(token: &str, now: i64) -> bool {
	match expiry_secs(token) {
		Some(exp) => exp < now.div_euclid(1_000),
		None => true,
	}
}

/// Expiry in epoch milliseconds, or `0` when the token cannot be decoded or has no `exp`.
pub fn expiry_millis(token: &str) -> i64 {
	expiry_secs(token).map(|exp| exp.saturating_mul(1_000)).unwrap_or(0)
}

/// `exp` read straight from the payload, so unrelated claims can never hide it.
fn expiry_secs(token: &str) -> Option<i64> {
	decode_payload(token).ok()?.get("exp").and_then(numeric_date_value)
}

/// Seconds since the epoch from a JSON number, floored when fractional.
fn numeric_date_value(value: &Value) -> Option<i64> {
	value.as_i64().or_else(|| {
		value.as_f64().filter(|secs| secs.is_finite()).map(|secs| secs.floor() as i64)
	})
}

fn numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(numeric_date_value(&Value::deserialize(deserializer)?))
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let roles = match Value::deserialize(deserializer)? {
		Value::Array(items) => items
			.into_iter()
			.filter_map(|item| match item {
				Value::String(role) => Some(role),
				_ => None,
			})
			.collect(),
		_ => Vec::new(),
	};

	Ok(roles)
}

fn role_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, RoleSet>, D::Error>
where
	D: Deserializer<'de>,
{
	let map = match Value::deserialize(deserializer)? {
		Value::Object(entries) => entries
			.into_iter()
			.filter_map(|(resource, access)| {
				serde_json::from_value(access).ok().map(|roles| (resource, roles))
			})
			.collect(),
		_ => BTreeMap::new(),
	};

	Ok(map)
}
