//! Fixed-window rate limiting for credential submissions.
//!
//! Each client identity gets at most `max_attempts` admitted submissions per window. A window
//! opens on the first submission after the previous one lapsed, rejected submissions leave
//! the entry untouched, and a successful login deletes the entry.

// crates.io
use oauth2::http::HeaderMap;
// self
use crate::{
	_prelude::*,
	auth::token::record::{duration_millis, now_millis},
	obs,
	store::{MemoryRateLimitStore, RateLimitStore},
};

/// Identity shared by every request that carries no forwarding headers.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Budget applied per client identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitPolicy {
	/// Admitted submissions per window.
	pub max_attempts: u32,
	/// Window length.
	pub window: Duration,
}
impl RateLimitPolicy {
	/// Default number of admitted submissions per window.
	pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
	/// Default window length.
	pub const DEFAULT_WINDOW: Duration = Duration::minutes(15);

	/// Creates a policy with explicit limits.
	pub const fn new(max_attempts: u32, window: Duration) -> Self {
		Self { max_attempts, window }
	}

	/// Window length in milliseconds.
	pub fn window_millis(self) -> i64 {
		duration_millis(self.window)
	}
}
impl Default for RateLimitPolicy {
	fn default() -> Self {
		Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_WINDOW)
	}
}

/// Attempt counter for one identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
	/// Admitted submissions in the current window.
	pub count: u32,
	/// Window start (epoch ms).
	pub window_start: i64,
}
impl RateLimitEntry {
	/// Entry for the first submission of a new window.
	pub fn open(now: i64) -> Self {
		Self { count: 1, window_start: now }
	}

	/// Returns `true` once the window started before `now - window`.
	pub fn is_stale(&self, now: i64, policy: RateLimitPolicy) -> bool {
		self.window_start < now.saturating_sub(policy.window_millis())
	}

	/// Applies one submission to an existing entry and reports whether it is admitted.
	///
	/// A rejected submission does not modify the entry.
	pub fn admit(&mut self, now: i64, policy: RateLimitPolicy) -> bool {
		if self.is_stale(now, policy) {
			*self = Self::open(now);

			return true;
		}
		if self.count >= policy.max_attempts {
			return false;
		}

		self.count += 1;

		true
	}
}

/// Rate limiter bound to a [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
	store: Arc<dyn RateLimitStore>,
	policy: RateLimitPolicy,
}
impl RateLimiter {
	/// Creates a limiter over the provided store.
	pub fn new(store: Arc<dyn RateLimitStore>, policy: RateLimitPolicy) -> Self {
		Self { store, policy }
	}

	/// Creates a limiter over a fresh [`MemoryRateLimitStore`].
	pub fn in_memory(policy: RateLimitPolicy) -> Self {
		Self::new(Arc::new(MemoryRateLimitStore::default()), policy)
	}

	/// Active policy.
	pub fn policy(&self) -> RateLimitPolicy {
		self.policy
	}

	/// Reports whether a submission from `identity` is admitted now.
	pub async fn admit(&self, identity: &str) -> Result<bool> {
		self.admit_at(identity, now_millis()).await
	}

	/// [`RateLimiter::admit`] evaluated at `now` (epoch ms).
	pub async fn admit_at(&self, identity: &str, now: i64) -> Result<bool> {
		let admitted = self.store.admit(identity, now, self.policy).await?;

		if !admitted {
			obs::record_rate_limited();
			obs::audit_rate_limited(identity);
		}

		Ok(admitted)
	}

	/// [`RateLimiter::admit`] as a guard: a rejected submission becomes
	/// [`Error::RateLimited`].
	pub async fn check(&self, identity: &str) -> Result<()> {
		if self.admit(identity).await? {
			Ok(())
		} else {
			Err(Error::RateLimited { identity: identity.to_owned() })
		}
	}

	/// Deletes the window for `identity`, typically after a successful login.
	pub async fn clear(&self, identity: &str) -> Result<()> {
		Ok(self.store.clear(identity).await?)
	}

	/// Current window for `identity`, if any.
	pub async fn entry(&self, identity: &str) -> Result<Option<RateLimitEntry>> {
		Ok(self.store.entry(identity).await?)
	}

	/// Drops expired windows; returns how many were removed.
	pub async fn prune_at(&self, now: i64) -> Result<usize> {
		Ok(self.store.prune(now, self.policy).await?)
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter").field("policy", &self.policy).finish()
	}
}

/// Derives the client identity from forwarding headers.
///
/// Uses the first comma-separated `x-forwarded-for` value, then `x-real-ip`, then
/// [`UNKNOWN_IDENTITY`]. Requests without either header share one bucket.
pub fn client_identity(headers: &HeaderMap) -> String {
	let forwarded = header_value(headers, "x-forwarded-for")
		.and_then(|value| value.split(',').next())
		.map(str::trim)
		.filter(|value| !value.is_empty());

	forwarded
		.or_else(|| header_value(headers, "x-real-ip"))
		.unwrap_or(UNKNOWN_IDENTITY)
		.to_owned()
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
	headers
		.get(name)
		.and_then(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::HeaderValue;
	// self
	use super::*;

	const WINDOW_MS: i64 = 15 * 60 * 1_000;

	#[test]
	fn entry_admits_until_budget_then_rejects_without_mutation() {
		let policy = RateLimitPolicy::default();
		let mut entry = RateLimitEntry::open(0);

		for _ in 1..5 {
			assert!(entry.admit(10, policy));
		}

		assert_eq!(entry.count, 5);
		assert!(!entry.admit(20, policy));
		assert_eq!(entry, RateLimitEntry { count: 5, window_start: 0 });
	}

	#[test]
	fn window_resets_only_after_it_fully_lapses() {
		let policy = RateLimitPolicy::default();
		let mut entry = RateLimitEntry { count: 5, window_start: 0 };

		assert!(!entry.admit(WINDOW_MS, policy));
		assert!(entry.admit(WINDOW_MS + 1, policy));
		assert_eq!(entry, RateLimitEntry::open(WINDOW_MS + 1));
	}

	#[tokio::test]
	async fn limiter_rejects_sixth_attempt_and_clear_restores_budget() {
		let limiter = RateLimiter::in_memory(RateLimitPolicy::default());

		for attempt in 0..5 {
			assert!(limiter.admit_at("1.2.3.4", attempt).await.expect("Admission should succeed."));
		}

		assert!(!limiter.admit_at("1.2.3.4", 5).await.expect("Admission should succeed."));
		assert!(limiter.admit_at("5.6.7.8", 5).await.expect("Other identities are independent."));

		limiter.clear("1.2.3.4").await.expect("Clear should succeed.");

		assert_eq!(limiter.entry("1.2.3.4").await.expect("Lookup should succeed."), None);
		assert!(limiter.admit_at("1.2.3.4", 6).await.expect("Admission should succeed."));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_submissions_never_exceed_the_budget() {
		let limiter = RateLimiter::in_memory(RateLimitPolicy::default());
		let tasks = (0..64)
			.map(|_| {
				let limiter = limiter.clone();

				tokio::spawn(async move { limiter.admit_at("198.51.100.9", 1_000).await })
			})
			.collect::<Vec<_>>();
		let mut admitted = 0;

		for task in tasks {
			if task.await.expect("Admission task should not panic.").expect("Admission should succeed.")
			{
				admitted += 1;
			}
		}

		assert_eq!(admitted, RateLimitPolicy::DEFAULT_MAX_ATTEMPTS);
		assert_eq!(
			limiter.entry("198.51.100.9").await.expect("Lookup should succeed."),
			Some(RateLimitEntry { count: RateLimitPolicy::DEFAULT_MAX_ATTEMPTS, window_start: 1_000 })
		);
	}

	#[tokio::test]
	async fn check_turns_rejections_into_errors() {
		let policy = RateLimitPolicy { max_attempts: 1, ..Default::default() };
		let limiter = RateLimiter::in_memory(policy);

		limiter.check("1.2.3.4").await.expect("First attempt should be admitted.");

		let err = limiter.check("1.2.3.4").await.expect_err("Second attempt exceeds the budget.");

		assert!(matches!(err, Error::RateLimited { ref identity } if identity == "1.2.3.4"));
	}

	#[test]
	fn identity_prefers_forwarded_for_then_real_ip() {
		let mut headers = HeaderMap::new();

		assert_eq!(client_identity(&headers), "unknown");

		headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));

		assert_eq!(client_identity(&headers), "10.0.0.9");

		headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));

		assert_eq!(client_identity(&headers), "203.0.113.7");
	}
}
