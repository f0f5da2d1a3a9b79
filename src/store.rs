//! Storage contract and the built-in in-memory backend for login rate-limit windows.

pub mod memory;

pub use memory::MemoryRateLimitStore;

// self
use crate::{
	_prelude::*,
	rate_limit::{RateLimitEntry, RateLimitPolicy},
};

/// Boxed future returned by [`RateLimitStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend for per-identity attempt windows.
///
/// `admit` must evaluate and update an entry atomically: two concurrent submissions from
/// the same identity may never both observe the same count.
pub trait RateLimitStore
where
	Self: Send + Sync,
{
	/// Applies the fixed-window algorithm for `identity` at `now` (epoch ms) and reports
	/// whether the attempt is admitted.
	fn admit<'a>(
		&'a self,
		identity: &'a str,
		now: i64,
		policy: RateLimitPolicy,
	) -> StoreFuture<'a, bool>;

	/// Deletes the window for `identity`.
	fn clear<'a>(&'a self, identity: &'a str) -> StoreFuture<'a, ()>;

	/// Returns the current window for `identity`, if any.
	fn entry<'a>(&'a self, identity: &'a str) -> StoreFuture<'a, Option<RateLimitEntry>>;

	/// Drops every window that started before `now - policy.window`; returns how many.
	fn prune(&self, now: i64, policy: RateLimitPolicy) -> StoreFuture<'_, usize>;
}

/// Error type produced by [`RateLimitStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
