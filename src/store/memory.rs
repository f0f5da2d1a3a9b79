//! Process-local [`RateLimitStore`] backed by a mutex-guarded map.

// self
use crate::{
	_prelude::*,
	rate_limit::{RateLimitEntry, RateLimitPolicy},
	store::{RateLimitStore, StoreFuture},
};

/// Table size that triggers the first sweep of stale windows on admission.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 1_024;

#[derive(Debug)]
struct Windows {
	entries: HashMap<String, RateLimitEntry>,
	floor: usize,
	prune_at: usize,
}
impl Windows {
	fn new(floor: usize) -> Self {
		let floor = floor.max(1);

		Self { entries: HashMap::new(), floor, prune_at: floor }
	}

	fn prune(&mut self, now: i64, policy: RateLimitPolicy) -> usize {
		let before = self.entries.len();

		self.entries.retain(|_, entry| !entry.is_stale(now, policy));
		// Sweep again once the live set doubles.
		self.prune_at = self.floor.max(self.entries.len().saturating_mul(2));

		before - self.entries.len()
	}
}

type WindowMap = Arc<Mutex<Windows>>;

/// In-memory rate-limit windows; state is lost when the process exits.
///
/// Every operation runs inside a single critical section, so concurrent admissions for one
/// identity are serialized and no increment is lost. Admitting a new identity sweeps stale
/// windows whenever the table has grown past its prune threshold, so identities that never
/// log in successfully do not accumulate.
#[derive(Clone, Debug)]
pub struct MemoryRateLimitStore(WindowMap);
impl MemoryRateLimitStore {
	/// Creates a store that sweeps stale windows once `threshold` identities are tracked.
	pub fn with_prune_threshold(threshold: usize) -> Self {
		Self(Arc::new(Mutex::new(Windows::new(threshold))))
	}

	/// Number of identities currently tracked.
	pub fn len(&self) -> usize {
		self.0.lock().entries.len()
	}

	/// Returns `true` when no identity is tracked.
	pub fn is_empty(&self) -> bool {
		self.0.lock().entries.is_empty()
	}

	fn admit_now(map: &WindowMap, identity: &str, now: i64, policy: RateLimitPolicy) -> bool {
		let mut windows = map.lock();

		if let Some(entry) = windows.entries.get_mut(identity) {
			return entry.admit(now, policy);
		}
		if windows.entries.len() >= windows.prune_at {
			windows.prune(now, policy);
		}

		windows.entries.insert(identity.to_owned(), RateLimitEntry::open(now));

		true
	}

	fn prune_now(map: &WindowMap, now: i64, policy: RateLimitPolicy) -> usize {
		map.lock().prune(now, policy)
	}
}
impl Default for MemoryRateLimitStore {
	fn default() -> Self {
		Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
	}
}
impl RateLimitStore for MemoryRateLimitStore {
	fn admit<'a>(
		&'a self,
		identity: &'a str,
		now: i64,
		policy: RateLimitPolicy,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(Self::admit_now(&self.0, identity, now, policy)) })
	}

	fn clear<'a>(&'a self, identity: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.lock().entries.remove(identity);

			Ok(())
		})
	}

	fn entry<'a>(&'a self, identity: &'a str) -> StoreFuture<'a, Option<RateLimitEntry>> {
		Box::pin(async move { Ok(self.0.lock().entries.get(identity).copied()) })
	}

	fn prune(&self, now: i64, policy: RateLimitPolicy) -> StoreFuture<'_, usize> {
		Box::pin(async move { Ok(Self::prune_now(&self.0, now, policy)) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const POLICY: RateLimitPolicy = RateLimitPolicy::new(2, Duration::seconds(10));

	#[test]
	fn first_admission_opens_a_window() {
		let store = MemoryRateLimitStore::default();

		assert!(MemoryRateLimitStore::admit_now(&store.0, "10.0.0.1", 1_000, POLICY));
		assert_eq!(
			store.0.lock().entries.get("10.0.0.1").copied(),
			Some(RateLimitEntry { count: 1, window_start: 1_000 })
		);
	}

	#[test]
	fn prune_drops_only_stale_windows() {
		let store = MemoryRateLimitStore::default();

		MemoryRateLimitStore::admit_now(&store.0, "old", 0, POLICY);
		MemoryRateLimitStore::admit_now(&store.0, "fresh", 15_000, POLICY);

		assert_eq!(MemoryRateLimitStore::prune_now(&store.0, 20_000, POLICY), 1);
		assert_eq!(store.len(), 1);
		assert!(store.0.lock().entries.contains_key("fresh"));
	}

	#[test]
	fn new_identities_sweep_stale_windows_past_the_threshold() {
		let store = MemoryRateLimitStore::with_prune_threshold(3);

		for identity in ["a", "b", "c"] {
			assert!(MemoryRateLimitStore::admit_now(&store.0, identity, 0, POLICY));
		}

		assert_eq!(store.len(), 3);

		// Inside the window nothing is stale, so the table grows and the threshold doubles.
		assert!(MemoryRateLimitStore::admit_now(&store.0, "d", 5_000, POLICY));
		assert_eq!(store.len(), 4);
		assert_eq!(store.0.lock().prune_at, 6);

		for identity in ["e", "f"] {
			assert!(MemoryRateLimitStore::admit_now(&store.0, identity, 5_000, POLICY));
		}

		// `a`..`c` opened at 0 and lapsed; `d`..`f` are still live.
		assert!(MemoryRateLimitStore::admit_now(&store.0, "g", 12_000, POLICY));
		assert_eq!(store.len(), 4);

		for identity in ["a", "b", "c"] {
			assert!(!store.0.lock().entries.contains_key(identity));
		}
	}
}
