//! In-memory token cache with per-key singleflight guards.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenRequest},
};

/// Whose identity a cached token represents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum CacheIdentity {
	/// The application itself.
	App,
	/// A user, identified by the fingerprint of their assertion.
	User(String),
}

/// Identity plus scope-set fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
	identity: CacheIdentity,
	scope: String,
}
impl CacheKey {
	pub(crate) fn for_request(request: &TokenRequest) -> Self {
		let identity = match request {
			TokenRequest::Client { .. } => CacheIdentity::App,
			TokenRequest::OnBehalfOf { assertion, .. } =>
				CacheIdentity::User(assertion.fingerprint()),
		};

		Self { identity, scope: request.scope().fingerprint() }
	}
}

#[derive(Debug)]
pub(crate) struct TokenCache {
	entries: RwLock<HashMap<CacheKey, AccessToken>>,
	guards: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
	expiry_buffer: Duration,
}
impl TokenCache {
	pub(crate) fn new(expiry_buffer: Duration) -> Self {
		Self { entries: Default::default(), guards: Default::default(), expiry_buffer }
	}

	/// Returns the entry when it stays valid beyond the expiry buffer.
	pub(crate) fn get(&self, key: &CacheKey, now: OffsetDateTime) -> Option<AccessToken> {
		let entries = self.entries.read();

		entries.get(key).filter(|token| token.is_fresh_at(now, self.expiry_buffer)).cloned()
	}

	/// Stores `token` and drops expired entries plus idle guards.
	pub(crate) fn insert(&self, key: CacheKey, token: AccessToken) {
		let now = OffsetDateTime::now_utc();
		let mut entries = self.entries.write();

		entries.retain(|_, existing| !existing.is_expired_at(now));
		entries.insert(key, token);

		self.guards
			.lock()
			.retain(|key, guard| Arc::strong_count(guard) > 1 || entries.contains_key(key));
	}

	/// Returns (and creates on demand) the singleflight guard for `key`.
	pub(crate) fn guard(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
		let mut guards = self.guards.lock();

		guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.read().len()
	}

	pub(crate) fn clear(&self) {
		self.entries.write().clear();
		self.guards.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::auth::{ScopeSet, UserAssertion};

	fn scope(raw: &str) -> ScopeSet {
		ScopeSet::from_str(raw).expect("Scope fixture should be valid.")
	}

	#[test]
	fn keys_partition_by_identity_and_scope() {
		let app = CacheKey::for_request(&TokenRequest::client(scope("b a")));
		let app_reordered = CacheKey::for_request(&TokenRequest::client(scope("a b")));
		let alice = CacheKey::for_request(&TokenRequest::on_behalf_of(
			UserAssertion::new("alice.jwt"),
			scope("a b"),
		));
		let bob = CacheKey::for_request(&TokenRequest::on_behalf_of(
			UserAssertion::new("bob.jwt"),
			scope("a b"),
		));

		assert_eq!(app, app_reordered);
		assert_ne!(app, alice);
		assert_ne!(alice, bob);
		assert!(!format!("{alice:?}").contains("alice.jwt"));
	}

	#[test]
	fn entries_inside_the_buffer_are_misses() {
		let cache = TokenCache::new(Duration::minutes(5));
		let issued_at = datetime!(2030-01-01 00:00 UTC);
		let scopes = scope("api://backend/.default");
		let key = CacheKey::for_request(&TokenRequest::client(scopes.clone()));
		let token = AccessToken::new("token", scopes, issued_at, Duration::hours(1));

		cache.insert(key.clone(), token);

		assert!(cache.get(&key, issued_at + Duration::minutes(54)).is_some());
		assert!(cache.get(&key, issued_at + Duration::minutes(55)).is_none());
		assert_eq!(cache.len(), 1);

		cache.clear();

		assert_eq!(cache.len(), 0);
	}

	#[test]
	fn guards_are_shared_per_key() {
		let cache = TokenCache::new(Duration::ZERO);
		let key = CacheKey::for_request(&TokenRequest::client(scope("a")));
		let first = cache.guard(&key);
		let second = cache.guard(&key);

		assert!(Arc::ptr_eq(&first, &second));
	}
}
