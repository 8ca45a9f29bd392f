//! Access tokens issued by the identity provider.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Bearer access token plus the metadata the token cache needs.
#[derive(Clone)]
pub struct AccessToken {
	/// Bearer value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Scopes the token was requested for.
	pub scope: ScopeSet,
	/// Instant the response was received.
	pub issued_at: OffsetDateTime,
	/// Instant after which the provider no longer accepts the token.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Creates a token that expires `expires_in` after `issued_at`.
	pub fn new(
		secret: impl Into<String>,
		scope: ScopeSet,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Self {
		let expires_at = issued_at + expires_in;

		Self { secret: TokenSecret::new(secret), scope, issued_at, expires_at }
	}

	/// Returns the bearer value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.secret.expose()
	}

	/// Remaining lifetime at `instant` (negative once expired).
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}

	/// Returns `true` when the token stays valid for longer than `buffer` after `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, buffer: Duration) -> bool {
		self.remaining_at(instant) > buffer
	}

	/// Returns `true` once `instant` reaches the expiry.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &self.secret)
			.field("scope", &self.scope)
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
