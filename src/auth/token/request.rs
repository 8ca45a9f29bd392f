//! Stateless token requests: client credentials or on-behalf-of a signed-in user.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	provider::GrantType,
};

/// Incoming user token presented for an on-behalf-of exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct UserAssertion(TokenSecret);
impl UserAssertion {
	/// Wraps the raw user token supplied by the login middleware.
	pub fn new(token: impl Into<String>) -> Self {
		Self(TokenSecret::new(token))
	}

	/// Returns the raw token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.0.expose()
	}

	/// Returns `true` when the token is empty or whitespace.
	pub fn is_blank(&self) -> bool {
		self.0.is_blank()
	}

	/// SHA-256 digest of the token (base64url, no padding) used as a cache partition.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.expose().as_bytes());

		URL_SAFE_NO_PAD.encode(hasher.finalize())
	}
}
impl Debug for UserAssertion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("UserAssertion").field(&"<redacted>").finish()
	}
}

/// Token request value object; never persisted.
#[derive(Clone, Debug)]
pub enum TokenRequest {
	/// Token for the application's own identity.
	Client {
		/// Requested scopes.
		scope: ScopeSet,
	},
	/// Token exchanged on behalf of the user who presented `assertion`.
	OnBehalfOf {
		/// Incoming user token.
		assertion: UserAssertion,
		/// Requested scopes.
		scope: ScopeSet,
	},
}
impl TokenRequest {
	/// Builds a client-credentials request.
	pub fn client(scope: ScopeSet) -> Self {
		Self::Client { scope }
	}

	/// Builds an on-behalf-of request.
	pub fn on_behalf_of(assertion: UserAssertion, scope: ScopeSet) -> Self {
		Self::OnBehalfOf { assertion, scope }
	}

	/// Requested scopes.
	pub fn scope(&self) -> &ScopeSet {
		match self {
			Self::Client { scope } | Self::OnBehalfOf { scope, .. } => scope,
		}
	}

	/// Grant used to satisfy the request.
	pub fn grant(&self) -> GrantType {
		match self {
			Self::Client { .. } => GrantType::ClientCredentials,
			Self::OnBehalfOf { .. } => GrantType::OnBehalfOf,
		}
	}
}
