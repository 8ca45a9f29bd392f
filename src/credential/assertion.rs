//! Client assertions and the capability that produces them.

// self
use crate::{_prelude::*, auth::TokenSecret, error::CredentialError};

/// Boxed future returned by [`AssertionProvider::assertion`].
pub type AssertionFuture<'a> = Pin<Box<dyn Future<Output = Result<ClientAssertion>> + 'a + Send>>;

/// Signed JWT presented as `client_assertion` instead of a client secret.
#[derive(Clone)]
pub struct ClientAssertion {
	token: TokenSecret,
	expires_at: Option<OffsetDateTime>,
}
impl ClientAssertion {
	/// Wraps a raw assertion with unknown expiry.
	pub fn new(token: impl Into<String>) -> Self {
		Self { token: TokenSecret::new(token), expires_at: None }
	}

	/// Records when the assertion stops being accepted.
	pub fn with_expires_at(mut self, expires_at: OffsetDateTime) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Returns the raw assertion. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.token.expose()
	}

	/// Expiry reported by the issuer, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// Rejects blank or already expired assertions.
	pub fn validate_at(self, instant: OffsetDateTime) -> Result<Self, CredentialError> {
		if self.token.is_blank() {
			return Err(CredentialError::Assertion { message: "assertion is empty".into() });
		}
		if self.expires_at.is_some_and(|expires_at| expires_at <= instant) {
			return Err(CredentialError::Assertion { message: "assertion has expired".into() });
		}

		Ok(self)
	}
}
impl Debug for ClientAssertion {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientAssertion")
			.field("token", &self.token)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Deferred computation producing a fresh client assertion.
///
/// Invoked every time the confidential client authenticates. Implementations must tolerate
/// concurrent calls and must not hand out an assertion past its validity.
pub trait AssertionProvider
where
	Self: Send + Sync,
{
	/// Produces an assertion for the next token request.
	fn assertion(&self) -> AssertionFuture<'_>;
}

/// Adapts an async closure into an [`AssertionProvider`].
pub struct FnAssertionProvider<F>(F);
impl<F, Fut> FnAssertionProvider<F>
where
	F: Fn() -> Fut,
	Fut: Future<Output = Result<ClientAssertion>>,
{
	/// Wraps `callback`.
	pub fn new(callback: F) -> Self {
		Self(callback)
	}
}
impl<F, Fut> AssertionProvider for FnAssertionProvider<F>
where
	F: Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<ClientAssertion>>,
{
	fn assertion(&self) -> AssertionFuture<'_> {
		Box::pin((self.0)())
	}
}
impl<F> Debug for FnAssertionProvider<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FnAssertionProvider(..)")
	}
}
