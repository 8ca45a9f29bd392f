//! The confidential-client credential shared by the secret and federated variants.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet, TokenRequest, TokenSecret, UserAssertion},
	client::{ClientAuth, ClientSettings, ConfidentialClientFactory},
	credential::{AssertionProvider, CredentialKind, CredentialStrategy, TokenFuture},
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper, TokenHttpClient, TransportErrorMapper},
};

/// Credential backed by one memoized confidential client.
///
/// The variant is fixed by the factory's [`ClientAuth`]: a client secret for
/// [`CredentialKind::Secret`], or an [`AssertionProvider`] called for every token-endpoint
/// request for [`CredentialKind::Federated`]. Cached tokens need no assertion.
pub struct ConfidentialCredential<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	factory: Arc<ConfidentialClientFactory<C, M>>,
}
impl<C, M> ConfidentialCredential<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a credential whose confidential client authenticates with `auth`.
	pub fn with_http_client(
		settings: ClientSettings,
		auth: ClientAuth,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self::with_factory(Arc::new(ConfidentialClientFactory::with_http_client(
			settings,
			auth,
			http_client,
			mapper,
		)))
	}

	/// Wraps an existing factory.
	pub fn with_factory(factory: Arc<ConfidentialClientFactory<C, M>>) -> Self {
		Self { factory }
	}

	/// Factory owning the memoized client handle.
	pub fn factory(&self) -> &Arc<ConfidentialClientFactory<C, M>> {
		&self.factory
	}

	async fn acquire(&self, request: TokenRequest) -> Result<AccessToken> {
		#[cfg(feature = "tracing")]
		tracing::info!(
			credential = %self.kind(),
			grant = %request.grant(),
			scope = %request.scope(),
			"Acquiring token."
		);

		self.factory.client().await?.acquire(&request).await
	}
}
impl ConfidentialCredential {
	/// Secret variant on a caller-provided reqwest client.
	pub fn secret(
		settings: ClientSettings,
		secret: TokenSecret,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self::with_reqwest(settings, ClientAuth::Secret(secret), http_client)
	}

	/// Federated variant on a caller-provided reqwest client.
	pub fn federated(
		settings: ClientSettings,
		provider: Arc<dyn AssertionProvider>,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self::with_reqwest(settings, ClientAuth::Assertion(provider), http_client)
	}

	fn with_reqwest(
		settings: ClientSettings,
		auth: ClientAuth,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self::with_http_client(settings, auth, http_client, ReqwestTransportErrorMapper)
	}
}
impl<C, M> CredentialStrategy for ConfidentialCredential<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn kind(&self) -> CredentialKind {
		self.factory.credential_kind()
	}

	fn connect(&self) -> TokenFuture<'_, ()> {
		Box::pin(async move { self.factory.client().await.map(|_| ()) })
	}

	fn acquire_token_for_client<'a>(&'a self, scope: &'a ScopeSet) -> TokenFuture<'a> {
		Box::pin(self.acquire(TokenRequest::client(scope.clone())))
	}

	fn acquire_token_on_behalf_of<'a>(
		&'a self,
		user: &'a UserAssertion,
		scope: &'a ScopeSet,
	) -> TokenFuture<'a> {
		Box::pin(self.acquire(TokenRequest::on_behalf_of(user.clone(), scope.clone())))
	}
}
impl<C, M> Debug for ConfidentialCredential<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConfidentialCredential")
			.field("kind", &self.kind())
			.field("factory", &self.factory)
			.finish()
	}
}
