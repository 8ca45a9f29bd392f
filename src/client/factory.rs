//! Memoized construction of the process-wide confidential client.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	client::{ClientAuth, ClientSettings, ConfidentialClient},
	credential::{CredentialKind, DEFAULT_HTTP_TIMEOUT},
	error::ConfigError,
	http::{ReqwestHttpClient, ReqwestTransportErrorMapper, TokenHttpClient, TransportErrorMapper},
	provider::{EntraProviderStrategy, ProviderStrategy},
};

/// Builds at most one [`ConfidentialClient`] and hands out shared references to it.
///
/// Construction performs the discovery round trip, so concurrent first callers wait on a single
/// initialization instead of racing. A failed construction leaves the cell empty and the next
/// caller retries it.
pub struct ConfidentialClientFactory<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	settings: ClientSettings,
	auth: ClientAuth,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	strategy: Arc<dyn ProviderStrategy>,
	client: AsyncOnceCell<Arc<ConfidentialClient<C, M>>>,
	constructions: AtomicU64,
}
impl<C, M> ConfidentialClientFactory<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a factory that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		settings: ClientSettings,
		auth: ClientAuth,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			settings,
			auth,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			strategy: Arc::new(EntraProviderStrategy),
			client: AsyncOnceCell::new(),
			constructions: AtomicU64::new(0),
		}
	}

	/// Replaces the provider strategy used to decorate requests and classify errors.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Returns the shared client, constructing it on first use.
	pub async fn client(&self) -> Result<Arc<ConfidentialClient<C, M>>> {
		let client = self
			.client
			.get_or_try_init(|| async {
				self.constructions.fetch_add(1, Ordering::SeqCst);

				#[cfg(feature = "tracing")]
				tracing::info!(
					authority = %self.settings.authority,
					client_id = %self.settings.client_id,
					credential = %self.auth.kind(),
					"Constructing confidential client."
				);

				ConfidentialClient::connect(
					self.settings.clone(),
					self.auth.clone(),
					self.http_client.clone(),
					self.transport_mapper.clone(),
					self.strategy.clone(),
				)
				.await
				.map(Arc::new)
			})
			.await?;

		Ok(client.clone())
	}

	/// Returns the client if it has already been constructed.
	pub fn get(&self) -> Option<Arc<ConfidentialClient<C, M>>> {
		self.client.get().cloned()
	}

	/// Number of construction attempts so far.
	pub fn constructions(&self) -> u64 {
		self.constructions.load(Ordering::SeqCst)
	}

	/// Settings the client is built from.
	pub fn settings(&self) -> &ClientSettings {
		&self.settings
	}

	/// Credential variant used by the client.
	pub fn credential_kind(&self) -> CredentialKind {
		self.auth.kind()
	}
}
impl ConfidentialClientFactory {
	/// Creates a factory on a default reqwest transport.
	pub fn new(settings: ClientSettings, auth: ClientAuth) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(DEFAULT_HTTP_TIMEOUT)?;

		Ok(Self::with_http_client(settings, auth, http_client, ReqwestTransportErrorMapper))
	}
}
impl<C, M> Debug for ConfidentialClientFactory<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConfidentialClientFactory")
			.field("authority", &self.settings.authority)
			.field("client_id", &self.settings.client_id)
			.field("auth", &self.auth)
			.field("constructed", &self.client.is_initialized())
			.field("constructions", &self.constructions())
			.finish()
	}
}
