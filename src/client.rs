//! Confidential client: the established trust relationship with the identity provider.
//!
//! A [`ConfidentialClient`] is built once per process by the [`ConfidentialClientFactory`]. It
//! resolves the token endpoint through discovery, authenticates each token request with a
//! [`ClientAuth`], and keeps an in-memory token cache keyed by identity and scope set. Identical
//! concurrent requests are collapsed by a per-key singleflight guard.

mod cache;
mod discovery;
mod factory;
mod response;

pub use factory::*;

pub(crate) use response::Seconds;

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ClientId, TokenRequest, TokenSecret},
	client::cache::{CacheKey, TokenCache},
	credential::{AssertionProvider, CredentialKind},
	error::ConfigError,
	http::{
		EndpointKind, ReqwestHttpClient, ReqwestTransportErrorMapper, ResponseMetadataSlot,
		TokenHttpClient, TransportErrorMapper,
	},
	obs::{self, FlowKind, FlowOutcome},
	provider::{Authority, GrantType, ProviderStrategy, authority::validate_endpoint},
};

/// `client_assertion_type` sent with federated credentials.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Proof of identity attached to every token request.
#[derive(Clone)]
pub enum ClientAuth {
	/// `client_secret` form field.
	Secret(TokenSecret),
	/// `client_assertion` minted by the provider on every request.
	Assertion(Arc<dyn AssertionProvider>),
}
impl ClientAuth {
	/// Credential variant this authentication belongs to.
	pub fn kind(&self) -> CredentialKind {
		match self {
			Self::Secret(_) => CredentialKind::Secret,
			Self::Assertion(_) => CredentialKind::Federated,
		}
	}

	async fn apply(&self, form: &mut BTreeMap<String, String>) -> Result<()> {
		match self {
			Self::Secret(secret) => {
				form.insert("client_secret".into(), secret.expose().into());
			},
			Self::Assertion(provider) => {
				let assertion =
					provider.assertion().await?.validate_at(OffsetDateTime::now_utc())?;

				form.insert("client_assertion_type".into(), CLIENT_ASSERTION_TYPE.into());
				form.insert("client_assertion".into(), assertion.expose().into());
			},
		}

		Ok(())
	}
}
impl Debug for ClientAuth {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Secret(secret) => f.debug_tuple("Secret").field(secret).finish(),
			Self::Assertion(_) => f.write_str("Assertion(..)"),
		}
	}
}

/// Settings required to construct a [`ConfidentialClient`].
#[derive(Clone, Debug)]
pub struct ClientSettings {
	/// Authority (instance + tenant).
	pub authority: Authority,
	/// Client id of this application registration.
	pub client_id: ClientId,
	/// Resolve the token endpoint from the OpenID metadata document.
	pub discovery: bool,
	/// Cached tokens expiring within this window are treated as absent.
	pub expiry_buffer: Duration,
}
impl ClientSettings {
	/// Default freshness window for cached tokens.
	pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::minutes(5);

	/// Settings with discovery enabled and the default expiry buffer.
	pub fn new(authority: Authority, client_id: ClientId) -> Self {
		Self { authority, client_id, discovery: true, expiry_buffer: Self::DEFAULT_EXPIRY_BUFFER }
	}

	/// Uses the conventional v2.0 token endpoint instead of discovery.
	pub fn without_discovery(mut self) -> Self {
		self.discovery = false;

		self
	}

	/// Overrides the cache freshness window; negative values clamp to zero.
	pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
		self.expiry_buffer = if buffer.is_negative() { Duration::ZERO } else { buffer };

		self
	}
}

/// Established trust relationship with the identity provider.
///
/// Shared read-only by every broker call; token requests go through [`acquire`](Self::acquire).
pub struct ConfidentialClient<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	settings: ClientSettings,
	token_endpoint: Url,
	auth: ClientAuth,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	strategy: Arc<dyn ProviderStrategy>,
	cache: TokenCache,
}
impl<C, M> ConfidentialClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) async fn connect(
		settings: ClientSettings,
		auth: ClientAuth,
		http_client: Arc<C>,
		transport_mapper: Arc<M>,
		strategy: Arc<dyn ProviderStrategy>,
	) -> Result<Self> {
		let token_endpoint = if settings.discovery {
			let (http, mapper) = (http_client.as_ref(), transport_mapper.as_ref());

			discovery::discover(http, mapper, &settings.authority).await?
		} else {
			settings.authority.token_endpoint()?
		};

		validate_endpoint("token", &token_endpoint)?;

		let cache = TokenCache::new(settings.expiry_buffer);

		Ok(Self { settings, token_endpoint, auth, http_client, transport_mapper, strategy, cache })
	}

	/// Settings the client was built from.
	pub fn settings(&self) -> &ClientSettings {
		&self.settings
	}

	/// Token endpoint resolved at construction.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	/// Credential variant used to authenticate.
	pub fn credential_kind(&self) -> CredentialKind {
		self.auth.kind()
	}

	/// Number of cached tokens, fresh or not.
	pub fn cached_tokens(&self) -> usize {
		self.cache.len()
	}

	/// Drops every cached token.
	pub fn clear_cache(&self) {
		self.cache.clear();
	}

	/// Returns a cached token when one is fresh, otherwise calls the token endpoint.
	pub async fn acquire(&self, request: &TokenRequest) -> Result<AccessToken> {
		let kind = FlowKind::from(request.grant());
		let result = obs::observe(kind, "acquire", self.acquire_cached(request)).await;

		#[cfg(feature = "tracing")]
		if let Err(e) = &result {
			tracing::warn!(grant = %request.grant(), error = %e, "Token acquisition failed.");
		}

		result
	}

	async fn acquire_cached(&self, request: &TokenRequest) -> Result<AccessToken> {
		if let TokenRequest::OnBehalfOf { assertion, .. } = request {
			if assertion.is_blank() {
				let reason = "user assertion is empty".into();

				return Err(Error::Delegation { reason, status: None });
			}
		}

		let key = CacheKey::for_request(request);

		if let Some(token) = self.cached(&key, request.grant()) {
			return Ok(token);
		}

		let guard = self.cache.guard(&key);
		let _singleflight = guard.lock().await;

		// Another caller may have filled the entry while this one waited.
		if let Some(token) = self.cached(&key, request.grant()) {
			return Ok(token);
		}

		let token = self.exchange(request).await?;

		self.cache.insert(key, token.clone());

		Ok(token)
	}

	fn cached(&self, key: &CacheKey, grant: GrantType) -> Option<AccessToken> {
		let token = self.cache.get(key, OffsetDateTime::now_utc())?;

		obs::record_flow_outcome(FlowKind::from(grant), FlowOutcome::CacheHit);

		#[cfg(feature = "tracing")]
		tracing::debug!(grant = %grant, scope = %token.scope, "Serving token from cache.");

		Some(token)
	}

	async fn exchange(&self, request: &TokenRequest) -> Result<AccessToken> {
		let grant = request.grant();
		let mut form = BTreeMap::new();

		form.insert("grant_type".into(), grant.as_str().into());
		form.insert("scope".into(), request.scope().normalized());

		if let TokenRequest::OnBehalfOf { assertion, .. } = request {
			form.insert("requested_token_use".into(), "on_behalf_of".into());
			form.insert("assertion".into(), assertion.expose().into());
		}

		self.strategy.augment_token_request(grant, &mut form);

		form.insert("client_id".into(), self.settings.client_id.to_string());

		self.auth.apply(&mut form).await?;

		let body =
			form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter()).finish();
		let http_request = Request::builder()
			.method(Method::POST)
			.uri(self.token_endpoint.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let issued_at = OffsetDateTime::now_utc();
		let response = handle.call(http_request).await.map_err(|e| {
			self.transport_mapper.map_transport_error(EndpointKind::Token, slot.take().as_ref(), e)
		})?;
		let meta = slot.take();

		response::map_token_response(
			self.strategy.as_ref(),
			grant,
			request.scope(),
			issued_at,
			meta.as_ref(),
			response,
		)
	}
}
impl<C, M> Debug for ConfidentialClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConfidentialClient")
			.field("authority", &self.settings.authority)
			.field("client_id", &self.settings.client_id)
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("auth", &self.auth)
			.field("cached_tokens", &self.cache.len())
			.finish()
	}
}
