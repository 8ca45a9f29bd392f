//! OpenID Connect discovery round trip performed once per client construction.

// crates.io
use oauth2::{
	AsyncHttpClient,
	http::{Method, Request, header::ACCEPT},
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError},
	http::{self, EndpointKind, ResponseMetadataSlot, TokenHttpClient, TransportErrorMapper},
	obs::{self, FlowKind},
	provider::{Authority, authority::validate_endpoint},
};

/// The only field of the authority's OpenID metadata the broker relies on.
#[derive(Deserialize)]
struct OpenIdConfigurationDocument {
	token_endpoint: String,
}

pub(crate) async fn discover<C, M>(
	http_client: &C,
	mapper: &M,
	authority: &Authority,
) -> Result<Url>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let result =
		obs::observe(FlowKind::Discovery, "discover", fetch(http_client, mapper, authority)).await;

	#[cfg(feature = "tracing")]
	match &result {
		Ok(token_endpoint) => tracing::info!(
			authority = %authority,
			token_endpoint = %token_endpoint,
			"Authority metadata resolved."
		),
		Err(e) => tracing::warn!(authority = %authority, error = %e, "Authority discovery failed."),
	}

	result
}

async fn fetch<C, M>(
	http_client: &C,
	mapper: &M,
	authority: &Authority,
) -> Result<Url>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let url = authority.discovery_endpoint()?;
	let request = Request::builder()
		.method(Method::GET)
		.uri(url.as_str())
		.header(ACCEPT, "application/json")
		.body(Vec::new())
		.map_err(ConfigError::from)?;
	let slot = ResponseMetadataSlot::default();
	let handle = http_client.with_metadata(slot.clone());
	let response = handle.call(request).await.map_err(|e| {
		mapper.map_transport_error(EndpointKind::Discovery, slot.take().as_ref(), e)
	})?;
	let meta = slot.take();
	let status = response.status();

	if status.as_u16() == 429 || status.is_server_error() {
		return Err(TransientError::TokenEndpoint {
			message: format!("discovery endpoint returned HTTP {}", status.as_u16()),
			status: Some(status.as_u16()),
			retry_after: http::meta_retry_after(meta.as_ref()),
		}
		.into());
	}
	if !status.is_success() {
		return Err(ConfigError::Discovery { url: url.to_string(), status: status.as_u16() }.into());
	}

	let mut deserializer = serde_json::Deserializer::from_slice(response.body());
	let document: OpenIdConfigurationDocument =
		serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
			TransientError::ResponseParse { source, status: Some(status.as_u16()) }
		})?;
	let token_endpoint = Url::parse(&document.token_endpoint)
		.map_err(|e| ConfigError::invalid_setting("token_endpoint", e))?;

	validate_endpoint("token", &token_endpoint)?;

	Ok(token_endpoint)
}
