//! Managed-identity tokens from the instance metadata service or an App Service style endpoint,
//! and Kubernetes workload-identity assertions read from a projected token file.

// std
use std::path::Path;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ClientId, Scope, ScopeSet},
	client::Seconds,
	config::ManagedIdentityEndpoint,
	credential::{AssertionFuture, AssertionProvider, ClientAssertion},
	error::{ConfigError, CredentialError},
	http::ReqwestHttpClient,
	obs::{self, FlowKind},
};

/// Instance metadata service token endpoint.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
/// `api-version` understood by the instance metadata service.
pub const IMDS_API_VERSION: &str = "2018-02-01";
/// `api-version` understood by App Service style endpoints.
pub const APP_SERVICE_API_VERSION: &str = "2019-08-01";
/// Audience of tokens exchanged for a federated client assertion.
pub const TOKEN_EXCHANGE_RESOURCE: &str = "api://AzureADTokenExchange";

/// Fetches managed-identity tokens; each call hits the endpoint, nothing is cached.
#[derive(Clone)]
pub struct ManagedIdentityCredential {
	client_id: Option<ClientId>,
	endpoint: ManagedIdentityEndpoint,
	imds_override: Option<Url>,
	http_client: ReqwestHttpClient,
}
impl ManagedIdentityCredential {
	/// Creates a credential for the user-assigned identity `client_id` (system-assigned when
	/// `None`).
	pub fn new(
		client_id: Option<ClientId>,
		endpoint: ManagedIdentityEndpoint,
		http_client: ReqwestHttpClient,
	) -> Self {
		Self { client_id, endpoint, imds_override: None, http_client }
	}

	/// Points IMDS requests at `url` instead of the link-local address.
	pub fn with_imds_endpoint(mut self, url: Url) -> Self {
		self.imds_override = Some(url);

		self
	}

	/// Token for `resource`; a trailing `/.default` is stripped.
	pub async fn get_token(&self, resource: &str) -> Result<AccessToken> {
		let result =
			obs::observe(FlowKind::ManagedIdentity, "get_token", self.fetch(resource)).await;

		#[cfg(feature = "tracing")]
		if let Err(e) = &result {
			tracing::warn!(resource, error = %e, "Managed identity token request failed.");
		}

		result
	}

	async fn fetch(&self, resource: &str) -> Result<AccessToken> {
		let scope = Scope::default_for(resource).map_err(ConfigError::from)?;
		let (url, api_version) = match &self.endpoint {
			ManagedIdentityEndpoint::Imds => (self.imds_url()?, IMDS_API_VERSION),
			ManagedIdentityEndpoint::AppService { endpoint, .. } =>
				(endpoint.clone(), APP_SERVICE_API_VERSION),
			ManagedIdentityEndpoint::WorkloadIdentity { .. } =>
				return Err(CredentialError::Assertion {
					message: "workload identity has no token endpoint".into(),
				}
				.into()),
		};
		let mut request = self
			.http_client
			.get(url.clone())
			.query(&[("api-version", api_version), ("resource", scope.resource())]);

		if let Some(client_id) = &self.client_id {
			request = request.query(&[("client_id", client_id.as_ref())]);
		}

		request = match &self.endpoint {
			ManagedIdentityEndpoint::AppService { header, .. } =>
				request.header("X-IDENTITY-HEADER", header.expose()),
			ManagedIdentityEndpoint::Imds | ManagedIdentityEndpoint::WorkloadIdentity { .. } =>
				request.header("Metadata", "true"),
		};

		let response =
			request.send().await.map_err(|e| CredentialError::unreachable(url.as_str(), e))?;
		let status = response.status();
		let body =
			response.bytes().await.map_err(|e| CredentialError::unreachable(url.as_str(), e))?;

		if !status.is_success() {
			return Err(CredentialError::Rejected {
				status: status.as_u16(),
				body: String::from_utf8_lossy(&body).into_owned(),
			}
			.into());
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&body);
		let parsed: ManagedIdentityTokenBody = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| CredentialError::MalformedResponse { source })?;
		let issued_at = OffsetDateTime::now_utc();
		let expires_in = parsed.lifetime(issued_at).ok_or_else(|| CredentialError::Assertion {
			message: "managed identity token carries no expiry".into(),
		})?;

		Ok(AccessToken::new(parsed.access_token, ScopeSet::single(scope), issued_at, expires_in))
	}

	fn imds_url(&self) -> Result<Url, ConfigError> {
		match &self.imds_override {
			Some(url) => Ok(url.clone()),
			None => Ok(Url::parse(IMDS_ENDPOINT)?),
		}
	}
}
impl AssertionProvider for ManagedIdentityCredential {
	fn assertion(&self) -> AssertionFuture<'_> {
		Box::pin(async move {
			if let ManagedIdentityEndpoint::WorkloadIdentity { token_file } = &self.endpoint {
				return obs::observe(
					FlowKind::ManagedIdentity,
					"read_token_file",
					async move { read_token_file(token_file) },
				)
				.await;
			}

			let token = self.get_token(TOKEN_EXCHANGE_RESOURCE).await?;

			Ok(ClientAssertion::new(token.expose()).with_expires_at(token.expires_at))
		})
	}
}
impl Debug for ManagedIdentityCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ManagedIdentityCredential")
			.field("client_id", &self.client_id)
			.field("endpoint", &self.endpoint)
			.field("imds_override", &self.imds_override)
			.finish()
	}
}

/// Kubelet rotates the projected token in place, so the file is read on every call.
fn read_token_file(path: &Path) -> Result<ClientAssertion> {
	let raw = std::fs::read_to_string(path)
		.map_err(|source| CredentialError::TokenFile { path: path.to_path_buf(), source })?;

	Ok(ClientAssertion::new(raw.trim()))
}

#[derive(Deserialize)]
struct ManagedIdentityTokenBody {
	access_token: String,
	#[serde(default)]
	expires_in: Option<Seconds>,
	#[serde(default)]
	expires_on: Option<Seconds>,
}
impl ManagedIdentityTokenBody {
	fn lifetime(&self, issued_at: OffsetDateTime) -> Option<Duration> {
		if let Some(seconds) = self.expires_in.as_ref().and_then(Seconds::get) {
			return Some(Duration::seconds(seconds));
		}

		let expires_on = self.expires_on.as_ref().and_then(Seconds::get)?;

		OffsetDateTime::from_unix_timestamp(expires_on).ok().map(|instant| instant - issued_at)
	}
}
