//! Credential strategies: how the application proves its identity to the token endpoint.
//!
//! The secret variant presents a pre-shared client secret. The federated variant mints a client
//! assertion per request from a managed or workload identity. Both are a
//! [`ConfidentialCredential`] over a memoized
//! [`ConfidentialClient`](crate::client::ConfidentialClient), differing only in its
//! [`ClientAuth`](crate::client::ClientAuth), and are used through the object-safe
//! [`CredentialStrategy`] so the strategy can be chosen once and injected.

pub mod assertion;
pub mod confidential;
pub mod managed_identity;

pub use assertion::*;
pub use confidential::*;
pub use managed_identity::*;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet, UserAssertion},
	client::ClientSettings,
	config::{CredentialConfig, CredentialSource, Environment},
	error::ConfigError,
	http::ReqwestHttpClient,
};

/// Boxed future returned by [`CredentialStrategy`] operations.
pub type TokenFuture<'a, T = AccessToken> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Trust-establishment mechanism selected for the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKind {
	/// Pre-shared client secret.
	Secret,
	/// Managed-identity token presented as a client assertion.
	Federated,
}
impl CredentialKind {
	/// `Production` selects [`Federated`](Self::Federated); anything else selects
	/// [`Secret`](Self::Secret).
	pub fn from_environment(environment: &Environment) -> Self {
		if environment.is_production() { Self::Federated } else { Self::Secret }
	}

	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKind::Secret => "secret",
			CredentialKind::Federated => "federated",
		}
	}
}
impl Display for CredentialKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Token acquisition capability shared by every credential variant.
pub trait CredentialStrategy
where
	Self: Send + Sync,
{
	/// Variant implemented by this strategy.
	fn kind(&self) -> CredentialKind;

	/// Eagerly constructs the confidential-client handle.
	fn connect(&self) -> TokenFuture<'_, ()>;

	/// Token for the application's own identity.
	fn acquire_token_for_client<'a>(&'a self, scope: &'a ScopeSet) -> TokenFuture<'a>;

	/// Exchanges `user` for a token scoped to `scope`, preserving the user's identity.
	///
	/// Fails with [`Error::Delegation`] when the user token is expired, malformed, or issued for
	/// another audience.
	fn acquire_token_on_behalf_of<'a>(
		&'a self,
		user: &'a UserAssertion,
		scope: &'a ScopeSet,
	) -> TokenFuture<'a>;
}

/// Builds the strategy matching `config` on the default reqwest transport.
pub fn from_config(config: &CredentialConfig) -> Result<Arc<dyn CredentialStrategy>, ConfigError> {
	from_config_with_http(config, ReqwestHttpClient::with_timeout(DEFAULT_HTTP_TIMEOUT)?)
}

/// Builds the strategy matching `config` on a caller-provided reqwest client.
pub fn from_config_with_http(
	config: &CredentialConfig,
	http_client: ReqwestHttpClient,
) -> Result<Arc<dyn CredentialStrategy>, ConfigError> {
	let settings = ClientSettings::new(config.authority.clone(), config.client_id.clone());
	let strategy: Arc<dyn CredentialStrategy> = match &config.source {
		CredentialSource::Secret(secret) =>
			Arc::new(ConfidentialCredential::secret(settings, secret.clone(), http_client)),
		CredentialSource::ManagedIdentity { client_id, endpoint } => {
			let identity = ManagedIdentityCredential::new(
				Some(client_id.clone()),
				endpoint.clone(),
				http_client.clone(),
			);

			Arc::new(ConfidentialCredential::federated(settings, Arc::new(identity), http_client))
		},
	};

	#[cfg(feature = "tracing")]
	tracing::info!(
		credential = %strategy.kind(),
		client_id = %config.client_id,
		"Credential strategy selected."
	);

	Ok(strategy)
}

/// Request timeout applied to identity-provider and managed-identity calls.
pub const DEFAULT_HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
