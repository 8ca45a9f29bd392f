//! Token broker facade used by the web tier.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, Scope, ScopeSet, UserAssertion},
	config::BrokerConfig,
	credential::{self, CredentialKind, CredentialStrategy},
	error::ConfigError,
	http::ReqwestHttpClient,
};

/// Dispatches token requests to the credential strategy selected at startup.
///
/// The downstream scope `api://<API_APP_ID>/<OAUTH_SCOPE>` is validated when the broker is
/// built, so a misconfigured process fails before any request reaches the network.
#[derive(Clone)]
pub struct TokenBroker {
	strategy: Arc<dyn CredentialStrategy>,
	downstream_scope: Scope,
}
impl TokenBroker {
	/// Wraps an already selected strategy.
	pub fn new(strategy: Arc<dyn CredentialStrategy>, downstream_scope: Scope) -> Self {
		Self { strategy, downstream_scope }
	}

	/// Synthesizes the downstream scope from its parts and wraps `strategy`.
	pub fn with_scope_parts(
		strategy: Arc<dyn CredentialStrategy>,
		api_app_id: &str,
		oauth_scope: &str,
	) -> Result<Self, ConfigError> {
		if api_app_id.trim().is_empty() {
			return Err(ConfigError::MissingSetting { name: "API_APP_ID" });
		}
		if oauth_scope.trim().is_empty() {
			return Err(ConfigError::MissingSetting { name: "OAUTH_SCOPE" });
		}

		Ok(Self::new(strategy, Scope::downstream(api_app_id.trim(), oauth_scope.trim())?))
	}

	/// Validates `config` and selects the credential strategy on the default transport.
	pub fn from_config(config: &BrokerConfig) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(credential::DEFAULT_HTTP_TIMEOUT)?;

		Self::from_config_with_http(config, http_client)
	}

	/// Validates `config` and selects the credential strategy on a caller-provided client.
	pub fn from_config_with_http(
		config: &BrokerConfig,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let downstream_scope = config.downstream_scope()?;
		let credential_config = config.credential_config()?;
		let strategy = credential::from_config_with_http(&credential_config, http_client)?;

		Ok(Self::new(strategy, downstream_scope))
	}

	/// Selected credential variant.
	pub fn kind(&self) -> CredentialKind {
		self.strategy.kind()
	}

	/// Scope requested for downstream calls.
	pub fn downstream_scope(&self) -> &Scope {
		&self.downstream_scope
	}

	/// Constructs the confidential-client handle now instead of on first use.
	pub async fn connect(&self) -> Result<()> {
		self.strategy.connect().await
	}

	/// Token for the application's own identity.
	pub async fn acquire_token_for_user(&self, scopes: &ScopeSet) -> Result<AccessToken> {
		self.strategy.acquire_token_for_client(scopes).await
	}

	/// Exchanges `user` for a token scoped to `scopes`.
	pub async fn acquire_token_on_behalf_of(
		&self,
		user: &UserAssertion,
		scopes: &ScopeSet,
	) -> Result<AccessToken> {
		if user.is_blank() {
			let reason = "user assertion is empty".into();

			return Err(Error::Delegation { reason, status: None });
		}

		self.strategy.acquire_token_on_behalf_of(user, scopes).await
	}

	/// Exchanges `user` for a token scoped to the downstream API.
	pub async fn acquire_downstream_token(&self, user: &UserAssertion) -> Result<AccessToken> {
		let scopes = ScopeSet::single(self.downstream_scope.clone());

		self.acquire_token_on_behalf_of(user, &scopes).await
	}
}
impl Debug for TokenBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBroker")
			.field("credential", &self.strategy.kind())
			.field("downstream_scope", &self.downstream_scope)
			.finish()
	}
}
