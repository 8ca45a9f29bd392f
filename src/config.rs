//! Environment-driven broker configuration.
//!
//! Settings are read once at process start through `figment`. Top-level keys map to plain
//! environment variables (`API_APP_ID`, `AZURE_TENANT_ID`, ...) and the AzureAd section uses
//! `__` nesting (`AZUREAD__INSTANCE`, `AZUREAD__AUTHORITY`).

// std
use std::path::PathBuf;
// crates.io
use figment::{
	Error as FigmentError, Figment, Metadata, Profile, Provider,
	providers::Env,
	value::{Dict, Map, Value},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, Scope, TenantId, TokenSecret},
	credential::CredentialKind,
	error::ConfigError,
	provider::Authority,
};

/// Environment variables read by [`BrokerConfig::env_provider`].
pub const ENV_KEYS: &[&str] = &[
	"ENVIRONMENT",
	"API_APP_ID",
	"OAUTH_SCOPE",
	"APIM_BASE_URL",
	"AZURE_CLIENT_ID",
	"AZURE_TENANT_ID",
	"AZURE_CLIENT_SECRET",
	"IDENTITY_ENDPOINT",
	"IDENTITY_HEADER",
	"AZURE_FEDERATED_TOKEN_FILE",
	"AZUREAD__INSTANCE",
	"AZUREAD__AUTHORITY",
];

/// Permission requested on the downstream API when `OAUTH_SCOPE` is unset.
pub const DEFAULT_OAUTH_SCOPE: &str = "access_as_user";

/// Deployment environment name.
///
/// Only `Production` (compared case-insensitively) changes behavior; a missing value is treated
/// as `Development`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment(String);
impl Environment {
	/// Value assumed when `ENVIRONMENT` is not set.
	pub const DEVELOPMENT: &'static str = "Development";
	/// Value that selects the federated credential.
	pub const PRODUCTION: &'static str = "Production";

	/// Wraps a raw environment name.
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	/// Returns `true` for `Production`, ignoring ASCII case.
	pub fn is_production(&self) -> bool {
		self.0.eq_ignore_ascii_case(Self::PRODUCTION)
	}

	/// Borrows the raw name.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Default for Environment {
	fn default() -> Self {
		Self::new(Self::DEVELOPMENT)
	}
}
impl Display for Environment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// `AzureAd` configuration section.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AzureAdSection {
	/// Cloud instance, defaults to the public cloud.
	pub instance: Option<String>,
	/// Full authority URL; overrides `instance` + `AZURE_TENANT_ID` when present.
	pub authority: Option<String>,
}

/// Raw broker settings as extracted from the environment.
///
/// Extraction never fails on absent values. Validation happens in
/// [`credential_config`](BrokerConfig::credential_config),
/// [`downstream_scope`](BrokerConfig::downstream_scope), and
/// [`apim_base_url`](BrokerConfig::apim_base_url) so each caller only pays for what it uses.
#[derive(Clone, Deserialize)]
pub struct BrokerConfig {
	/// `ENVIRONMENT`.
	#[serde(default)]
	pub environment: Option<String>,
	/// `API_APP_ID`: application id of the downstream API registration.
	#[serde(default)]
	pub api_app_id: Option<String>,
	/// `OAUTH_SCOPE`: permission exposed by the downstream API.
	#[serde(default = "default_oauth_scope")]
	pub oauth_scope: Option<String>,
	/// `APIM_BASE_URL`: downstream gateway base URL.
	#[serde(default)]
	pub apim_base_url: Option<String>,
	/// `AZURE_CLIENT_ID`: this application's client id, also the managed identity in production.
	#[serde(default)]
	pub azure_client_id: Option<String>,
	/// `AZURE_TENANT_ID`.
	#[serde(default)]
	pub azure_tenant_id: Option<String>,
	/// `AZURE_CLIENT_SECRET`: required outside production.
	#[serde(default)]
	pub azure_client_secret: Option<TokenSecret>,
	/// `IDENTITY_ENDPOINT`: App Service style managed-identity endpoint.
	#[serde(default)]
	pub identity_endpoint: Option<String>,
	/// `IDENTITY_HEADER`: secret header value paired with `IDENTITY_ENDPOINT`.
	#[serde(default)]
	pub identity_header: Option<TokenSecret>,
	/// `AZURE_FEDERATED_TOKEN_FILE`: projected service-account token of a Kubernetes workload
	/// identity.
	#[serde(default)]
	pub azure_federated_token_file: Option<String>,
	/// `AZUREAD__*` section.
	#[serde(default)]
	pub azuread: AzureAdSection,
}
impl BrokerConfig {
	/// Reads the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_figment(Figment::from(Self::env_provider()))
	}

	/// Extracts settings from an arbitrary figment, for layering or tests.
	pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
		Ok(figment.extract()?)
	}

	/// Environment provider restricted to [`ENV_KEYS`].
	pub fn env_provider() -> StringEnv {
		StringEnv::new(Env::raw().only(ENV_KEYS).split("__"))
	}

	/// Deployment environment, `Development` when unset.
	pub fn environment(&self) -> Environment {
		self.environment.as_deref().map(Environment::new).unwrap_or_default()
	}

	/// Credential strategy selected by the deployment environment.
	pub fn credential_kind(&self) -> CredentialKind {
		CredentialKind::from_environment(&self.environment())
	}

	/// Synthesizes `api://<API_APP_ID>/<OAUTH_SCOPE>`.
	pub fn downstream_scope(&self) -> Result<Scope, ConfigError> {
		let app = required(&self.api_app_id, "API_APP_ID")?;
		let permission = required(&self.oauth_scope, "OAUTH_SCOPE")?;

		Ok(Scope::downstream(app, permission)?)
	}

	/// Validated downstream gateway base URL without a trailing slash.
	pub fn apim_base_url(&self) -> Result<Url, ConfigError> {
		let raw = required(&self.apim_base_url, "APIM_BASE_URL")?;

		Url::parse(raw.trim_end_matches('/'))
			.map_err(|e| ConfigError::invalid_setting("APIM_BASE_URL", e))
	}

	/// Resolves the identity-provider authority.
	pub fn authority(&self) -> Result<Authority, ConfigError> {
		if let Some(raw) = non_empty(&self.azuread.authority) {
			let url =
				Url::parse(raw).map_err(|e| ConfigError::invalid_setting("AZUREAD__AUTHORITY", e))?;

			return Authority::from_authority_url(&url);
		}

		let tenant = TenantId::new(required(&self.azure_tenant_id, "AZURE_TENANT_ID")?)?;
		let instance = non_empty(&self.azuread.instance).unwrap_or(Authority::DEFAULT_INSTANCE);
		let instance =
			Url::parse(instance).map_err(|e| ConfigError::invalid_setting("AZUREAD__INSTANCE", e))?;

		Authority::new(instance, tenant)
	}

	/// Validates the settings the selected credential needs.
	pub fn credential_config(&self) -> Result<CredentialConfig, ConfigError> {
		let authority = self.authority()?;
		let client_id = ClientId::new(required(&self.azure_client_id, "AZURE_CLIENT_ID")?)?;
		let source = match self.credential_kind() {
			CredentialKind::Secret => {
				let secret = self
					.azure_client_secret
					.clone()
					.filter(|secret| !secret.is_blank())
					.ok_or(ConfigError::MissingSetting { name: "AZURE_CLIENT_SECRET" })?;

				CredentialSource::Secret(secret)
			},
			CredentialKind::Federated => CredentialSource::ManagedIdentity {
				client_id: client_id.clone(),
				endpoint: self.managed_identity_endpoint()?,
			},
		};

		Ok(CredentialConfig { authority, client_id, source })
	}

	fn managed_identity_endpoint(&self) -> Result<ManagedIdentityEndpoint, ConfigError> {
		if let Some(token_file) = non_empty(&self.azure_federated_token_file) {
			return Ok(ManagedIdentityEndpoint::WorkloadIdentity { token_file: token_file.into() });
		}

		let Some(raw) = non_empty(&self.identity_endpoint) else {
			return Ok(ManagedIdentityEndpoint::Imds);
		};
		let endpoint =
			Url::parse(raw).map_err(|e| ConfigError::invalid_setting("IDENTITY_ENDPOINT", e))?;
		let header = self
			.identity_header
			.clone()
			.filter(|header| !header.is_blank())
			.ok_or(ConfigError::MissingSetting { name: "IDENTITY_HEADER" })?;

		Ok(ManagedIdentityEndpoint::AppService { endpoint, header })
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			environment: None,
			api_app_id: None,
			oauth_scope: default_oauth_scope(),
			apim_base_url: None,
			azure_client_id: None,
			azure_tenant_id: None,
			azure_client_secret: None,
			identity_endpoint: None,
			identity_header: None,
			azure_federated_token_file: None,
			azuread: AzureAdSection::default(),
		}
	}
}
impl Debug for BrokerConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrokerConfig")
			.field("environment", &self.environment)
			.field("api_app_id", &self.api_app_id)
			.field("oauth_scope", &self.oauth_scope)
			.field("apim_base_url", &self.apim_base_url)
			.field("azure_client_id", &self.azure_client_id)
			.field("azure_tenant_id", &self.azure_tenant_id)
			.field("azure_client_secret", &self.azure_client_secret.as_ref().map(|_| "<redacted>"))
			.field("identity_endpoint", &self.identity_endpoint)
			.field("azure_federated_token_file", &self.azure_federated_token_file)
			.field("azuread", &self.azuread)
			.finish()
	}
}

/// Environment provider that hands every value to serde as a string.
///
/// [`Env`] parses values, so `API_APP_ID=12345` would arrive as an integer and a secret such as
/// `0123` would lose its leading zero.
#[derive(Clone)]
pub struct StringEnv(Env);
impl StringEnv {
	/// Wraps a configured [`Env`], keeping its key filtering and `__` nesting.
	pub fn new(env: Env) -> Self {
		Self(env)
	}
}
impl Provider for StringEnv {
	fn metadata(&self) -> Metadata {
		self.0.metadata()
	}

	fn data(&self) -> Result<Map<Profile, Dict>, FigmentError> {
		let mut dict = Dict::new();

		for (key, value) in self.0.iter() {
			let path = key.as_str().split('.').collect::<Vec<_>>();

			insert_string(&mut dict, &path, value);
		}

		Ok(self.0.profile.collect(dict))
	}
}
impl Debug for StringEnv {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.0.iter().map(|(key, _)| key)).finish()
	}
}

/// Validated, immutable credential settings.
#[derive(Clone, Debug)]
pub struct CredentialConfig {
	/// Authority the confidential client talks to.
	pub authority: Authority,
	/// Client id of this application registration.
	pub client_id: ClientId,
	/// Proof of identity presented to the token endpoint.
	pub source: CredentialSource,
}
impl CredentialConfig {
	/// Strategy matching the configured source.
	pub fn kind(&self) -> CredentialKind {
		match self.source {
			CredentialSource::Secret(_) => CredentialKind::Secret,
			CredentialSource::ManagedIdentity { .. } => CredentialKind::Federated,
		}
	}
}

/// Where the client's proof of identity comes from.
#[derive(Clone, Debug)]
pub enum CredentialSource {
	/// Pre-shared client secret.
	Secret(TokenSecret),
	/// Managed identity exchanged for a client assertion.
	ManagedIdentity {
		/// Client id of the user-assigned managed identity.
		client_id: ClientId,
		/// Endpoint serving managed-identity tokens.
		endpoint: ManagedIdentityEndpoint,
	},
}

/// Managed-identity token endpoint flavor.
#[derive(Clone, Debug)]
pub enum ManagedIdentityEndpoint {
	/// Instance metadata service at the link-local address.
	Imds,
	/// App Service style endpoint announced through `IDENTITY_ENDPOINT`.
	AppService {
		/// Token endpoint URL.
		endpoint: Url,
		/// Value sent in the `X-IDENTITY-HEADER` header.
		header: TokenSecret,
	},
	/// Kubernetes workload identity: the projected token file is itself the client assertion.
	WorkloadIdentity {
		/// Path announced through `AZURE_FEDERATED_TOKEN_FILE`, re-read for every assertion.
		token_file: PathBuf,
	},
}

fn insert_string(dict: &mut Dict, path: &[&str], value: String) {
	match path {
		[] => {},
		[leaf] => {
			dict.insert((*leaf).into(), Value::from(value));
		},
		[head, rest @ ..] => {
			let child = dict.entry((*head).into()).or_insert_with(|| Value::from(Dict::new()));

			if let Value::Dict(_, child) = child {
				insert_string(child, rest, value);
			}
		},
	}
}

fn default_oauth_scope() -> Option<String> {
	Some(DEFAULT_OAUTH_SCOPE.into())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
	value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
	non_empty(value).ok_or(ConfigError::MissingSetting { name })
}

#[cfg(test)]
mod tests {
	// crates.io
	use figment::Jail;
	// self
	use super::*;

	fn load() -> BrokerConfig {
		BrokerConfig::from_env().expect("Environment should extract.")
	}

	#[test]
	fn environment_selection_is_case_insensitive() {
		for (raw, kind) in [
			("Production", CredentialKind::Federated),
			("production", CredentialKind::Federated),
			("PRODUCTION", CredentialKind::Federated),
			("Development", CredentialKind::Secret),
			("Staging", CredentialKind::Secret),
			("", CredentialKind::Secret),
		] {
			let config =
				BrokerConfig { environment: Some(raw.into()), ..BrokerConfig::default() };

			assert_eq!(config.credential_kind(), kind, "ENVIRONMENT={raw:?}");
		}

		assert_eq!(BrokerConfig::default().environment().as_str(), "Development");
		assert_eq!(BrokerConfig::default().credential_kind(), CredentialKind::Secret);
	}

	#[test]
	fn reads_environment_with_nested_azuread_section() {
		Jail::expect_with(|jail| {
			jail.set_env("ENVIRONMENT", "production");
			jail.set_env("API_APP_ID", "backend-api");
			jail.set_env("APIM_BASE_URL", "https://apim.example.net/");
			jail.set_env("AZURE_CLIENT_ID", "client-app");
			jail.set_env("AZURE_TENANT_ID", "contoso");
			jail.set_env("AZUREAD__INSTANCE", "https://login.microsoftonline.us/");

			let config = load();

			assert!(config.environment().is_production());
			assert_eq!(config.oauth_scope.as_deref(), Some(DEFAULT_OAUTH_SCOPE));
			assert_eq!(
				config.downstream_scope().expect("Scope should resolve.").as_str(),
				"api://backend-api/access_as_user"
			);
			assert_eq!(
				config.apim_base_url().expect("Gateway URL should parse.").as_str(),
				"https://apim.example.net/"
			);
			assert_eq!(
				config.authority().expect("Authority should resolve.").to_string(),
				"https://login.microsoftonline.us/contoso"
			);

			Ok(())
		});
	}

	#[test]
	fn missing_scope_parts_are_configuration_errors() {
		Jail::expect_with(|jail| {
			jail.set_env("OAUTH_SCOPE", "");

			let config = load();

			assert!(matches!(
				config.downstream_scope(),
				Err(ConfigError::MissingSetting { name: "API_APP_ID" })
			));

			jail.set_env("API_APP_ID", "backend-api");

			assert!(matches!(
				load().downstream_scope(),
				Err(ConfigError::MissingSetting { name: "OAUTH_SCOPE" })
			));

			Ok(())
		});
	}

	#[test]
	fn secret_is_required_outside_production() {
		Jail::expect_with(|jail| {
			jail.set_env("AZURE_CLIENT_ID", "client-app");
			jail.set_env("AZURE_TENANT_ID", "contoso");

			assert!(matches!(
				load().credential_config(),
				Err(ConfigError::MissingSetting { name: "AZURE_CLIENT_SECRET" })
			));

			jail.set_env("AZURE_CLIENT_SECRET", "s3cr3t");

			let credential = load().credential_config().expect("Secret config should validate.");

			assert_eq!(credential.kind(), CredentialKind::Secret);
			assert!(!format!("{:?}", load()).contains("s3cr3t"));

			Ok(())
		});
	}

	#[test]
	fn production_uses_managed_identity_without_secret() {
		Jail::expect_with(|jail| {
			jail.set_env("ENVIRONMENT", "Production");
			jail.set_env("AZURE_CLIENT_ID", "client-app");
			jail.set_env("AZURE_TENANT_ID", "contoso");

			let credential = load().credential_config().expect("Federated config should validate.");

			assert_eq!(credential.kind(), CredentialKind::Federated);
			assert!(matches!(
				credential.source,
				CredentialSource::ManagedIdentity { endpoint: ManagedIdentityEndpoint::Imds, .. }
			));

			jail.set_env("IDENTITY_ENDPOINT", "http://127.0.0.1:41234/msi/token");

			assert!(matches!(
				load().credential_config(),
				Err(ConfigError::MissingSetting { name: "IDENTITY_HEADER" })
			));

			jail.set_env("AZURE_FEDERATED_TOKEN_FILE", "/var/run/secrets/azure/tokens/token");

			let credential = load().credential_config().expect("Workload identity should win.");

			match credential.source {
				CredentialSource::ManagedIdentity {
					endpoint: ManagedIdentityEndpoint::WorkloadIdentity { token_file },
					..
				} => assert_eq!(token_file, PathBuf::from("/var/run/secrets/azure/tokens/token")),
				other => panic!("Expected workload identity, got {other:?}."),
			}

			Ok(())
		});
	}

	#[test]
	fn numeric_looking_values_stay_strings() {
		Jail::expect_with(|jail| {
			jail.set_env("API_APP_ID", "12345");
			jail.set_env("AZURE_CLIENT_ID", "42");
			jail.set_env("AZURE_TENANT_ID", "contoso");
			jail.set_env("AZURE_CLIENT_SECRET", "0123");
			jail.set_env("ENVIRONMENT", "true");
			jail.set_env("AZUREAD__INSTANCE", "https://login.microsoftonline.com/");

			let config = load();

			assert_eq!(config.api_app_id.as_deref(), Some("12345"));
			assert_eq!(config.azure_client_id.as_deref(), Some("42"));
			assert_eq!(config.environment.as_deref(), Some("true"));
			assert_eq!(
				config.azure_client_secret.as_ref().map(TokenSecret::expose),
				Some("0123")
			);
			assert_eq!(
				config.downstream_scope().expect("Scope should resolve.").as_str(),
				"api://12345/access_as_user"
			);

			let credential = config.credential_config().expect("Secret config should validate.");

			assert!(matches!(
				credential.source,
				CredentialSource::Secret(ref secret) if secret.expose() == "0123"
			));

			jail.set_env("AZURE_CLIENT_SECRET", "true");

			assert_eq!(load().azure_client_secret.as_ref().map(TokenSecret::expose), Some("true"));

			Ok(())
		});
	}

	#[test]
	fn authority_url_overrides_instance_and_tenant() {
		Jail::expect_with(|jail| {
			jail.set_env("AZUREAD__AUTHORITY", "https://login.microsoftonline.com/fabrikam");

			let authority = load().authority().expect("Authority URL should parse.");

			assert_eq!(authority.tenant().as_ref(), "fabrikam");

			jail.set_env("AZUREAD__AUTHORITY", "http://login.example.com/fabrikam");

			assert!(matches!(load().authority(), Err(ConfigError::InsecureEndpoint { .. })));

			Ok(())
		});
	}
}
