//! Authority (instance + tenant) and the endpoints derived from it.

// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::{_prelude::*, auth::TenantId, error::ConfigError};

/// Identity-provider authority: a cloud instance plus a directory tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authority {
	instance: Url,
	tenant: TenantId,
}
impl Authority {
	/// Public cloud instance used when none is configured.
	pub const DEFAULT_INSTANCE: &'static str = "https://login.microsoftonline.com/";

	/// Validates the instance URL and binds it to `tenant`.
	pub fn new(mut instance: Url, tenant: TenantId) -> Result<Self, ConfigError> {
		validate_endpoint("instance", &instance)?;

		if !instance.path().ends_with('/') {
			let path = format!("{}/", instance.path());

			instance.set_path(&path);
		}

		Ok(Self { instance, tenant })
	}

	/// Authority on the public cloud instance.
	pub fn public_cloud(tenant: TenantId) -> Result<Self, ConfigError> {
		Self::new(Url::parse(Self::DEFAULT_INSTANCE)?, tenant)
	}

	/// Parses a full authority URL such as `https://login.microsoftonline.com/<tenant>`.
	///
	/// A trailing `v2.0` segment (`.../<tenant>/v2.0`) names the endpoint version, not the
	/// tenant, and is dropped.
	pub fn from_authority_url(authority: &Url) -> Result<Self, ConfigError> {
		let mut segments = authority
			.path_segments()
			.map(|segments| segments.filter(|segment| !segment.is_empty()).collect::<Vec<_>>())
			.unwrap_or_default();

		if segments.last().is_some_and(|segment| segment.eq_ignore_ascii_case(VERSION_SEGMENT)) {
			segments.pop();
		}

		let tenant = segments.pop().ok_or(ConfigError::MissingSetting { name: "AZURE_TENANT_ID" })?;
		let tenant = TenantId::new(tenant)?;
		let mut instance = authority.clone();

		instance.set_path(&format!("{}/", segments.join("/")));
		instance.set_query(None);

		Self::new(instance, tenant)
	}

	/// Cloud instance, always ending with `/`.
	pub fn instance(&self) -> &Url {
		&self.instance
	}

	/// Directory tenant.
	pub fn tenant(&self) -> &TenantId {
		&self.tenant
	}

	/// `{instance}{tenant}/`.
	pub fn url(&self) -> Result<Url, ConfigError> {
		Ok(self.instance.join(&format!("{}/", self.tenant))?)
	}

	/// OpenID Connect metadata document for the v2.0 endpoints.
	pub fn discovery_endpoint(&self) -> Result<Url, ConfigError> {
		Ok(self.url()?.join("v2.0/.well-known/openid-configuration")?)
	}

	/// Conventional v2.0 token endpoint, used when discovery is disabled.
	pub fn token_endpoint(&self) -> Result<Url, ConfigError> {
		Ok(self.url()?.join("oauth2/v2.0/token")?)
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}{}", self.instance, self.tenant)
	}
}

const VERSION_SEGMENT: &str = "v2.0";

/// Rejects plain-HTTP endpoints unless they point at the local machine.
pub(crate) fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}
