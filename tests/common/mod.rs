#![allow(dead_code)]

// crates.io
use httpmock::{Mock, prelude::*};
use obo_broker::{
	auth::{ClientId, TenantId, TokenSecret},
	client::ClientSettings,
	config::{AzureAdSection, BrokerConfig},
	http::ReqwestHttpClient,
	provider::Authority,
	reqwest::Client,
	url::Url,
};

pub const TENANT: &str = "tenant-obo";
pub const CLIENT_ID: &str = "web-client";
pub const CLIENT_SECRET: &str = "web-secret";
pub const API_APP_ID: &str = "backend-api";
pub const DOWNSTREAM_SCOPE: &str = "api://backend-api/access_as_user";
pub const OBO_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

pub fn http_client() -> ReqwestHttpClient {
	let client = Client::builder()
		.danger_accept_invalid_certs(true)
		.build()
		.expect("Failed to build Reqwest client for tests.");

	ReqwestHttpClient::with_client(client)
}

pub fn instance(server: &MockServer) -> String {
	format!("{}/", server.base_url())
}

pub fn authority(server: &MockServer) -> Authority {
	let instance = Url::parse(&instance(server)).expect("Mock base URL should parse.");
	let tenant = TenantId::new(TENANT).expect("Tenant fixture should be valid.");

	Authority::new(instance, tenant).expect("Loopback authority should be accepted.")
}

pub fn settings(server: &MockServer) -> ClientSettings {
	let client_id = ClientId::new(CLIENT_ID).expect("Client fixture should be valid.");

	ClientSettings::new(authority(server), client_id)
}

pub fn token_path() -> String {
	format!("/{TENANT}/oauth2/v2.0/token")
}

pub fn discovery_path() -> String {
	format!("/{TENANT}/v2.0/.well-known/openid-configuration")
}

pub async fn mock_discovery(server: &MockServer) -> Mock<'_> {
	let body = format!(
		"{{\"issuer\":\"{}/{TENANT}/v2.0\",\"token_endpoint\":\"{}\"}}",
		server.base_url(),
		server.url(token_path())
	);

	server
		.mock_async(|when, then| {
			when.method(GET).path(discovery_path());
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await
}

/// Development configuration pointing the authority and gateway at `server`.
pub fn development_config(server: &MockServer) -> BrokerConfig {
	BrokerConfig {
		environment: Some("Development".into()),
		api_app_id: Some(API_APP_ID.into()),
		apim_base_url: Some(server.url("/apim/")),
		azure_client_id: Some(CLIENT_ID.into()),
		azure_tenant_id: Some(TENANT.into()),
		azure_client_secret: Some(TokenSecret::new(CLIENT_SECRET)),
		azuread: AzureAdSection { instance: Some(instance(server)), authority: None },
		..Default::default()
	}
}
