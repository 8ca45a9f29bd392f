mod common;

// std
use std::{
	env, fs,
	path::{Path, PathBuf},
	process,
	sync::Arc,
};
// crates.io
use httpmock::prelude::*;
use obo_broker::{
	auth::{ClientId, Scope, TokenSecret, UserAssertion},
	broker::TokenBroker,
	client::CLIENT_ASSERTION_TYPE,
	config::{BrokerConfig, ManagedIdentityEndpoint},
	credential::{ConfidentialCredential, CredentialKind, ManagedIdentityCredential},
	error::{CredentialError, Error},
	url::Url,
};
use time::OffsetDateTime;
// self
use common::*;

const MI_PATH: &str = "/msi/token";
const MI_HEADER: &str = "identity-header-value";

fn production_config(server: &MockServer) -> BrokerConfig {
	BrokerConfig {
		environment: Some("production".into()),
		azure_client_secret: None,
		identity_endpoint: Some(server.url(MI_PATH)),
		identity_header: Some(TokenSecret::new(MI_HEADER)),
		..development_config(server)
	}
}

#[tokio::test]
async fn production_presents_a_managed_identity_assertion() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let identity = server
		.mock_async(|when, then| {
			when.method(GET)
				.path(MI_PATH)
				.query_param("api-version", "2019-08-01")
				.query_param("resource", "api://AzureADTokenExchange")
				.query_param("client_id", CLIENT_ID)
				.header("X-IDENTITY-HEADER", MI_HEADER);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"mi-assertion\",\"expires_in\":\"3600\",\"token_type\":\"Bearer\"}",
			);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(token_path())
				.form_urlencoded_tuple("grant_type", OBO_GRANT)
				.form_urlencoded_tuple("requested_token_use", "on_behalf_of")
				.form_urlencoded_tuple("client_id", CLIENT_ID)
				.form_urlencoded_tuple("client_assertion_type", CLIENT_ASSERTION_TYPE)
				.form_urlencoded_tuple("client_assertion", "mi-assertion")
				.form_urlencoded_tuple("scope", DOWNSTREAM_SCOPE);
			then.status(200).header("content-type", "application/json").body(
				"{\"token_type\":\"Bearer\",\"access_token\":\"federated-obo\",\"expires_in\":3600}",
			);
		})
		.await;
	let broker = TokenBroker::from_config_with_http(&production_config(&server), http_client())
		.expect("Production configuration should be valid.");

	assert_eq!(broker.kind(), CredentialKind::Federated);

	let first = broker
		.acquire_downstream_token(&UserAssertion::new("alice.jwt"))
		.await
		.expect("Federated exchange should succeed.");
	let cached = broker
		.acquire_downstream_token(&UserAssertion::new("alice.jwt"))
		.await
		.expect("Cached exchange should succeed.");

	assert_eq!(first.expose(), "federated-obo");
	assert_eq!(cached.expose(), "federated-obo");

	identity.assert_calls_async(1).await;
	token.assert_calls_async(1).await;

	broker
		.acquire_downstream_token(&UserAssertion::new("bob.jwt"))
		.await
		.expect("Second user exchange should succeed.");

	// Each exchange mints a fresh assertion.
	identity.assert_calls_async(2).await;
	token.assert_calls_async(2).await;
}

#[tokio::test]
async fn imds_is_queried_with_the_metadata_header() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let imds = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/metadata/identity/oauth2/token")
				.query_param("api-version", "2018-02-01")
				.query_param("resource", "api://AzureADTokenExchange")
				.header("Metadata", "true");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"imds-assertion\",\"expires_in\":\"86399\",\"resource\":\"api://AzureADTokenExchange\"}",
			);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(token_path())
				.form_urlencoded_tuple("client_assertion", "imds-assertion");
			then.status(200).header("content-type", "application/json").body(
				"{\"token_type\":\"Bearer\",\"access_token\":\"imds-obo\",\"expires_in\":3600}",
			);
		})
		.await;
	let client_id = ClientId::new(CLIENT_ID).expect("Client fixture should be valid.");
	let imds_url =
		Url::parse(&server.url("/metadata/identity/oauth2/token")).expect("Mock IMDS URL.");
	let identity = ManagedIdentityCredential::new(
		Some(client_id),
		ManagedIdentityEndpoint::Imds,
		http_client(),
	)
	.with_imds_endpoint(imds_url);
	let credential =
		ConfidentialCredential::federated(settings(&server), Arc::new(identity), http_client());
	let scope = Scope::downstream(API_APP_ID, "access_as_user").expect("Scope fixture.");
	let broker = TokenBroker::new(Arc::new(credential), scope);
	let issued = broker
		.acquire_downstream_token(&UserAssertion::new("user.jwt"))
		.await
		.expect("IMDS-backed exchange should succeed.");

	assert_eq!(issued.expose(), "imds-obo");

	imds.assert_calls_async(1).await;
	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn managed_identity_failure_never_reaches_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let _identity = server
		.mock_async(|when, then| {
			when.method(GET).path(MI_PATH);
			then.status(400).body(
				"{\"error\":\"invalid_request\",\"error_description\":\"Identity not found\"}",
			);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"token_type\":\"Bearer\",\"access_token\":\"unused\",\"expires_in\":3600}",
			);
		})
		.await;
	let broker = TokenBroker::from_config_with_http(&production_config(&server), http_client())
		.expect("Production configuration should be valid.");
	let err = broker
		.acquire_downstream_token(&UserAssertion::new("user.jwt"))
		.await
		.expect_err("Managed identity rejection should surface.");

	match err {
		Error::CredentialUnavailable(CredentialError::Rejected { status, body }) => {
			assert_eq!(status, 400);
			assert!(body.contains("Identity not found"));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn production_without_an_identity_header_is_rejected() {
	let server = MockServer::start_async().await;
	let config = BrokerConfig { identity_header: None, ..production_config(&server) };
	let err = TokenBroker::from_config_with_http(&config, http_client())
		.expect_err("App Service endpoints need their header.");

	assert!(err.to_string().contains("IDENTITY_HEADER"));
}

fn token_file_path(label: &str) -> PathBuf {
	let unique = format!(
		"obo_broker_{label}_{}_{}.jwt",
		process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos(),
	);

	env::temp_dir().join(unique)
}

fn workload_config(server: &MockServer, token_file: &Path) -> BrokerConfig {
	BrokerConfig {
		azure_federated_token_file: Some(token_file.display().to_string()),
		..production_config(server)
	}
}

#[tokio::test]
async fn workload_identity_presents_the_projected_token() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let identity = server
		.mock_async(|when, then| {
			when.method(GET).path(MI_PATH);
			then.status(500);
		})
		.await;
	let first = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(token_path())
				.form_urlencoded_tuple("client_assertion_type", CLIENT_ASSERTION_TYPE)
				.form_urlencoded_tuple("client_assertion", "projected-1")
				.form_urlencoded_tuple("assertion", "alice.jwt");
			then.status(200).header("content-type", "application/json").body(
				"{\"token_type\":\"Bearer\",\"access_token\":\"alice-obo\",\"expires_in\":3600}",
			);
		})
		.await;
	let rotated = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(token_path())
				.form_urlencoded_tuple("client_assertion", "projected-2")
				.form_urlencoded_tuple("assertion", "bob.jwt");
			then.status(200).header("content-type", "application/json").body(
				"{\"token_type\":\"Bearer\",\"access_token\":\"bob-obo\",\"expires_in\":3600}",
			);
		})
		.await;
	let token_file = token_file_path("workload");

	fs::write(&token_file, "projected-1\n").expect("Token file should be writable.");

	let broker =
		TokenBroker::from_config_with_http(&workload_config(&server, &token_file), http_client())
			.expect("Workload identity configuration should be valid.");

	assert_eq!(broker.kind(), CredentialKind::Federated);

	let alice = broker
		.acquire_downstream_token(&UserAssertion::new("alice.jwt"))
		.await
		.expect("Projected token should be accepted.");

	fs::write(&token_file, "projected-2").expect("Token file should be rewritable.");

	let bob = broker
		.acquire_downstream_token(&UserAssertion::new("bob.jwt"))
		.await
		.expect("Rotated token should be read again.");

	fs::remove_file(&token_file).expect("Token file should be removable.");

	assert_eq!(alice.expose(), "alice-obo");
	assert_eq!(bob.expose(), "bob-obo");

	first.assert_calls_async(1).await;
	rotated.assert_calls_async(1).await;
	identity.assert_calls_async(0).await;
}

#[tokio::test]
async fn unreadable_token_file_never_reaches_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(200).header("content-type", "application/json").body(
				"{\"token_type\":\"Bearer\",\"access_token\":\"unused\",\"expires_in\":3600}",
			);
		})
		.await;
	let missing = token_file_path("missing");
	let broker =
		TokenBroker::from_config_with_http(&workload_config(&server, &missing), http_client())
			.expect("Workload identity configuration should be valid.");
	let err = broker
		.acquire_downstream_token(&UserAssertion::new("user.jwt"))
		.await
		.expect_err("Missing token file should surface.");

	assert!(!err.is_transient());

	match err {
		Error::CredentialUnavailable(CredentialError::TokenFile { path, .. }) =>
			assert_eq!(path, missing),
		other => panic!("Unexpected error: {other:?}."),
	}

	token.assert_calls_async(0).await;
}
