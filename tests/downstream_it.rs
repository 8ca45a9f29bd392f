mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::{Mock, prelude::*};
use obo_broker::{
	auth::UserAssertion,
	broker::TokenBroker,
	downstream::{DownstreamApiInvoker, DownstreamReply, USER_MESSAGE_HEADER},
};
// self
use common::*;

fn invoker(server: &MockServer) -> DownstreamApiInvoker {
	let config = development_config(server);
	let broker = TokenBroker::from_config_with_http(&config, http_client())
		.expect("Development configuration should be valid.");
	let base_url = config.apim_base_url().expect("Gateway URL should be valid.");

	DownstreamApiInvoker::new(Arc::new(broker), &base_url, http_client())
		.expect("Invoker should accept the gateway URL.")
}

async fn mock_obo(server: &MockServer) -> Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path(token_path())
				.form_urlencoded_tuple("assertion", "user.jwt")
				.form_urlencoded_tuple("scope", DOWNSTREAM_SCOPE);
			then.status(200).header("content-type", "application/json").body(
				"{\"token_type\":\"Bearer\",\"access_token\":\"gateway-token\",\"expires_in\":3600}",
			);
		})
		.await
}

#[tokio::test]
async fn success_is_pretty_printed() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let _token = mock_obo(&server).await;
	let gateway = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/apim/test")
				.header("authorization", "Bearer gateway-token")
				.header(USER_MESSAGE_HEADER, "hello gateway");
			then.status(200).header("content-type", "application/json").body("{\"a\":1}");
		})
		.await;
	let invoker = invoker(&server);

	assert_eq!(invoker.endpoint().as_str(), server.url("/apim/test"));

	let reply = invoker.call(&UserAssertion::new("user.jwt"), "hello gateway").await;

	assert_eq!(reply, DownstreamReply::Success("{\n  \"a\": 1\n}".into()));
	assert_eq!(reply.to_string(), "{\n  \"a\": 1\n}");

	gateway.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_success_status_renders_status_and_body() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let _token = mock_obo(&server).await;
	let _gateway = server
		.mock_async(|when, then| {
			when.method(GET).path("/apim/test");
			then.status(500).body("boom");
		})
		.await;
	let reply = invoker(&server).call(&UserAssertion::new("user.jwt"), "hi").await;

	assert_eq!(reply, DownstreamReply::Failure { status: 500, body: "boom".into() });

	let rendered = reply.to_string();

	assert!(rendered.starts_with("Error: 500"));
	assert!(rendered.ends_with("\nboom"));
}

#[tokio::test]
async fn delegation_failure_renders_as_exception() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path(token_path());
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"AADSTS50013: Assertion failed signature validation.\"}",
			);
		})
		.await;
	let gateway = server
		.mock_async(|when, then| {
			when.method(GET).path("/apim/test");
			then.status(200).body("{}");
		})
		.await;
	let reply = invoker(&server).call(&UserAssertion::new("forged.jwt"), "hi").await;
	let rendered = reply.into_string();

	assert!(rendered.starts_with("Exception: "));
	assert!(rendered.contains("AADSTS50013"));

	gateway.assert_calls_async(0).await;
}

#[tokio::test]
async fn malformed_gateway_json_renders_as_exception() {
	let server = MockServer::start_async().await;
	let _discovery = mock_discovery(&server).await;
	let _token = mock_obo(&server).await;
	let _gateway = server
		.mock_async(|when, then| {
			when.method(GET).path("/apim/test");
			then.status(200).body("not json");
		})
		.await;
	let reply = invoker(&server).call(&UserAssertion::new("user.jwt"), "hi").await;

	assert!(matches!(reply, DownstreamReply::Exception { transient: false, .. }));
	assert!(reply.to_string().starts_with("Exception: Downstream gateway returned malformed JSON"));
}
