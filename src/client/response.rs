//! Token endpoint response parsing and error classification.

// crates.io
use oauth2::HttpResponse;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, ScopeSet},
	error::{TokenAcquisitionError, TransientError},
	http::{self, ResponseMetadata},
	provider::{GrantType, ProviderErrorContext, ProviderErrorKind, ProviderStrategy},
};

/// Lifetime field that providers emit either as a JSON number or as a numeric string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Seconds {
	Number(i64),
	Text(String),
}
impl Seconds {
	pub(crate) fn get(&self) -> Option<i64> {
		match self {
			Self::Number(value) => Some(*value),
			Self::Text(value) => value.trim().parse().ok(),
		}
	}
}

#[derive(Deserialize)]
struct TokenResponseBody {
	access_token: String,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<Seconds>,
}

#[derive(Default, Deserialize)]
struct ErrorResponseBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
	#[serde(default)]
	error_codes: Vec<u32>,
}

pub(crate) fn map_token_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	scope: &ScopeSet,
	issued_at: OffsetDateTime,
	meta: Option<&ResponseMetadata>,
	response: HttpResponse,
) -> Result<AccessToken> {
	let status = response.status();

	if !status.is_success() {
		return Err(map_error_response(strategy, grant, status.as_u16(), meta, response.body()));
	}

	let mut deserializer = serde_json::Deserializer::from_slice(response.body());
	let body: TokenResponseBody = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransientError::ResponseParse { source, status: Some(status.as_u16()) })?;

	if body.token_type.as_deref().is_some_and(|kind| !kind.eq_ignore_ascii_case("bearer")) {
		return Err(invalid_response("token_type is not Bearer"));
	}
	if body.access_token.trim().is_empty() {
		return Err(invalid_response("access_token is empty"));
	}

	let expires_in = body
		.expires_in
		.as_ref()
		.and_then(Seconds::get)
		.ok_or_else(|| invalid_response("expires_in is missing"))?;

	if expires_in <= 0 {
		return Err(invalid_response("expires_in is not positive"));
	}

	Ok(AccessToken::new(body.access_token, scope.clone(), issued_at, Duration::seconds(expires_in)))
}

fn map_error_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	status: u16,
	meta: Option<&ResponseMetadata>,
	body: &[u8],
) -> Error {
	let text = String::from_utf8_lossy(body);
	let parsed: ErrorResponseBody = serde_json::from_slice(body).unwrap_or_default();
	let mut ctx = ProviderErrorContext::new(grant)
		.with_http_status(status)
		.with_error_codes(parsed.error_codes.iter().copied())
		.with_body_preview(&*text);

	if let Some(error) = &parsed.error {
		ctx = ctx.with_oauth_error(error.as_str());
	}
	if let Some(description) = &parsed.error_description {
		ctx = ctx.with_error_description(description.as_str());
	}

	let reason = match (parsed.error_description, parsed.error) {
		(Some(description), _) => description.trim().to_owned(),
		(None, Some(error)) => error,
		(None, None) => format!("token endpoint returned HTTP {status}"),
	};

	match strategy.classify_token_error(&ctx) {
		ProviderErrorKind::InvalidGrant if grant == GrantType::OnBehalfOf =>
			Error::Delegation { reason, status: Some(status) },
		ProviderErrorKind::InvalidGrant => TokenAcquisitionError::InvalidGrant { reason }.into(),
		ProviderErrorKind::InvalidClient => TokenAcquisitionError::InvalidClient { reason }.into(),
		ProviderErrorKind::InsufficientScope =>
			TokenAcquisitionError::InsufficientScope { reason }.into(),
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message: reason,
			status: Some(status),
			retry_after: http::meta_retry_after(meta),
		}
		.into(),
	}
}

fn invalid_response(reason: &str) -> Error {
	TokenAcquisitionError::InvalidResponse { reason: reason.into() }.into()
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	// self
	use super::*;
	use crate::provider::EntraProviderStrategy;

	fn response(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = StatusCode::from_u16(status).expect("Status fixture is valid.");

		response
	}

	fn map(grant: GrantType, status: u16, body: &str) -> Result<AccessToken> {
		let scope = ScopeSet::from_str("api://backend/access_as_user").expect("Scope fixture.");

		map_token_response(
			&EntraProviderStrategy,
			grant,
			&scope,
			OffsetDateTime::now_utc(),
			None,
			response(status, body),
		)
	}

	#[test]
	fn success_accepts_numeric_and_string_lifetimes() {
		for body in [
			r#"{"token_type":"Bearer","access_token":"abc","expires_in":3599}"#,
			r#"{"token_type":"bearer","access_token":"abc","expires_in":"3599","ext_expires_in":"3599"}"#,
		] {
			let token = map(GrantType::OnBehalfOf, 200, body).expect("Token should parse.");

			assert_eq!(token.expose(), "abc");
			assert_eq!(token.expires_at - token.issued_at, Duration::seconds(3599));
		}
	}

	#[test]
	fn unusable_success_payloads_are_rejected() {
		for body in [
			r#"{"access_token":"abc"}"#,
			r#"{"access_token":"","expires_in":60}"#,
			r#"{"access_token":"abc","expires_in":0}"#,
			r#"{"token_type":"pop","access_token":"abc","expires_in":60}"#,
		] {
			assert!(matches!(
				map(GrantType::ClientCredentials, 200, body),
				Err(Error::TokenAcquisition(TokenAcquisitionError::InvalidResponse { .. }))
			));
		}

		let err = map(GrantType::ClientCredentials, 200, "not json").expect_err("Parse failure.");

		assert!(matches!(
			err,
			Error::TokenAcquisition(TokenAcquisitionError::Transient(
				TransientError::ResponseParse { status: Some(200), .. }
			))
		));
	}

	#[test]
	fn rejected_user_assertion_is_a_delegation_error() {
		let body = r#"{"error":"invalid_grant","error_description":"AADSTS50013: Assertion failed signature validation.","error_codes":[50013]}"#;

		match map(GrantType::OnBehalfOf, 400, body) {
			Err(Error::Delegation { reason, status }) => {
				assert!(reason.starts_with("AADSTS50013"));
				assert_eq!(status, Some(400));
			},
			other => panic!("Unexpected result: {other:?}."),
		}

		assert!(matches!(
			map(GrantType::ClientCredentials, 400, body),
			Err(Error::TokenAcquisition(TokenAcquisitionError::InvalidGrant { .. }))
		));
	}

	#[test]
	fn client_and_server_failures_are_classified() {
		assert!(matches!(
			map(GrantType::OnBehalfOf, 401, r#"{"error":"invalid_client"}"#),
			Err(Error::TokenAcquisition(TokenAcquisitionError::InvalidClient { .. }))
		));

		let err = map(GrantType::OnBehalfOf, 503, "upstream down").expect_err("Transient failure.");

		assert!(err.is_transient());
	}
}
