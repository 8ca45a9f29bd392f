//! Authenticated calls to the downstream gateway, rendered into a single printable result.

// crates.io
use reqwest::{
	StatusCode,
	header::{AUTHORIZATION, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	auth::UserAssertion,
	broker::TokenBroker,
	config::BrokerConfig,
	credential::DEFAULT_HTTP_TIMEOUT,
	error::{ConfigError, DownstreamError},
	http::ReqwestHttpClient,
	obs::{self, FlowKind},
};

/// Header carrying the user's free-text message.
pub const USER_MESSAGE_HEADER: &str = "X-User-Message";
/// Path appended to the gateway base URL.
pub const TEST_PATH: &str = "test";

/// Outcome of a downstream call; [`Display`] renders the string shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownstreamReply {
	/// 2xx response with its JSON body re-serialized with indentation.
	Success(String),
	/// Non-2xx response with its body verbatim.
	Failure {
		/// HTTP status code.
		status: u16,
		/// Response body.
		body: String,
	},
	/// Token acquisition, transport, or parsing failure.
	Exception {
		/// Error message.
		message: String,
		/// Whether a later retry may succeed.
		transient: bool,
	},
}
impl DownstreamReply {
	/// Returns `true` for [`Success`](Self::Success).
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success(_))
	}

	/// Renders the reply.
	pub fn into_string(self) -> String {
		self.to_string()
	}
}
impl From<Result<String>> for DownstreamReply {
	fn from(result: Result<String>) -> Self {
		match result {
			Ok(body) => Self::Success(body),
			Err(Error::Downstream(DownstreamError::Status { status, body })) =>
				Self::Failure { status, body },
			Err(err) => Self::Exception { transient: err.is_transient(), message: err.to_string() },
		}
	}
}
impl Display for DownstreamReply {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Success(body) => f.write_str(body),
			Self::Failure { status, body } => match StatusCode::from_u16(*status) {
				Ok(code) => write!(f, "Error: {code}\n{body}"),
				Err(_) => write!(f, "Error: {status}\n{body}"),
			},
			Self::Exception { message, .. } => write!(f, "Exception: {message}"),
		}
	}
}

/// Calls `GET {APIM_BASE_URL}/test` with a bearer token obtained on behalf of the user.
#[derive(Clone)]
pub struct DownstreamApiInvoker {
	broker: Arc<TokenBroker>,
	http_client: ReqwestHttpClient,
	endpoint: Url,
}
impl DownstreamApiInvoker {
	/// Creates an invoker targeting `{base_url}/test`.
	pub fn new(
		broker: Arc<TokenBroker>,
		base_url: &Url,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let base = base_url.as_str().trim_end_matches('/');
		let endpoint = Url::parse(&format!("{base}/{TEST_PATH}"))
			.map_err(|e| ConfigError::invalid_setting("APIM_BASE_URL", e))?;

		Ok(Self { broker, http_client, endpoint })
	}

	/// Reads `APIM_BASE_URL` from `config` and uses a default reqwest client.
	pub fn from_config(
		broker: Arc<TokenBroker>,
		config: &BrokerConfig,
	) -> Result<Self, ConfigError> {
		let http_client = ReqwestHttpClient::with_timeout(DEFAULT_HTTP_TIMEOUT)?;

		Self::new(broker, &config.apim_base_url()?, http_client)
	}

	/// Endpoint every call targets.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Performs the call; never fails, every error becomes part of the reply.
	pub async fn call(&self, user: &UserAssertion, message: &str) -> DownstreamReply {
		DownstreamReply::from(self.try_call(user, message).await)
	}

	/// Performs the call and returns the pretty-printed JSON body, or the typed failure.
	pub async fn try_call(&self, user: &UserAssertion, message: &str) -> Result<String> {
		let result = obs::observe(FlowKind::Downstream, "call", self.send(user, message)).await;

		#[cfg(feature = "tracing")]
		if let Err(e) = &result {
			tracing::warn!(endpoint = %self.endpoint, error = %e, "Downstream call failed.");
		}

		result
	}

	async fn send(&self, user: &UserAssertion, message: &str) -> Result<String> {
		#[cfg(feature = "tracing")]
		tracing::info!(scope = %self.broker.downstream_scope(), "Acquiring downstream token.");

		let token = self.broker.acquire_downstream_token(user).await?;
		let mut bearer = HeaderValue::try_from(format!("Bearer {}", token.expose()))
			.map_err(|e| ConfigError::invalid_setting("access_token", e))?;

		bearer.set_sensitive(true);

		#[cfg(feature = "tracing")]
		tracing::info!(endpoint = %self.endpoint, "Calling downstream gateway.");

		let response = self
			.http_client
			.get(self.endpoint.clone())
			.header(AUTHORIZATION, bearer)
			.header(USER_MESSAGE_HEADER, message)
			.send()
			.await
			.map_err(|source| DownstreamError::Transport { source })?;
		let status = response.status();
		let body = response.bytes().await.map_err(|source| DownstreamError::Transport { source })?;

		if !status.is_success() {
			return Err(DownstreamError::Status {
				status: status.as_u16(),
				body: String::from_utf8_lossy(&body).into_owned(),
			}
			.into());
		}

		let document = serde_json::from_slice::<serde_json::Value>(&body)
			.map_err(|source| DownstreamError::Body { source })?;
		let pretty = serde_json::to_string_pretty(&document)
			.map_err(|source| DownstreamError::Body { source })?;

		Ok(pretty)
	}
}
impl Debug for DownstreamApiInvoker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DownstreamApiInvoker")
			.field("broker", &self.broker)
			.field("endpoint", &self.endpoint.as_str())
			.finish()
	}
}
