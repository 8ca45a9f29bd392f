//! Broker-level error taxonomy shared by credentials, the confidential client, and the invoker.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Missing or invalid configuration; fatal at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The credential source could not produce proof of identity.
	#[error(transparent)]
	CredentialUnavailable(#[from] CredentialError),
	/// Identity provider refused to exchange the user token.
	#[error("On-behalf-of exchange was rejected: {reason}.")]
	Delegation {
		/// Provider-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Any other identity-provider failure.
	#[error(transparent)]
	TokenAcquisition(#[from] TokenAcquisitionError),
	/// Downstream gateway failure.
	#[error(transparent)]
	Downstream(#[from] DownstreamError),
}
impl Error {
	/// Returns `true` when the failure is temporary and a caller-driven retry may succeed.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::TokenAcquisition(
				TokenAcquisitionError::Transient(_) | TokenAcquisitionError::Transport(_),
			) => true,
			Self::CredentialUnavailable(CredentialError::Unreachable { .. }) => true,
			Self::Downstream(err) => err.is_transient(),
			_ => false,
		}
	}
}
impl From<TransientError> for Error {
	fn from(e: TransientError) -> Self {
		Self::TokenAcquisition(e.into())
	}
}
impl From<TransportError> for Error {
	fn from(e: TransportError) -> Self {
		Self::TokenAcquisition(e.into())
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required setting is absent or empty.
	#[error("Required setting `{name}` is not configured.")]
	MissingSetting {
		/// Setting name as it appears in the environment.
		name: &'static str,
	},
	/// A setting is present but cannot be parsed.
	#[error("Setting `{name}` is invalid.")]
	InvalidSetting {
		/// Setting name as it appears in the environment.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: BoxError,
	},
	/// The configuration source could not be extracted.
	#[error("Configuration could not be loaded.")]
	Extract(#[source] Box<figment::Error>),
	/// An endpoint does not use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Offending URL.
		url: String,
	},
	/// The authority's metadata document could not be resolved.
	#[error("Authority metadata at {url} returned HTTP {status}.")]
	Discovery {
		/// Discovery document URL.
		url: String,
		/// HTTP status code.
		status: u16,
	},
	/// A URL could not be derived from the configured authority.
	#[error("Endpoint URL is invalid.")]
	InvalidUrl(#[from] url::ParseError),
	/// Identifier validation failed.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a parsing failure for the named setting.
	pub fn invalid_setting(
		name: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::InvalidSetting { name, source: Box::new(src) }
	}

	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<figment::Error> for ConfigError {
	fn from(e: figment::Error) -> Self {
		Self::Extract(Box::new(e))
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while obtaining proof of the application's identity.
#[derive(Debug, ThisError)]
pub enum CredentialError {
	/// The managed-identity endpoint could not be reached.
	#[error("Managed identity endpoint {endpoint} is unreachable.")]
	Unreachable {
		/// Endpoint that was called.
		endpoint: String,
		/// Transport failure.
		#[source]
		source: BoxError,
	},
	/// The managed-identity endpoint refused to issue a token.
	#[error("Managed identity endpoint returned HTTP {status}: {body}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Response body preview.
		body: String,
	},
	/// The managed-identity endpoint returned a body that is not a token response.
	#[error("Managed identity endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The projected workload-identity token could not be read.
	#[error("Federated token file {} could not be read.", path.display())]
	TokenFile {
		/// `AZURE_FEDERATED_TOKEN_FILE`.
		path: std::path::PathBuf,
		/// I/O failure.
		#[source]
		source: std::io::Error,
	},
	/// A caller-supplied assertion callback failed.
	#[error("Client assertion could not be produced: {message}.")]
	Assertion {
		/// Callback-supplied message.
		message: String,
	},
}
impl CredentialError {
	/// Wraps a transport failure raised while calling `endpoint`.
	pub fn unreachable(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Unreachable { endpoint: endpoint.into(), source: Box::new(src) }
	}
}

/// Identity-provider failures that are not delegation rejections.
#[derive(Debug, ThisError)]
pub enum TokenAcquisitionError {
	/// Provider rejected the grant.
	#[error("Identity provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Requested scopes are not allowed for this client.
	#[error("Requested scopes were refused: {reason}.")]
	InsufficientScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider answered successfully but the payload is unusable.
	#[error("Identity provider returned an unusable response: {reason}.")]
	InvalidResponse {
		/// Broker-supplied description.
		reason: String,
	},
	/// Temporary upstream failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Identity provider returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Provider responded with malformed JSON that could not be parsed.
	#[error("Identity provider returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Failures raised by the downstream gateway call.
#[derive(Debug, ThisError)]
pub enum DownstreamError {
	/// Gateway answered with a non-success status.
	#[error("Downstream gateway returned HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body, verbatim.
		body: String,
	},
	/// Gateway could not be reached or the request timed out.
	#[error("Downstream gateway request failed: {source}")]
	Transport {
		/// Transport failure.
		#[source]
		source: ReqwestError,
	},
	/// Gateway answered with a success status but the body is not JSON.
	#[error("Downstream gateway returned malformed JSON: {source}")]
	Body {
		/// JSON parsing failure.
		#[source]
		source: serde_json::Error,
	},
}
impl DownstreamError {
	/// Returns `true` for timeouts, connection failures, throttling, and 5xx responses.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Status { status, .. } => *status == 429 || *status >= 500,
			Self::Transport { source } => source.is_timeout() || source.is_connect(),
			Self::Body { .. } => false,
		}
	}
}
