//! Provider hooks for token-request decoration and error classification.
//!
//! The confidential client hands every non-success token response to a [`ProviderStrategy`]
//! as a [`ProviderErrorContext`] and maps the returned [`ProviderErrorKind`] onto the broker's
//! error taxonomy.

// self
use crate::{_prelude::*, provider::GrantType};

/// Identity-provider specific behavior plugged into the confidential client.
pub trait ProviderStrategy
where
	Self: Send + Sync,
{
	/// Buckets a failed token response.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds provider-specific form fields before the request is sent.
	///
	/// Credential fields (`client_id`, `client_secret`, `client_assertion`) are written after
	/// this hook and always win.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Failure buckets a strategy can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// The grant, or the user assertion it carried, was refused.
	InvalidGrant,
	/// The application failed to authenticate.
	InvalidClient,
	/// The requested resource or permission is unknown or not granted.
	InsufficientScope,
	/// Throttling or a provider-side fault.
	Transient,
}

/// Everything known about a failed token response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant of the failing request.
	pub grant_type: GrantType,
	/// HTTP status code.
	pub http_status: Option<u16>,
	/// OAuth `error` field.
	pub oauth_error: Option<String>,
	/// OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Entra `error_codes` (the numeric part of `AADSTS<n>`).
	pub error_codes: Vec<u32>,
	/// Truncated raw body, kept for responses that are not JSON.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	/// Maximum number of characters kept in [`body_preview`](Self::body_preview).
	pub const BODY_PREVIEW_LIMIT: usize = 256;

	/// Empty context for `grant_type`.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			error_codes: Vec::new(),
			body_preview: None,
		}
	}

	/// Sets the HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Sets the OAuth `error` field.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Sets the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Sets the Entra error codes.
	pub fn with_error_codes(mut self, codes: impl IntoIterator<Item = u32>) -> Self {
		self.error_codes = codes.into_iter().collect();

		self
	}

	/// Stores the first [`BODY_PREVIEW_LIMIT`](Self::BODY_PREVIEW_LIMIT) characters of `body`.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		let mut body = body.into();

		if let Some((cut, _)) = body.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			body.truncate(cut);
			body.push('…');
		}

		self.body_preview = Some(body);

		self
	}

	/// Entra codes from `error_codes`, or parsed from an `AADSTS<n>:` description prefix.
	pub fn entra_codes(&self) -> Vec<u32> {
		if !self.error_codes.is_empty() {
			return self.error_codes.clone();
		}

		self.error_description.as_deref().and_then(parse_aadsts).into_iter().collect()
	}
}

/// Classification tuned for Entra ID token endpoints.
///
/// Precedence: `AADSTS` codes, then the OAuth `error` field, then hints in the description or
/// raw body, then the HTTP status.
#[derive(Debug, Default)]
pub struct EntraProviderStrategy;
impl Display for EntraProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("entra")
	}
}
impl ProviderStrategy for EntraProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.entra_codes()
			.into_iter()
			.find_map(kind_for_code)
			.or_else(|| ctx.oauth_error.as_deref().and_then(kind_for_oauth_error))
			.or_else(|| ctx.error_description.as_deref().and_then(kind_for_text))
			.or_else(|| ctx.body_preview.as_deref().and_then(kind_for_text))
			.unwrap_or_else(|| kind_for_status(ctx.http_status))
	}
}

const OAUTH_ERRORS: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("interaction_required", ProviderErrorKind::InvalidGrant),
	("consent_required", ProviderErrorKind::InvalidGrant),
	("access_denied", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("unauthorized_client", ProviderErrorKind::InvalidClient),
	("invalid_scope", ProviderErrorKind::InsufficientScope),
	("insufficient_scope", ProviderErrorKind::InsufficientScope),
	("invalid_resource", ProviderErrorKind::InsufficientScope),
	("temporarily_unavailable", ProviderErrorKind::Transient),
	("server_error", ProviderErrorKind::Transient),
];

fn kind_for_oauth_error(error: &str) -> Option<ProviderErrorKind> {
	let error = error.trim();

	OAUTH_ERRORS.iter().find(|(name, _)| name.eq_ignore_ascii_case(error)).map(|(_, kind)| *kind)
}

fn kind_for_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	OAUTH_ERRORS.iter().find(|(name, _)| lowered.contains(name)).map(|(_, kind)| *kind)
}

fn kind_for_code(code: u32) -> Option<ProviderErrorKind> {
	let kind = match code {
		// User assertion: bad signature, expired, wrong audience, MFA or consent missing.
		50013 | 50027 | 50076 | 50079 | 65001 | 500133 => ProviderErrorKind::InvalidGrant,
		// Application: unknown, bad secret, bad or expired client assertion.
		700016 | 700024 | 700027 | 7000215 | 7000222 => ProviderErrorKind::InvalidClient,
		// Resource or permission not registered.
		28002 | 70011 | 500011 => ProviderErrorKind::InsufficientScope,
		// Throttled or internal.
		50196 | 90006 | 90033 => ProviderErrorKind::Transient,
		_ => return None,
	};

	Some(kind)
}

fn kind_for_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

fn parse_aadsts(description: &str) -> Option<u32> {
	let rest = description.trim_start().strip_prefix("AADSTS")?;
	let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());

	rest[..end].parse().ok()
}
