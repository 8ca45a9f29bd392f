//! Scope values and the normalized scope sets used as token-cache keys.

// std
use std::collections::BTreeSet;
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
	/// One of the components of a synthesized scope is empty.
	#[error("The {component} component of the scope cannot be empty.")]
	EmptyComponent {
		/// Component label (`application` or `permission`).
		component: &'static str,
	},
	/// Token requests must name at least one scope.
	#[error("At least one scope is required.")]
	EmptySet,
}

/// A single scope string identifying a resource and permission.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);
impl Scope {
	/// Prefix of application ID URIs registered in the identity provider.
	pub const APPLICATION_URI_PREFIX: &'static str = "api://";
	/// Suffix requesting every statically configured permission of a resource.
	pub const DEFAULT_SUFFIX: &'static str = "/.default";

	/// Validates and wraps a raw scope string.
	pub fn new(value: impl Into<String>) -> Result<Self, ScopeValidationError> {
		let value = value.into();

		validate(&value)?;

		Ok(Self(value))
	}

	/// Synthesizes `api://<application>/<permission>`.
	pub fn downstream(application: &str, permission: &str) -> Result<Self, ScopeValidationError> {
		if application.is_empty() {
			return Err(ScopeValidationError::EmptyComponent { component: "application" });
		}
		if permission.is_empty() {
			return Err(ScopeValidationError::EmptyComponent { component: "permission" });
		}

		Self::new(format!("{}{application}/{permission}", Self::APPLICATION_URI_PREFIX))
	}

	/// Builds the `<resource>/.default` scope for the provided resource URI.
	pub fn default_for(resource: &str) -> Result<Self, ScopeValidationError> {
		if resource.ends_with(Self::DEFAULT_SUFFIX) {
			Self::new(resource)
		} else {
			Self::new(format!("{}{}", resource.trim_end_matches('/'), Self::DEFAULT_SUFFIX))
		}
	}

	/// Returns the resource part of a `.default` scope, or the scope itself.
	pub fn resource(&self) -> &str {
		self.0.strip_suffix(Self::DEFAULT_SUFFIX).unwrap_or(&self.0)
	}

	/// Borrows the scope string.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for Scope {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<Scope> for String {
	fn from(value: Scope) -> Self {
		value.0
	}
}
impl TryFrom<String> for Scope {
	type Error = ScopeValidationError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for Scope {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for Scope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Scope({})", self.0)
	}
}
impl Display for Scope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Non-empty, deduplicated, sorted set of scopes.
///
/// Requests naming the same scopes in a different order normalize to equal sets and share one
/// cache entry.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet(Arc<[Scope]>);
impl ScopeSet {
	/// Creates a normalized scope set from any iterator of raw scope strings.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut set = BTreeSet::new();

		for scope in scopes {
			set.insert(Scope::new(scope)?);
		}

		Self::from_set(set)
	}

	/// Creates a set holding exactly one scope.
	pub fn single(scope: Scope) -> Self {
		Self(Arc::from([scope]))
	}

	fn from_set(set: BTreeSet<Scope>) -> Result<Self, ScopeValidationError> {
		if set.is_empty() {
			return Err(ScopeValidationError::EmptySet);
		}

		Ok(Self(set.into_iter().collect()))
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Always `false`; kept for API symmetry with collections.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &Scope> {
		self.0.iter()
	}

	/// Returns the space-delimited form sent in the `scope` form field.
	pub fn normalized(&self) -> String {
		self.0.iter().map(Scope::as_str).collect::<Vec<_>>().join(" ")
	}

	/// Base64 (no padding) SHA-256 digest of [`normalized`](Self::normalized).
	pub fn fingerprint(&self) -> String {
		STANDARD_NO_PAD.encode(Sha256::digest(self.normalized().as_bytes()))
	}
}
impl From<Scope> for ScopeSet {
	fn from(value: Scope) -> Self {
		Self::single(value)
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s.split_whitespace())
	}
}

fn validate(scope: &str) -> Result<(), ScopeValidationError> {
	if scope.is_empty() {
		return Err(ScopeValidationError::Empty);
	}
	if scope.chars().any(char::is_whitespace) {
		return Err(ScopeValidationError::ContainsWhitespace { scope: scope.to_owned() });
	}

	Ok(())
}
