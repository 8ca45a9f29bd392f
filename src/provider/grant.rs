//! Grants the broker requests and their token-endpoint form values.

// self
use crate::_prelude::*;

/// Token grants issued by the confidential client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Client Credentials grant for app-only tokens.
	ClientCredentials,
	/// JWT bearer grant with `requested_token_use=on_behalf_of`.
	OnBehalfOf,
}
impl GrantType {
	/// Value of the `grant_type` form field.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::ClientCredentials => "client_credentials",
			GrantType::OnBehalfOf => "urn:ietf:params:oauth:grant-type:jwt-bearer",
		}
	}

	/// Short label suitable for logs and metric fields.
	pub fn label(self) -> &'static str {
		match self {
			GrantType::ClientCredentials => "client_credentials",
			GrantType::OnBehalfOf => "on_behalf_of",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.label())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn grant_identifiers_match_wire_values() {
		assert_eq!(GrantType::ClientCredentials.as_str(), "client_credentials");
		assert_eq!(GrantType::OnBehalfOf.as_str(), "urn:ietf:params:oauth:grant-type:jwt-bearer");
		assert_eq!(GrantType::OnBehalfOf.to_string(), "on_behalf_of");
	}
}
