//! Token value types: redacted secrets, issued access tokens, and token requests.

mod access;
mod request;
mod secret;

pub use access::*;
pub use request::*;
pub use secret::*;
