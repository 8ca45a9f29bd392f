//! Identity-provider identifiers, scopes, and token value types.

pub mod id;
pub mod scope;
pub mod token;

pub use id::*;
pub use scope::*;
pub use token::*;
