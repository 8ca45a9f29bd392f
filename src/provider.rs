//! Identity-provider facing data (authority, grants) and behavior (error classification).
//!
//! `authority` validates the instance + tenant pair and derives the discovery and token
//! endpoints. `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook used by the
//! confidential client to decorate token requests and map error responses into the broker
//! taxonomy.

pub mod authority;
pub mod grant;
pub mod strategy;

pub use authority::*;
pub use grant::*;
pub use strategy::*;
