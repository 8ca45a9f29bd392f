//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `obo_broker.flow` with the `flow` and
//!   `stage` (call site) fields.
//! - Enable `metrics` to increment the `obo_broker_flow_total` counter for every outcome,
//!   labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flows observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Token for the application's own identity.
	ClientCredentials,
	/// User-token exchange for a downstream token.
	OnBehalfOf,
	/// Managed-identity token used as a client assertion.
	ManagedIdentity,
	/// OpenID Connect discovery performed while constructing the client handle.
	Discovery,
	/// Authenticated call to the downstream gateway.
	Downstream,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::OnBehalfOf => "on_behalf_of",
			FlowKind::ManagedIdentity => "managed_identity",
			FlowKind::Discovery => "discovery",
			FlowKind::Downstream => "downstream",
		}
	}
}
impl From<crate::provider::GrantType> for FlowKind {
	fn from(grant: crate::provider::GrantType) -> Self {
		match grant {
			crate::provider::GrantType::ClientCredentials => FlowKind::ClientCredentials,
			crate::provider::GrantType::OnBehalfOf => FlowKind::OnBehalfOf,
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Token served from the in-memory cache.
	CacheHit,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::CacheHit => "cache_hit",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a [`FlowSpan`] and counts the attempt plus its success or failure.
pub async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	record_flow_outcome(kind, outcome);

	result
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn observe_passes_results_through() {
		let ok = observe(FlowKind::Discovery, "discover", async { Ok(3) }).await;

		assert_eq!(ok.expect("Success should pass through."), 3);

		let err = observe(FlowKind::Downstream, "call", async {
			Err::<(), _>(Error::Delegation { reason: "denied".into(), status: None })
		})
		.await;

		assert!(matches!(err, Err(Error::Delegation { .. })));
	}
}
