//! Optional observability helpers for login and refresh flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit spans named `keycloak_auth_broker.flow` with the
//!   `flow` (grant) and `stage` (call site) fields, settled with `outcome` and the error
//!   `code`, plus audit events for login outcomes, rate-limit rejections, refresh failures,
//!   and identity-provider latency.
//! - Enable `metrics` to increment `keycloak_auth_broker_flow_total` for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and
//!   `keycloak_auth_broker_rate_limited_total` for every rejected submission.

mod audit;
mod metrics;
mod tracing;

pub use self::{audit::*, metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Flow kinds observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Resource-owner password login.
	Password,
	/// Refresh token exchange.
	Refresh,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Password => "password",
			FlowKind::Refresh => "refresh",
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
	/// A refresh that reused another caller's in-flight result.
	Coalesced,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Coalesced => "coalesced",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
