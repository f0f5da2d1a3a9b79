//! Audit events for credential logins and session refreshes.
//!
//! Events carry the client identity and username but never a password or token.

// self
use crate::obs::FlowKind;

/// Records a successful credential login.
pub fn audit_login_success(identity: &str, username: &str) {
	#[cfg(feature = "tracing")]
	tracing::info!(identity, username, "credential login succeeded");
	#[cfg(not(feature = "tracing"))]
	let _ = (identity, username);
}

/// Records a failed credential login with its stable error code.
pub fn audit_login_failure(identity: &str, username: &str, code: &str, oauth_error: Option<&str>) {
	#[cfg(feature = "tracing")]
	tracing::warn!(identity, username, error = code, oauth_error, "credential login failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (identity, username, code, oauth_error);
}

/// Records a submission rejected by the rate limiter.
pub fn audit_rate_limited(identity: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(identity, "login attempt rejected by rate limiter");
	#[cfg(not(feature = "tracing"))]
	let _ = identity;
}

/// Records a refresh that left the session in the failed state.
pub fn audit_refresh_failure(code: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = code, "session refresh failed; re-authentication required");
	#[cfg(not(feature = "tracing"))]
	let _ = code;
}

/// Records the identity provider's token endpoint round-trip time.
pub fn audit_idp_latency(kind: FlowKind, elapsed: Option<std::time::Duration>) {
	#[cfg(feature = "tracing")]
	{
		if let Some(elapsed) = elapsed {
			tracing::info!(
				flow = kind.as_str(),
				elapsed_ms = elapsed.as_millis() as u64,
				"identity provider responded"
			);
		}
	}
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, elapsed);
}

/// Records a rate-limit store failure; `operation` names the store call.
pub fn audit_store_failure(identity: &str, operation: &'static str, code: &str) {
	#[cfg(feature = "tracing")]
	tracing::error!(identity, operation, error = code, "rate-limit store failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (identity, operation, code);
}
