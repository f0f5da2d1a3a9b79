//! Spans around token-endpoint exchanges.
//!
//! Each password login and refresh runs inside one `keycloak_auth_broker.flow` span. The span
//! opens with the grant (`flow`) and the broker entry point (`stage`); `outcome` and, on
//! failure, the broker error `code` are filled in once the exchange settles. Usernames,
//! passwords, and tokens are never attached.

// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome},
};

/// Future returned by [`FlowSpan::instrument`]; instrumented only with the `tracing` feature.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; the input future itself without `tracing`.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span covering a single grant exchange against the identity provider.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind`, labeled with the broker entry point that started it.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"keycloak_auth_broker.flow",
				flow = kind.as_str(),
				stage,
				outcome = tracing::field::Empty,
				code = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Runs the exchange inside the span; no guard is held across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Records how the exchange ended and returns the matching outcome label.
	pub fn settle<T>(&self, result: &Result<T>) -> FlowOutcome {
		let (outcome, code) = match result {
			Ok(_) => (FlowOutcome::Success, None),
			Err(err) => (FlowOutcome::Failure, Some(err.code())),
		};

		#[cfg(feature = "tracing")]
		{
			self.span.record("outcome", outcome.as_str());

			if let Some(code) = code {
				self.span.record("code", code);
			}
		}
		#[cfg(not(feature = "tracing"))]
		let _ = code;

		outcome
	}
}
