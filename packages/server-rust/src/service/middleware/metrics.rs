//! Metrics middleware for command dispatch.
//!
//! Records dispatch duration and outcome on a `tracing` span, not a metrics
//! crate.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use nado_core::{Command, ResponseEnvelope};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::DispatchError;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps each dispatch in a `dispatch` span.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

/// `ok`, `failed` (the unit answered with `success = false`) or `error`
/// (dispatch never reached a unit).
fn outcome_of(result: &Result<ResponseEnvelope, DispatchError>) -> &'static str {
    match result {
        Ok(env) if env.success => "ok",
        Ok(_) => "failed",
        Err(_) => "error",
    }
}

impl<S> Service<Command> for MetricsService<S>
where
    S: Service<Command, Response = ResponseEnvelope, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = ResponseEnvelope;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<ResponseEnvelope, DispatchError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, command: Command) -> Self::Future {
        let span = info_span!(
            "dispatch",
            service = command.service.as_deref().unwrap_or_default(),
            method = command.method.as_deref().unwrap_or_default(),
            operator = %command.operator,
            ip = %command.ip,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(command);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = outcome_of(&result);

                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                tracing::info!(duration_ms, outcome, "dispatch complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
