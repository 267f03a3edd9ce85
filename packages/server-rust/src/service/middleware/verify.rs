//! Signature verification middleware.
//!
//! Recomputes the signature over the command's canonical payload and rejects
//! the command with a parameter error before any inner service runs when it
//! is missing or does not match. Comparison is constant-time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use nado_core::{Command, ResponseEnvelope, Signer};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::warn;

use crate::service::operation::DispatchError;

// ---------------------------------------------------------------------------
// VerifyLayer
// ---------------------------------------------------------------------------

/// Tower layer that authenticates commands with a shared-secret signer.
#[derive(Clone)]
pub struct VerifyLayer {
    signer: Arc<dyn Signer>,
}

impl VerifyLayer {
    #[must_use]
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

impl std::fmt::Debug for VerifyLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for VerifyLayer {
    type Service = VerifyService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VerifyService {
            inner,
            signer: Arc::clone(&self.signer),
        }
    }
}

// ---------------------------------------------------------------------------
// VerifyService
// ---------------------------------------------------------------------------

/// Service wrapper that only forwards commands carrying a valid signature.
#[derive(Clone)]
pub struct VerifyService<S> {
    inner: S,
    signer: Arc<dyn Signer>,
}

impl<S> VerifyService<S> {
    fn verify(&self, command: &Command) -> Result<(), DispatchError> {
        let Some(presented) = command.signature.as_deref() else {
            return Err(DispatchError::InvalidParams("missing signature".into()));
        };
        let expected = self.signer.sign(&command.signing_payload());
        if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(DispatchError::InvalidParams("signature mismatch".into()))
        }
    }
}

impl<S> Service<Command> for VerifyService<S>
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
        if let Err(e) = self.verify(&command) {
            warn!(
                service = command.service.as_deref().unwrap_or_default(),
                method = command.method.as_deref().unwrap_or_default(),
                ip = %command.ip,
                error = %e,
                "command rejected"
            );
            return Box::pin(async move { Err(e) });
        }
        Box::pin(self.inner.call(command))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use nado_core::{Codec, MsgPackCodec, Sha256Signer};
    use tower::ServiceExt;

    use super::*;

    /// Counts calls that made it past verification.
    #[derive(Clone, Default)]
    struct Counting(Arc<AtomicUsize>);

    impl Service<Command> for Counting {
        type Response = ResponseEnvelope;
        type Error = DispatchError;
        type Future =
            Pin<Box<dyn Future<Output = Result<ResponseEnvelope, DispatchError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _command: Command) -> Self::Future {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(ResponseEnvelope::default()) })
        }
    }

    fn service(inner: Counting) -> VerifyService<Counting> {
        VerifyLayer::new(Arc::new(Sha256Signer::default())).layer(inner)
    }

    fn command() -> Command {
        Command::new("orders", "view").with_caller("u1", "10.0.0.1")
    }

    #[tokio::test]
    async fn valid_signature_passes_through() {
        let inner = Counting::default();
        let signed = command().signed(&Sha256Signer::default());
        let env = service(inner.clone()).oneshot(signed).await.unwrap();
        assert!(env.success);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_signature_never_reaches_inner() {
        let inner = Counting::default();
        let err = service(inner.clone()).oneshot(command()).await.unwrap_err();
        assert_eq!(err.into_envelope().message, "[10004]");
        assert_eq!(inner.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tampered_field_is_rejected() {
        let inner = Counting::default();
        let mut cmd = command().signed(&Sha256Signer::default());
        cmd.operator = "admin".into();
        let err = service(inner.clone()).oneshot(cmd).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
        assert_eq!(inner.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let cmd = command().signed(&Sha256Signer::new("other"));
        let err = service(Counting::default()).oneshot(cmd).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn nil_param_survives_the_wire() {
        let inner = Counting::default();
        let sent = command()
            .with_param(rmpv::Value::Nil)
            .signed(&Sha256Signer::default());
        let bytes = MsgPackCodec.encode(&sent).unwrap();
        let received: Command = MsgPackCodec.decode(&bytes).unwrap();
        assert_eq!(received.param, None);

        let env = service(inner.clone()).oneshot(received).await.unwrap();
        assert!(env.success);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }
}
