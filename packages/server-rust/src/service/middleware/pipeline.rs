//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use nado_core::{Command, ResponseEnvelope, Signer};
use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use super::verify::VerifyLayer;
use crate::service::operation::DispatchError;
use crate::service::router::UnitRouter;

/// The type-erased dispatch stack handed to every connection.
pub type DispatchService = BoxCloneService<Command, ResponseEnvelope, DispatchError>;

/// Build the dispatch pipeline by wrapping the `UnitRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `VerifyLayer` -- reject unauthenticated commands before doing any work
/// 2. `MetricsLayer` -- record timing and outcome of authenticated dispatches
#[must_use]
pub fn build_dispatch_pipeline(router: UnitRouter, signer: Arc<dyn Signer>) -> DispatchService {
    BoxCloneService::new(
        ServiceBuilder::new()
            .layer(VerifyLayer::new(signer))
            .layer(MetricsLayer)
            .service(router),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use nado_core::{ManualClock, Sha256Signer};
    use tower::ServiceExt;

    use super::*;
    use crate::service::admission::AdmissionController;
    use crate::service::config::AdmissionConfig;
    use crate::service::registry::UnitRegistry;
    use crate::service::scheduler::Scheduler;
    use crate::service::unit::{Priority, SuspendingUnit, UnitDescriptor, UnitState};

    struct Answer;

    #[async_trait]
    impl SuspendingUnit for Answer {
        async fn process(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
            state.data = rmpv::Value::from("pong");
            Ok(true)
        }
    }

    fn pipeline() -> DispatchService {
        let mut registry = UnitRegistry::new();
        registry.register("system", "ping", UnitDescriptor::suspending(Priority::Highest, |_| Answer));
        let admission = Arc::new(
            AdmissionController::with_clock(AdmissionConfig::default(), Arc::new(ManualClock::new(0)))
                .unwrap(),
        );
        let scheduler = Arc::new(Scheduler::start(0, Arc::clone(&admission)));
        let router = UnitRouter::new(registry.freeze(), admission, scheduler, true);
        build_dispatch_pipeline(router, Arc::new(Sha256Signer::default()))
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let cmd = Command::new("system", "ping")
            .with_caller("u1", "10.0.0.1")
            .signed(&Sha256Signer::default());
        let env = pipeline().oneshot(cmd).await.unwrap();
        assert!(env.success);
        assert_eq!(env.data, rmpv::Value::from("pong"));
    }

    #[tokio::test]
    async fn verification_runs_before_lookup() {
        // Unknown service and no signature: the signature error wins.
        let cmd = Command::new("nowhere", "nothing").with_caller("u1", "10.0.0.1");
        let err = pipeline().oneshot(cmd).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn signed_unknown_service_reports_lookup_reason() {
        let cmd = Command::new("nowhere", "nothing")
            .with_caller("u1", "10.0.0.1")
            .signed(&Sha256Signer::default());
        let err = pipeline().oneshot(cmd).await.unwrap_err();
        assert_eq!(
            err.into_envelope().message,
            "[10001]can not find service nowhere[nothing]"
        );
    }
}
