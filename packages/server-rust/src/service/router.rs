//! Unit routing: maps a verified `Command` to its registered unit and runs it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use nado_core::{Command, ResponseEnvelope};
use tower::Service;
use tracing::debug;

use super::admission::AdmissionController;
use super::lifecycle;
use super::operation::DispatchError;
use super::registry::UnitRegistry;
use super::scheduler::Scheduler;
use super::unit::{Priority, UnitRequest};

// ---------------------------------------------------------------------------
// UnitRouter
// ---------------------------------------------------------------------------

/// Innermost service of the dispatch pipeline.
///
/// Resolves `service`/`method` against the frozen registry, builds a fresh
/// unit instance, and either runs it on the calling task (level 1 with inline
/// execution enabled) or hands it to the scheduler and waits for the
/// envelope. Cloning is cheap: every field is shared.
#[derive(Debug, Clone)]
pub struct UnitRouter {
    registry: Arc<UnitRegistry>,
    admission: Arc<AdmissionController>,
    scheduler: Arc<Scheduler>,
    inline_highest: bool,
}

impl UnitRouter {
    #[must_use]
    pub fn new(
        registry: Arc<UnitRegistry>,
        admission: Arc<AdmissionController>,
        scheduler: Arc<Scheduler>,
        inline_highest: bool,
    ) -> Self {
        Self {
            registry,
            admission,
            scheduler,
            inline_highest,
        }
    }

    async fn dispatch(self, command: Command) -> Result<ResponseEnvelope, DispatchError> {
        let (namespace, operation) = match (command.service, command.method) {
            (Some(ns), Some(op)) if !ns.is_empty() && !op.is_empty() => (ns, op),
            _ => return Err(DispatchError::InvalidParams("missing service or method".into())),
        };

        let descriptor = self.registry.lookup(&namespace, &operation)?;
        let request = UnitRequest::new(command.param, command.operator, command.ip);
        let instance = descriptor.instantiate(Arc::from(format!("{namespace}.{operation}")), request);
        debug!(unit = %instance.label, level = instance.priority().level(), "unit received");

        if self.inline_highest && instance.priority() == Priority::Highest {
            return Ok(lifecycle::execute(instance, &self.admission).await);
        }

        let priority = instance.priority();
        let receiver = self.scheduler.submit(priority, instance)?;
        receiver.await.map_err(|_| DispatchError::Undelivered)
    }
}

impl Service<Command> for UnitRouter {
    type Response = ResponseEnvelope;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<ResponseEnvelope, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Submission never blocks, so the router is always ready.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, command: Command) -> Self::Future {
        Box::pin(self.clone().dispatch(command))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use nado_core::ManualClock;
    use tower::ServiceExt;

    use super::*;
    use crate::service::config::AdmissionConfig;
    use crate::service::unit::{SuspendingUnit, UnitDescriptor, UnitState};

    /// Returns its payload.
    struct Echo;

    #[async_trait]
    impl SuspendingUnit for Echo {
        async fn process(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
            state.data = state.payload.clone();
            Ok(true)
        }
    }

    fn router(inline: bool, workers: usize) -> (UnitRouter, Arc<Scheduler>) {
        let mut registry = UnitRegistry::new();
        registry
            .register("echo", "fast", UnitDescriptor::suspending(Priority::Highest, |_| Echo))
            .register("echo", "slow", UnitDescriptor::suspending(Priority::Normal, |_| Echo));
        let admission = Arc::new(
            AdmissionController::with_clock(AdmissionConfig::default(), Arc::new(ManualClock::new(0)))
                .unwrap(),
        );
        let scheduler = Arc::new(Scheduler::start(workers, Arc::clone(&admission)));
        (
            UnitRouter::new(registry.freeze(), admission, Arc::clone(&scheduler), inline),
            scheduler,
        )
    }

    fn command(method: &str) -> Command {
        Command::new("echo", method).with_caller("u1", "10.0.0.1")
    }

    #[tokio::test]
    async fn highest_priority_runs_inline_without_consumers() {
        // No consumers: only inline execution can answer.
        let (router, scheduler) = router(true, 0);
        let env = router
            .oneshot(command("fast").with_param(rmpv::Value::from(7)))
            .await
            .unwrap();
        assert!(env.success);
        assert_eq!(env.data, rmpv::Value::from(7));
        assert_eq!(scheduler.pending(), [0; 4]);
    }

    #[tokio::test]
    async fn highest_priority_is_queued_when_inline_disabled() {
        let (router, scheduler) = router(false, 1);
        let env = router.oneshot(command("fast")).await.unwrap();
        assert_eq!(env.data, UnitRequest::default_payload());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn lower_priority_goes_through_scheduler() {
        let (router, scheduler) = router(true, 2);
        let env = router.oneshot(command("slow")).await.unwrap();
        assert!(env.success);
        assert_eq!(env.data, UnitRequest::default_payload());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_operation_is_lookup_error() {
        let (router, _scheduler) = router(true, 0);
        let err = router.oneshot(command("nope")).await.unwrap_err();
        assert_eq!(
            err.into_envelope().message,
            "[10001]can not find service echo[nope]"
        );
    }

    #[tokio::test]
    async fn missing_method_is_invalid_params() {
        let (router, _scheduler) = router(true, 0);
        let cmd = Command {
            service: Some("echo".into()),
            ..Command::default()
        };
        let err = router.oneshot(cmd).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn closed_scheduler_rejects_queued_units() {
        let (router, scheduler) = router(true, 1);
        scheduler.shutdown().await;
        let err = router.oneshot(command("slow")).await.unwrap_err();
        assert!(matches!(err, DispatchError::SchedulerClosed));
    }

    #[tokio::test]
    async fn empty_operator_is_denied_on_either_path() {
        let (router, scheduler) = router(true, 1);
        for method in ["fast", "slow"] {
            let cmd = Command::new("echo", method);
            let env = router.clone().oneshot(cmd).await.unwrap();
            assert_eq!(env.message, "[10002]illegal access");
        }
        scheduler.shutdown().await;
    }
}
