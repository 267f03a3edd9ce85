//! Unit lifecycle driver.
//!
//! Every unit runs the same state machine:
//!
//! ```text
//! AdmissionCheck -> BeforeValidate -> Validate -> AfterValidate
//!                -> BeforeProcess  -> Process  -> AfterProcess -> Success
//! ```
//!
//! Any stage may short-circuit to a failed envelope. `Validate` and `Process`
//! fail by returning `false` (business failure, reported with the unit's
//! recorded error); any hook fails by returning `Err` or panicking (fault,
//! reported with the recorded error or else the fault message). Faults never
//! escape this module.
//!
//! Blocking units are moved onto the blocking pool for the whole run;
//! suspending units are awaited in place.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures_util::FutureExt;
use nado_core::{ErrorCode, ResponseEnvelope};
use tracing::{debug, error, warn};

use super::admission::{Admission, AdmissionController};
use super::unit::{BlockingUnit, SuspendingUnit, UnitBody, UnitInstance, UnitState};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Lifecycle states in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AdmissionCheck,
    BeforeValidate,
    Validate,
    AfterValidate,
    BeforeProcess,
    Process,
    AfterProcess,
    Success,
}

impl Stage {
    /// The hook-backed stages, in the order they run.
    pub const HOOKS: [Stage; 6] = [
        Stage::BeforeValidate,
        Stage::Validate,
        Stage::AfterValidate,
        Stage::BeforeProcess,
        Stage::Process,
        Stage::AfterProcess,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AdmissionCheck => "admission_check",
            Self::BeforeValidate => "before_validate",
            Self::Validate => "validate",
            Self::AfterValidate => "after_validate",
            Self::BeforeProcess => "before_process",
            Self::Process => "process",
            Self::AfterProcess => "after_process",
            Self::Success => "success",
        }
    }

    /// Runs this stage's hook. `Ok(false)` stops the pipeline.
    fn call_blocking(self, unit: &mut dyn BlockingUnit, state: &mut UnitState) -> anyhow::Result<bool> {
        match self {
            Self::BeforeValidate => unit.before_validate(state).map(|()| true),
            Self::Validate => unit.validate(state),
            Self::AfterValidate => unit.after_validate(state).map(|()| true),
            Self::BeforeProcess => unit.before_process(state).map(|()| true),
            Self::Process => unit.process(state),
            Self::AfterProcess => unit.after_process(state).map(|()| true),
            Self::AdmissionCheck | Self::Success => Ok(true),
        }
    }

    async fn call_suspending(
        self,
        unit: &mut dyn SuspendingUnit,
        state: &mut UnitState,
    ) -> anyhow::Result<bool> {
        match self {
            Self::BeforeValidate => unit.before_validate(state).await.map(|()| true),
            Self::Validate => unit.validate(state).await,
            Self::AfterValidate => unit.after_validate(state).await.map(|()| true),
            Self::BeforeProcess => unit.before_process(state).await.map(|()| true),
            Self::Process => unit.process(state).await,
            Self::AfterProcess => unit.after_process(state).await.map(|()| true),
            Self::AdmissionCheck | Self::Success => Ok(true),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a run ended.
#[derive(Debug)]
enum Outcome {
    Succeeded,
    Rejected(Stage),
    Faulted(Stage, String),
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Runs `instance` through the full lifecycle and returns its envelope.
///
/// Admission is checked on the calling task. Blocking units then continue on
/// the blocking pool; suspending units continue on the calling task.
pub async fn execute(instance: UnitInstance, admission: &AdmissionController) -> ResponseEnvelope {
    let UnitInstance { label, state, body } = instance;
    let verdict = admission.admit(&state.operator, &state.ip);

    match body {
        UnitBody::Suspending(unit) => run_suspending(&label, unit, state, verdict).await,
        UnitBody::Blocking(unit) => {
            let task_label = label.clone();
            let joined =
                tokio::task::spawn_blocking(move || run_blocking(&task_label, unit, state, verdict))
                    .await;
            joined.unwrap_or_else(|e| {
                error!(unit = %label, error = %e, "blocking unit did not complete");
                ResponseEnvelope::error(ErrorCode::ServerError, "unit aborted")
            })
        }
    }
}

/// Blocking flavor. Runs every hook synchronously on the current thread.
pub fn run_blocking(
    label: &str,
    mut unit: Box<dyn BlockingUnit>,
    mut state: UnitState,
    verdict: Admission,
) -> ResponseEnvelope {
    let outcome = match verdict {
        Admission::Deny(denial) => {
            state.error = denial.message();
            Outcome::Rejected(Stage::AdmissionCheck)
        }
        Admission::Allow => drive_blocking(unit.as_mut(), &mut state),
    };

    let (success, message) = conclude(label, &outcome, &state);
    if unit.logs() {
        let logged = catch_unwind(AssertUnwindSafe(|| unit.logger(&state, success, &message)));
        observe_logger(label, logged);
    }
    finish(success, message, state)
}

/// Suspending flavor. Awaits every hook on the current task.
pub async fn run_suspending(
    label: &str,
    mut unit: Box<dyn SuspendingUnit>,
    mut state: UnitState,
    verdict: Admission,
) -> ResponseEnvelope {
    let outcome = match verdict {
        Admission::Deny(denial) => {
            state.error = denial.message();
            Outcome::Rejected(Stage::AdmissionCheck)
        }
        Admission::Allow => drive_suspending(unit.as_mut(), &mut state).await,
    };

    let (success, message) = conclude(label, &outcome, &state);
    if unit.logs() {
        let logged = AssertUnwindSafe(unit.logger(&state, success, &message))
            .catch_unwind()
            .await;
        observe_logger(label, logged);
    }
    finish(success, message, state)
}

// ---------------------------------------------------------------------------
// Drivers
// ---------------------------------------------------------------------------

fn drive_blocking(unit: &mut dyn BlockingUnit, state: &mut UnitState) -> Outcome {
    for stage in Stage::HOOKS {
        let step = catch_unwind(AssertUnwindSafe(|| stage.call_blocking(unit, state)));
        if let Some(outcome) = settle(stage, step) {
            return outcome;
        }
    }
    Outcome::Succeeded
}

async fn drive_suspending(unit: &mut dyn SuspendingUnit, state: &mut UnitState) -> Outcome {
    for stage in Stage::HOOKS {
        let step = AssertUnwindSafe(stage.call_suspending(unit, state))
            .catch_unwind()
            .await;
        if let Some(outcome) = settle(stage, step) {
            return outcome;
        }
    }
    Outcome::Succeeded
}

/// `None` means continue with the next stage.
fn settle(
    stage: Stage,
    step: Result<anyhow::Result<bool>, Box<dyn Any + Send>>,
) -> Option<Outcome> {
    match step {
        Ok(Ok(true)) => None,
        Ok(Ok(false)) => Some(Outcome::Rejected(stage)),
        Ok(Err(e)) => Some(Outcome::Faulted(stage, e.to_string())),
        Err(panic) => Some(Outcome::Faulted(stage, panic_message(panic.as_ref()))),
    }
}

fn conclude(label: &str, outcome: &Outcome, state: &UnitState) -> (bool, String) {
    match outcome {
        Outcome::Succeeded => (true, String::new()),
        Outcome::Rejected(stage) => {
            debug!(unit = label, %stage, error = %state.error, "unit rejected");
            (false, state.error.clone())
        }
        Outcome::Faulted(stage, fault) => {
            error!(unit = label, %stage, error = %fault, "unit faulted");
            let message = if state.error.is_empty() {
                fault.clone()
            } else {
                state.error.clone()
            };
            (false, message)
        }
    }
}

fn finish(success: bool, message: String, state: UnitState) -> ResponseEnvelope {
    if success {
        ResponseEnvelope::success(state.data)
    } else {
        ResponseEnvelope::failure(message)
    }
}

fn observe_logger(label: &str, logged: Result<anyhow::Result<()>, Box<dyn Any + Send>>) {
    match logged {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(unit = label, error = %e, "unit logger failed"),
        Err(panic) => warn!(
            unit = label,
            error = %panic_message(panic.as_ref()),
            "unit logger panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unit panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
