//! Unit-of-work contracts.
//!
//! A unit is one registered piece of business logic. Concrete units implement
//! either [`BlockingUnit`] (synchronous hooks, run on the blocking pool) or
//! [`SuspendingUnit`] (async hooks, run on the runtime). Both expose the same
//! fixed hook set; the lifecycle driver in [`super::lifecycle`] calls through
//! it in a fixed order.
//!
//! Hooks receive the per-request [`UnitState`] rather than owning it, so the
//! driver can always build the response even after a hook faults.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use nado_core::ErrorCode;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Queue preference of a unit. Lower level runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Level 1. Eligible for inline execution.
    #[default]
    Highest,
    /// Level 2.
    High,
    /// Level 3.
    Normal,
    /// Level 4.
    Lowest,
}

impl Priority {
    /// All levels, highest first.
    pub const ALL: [Priority; 4] = [
        Priority::Highest,
        Priority::High,
        Priority::Normal,
        Priority::Lowest,
    ];

    /// Maps a numeric level onto a priority. Anything outside `1..=4` is
    /// clamped to [`Priority::Lowest`] instead of being rejected.
    #[must_use]
    pub fn from_level(level: i64) -> Self {
        match level {
            1 => Self::Highest,
            2 => Self::High,
            3 => Self::Normal,
            _ => Self::Lowest,
        }
    }

    /// Numeric level, `1..=4`.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Highest => 1,
            Self::High => 2,
            Self::Normal => 3,
            Self::Lowest => 4,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self.level() as usize - 1
    }
}

impl From<u8> for Priority {
    fn from(level: u8) -> Self {
        Self::from_level(i64::from(level))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

// ---------------------------------------------------------------------------
// UnitRequest / UnitState
// ---------------------------------------------------------------------------

/// Inputs a unit is constructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRequest {
    pub payload: rmpv::Value,
    /// Caller identity. Empty when the caller did not identify itself.
    pub operator: String,
    /// Caller address.
    pub ip: String,
}

impl UnitRequest {
    /// Request with `payload`, or with [`UnitRequest::default_payload`] when
    /// the command carried none.
    #[must_use]
    pub fn new(payload: Option<rmpv::Value>, operator: String, ip: String) -> Self {
        Self {
            payload: payload.unwrap_or_else(Self::default_payload),
            operator,
            ip,
        }
    }

    /// `{action: "view"}`.
    #[must_use]
    pub fn default_payload() -> rmpv::Value {
        rmpv::Value::Map(vec![(
            rmpv::Value::from("action"),
            rmpv::Value::from("view"),
        )])
    }
}

/// Per-execution mutable state, owned by exactly one lifecycle run.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitState {
    pub payload: rmpv::Value,
    pub operator: String,
    pub ip: String,
    /// Business error recorded by a hook. Empty means none.
    pub error: String,
    /// Result payload returned verbatim on success.
    pub data: rmpv::Value,
    pub priority: Priority,
}

impl UnitState {
    #[must_use]
    pub fn new(request: UnitRequest, priority: Priority) -> Self {
        Self {
            payload: request.payload,
            operator: request.operator,
            ip: request.ip,
            error: String::new(),
            data: rmpv::Value::Map(Vec::new()),
            priority,
        }
    }

    /// Records `code` + `detail` as the error and returns `false`, so a
    /// validate/process hook can `return Ok(state.fail(..))`.
    pub fn fail(&mut self, code: ErrorCode, detail: &str) -> bool {
        self.error = code.tag(detail);
        false
    }

    /// Looks up a string-keyed entry of a map payload.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&rmpv::Value> {
        self.payload
            .as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

// ---------------------------------------------------------------------------
// Unit traits
// ---------------------------------------------------------------------------

/// Blocking flavor of the hook set. Runs on the blocking pool.
///
/// Only `validate` and `process` decide success; the other hooks are
/// pass-through unless overridden. Any hook may fault by returning `Err`.
#[allow(unused_variables)]
pub trait BlockingUnit: Send + 'static {
    /// Whether [`BlockingUnit::logger`] is called after each execution.
    fn logs(&self) -> bool {
        false
    }

    fn before_validate(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    fn validate(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn after_validate(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    fn before_process(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    fn process(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn after_process(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    /// Audit hook, called once with the final outcome when `logs()` is true.
    fn logger(&mut self, state: &UnitState, success: bool, message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Suspending flavor of the hook set. Runs directly on the runtime, so hooks
/// may await further I/O.
#[async_trait]
#[allow(unused_variables)]
pub trait SuspendingUnit: Send + 'static {
    /// Whether [`SuspendingUnit::logger`] is awaited after each execution.
    fn logs(&self) -> bool {
        false
    }

    async fn before_validate(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    async fn validate(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn after_validate(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_process(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    async fn process(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn after_process(&mut self, state: &mut UnitState) -> anyhow::Result<()> {
        Ok(())
    }

    async fn logger(
        &mut self,
        state: &UnitState,
        success: bool,
        message: &str,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A constructed unit of either flavor.
pub enum UnitBody {
    Blocking(Box<dyn BlockingUnit>),
    Suspending(Box<dyn SuspendingUnit>),
}

impl UnitBody {
    #[must_use]
    pub fn flavor(&self) -> &'static str {
        match self {
            Self::Blocking(_) => "blocking",
            Self::Suspending(_) => "suspending",
        }
    }
}

impl fmt::Debug for UnitBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UnitBody").field(&self.flavor()).finish()
    }
}

/// A unit ready to run: its state plus its hooks.
#[derive(Debug)]
pub struct UnitInstance {
    /// `namespace.operation`, for logs.
    pub label: Arc<str>,
    pub state: UnitState,
    pub body: UnitBody,
}

impl UnitInstance {
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.state.priority
    }
}

// ---------------------------------------------------------------------------
// UnitDescriptor
// ---------------------------------------------------------------------------

type Constructor = Arc<dyn Fn(&UnitRequest) -> UnitBody + Send + Sync>;

/// Registered, immutable description of a unit: its priority and how to
/// build an instance for a request.
#[derive(Clone)]
pub struct UnitDescriptor {
    priority: Priority,
    constructor: Constructor,
}

impl UnitDescriptor {
    /// Descriptor for a blocking unit built by `build`.
    pub fn blocking<U, F>(priority: Priority, build: F) -> Self
    where
        U: BlockingUnit,
        F: Fn(&UnitRequest) -> U + Send + Sync + 'static,
    {
        Self {
            priority,
            constructor: Arc::new(move |req| UnitBody::Blocking(Box::new(build(req)))),
        }
    }

    /// Descriptor for a suspending unit built by `build`.
    pub fn suspending<U, F>(priority: Priority, build: F) -> Self
    where
        U: SuspendingUnit,
        F: Fn(&UnitRequest) -> U + Send + Sync + 'static,
    {
        Self {
            priority,
            constructor: Arc::new(move |req| UnitBody::Suspending(Box::new(build(req)))),
        }
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Builds a fresh instance for `request`, copying this descriptor's priority.
    #[must_use]
    pub fn instantiate(&self, label: Arc<str>, request: UnitRequest) -> UnitInstance {
        let body = (self.constructor)(&request);
        UnitInstance {
            label,
            state: UnitState::new(request, self.priority),
            body,
        }
    }
}

impl fmt::Debug for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDescriptor")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
