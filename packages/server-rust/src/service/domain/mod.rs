//! Built-in units.
//!
//! Small, registrable units used by the server binary and the end-to-end
//! tests. They show both flavors of the hook set: `orders.view` is blocking,
//! `orders.create` and `system.ping` are suspending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nado_core::ErrorCode;
use rmpv::Value;

use crate::service::registry::UnitRegistry;
use crate::service::unit::{BlockingUnit, Priority, SuspendingUnit, UnitDescriptor, UnitState};

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(entries.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
}

// ---------------------------------------------------------------------------
// orders.view
// ---------------------------------------------------------------------------

/// Lists orders. Echoes the requested `action` alongside the listing.
#[derive(Debug, Default)]
pub struct OrdersView;

impl OrdersView {
    fn listing() -> Value {
        Value::Array(vec![
            map(vec![("id", Value::from(1)), ("item", Value::from("widget")), ("quantity", Value::from(3))]),
            map(vec![("id", Value::from(2)), ("item", Value::from("gadget")), ("quantity", Value::from(1))]),
        ])
    }
}

impl BlockingUnit for OrdersView {
    fn validate(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        match state.param("action") {
            Some(v) if v.is_str() => Ok(true),
            _ => Ok(state.fail(ErrorCode::InvalidParams, "action required")),
        }
    }

    fn process(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        let action = state.param("action").cloned().unwrap_or(Value::Nil);
        state.data = map(vec![("action", action), ("orders", Self::listing())]);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// orders.create
// ---------------------------------------------------------------------------

/// Creates an order from `{item, quantity}`. Ids come from a counter shared
/// by every instance built from the same descriptor.
#[derive(Debug)]
pub struct OrdersCreate {
    next_id: Arc<AtomicU64>,
}

impl OrdersCreate {
    #[must_use]
    pub fn new(next_id: Arc<AtomicU64>) -> Self {
        Self { next_id }
    }
}

#[async_trait]
impl SuspendingUnit for OrdersCreate {
    fn logs(&self) -> bool {
        true
    }

    async fn validate(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        let item_ok = state
            .param("item")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !item_ok {
            return Ok(state.fail(ErrorCode::InvalidParams, "item required"));
        }
        let quantity_ok = state
            .param("quantity")
            .and_then(Value::as_u64)
            .is_some_and(|q| q > 0);
        if !quantity_ok {
            return Ok(state.fail(ErrorCode::InvalidParams, "quantity must be positive"));
        }
        Ok(true)
    }

    async fn process(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item = state.param("item").cloned().unwrap_or(Value::Nil);
        let quantity = state.param("quantity").cloned().unwrap_or(Value::Nil);
        state.data = map(vec![
            ("id", Value::from(id)),
            ("item", item),
            ("quantity", quantity),
            ("operator", Value::from(state.operator.as_str())),
        ]);
        Ok(true)
    }

    async fn logger(&mut self, state: &UnitState, success: bool, message: &str) -> anyhow::Result<()> {
        tracing::info!(
            operator = %state.operator,
            ip = %state.ip,
            success,
            message,
            "order create audited"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// system.ping
// ---------------------------------------------------------------------------

/// Liveness probe. Answers `"pong"`.
#[derive(Debug, Default)]
pub struct SystemPing;

#[async_trait]
impl SuspendingUnit for SystemPing {
    async fn process(&mut self, state: &mut UnitState) -> anyhow::Result<bool> {
        state.data = Value::from("pong");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Registers every built-in unit.
pub fn register_defaults(registry: &mut UnitRegistry) -> &mut UnitRegistry {
    let next_id = Arc::new(AtomicU64::new(1));
    registry
        .register("orders", "view", UnitDescriptor::blocking(Priority::Highest, |_| OrdersView))
        .register(
            "orders",
            "create",
            UnitDescriptor::suspending(Priority::High, move |_| OrdersCreate::new(Arc::clone(&next_id))),
        )
        .register("system", "ping", UnitDescriptor::suspending(Priority::Highest, |_| SystemPing))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use nado_core::ManualClock;

    use super::*;
    use crate::service::admission::AdmissionController;
    use crate::service::config::AdmissionConfig;
    use crate::service::lifecycle;
    use crate::service::unit::UnitRequest;

    fn admission() -> AdmissionController {
        AdmissionController::with_clock(AdmissionConfig::default(), Arc::new(ManualClock::new(0)))
            .unwrap()
    }

    async fn run(registry: &UnitRegistry, ns: &str, op: &str, payload: Option<Value>) -> nado_core::ResponseEnvelope {
        let descriptor = registry.lookup(ns, op).unwrap();
        let instance = descriptor.instantiate(
            Arc::from(format!("{ns}.{op}")),
            UnitRequest::new(payload, "u1".into(), "10.0.0.1".into()),
        );
        lifecycle::execute(instance, &admission()).await
    }

    fn defaults() -> UnitRegistry {
        let mut registry = UnitRegistry::new();
        register_defaults(&mut registry);
        registry
    }

    #[test]
    fn defaults_register_three_units() {
        let registry = defaults();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lookup("orders", "view").unwrap().priority(), Priority::Highest);
        assert_eq!(registry.lookup("orders", "create").unwrap().priority(), Priority::High);
        assert_eq!(registry.namespaces(), vec!["orders", "system"]);
    }

    #[tokio::test]
    async fn view_echoes_default_action() {
        let env = run(&defaults(), "orders", "view", None).await;
        assert!(env.success);
        let data = env.data.as_map().unwrap();
        assert_eq!(data[0], (Value::from("action"), Value::from("view")));
        assert_eq!(data[1].1.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn view_without_action_fails_validation() {
        let env = run(&defaults(), "orders", "view", Some(map(vec![("page", Value::from(1))]))).await;
        assert!(!env.success);
        assert_eq!(env.message, "[10004]action required");
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let registry = defaults();
        let payload = map(vec![("item", Value::from("widget")), ("quantity", Value::from(2))]);
        let first = run(&registry, "orders", "create", Some(payload.clone())).await;
        let second = run(&registry, "orders", "create", Some(payload)).await;
        assert!(first.success && second.success);
        assert_eq!(first.data.as_map().unwrap()[0].1, Value::from(1));
        assert_eq!(second.data.as_map().unwrap()[0].1, Value::from(2));
    }

    #[tokio::test]
    async fn create_rejects_missing_item_and_bad_quantity() {
        let registry = defaults();
        let env = run(&registry, "orders", "create", Some(map(vec![("quantity", Value::from(1))]))).await;
        assert_eq!(env.message, "[10004]item required");

        let env = run(
            &registry,
            "orders",
            "create",
            Some(map(vec![("item", Value::from("x")), ("quantity", Value::from(0))])),
        )
        .await;
        assert_eq!(env.message, "[10004]quantity must be positive");
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let env = run(&defaults(), "system", "ping", None).await;
        assert_eq!(env.data, Value::from("pong"));
    }
}
