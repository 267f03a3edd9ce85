//! Unit dispatch and execution framework.
//!
//! This module implements the dispatch core:
//!
//! 1. **Registry** (`registry`): `(namespace, operation)` -> unit descriptor
//! 2. **Admission** (`admission`): per-address sliding-window rate limiting
//! 3. **Lifecycle** (`lifecycle`): the fixed validate -> process state machine
//! 4. **Scheduler** (`scheduler`): priority queues drained by a consumer pool
//! 5. **Middleware** (`middleware`): Tower layers (verification, metrics)
//! 6. **Routing** (`router`): lookup, instantiation, inline or queued execution
//! 7. **Domain units** (`domain`): built-in sample units

pub mod admission;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod unit;

// Re-export key types for convenient access.
pub use admission::{Admission, AdmissionController, Denial};
pub use config::{AdmissionConfig, ConfigError, SchedulerConfig, ServerConfig};
pub use middleware::{build_dispatch_pipeline, DispatchService};
pub use operation::DispatchError;
pub use registry::{LookupError, UnitRegistry};
pub use router::UnitRouter;
pub use scheduler::{Scheduler, SchedulerError};
pub use unit::{
    BlockingUnit, Priority, SuspendingUnit, UnitDescriptor, UnitInstance, UnitRequest, UnitState,
};
