//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`verify`]: Shared-secret signature verification
//! - [`metrics`]: Dispatch timing and outcome via `tracing` spans
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod metrics;
pub mod pipeline;
pub mod verify;

pub use metrics::MetricsLayer;
pub use pipeline::{build_dispatch_pipeline, DispatchService};
pub use verify::VerifyLayer;
