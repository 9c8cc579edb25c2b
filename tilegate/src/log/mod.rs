//! Logging abstraction layer.
//!
//! The cache core logs through the [`Logger`] trait and never depends on
//! a concrete backend. Three implementations ship with the crate:
//!
//! - [`CallbackLogger`]: four injectable per-level sinks for embedding
//!   applications; a missing sink silences that level
//! - [`TracingLogger`]: production adapter delegating to `tracing`
//! - [`NoOpLogger`]: silent logger for tests
//!
//! Components accept an `Arc<dyn Logger>` and use the `log_debug!`,
//! `log_info!`, `log_warn!` and `log_error!` macros.

mod callback;
mod noop;
mod tracing_adapter;
mod r#trait;

pub use callback::CallbackLogger;
pub use noop::NoOpLogger;
pub use r#trait::{LogLevel, Logger};
pub use tracing_adapter::TracingLogger;
