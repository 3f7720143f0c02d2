//! Logging abstraction for relationship engines.
//!
//! Engines report failures at their error boundary through a [`Logger`] so
//! hosts can route them; the default [`TracingLogger`] forwards to
//! [`tracing`]. State transitions are emitted as structured `tracing` events
//! directly.

use std::fmt;
use std::sync::Arc;

/// Logging trait for error-boundary messages.
///
/// # Example
///
/// ```rust
/// use orglink_core::logger::{Logger, TracingLogger};
///
/// let logger = TracingLogger;
/// logger.info("relations ready");
///
/// struct StderrLogger;
/// impl Logger for StderrLogger {
///     fn info(&self, message: &str) {
///         eprintln!("[INFO] {}", message);
///     }
///     fn warn(&self, message: &str) {
///         eprintln!("[WARN] {}", message);
///     }
///     fn error(&self, message: &str) {
///         eprintln!("[ERROR] {}", message);
///     }
///     fn debug(&self, message: &str) {
///         eprintln!("[DEBUG] {}", message);
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);

    fn debug(&self, message: &str);
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Logger")
    }
}

/// Default logger implementation using the `tracing` crate.
#[derive(Debug, Clone)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: "orglink", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "orglink", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "orglink", "{}", message);
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "orglink", "{}", message);
    }
}

pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}
