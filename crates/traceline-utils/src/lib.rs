//! # Traceline Utilities
//!
//! Shared utilities for the traceline workspace: a logging infrastructure
//! built on `tracing`, used by the demos and integration tests around the
//! core reader.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel};
pub use tracing::{debug, error, info, trace, warn};
