//! Utility modules for dockhand

pub mod logging;

// Re-export commonly used items
pub use logging::{init_default, init_from_env, init_logging, LoggingConfig};
