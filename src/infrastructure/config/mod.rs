//! Runtime configuration for the core system.

mod loader;

pub use loader::{ConfigLoadError, CoreConfig, CoreConfigLoader, LoggingSettings};
