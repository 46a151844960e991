//! Infrastructure adapters: configuration, logging, and stores.

pub mod config;
pub mod logging;
pub mod memory;
pub mod sqlite;

pub use config::{CoreConfig, CoreConfigLoader};
pub use memory::{MemoryExecutionStore, MemoryMemberStore};
pub use sqlite::SqliteExecutionStore;
