//! Storage backends for service status persistence
//!
//! This module provides a trait-based abstraction over the stores that
//! keep the health history of monitored services.
//!
//! ## Design
//!
//! - **Trait-based**: the `StorageBackend` trait is the only boundary the
//!   rest of the application uses
//! - **Async**: all operations are async for use from Tokio tasks
//! - **Replace-only**: the [`StorageSupervisor`] swaps whole backends and
//!   never reconfigures one in place
//!
//! ## Backends
//!
//! - **In-Memory** (default): optionally persisted to a JSON file
//! - **SQLite**: relational tables per namespace, behind `storage-sqlite`
//!
//! ## Usage
//!
//! ```no_run
//! use status_store::config::StorageConfig;
//! use status_store::storage::{StorageBackend, StorageSupervisor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let supervisor = StorageSupervisor::new();
//!     let config = StorageConfig {
//!         file: "./statuses.json".to_string(),
//!         ..Default::default()
//!     };
//!     supervisor.initialize(Some(&config)).await?;
//!
//!     let statuses = supervisor
//!         .get()
//!         .await
//!         .get_all_service_statuses_with_result_pagination(1, 20)
//!         .await?;
//!     println!("{} services", statuses.len());
//!
//!     supervisor.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;
pub mod supervisor;

pub use backend::{Backend, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteBackend;
pub use supervisor::StorageSupervisor;
