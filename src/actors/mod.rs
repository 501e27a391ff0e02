//! Background actors
//!
//! Each actor runs as an independent Tokio task and is controlled through
//! a handle that owns its shutdown channel and join handle.
//!
//! ## Actor Types
//!
//! - **AutosaveActor**: periodically saves the active storage backend
//!
//! ## Lifecycle
//!
//! Handles are owned by the [`StorageSupervisor`](crate::storage::StorageSupervisor).
//! Stopping a handle signals the actor and waits for it to finish, so at
//! most one actor per backend generation is ever running.

pub mod autosave;

pub use autosave::AutosaveHandle;
