//! Durable store adapters for the Tether URL shortener.
//!
//! - [`MemoryRepository`]: process-local table, used when no durable backend
//!   is configured.
//! - [`FileRepository`]: append-only JSON-lines log.
//! - [`MySqlRepository`]: relational table with soft deletes.
//! - [`TimeoutRepository`]: decorator bounding every call on another store.

pub mod file;
pub mod memory;
pub mod mysql;
mod table;
pub mod timeout;

pub use file::FileRepository;
pub use memory::MemoryRepository;
pub use mysql::MySqlRepository;
pub use tether_core::error::{Result, StorageError};
pub use tether_core::{PendingDelete, Repository, UrlRecord, UrlStats};
pub use timeout::TimeoutRepository;
