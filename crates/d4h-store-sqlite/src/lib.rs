//! SQLite backend for the Data4Help query engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every query-lifecycle operation runs
//! inside a single rusqlite transaction that commits only on success.

mod encode;
mod registry;
mod samples;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
