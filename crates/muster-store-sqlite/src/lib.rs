//! SQLite backend for the Muster attendance store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every call is serialised through that
//! one connection, which together with the `UNIQUE` constraint on attendance
//! makes the check-and-create atomic.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
