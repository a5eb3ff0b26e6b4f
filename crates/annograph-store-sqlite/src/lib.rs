//! SQLite backend for the annograph annotation store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each engine module below holds plain
//! synchronous functions over a [`rusqlite::Connection`]; [`SqliteStore`]
//! runs them inside one transaction per operation.

mod agents;
mod assignments;
mod encode;
mod functions;
mod labels;
mod project;
mod records;
mod schema;
mod schemas;
mod search;
mod stats;
mod store;
mod verify;
mod views;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
