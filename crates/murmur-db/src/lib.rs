//! Database layer for the Murmur realtime core.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every table used by the chat and notification
//! stores is created through versioned migrations managed by this crate.
//!
//! SQL files are compiled into the binary via `include_str!`, so the schema
//! ships with the server and cannot drift from the code that queries it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
