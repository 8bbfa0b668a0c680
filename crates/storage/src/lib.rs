//! PostgreSQL storage adapter for the Meteorite indexer.
//!
//! Implements the `Repositories` port from `meteorite-core` and owns the
//! core schema (checkpoint + transaction log). Protocol tables belong to
//! their bundles in `meteorite-protocols`.

mod postgres;

pub use postgres::{Database, DatabaseConfig, PgRepositories, PurgeStats};
