//! Download state store (SQLite via sqlx).
//!
//! Durable source of truth for hosters, their volume limits, and download
//! requests with their lifecycle status. The in-memory concurrency ledger is
//! rebuilt from the `downloading` rows here on every process start.

pub mod db;
pub mod downloads;
pub mod hosters;
pub mod types;

pub use db::StateDb;
pub use types::*;
