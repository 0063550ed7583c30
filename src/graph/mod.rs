//! Graph layer: SQLite-backed store, body codec, query builder, traversal
//! and export.

pub mod codec;
pub mod export;
pub mod query;
pub mod store;
pub mod traversal;
