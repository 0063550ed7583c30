//! SQLite plumbing: schema and connection pool.

pub mod pool;
pub mod schema;
