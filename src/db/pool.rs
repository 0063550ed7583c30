//! Pooled SQLite connections.
//!
//! An `r2d2` pool over `r2d2_sqlite`. Every connection gets the same
//! pragmas on checkout. Pool size bounds real parallelism; WAL lets readers
//! proceed while one connection writes.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::Result;

pub type SqlitePool = Pool<SqliteConnectionManager>;

/// A checked-out connection. Dropping it returns it to the pool.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

#[derive(Debug)]
struct ConnectionCustomizer {
    wal: bool,
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        if self.wal {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        Ok(())
    }
}

/// Build the pool described by `config`.
///
/// Each `:memory:` connection is its own database, so in-memory pools hold
/// exactly one connection that is never retired.
pub fn open(config: &StoreConfig) -> Result<SqlitePool> {
    let in_memory = config.is_in_memory();
    let manager = if in_memory {
        SqliteConnectionManager::memory()
    } else {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        SqliteConnectionManager::file(&config.path)
    };

    let size = if in_memory {
        if config.pool_size > 1 {
            tracing::warn!(
                "pool_size {} ignored for :memory: database, using 1",
                config.pool_size
            );
        }
        1
    } else {
        u32::try_from(config.pool_size.max(1)).unwrap_or(u32::MAX)
    };

    let mut builder = Pool::builder()
        .max_size(size)
        .connection_timeout(Duration::from_millis(config.checkout_timeout_ms))
        .connection_customizer(Box::new(ConnectionCustomizer {
            wal: config.wal && !in_memory,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }));
    if in_memory {
        builder = builder
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = builder.build(manager)?;
    tracing::debug!(
        "opened pool of {} connection(s) to {}",
        size,
        config.path.display()
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    fn file_config(dir: &tempfile::TempDir, pool_size: usize) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("nested").join("graph.db"),
            pool_size,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn in_memory_pool_has_one_connection() {
        let config = StoreConfig {
            pool_size: 8,
            ..StoreConfig::in_memory()
        };
        let pool = open(&config).unwrap();
        assert_eq!(pool.max_size(), 1);
    }

    #[test]
    fn in_memory_pool_keeps_its_database() {
        let pool = open(&StoreConfig::in_memory()).unwrap();
        pool.get()
            .unwrap()
            .execute_batch("CREATE TABLE t (x); INSERT INTO t VALUES (1);")
            .unwrap();
        let n: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn file_pool_applies_pragmas() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = open(&file_config(&dir, 3)).unwrap();
        assert_eq!(pool.max_size(), 3);

        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        let sync: i64 = conn
            .query_row("PRAGMA synchronous", [], |row| row.get(0))
            .unwrap();
        assert_eq!(sync, 1);
    }

    #[test]
    fn waiter_gets_whichever_connection_frees_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = Arc::new(open(&file_config(&dir, 2)).unwrap());
        let first = pool.get().unwrap();
        let second = pool.get().unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let conn = pool.get();
                tx.send(conn.is_ok()).unwrap();
            })
        };

        drop(first);
        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(got);
        waiter.join().unwrap();
        drop(second);
    }

    #[test]
    fn exhausted_pool_times_out() {
        let config = StoreConfig {
            checkout_timeout_ms: 50,
            ..StoreConfig::in_memory()
        };
        let pool = open(&config).unwrap();
        let _held = pool.get().unwrap();
        assert!(pool.get().is_err());
    }
}
