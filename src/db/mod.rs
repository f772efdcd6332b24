//! Database module for Memoapi
//!
//! Provides SQLite storage for memo records.

pub mod memos;
pub mod schema;

use crate::error::Result;
use rusqlite::{Connection, Transaction};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Database manager around a single SQLite connection
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        schema::init_db(&conn)?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_db(&conn)?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection. A poisoned lock is recovered since SQLite
    /// rolls back any transaction left open by the panicking holder.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the connection on the blocking pool
    pub async fn with_conn<F, T>(self: &Arc<Self>, f: F) -> T
    where
        F: FnOnce(&Connection) -> T + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        let handle = tokio::task::spawn_blocking(move || {
            let conn = db.conn();
            f(&conn)
        });
        match handle.await {
            Ok(value) => value,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    /// Run `f` inside one transaction on the blocking pool.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise.
    pub async fn with_tx<F, T>(self: &Arc<Self>, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        let handle = tokio::task::spawn_blocking(move || {
            let mut conn = db.conn();
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_creation() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("memos.db");

        let db = Database::new(db_path.clone());
        assert!(db.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_with_tx_rolls_back_on_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let result: rusqlite::Result<()> = db
            .with_tx(|tx| {
                tx.execute(
                    "INSERT INTO memos (title, file_name, file_path, uploaded_at)
                     VALUES ('A', 'a.pdf', 'memo_uploads/a.pdf', '2024-01-01T00:00:00')",
                    [],
                )?;
                Err(rusqlite::Error::QueryReturnedNoRows)
            })
            .await;
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM memos", [], |row| row.get(0))
                    .unwrap_or(-1)
            })
            .await;
        assert_eq!(count, 0);
    }
}
