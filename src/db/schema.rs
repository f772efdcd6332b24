//! SQLite schema for Memoapi

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Result};

/// Initialize the database with required tables
pub fn init_db(conn: &Connection) -> Result<()> {
    register_functions(conn)?;

    // Memo metadata; the PDF bytes live in the upload directory
    conn.execute(
        "CREATE TABLE IF NOT EXISTS memos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT 'public',
            is_archived BOOLEAN NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_memos_visibility ON memos(is_archived, tags)",
        [],
    )?;

    Ok(())
}

/// Per-connection SQL functions.
///
/// `unicode_lower` folds case for every script; the built-in `lower()` and
/// `LIKE` only fold ASCII.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        conn.execute(
            "INSERT INTO memos (title, file_name, file_path, uploaded_at)
             VALUES ('A', 'a.pdf', 'memo_uploads/a.pdf', '2024-01-01T00:00:00')",
            [],
        )
        .unwrap();

        let (tags, archived): (String, bool) = conn
            .query_row("SELECT tags, is_archived FROM memos", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(tags, "public");
        assert!(!archived);
    }
}
