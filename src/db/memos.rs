//! Memo record queries
//!
//! Plain functions over a `Connection` so they can run inside the
//! request transaction opened by [`Database::with_tx`](super::Database::with_tx).

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Tag that makes a memo visible in listings, search and downloads
pub const PUBLIC_TAG: &str = "public";

/// Storage format of `uploaded_at` (local time, minute precision)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const MEMO_COLUMNS: &str = "id, title, file_name, file_path, uploaded_at, tags, is_archived";

/// A persisted memo row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoRecord {
    pub id: i64,
    pub title: String,
    pub file_name: String,
    /// Path of the blob relative to the data directory
    pub file_path: String,
    pub uploaded_at: NaiveDateTime,
    pub tags: String,
    pub is_archived: bool,
}

impl MemoRecord {
    /// Visible to anonymous callers
    pub fn is_public(&self) -> bool {
        !self.is_archived && self.tags == PUBLIC_TAG
    }
}

/// Values for a new row; the id is assigned by SQLite
#[derive(Debug, Clone)]
pub struct NewMemo {
    pub title: String,
    pub file_name: String,
    pub file_path: String,
    pub uploaded_at: NaiveDateTime,
    pub tags: String,
}

/// Partial update, `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct MemoChanges {
    pub title: Option<String>,
    pub file_name: Option<String>,
    pub tags: Option<String>,
}

fn row_to_memo(row: &Row<'_>) -> rusqlite::Result<MemoRecord> {
    let uploaded_at: String = row.get(4)?;
    let uploaded_at = NaiveDateTime::parse_from_str(&uploaded_at, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(MemoRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        uploaded_at,
        tags: row.get(5)?,
        is_archived: row.get(6)?,
    })
}

/// Insert a memo and return it with its assigned id
pub fn insert_memo(conn: &Connection, memo: &NewMemo) -> rusqlite::Result<MemoRecord> {
    conn.execute(
        "INSERT INTO memos (title, file_name, file_path, uploaded_at, tags, is_archived)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
            memo.title,
            memo.file_name,
            memo.file_path,
            memo.uploaded_at.format(TIMESTAMP_FORMAT).to_string(),
            memo.tags,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_memo(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_memo(conn: &Connection, id: i64) -> rusqlite::Result<Option<MemoRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM memos WHERE id = ?1", MEMO_COLUMNS),
        [id],
        row_to_memo,
    )
    .optional()
}

/// All non-archived memos tagged public
pub fn list_public(conn: &Connection) -> rusqlite::Result<Vec<MemoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM memos
         WHERE is_archived = 0 AND tags = ?1
         ORDER BY id",
        MEMO_COLUMNS
    ))?;

    let memos = stmt
        .query_map([PUBLIC_TAG], row_to_memo)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memos)
}

/// Public memos whose title or file name contains `query` (ASCII case-insensitive)
pub fn search_public(conn: &Connection, query: &str) -> rusqlite::Result<Vec<MemoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM memos
         WHERE is_archived = 0 AND tags = ?1
           AND (unicode_lower(title) LIKE ?2 ESCAPE '\\'
                OR unicode_lower(file_name) LIKE ?2 ESCAPE '\\')
         ORDER BY id",
        MEMO_COLUMNS
    ))?;

    let pattern = like_pattern(&query.to_lowercase());
    let memos = stmt
        .query_map(params![PUBLIC_TAG, pattern], row_to_memo)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(memos)
}

/// Apply `changes` to a memo. Returns `None` if the id does not exist.
pub fn update_memo(
    conn: &Connection,
    id: i64,
    changes: &MemoChanges,
) -> rusqlite::Result<Option<MemoRecord>> {
    let updated = conn.execute(
        "UPDATE memos SET
            title = COALESCE(?1, title),
            file_name = COALESCE(?2, file_name),
            tags = COALESCE(?3, tags)
         WHERE id = ?4",
        params![changes.title, changes.file_name, changes.tags, id],
    )?;

    if updated == 0 {
        return Ok(None);
    }
    get_memo(conn, id)
}

/// Mark a memo archived. Returns `None` if the id does not exist.
pub fn archive_memo(conn: &Connection, id: i64) -> rusqlite::Result<Option<MemoRecord>> {
    let updated = conn.execute("UPDATE memos SET is_archived = 1 WHERE id = ?1", [id])?;

    if updated == 0 {
        return Ok(None);
    }
    get_memo(conn, id)
}

/// `%query%` with LIKE wildcards in the query matched literally
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_db;
    use chrono::NaiveDate;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn new_memo(title: &str, file_name: &str, tags: &str) -> NewMemo {
        NewMemo {
            title: title.to_string(),
            file_name: file_name.to_string(),
            file_path: format!("memo_uploads/{}", file_name),
            uploaded_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            tags: tags.to_string(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_conn();
        let memo = insert_memo(&conn, &new_memo("Budget", "Budget_2024-03-01.pdf", "public")).unwrap();

        assert!(memo.id > 0);
        assert!(!memo.is_archived);
        assert_eq!(memo.file_path, "memo_uploads/Budget_2024-03-01.pdf");

        let fetched = get_memo(&conn, memo.id).unwrap().unwrap();
        assert_eq!(fetched, memo);
        assert!(get_memo(&conn, memo.id + 100).unwrap().is_none());
    }

    #[test]
    fn test_list_public_filters_archived_and_tags() {
        let conn = test_conn();
        let visible = insert_memo(&conn, &new_memo("Visible", "v.pdf", "public")).unwrap();
        insert_memo(&conn, &new_memo("Internal", "i.pdf", "internal")).unwrap();
        let archived = insert_memo(&conn, &new_memo("Old", "o.pdf", "public")).unwrap();
        archive_memo(&conn, archived.id).unwrap();

        let memos = list_public(&conn).unwrap();
        assert_eq!(memos.len(), 1);
        assert_eq!(memos[0].id, visible.id);
    }

    #[test]
    fn test_search_matches_title_or_file_name() {
        let conn = test_conn();
        insert_memo(&conn, &new_memo("Q3 Report", "q3_2024-03-01.pdf", "public")).unwrap();
        insert_memo(&conn, &new_memo("Minutes", "board-minutes.pdf", "public")).unwrap();
        insert_memo(&conn, &new_memo("Report Internal", "r.pdf", "internal")).unwrap();

        let by_title = search_public(&conn, "REPORT").unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].title, "Q3 Report");

        let by_name = search_public(&conn, "board").unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].title, "Minutes");
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let conn = test_conn();
        insert_memo(&conn, &new_memo("Élan Vital", "élan_2024-03-01.pdf", "public")).unwrap();
        insert_memo(&conn, &new_memo("Über Alles", "u.pdf", "public")).unwrap();

        let hits = search_public(&conn, "élan").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Élan Vital");

        let hits = search_public(&conn, "ÜBER").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Über Alles");
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let conn = test_conn();
        insert_memo(&conn, &new_memo("Plan", "plan.pdf", "public")).unwrap();
        insert_memo(&conn, &new_memo("100% Done", "done.pdf", "public")).unwrap();

        let hits = search_public(&conn, "%").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "100% Done");
        assert!(search_public(&conn, "_").unwrap().is_empty());
    }

    #[test]
    fn test_update_only_supplied_fields() {
        let conn = test_conn();
        let memo = insert_memo(&conn, &new_memo("Budget", "b.pdf", "public")).unwrap();

        let changes = MemoChanges {
            tags: Some("internal".to_string()),
            ..Default::default()
        };
        let updated = update_memo(&conn, memo.id, &changes).unwrap().unwrap();
        assert_eq!(updated.tags, "internal");
        assert_eq!(updated.title, "Budget");
        assert_eq!(updated.file_name, "b.pdf");

        assert!(update_memo(&conn, 999, &changes).unwrap().is_none());
    }

    #[test]
    fn test_archive_missing_returns_none() {
        let conn = test_conn();
        assert!(archive_memo(&conn, 1).unwrap().is_none());
    }

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("a_b%c\\"), "%a\\_b\\%c\\\\%");
        assert_eq!(like_pattern(""), "%%");
    }
}
