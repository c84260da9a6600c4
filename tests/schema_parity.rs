//! Schema parity tests.
//!
//! Verifies that the async migration runner produces the same schema as
//! the raw migration SQL, and that the columns match what the Diesel table
//! definitions expect.

use std::collections::BTreeMap;

use rusqlite::{Connection, Result as SqliteResult};

use docpipe::repository::migrations::MIGRATIONS;
use docpipe::repository::{run_migrations, AsyncSqlitePool};

#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnInfo {
    col_type: String,
    not_null: bool,
    default_value: Option<String>,
    primary_key: bool,
}

type Tables = BTreeMap<String, BTreeMap<String, ColumnInfo>>;

fn extract_tables(conn: &Connection) -> SqliteResult<Tables> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' \
         AND name != '__schema_migrations' ORDER BY name",
    )?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<SqliteResult<Vec<_>>>()?;

    let mut tables = BTreeMap::new();
    for name in names {
        let mut pragma = conn.prepare(&format!("PRAGMA table_info(\"{}\")", name))?;
        let columns = pragma
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    ColumnInfo {
                        col_type: row.get::<_, String>(2)?.to_uppercase(),
                        not_null: row.get(3)?,
                        default_value: row.get(4)?,
                        primary_key: row.get::<_, i32>(5)? > 0,
                    },
                ))
            })?
            .collect::<SqliteResult<BTreeMap<_, _>>>()?;
        tables.insert(name, columns);
    }
    Ok(tables)
}

fn extract_indexes(conn: &Connection) -> SqliteResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, tbl_name FROM sqlite_master WHERE type='index' AND sql IS NOT NULL ORDER BY name",
    )?;
    let indexes = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(indexes)
}

fn raw_sql_schema() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    for (_, sql) in MIGRATIONS {
        conn.execute_batch(sql).unwrap();
    }
    conn
}

async fn migrated_db(dir: &tempfile::TempDir) -> Connection {
    let path = dir.path().join("docpipe.db");
    let pool = AsyncSqlitePool::from_path(&path);
    let applied = run_migrations(&pool).await.unwrap();
    assert_eq!(applied.len(), MIGRATIONS.len());
    Connection::open(&path).unwrap()
}

#[tokio::test]
async fn test_runner_matches_raw_sql() {
    let dir = tempfile::tempdir().unwrap();
    let migrated = migrated_db(&dir).await;
    let raw = raw_sql_schema();

    assert_eq!(extract_tables(&migrated).unwrap(), extract_tables(&raw).unwrap());
    assert_eq!(extract_indexes(&migrated).unwrap(), extract_indexes(&raw).unwrap());
}

#[tokio::test]
async fn test_migrations_are_applied_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = AsyncSqlitePool::from_path(&dir.path().join("docpipe.db"));
    assert_eq!(run_migrations(&pool).await.unwrap().len(), MIGRATIONS.len());
    assert!(run_migrations(&pool).await.unwrap().is_empty());
}

#[test]
fn test_columns_match_table_definitions() {
    let tables = extract_tables(&raw_sql_schema()).unwrap();

    let expect = |table: &str, columns: &[&str]| {
        let actual: Vec<&str> = tables[table].keys().map(String::as_str).collect();
        let mut expected = columns.to_vec();
        expected.sort_unstable();
        assert_eq!(actual, expected, "columns of {}", table);
    };

    expect(
        "documents",
        &[
            "id",
            "source_path",
            "filename",
            "content_hash",
            "file_size",
            "document_type",
            "extracted_text",
            "extraction_method",
            "page_count",
            "classification_confidence",
            "classification_method",
            "chunk_count",
            "extraction_status",
            "classification_status",
            "metadata_status",
            "chunking_status",
            "last_error",
            "created_at",
            "updated_at",
        ],
    );
    expect("structured_records", &["table_name", "document_id", "data", "saved_at"]);
    expect("document_chunks", &["document_id", "chunk_index", "content", "char_count"]);

    let status = &tables["documents"]["metadata_status"];
    assert!(status.not_null);
    assert_eq!(status.default_value.as_deref(), Some("'pending'"));
    assert!(tables["documents"]["id"].primary_key);
}
