//! Versioned SQLite migrations.
//!
//! Each migration is idempotent SQL applied once and recorded in
//! `__schema_migrations`.

use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use tracing::info;

use super::pool::{AsyncSqlitePool, DieselError};

/// Ordered `(version, sql)` pairs.
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_documents",
        r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY NOT NULL,
    source_path TEXT NOT NULL,
    filename TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    file_size BIGINT NOT NULL,
    document_type TEXT,
    extracted_text TEXT,
    extraction_method TEXT,
    page_count INTEGER,
    classification_confidence DOUBLE,
    classification_method TEXT,
    chunk_count INTEGER,
    extraction_status TEXT NOT NULL DEFAULT 'pending',
    classification_status TEXT NOT NULL DEFAULT 'pending',
    metadata_status TEXT NOT NULL DEFAULT 'pending',
    chunking_status TEXT NOT NULL DEFAULT 'pending',
    last_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_content_hash ON documents(content_hash);
"#,
    ),
    (
        "0002_structured_records",
        r#"
CREATE TABLE IF NOT EXISTS structured_records (
    table_name TEXT NOT NULL,
    document_id TEXT NOT NULL REFERENCES documents(id),
    data TEXT NOT NULL,
    saved_at TEXT NOT NULL,
    PRIMARY KEY (table_name, document_id)
);
"#,
    ),
    (
        "0003_document_chunks",
        r#"
CREATE TABLE IF NOT EXISTS document_chunks (
    document_id TEXT NOT NULL REFERENCES documents(id),
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    char_count INTEGER NOT NULL,
    PRIMARY KEY (document_id, chunk_index)
);
"#,
    ),
];

#[derive(QueryableByName)]
struct AppliedVersion {
    #[diesel(sql_type = Text)]
    version: String,
}

/// Apply pending migrations. Returns the versions applied by this call.
pub async fn run_migrations(pool: &AsyncSqlitePool) -> Result<Vec<String>, DieselError> {
    let mut conn = pool.get().await?;

    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS __schema_migrations (
            version TEXT PRIMARY KEY NOT NULL,
            run_on TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .await?;

    let applied: Vec<AppliedVersion> =
        diesel::sql_query("SELECT version FROM __schema_migrations")
            .load(&mut conn)
            .await?;
    let applied: std::collections::HashSet<String> =
        applied.into_iter().map(|v| v.version).collect();

    let mut ran = Vec::new();
    for (version, sql) in MIGRATIONS {
        if applied.contains(*version) {
            continue;
        }
        info!("Applying migration: {}", version);
        conn.batch_execute(sql).await?;
        diesel::sql_query("INSERT INTO __schema_migrations (version) VALUES (?)")
            .bind::<Text, _>(*version)
            .execute(&mut conn)
            .await?;
        ran.push(version.to_string());
    }

    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));

        let first = run_migrations(&pool).await.unwrap();
        assert_eq!(first.len(), MIGRATIONS.len());

        let second = run_migrations(&pool).await.unwrap();
        assert!(second.is_empty());
    }
}
