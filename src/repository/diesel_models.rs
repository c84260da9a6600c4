//! Diesel row types for the SQLite tables.

use diesel::prelude::*;

use crate::schema;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentRecord {
    pub id: String,
    pub source_path: String,
    pub filename: String,
    pub content_hash: String,
    pub file_size: i64,
    pub document_type: Option<String>,
    pub extracted_text: Option<String>,
    pub extraction_method: Option<String>,
    pub page_count: Option<i32>,
    pub classification_confidence: Option<f64>,
    pub classification_method: Option<String>,
    pub chunk_count: Option<i32>,
    pub extraction_status: String,
    pub classification_status: String,
    pub metadata_status: String,
    pub chunking_status: String,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::documents)]
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub source_path: &'a str,
    pub filename: &'a str,
    pub content_hash: &'a str,
    pub file_size: i64,
    pub document_type: Option<&'a str>,
    pub extracted_text: Option<&'a str>,
    pub extraction_method: Option<&'a str>,
    pub page_count: Option<i32>,
    pub classification_confidence: Option<f64>,
    pub classification_method: Option<&'a str>,
    pub chunk_count: Option<i32>,
    pub extraction_status: &'a str,
    pub classification_status: &'a str,
    pub metadata_status: &'a str,
    pub chunking_status: &'a str,
    pub last_error: Option<&'a str>,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update; `None` leaves a column untouched.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = schema::documents)]
pub struct DocumentChangeset<'a> {
    pub document_type: Option<&'a str>,
    pub extracted_text: Option<&'a str>,
    pub extraction_method: Option<&'a str>,
    pub page_count: Option<i32>,
    pub classification_confidence: Option<f64>,
    pub classification_method: Option<&'a str>,
    pub chunk_count: Option<i32>,
    pub extraction_status: Option<&'static str>,
    pub classification_status: Option<&'static str>,
    pub metadata_status: Option<&'static str>,
    pub chunking_status: Option<&'static str>,
    /// `Some(None)` writes NULL.
    pub last_error: Option<Option<&'a str>>,
    pub updated_at: Option<String>,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = schema::structured_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StructuredRecordRow {
    pub table_name: String,
    pub document_id: String,
    pub data: String,
    pub saved_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = schema::document_chunks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChunkRow {
    pub document_id: String,
    pub chunk_index: i32,
    pub content: String,
    pub char_count: i32,
}
