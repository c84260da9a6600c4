//! Persistence: the `DocumentStore` sink and its SQLite and in-memory implementations.

mod diesel_document;
mod diesel_models;
mod memory;
pub mod migrations;
mod pool;
mod store;

use chrono::{DateTime, Utc};

pub use diesel_document::DieselDocumentRepository;
pub use memory::MemoryDocumentStore;
pub use migrations::run_migrations;
pub use pool::{AsyncSqlitePool, DieselError};
pub use store::{DocumentStore, StoreError};

/// Parse a datetime string from the database.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
