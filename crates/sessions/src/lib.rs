//! User sessions and durable relay history.
//!
//! [`SessionStore`] owns the live, in-memory session map. Everything that
//! must outlive an eviction goes through a [`HistorySink`]: SQLite in
//! production, [`InMemoryHistory`] in tests.

pub mod error;
pub mod history;
pub mod memory;
pub mod session;
pub mod sqlite;
pub mod store;

pub use {
    error::{Error, Result},
    history::{AuditAction, AuditEntry, HistoryCounts, HistorySink, StoredMessage, bounded},
    memory::InMemoryHistory,
    session::{MessageSnapshot, UserSession},
    sqlite::SqliteHistory,
    store::SessionStore,
};

/// Run database migrations for the history tables.
///
/// Creates `sessions`, `message_history` and `audit_log`. Called by
/// [`SqliteHistory::connect`]; call it yourself when sharing a pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
