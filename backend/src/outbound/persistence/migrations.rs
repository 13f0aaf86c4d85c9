//! Embedded schema migrations.
//!
//! Diesel's migration harness needs a synchronous connection, so the
//! migrations run on a blocking thread with a dedicated `PgConnection`.

use diesel::{Connection, PgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use crate::domain::ports::StoreError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Apply every pending migration to the database at `database_url`.
///
/// # Errors
///
/// Returns [`StoreError::Connection`] when the database is unreachable and
/// [`StoreError::Query`] when a migration fails.
pub async fn run_pending_migrations(database_url: &str) -> Result<usize, StoreError> {
    let url = database_url.to_owned();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&url)
            .map_err(|err| StoreError::connection(format!("{err:?}")))?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| StoreError::query(format!("migration: {err}")))?;
        for version in &applied {
            info!(%version, "applied migration");
        }
        Ok(applied.len())
    })
    .await
    .map_err(|err| StoreError::query(format!("migration task failed: {err}")))?
}
