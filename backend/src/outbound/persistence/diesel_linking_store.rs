//! PostgreSQL-backed `LinkingStore` using Diesel.
//!
//! Each unit of work owns one pooled connection with an open transaction.
//! Repository queries for the unit live in `diesel_linking_queries` and
//! `diesel_room_queries`; this file only manages the transaction.

use async_trait::async_trait;
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, TransactionManager};
use tracing::warn;

use crate::domain::ports::{LinkingStore, LinkingUnit, StoreResult};

use super::diesel_error_mapping::{map_diesel_error, map_pool_error};
use super::pool::DbPool;

/// Diesel-backed implementation of the `LinkingStore` port.
#[derive(Clone)]
pub struct DieselLinkingStore {
    pool: DbPool,
}

impl DieselLinkingStore {
    /// Create a store over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkingStore for DieselLinkingStore {
    async fn begin(&self) -> StoreResult<Box<dyn LinkingUnit>> {
        let mut conn = self.pool.get_owned().await.map_err(map_pool_error)?;
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::begin_transaction(
            &mut conn,
        )
        .await
        .map_err(map_diesel_error)?;
        Ok(Box::new(DieselLinkingUnit { conn }))
    }
}

/// Open transaction on a pooled connection.
///
/// Dropping the unit without [`LinkingUnit::commit`] returns the connection
/// mid-transaction; the pool manager reports it broken and closes it, which
/// makes Postgres discard the writes.
pub(super) struct DieselLinkingUnit {
    conn: PooledConnection<'static, AsyncPgConnection>,
}

impl DieselLinkingUnit {
    pub(super) fn conn(&mut self) -> &mut AsyncPgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl LinkingUnit for DieselLinkingUnit {
    async fn commit(mut self: Box<Self>) -> StoreResult<()> {
        <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::commit_transaction(
            self.conn(),
        )
        .await
        .map_err(map_diesel_error)
    }

    async fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        let result =
            <AnsiTransactionManager as TransactionManager<AsyncPgConnection>>::rollback_transaction(
                self.conn(),
            )
            .await;
        if let Err(err) = &result {
            warn!(error = %err, "rollback failed; connection will be discarded");
        }
        result.map_err(map_diesel_error)
    }
}
