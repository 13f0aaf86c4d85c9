//! PostgreSQL persistence for the linking store using Diesel.
//!
//! The adapter is thin: row structs (`models.rs`) and table definitions
//! (`schema.rs`) stay private, queries translate rows to domain records, and
//! every database failure becomes a [`StoreError`](crate::domain::ports::StoreError).
//!
//! # Example
//!
//! ```ignore
//! use tandem::outbound::persistence::{DbPool, DieselLinkingStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/tandem")).await?;
//! let store = DieselLinkingStore::new(pool);
//! ```

mod diesel_error_mapping;
mod diesel_linking_queries;
mod diesel_linking_store;
mod diesel_room_queries;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_linking_store::DieselLinkingStore;
pub use migrations::run_pending_migrations;
pub use pool::{DbPool, PoolConfig, PoolError};
