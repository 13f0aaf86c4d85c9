//! Connection pool for the linking store.
//!
//! Units of work check out an owned connection so the transaction can
//! outlive the borrow of the pool. A connection returned with an open
//! transaction is reported broken by the manager and discarded.

use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};

use crate::domain::linking::TandemSettings;

const DEFAULT_MAX_SIZE: u32 = 10;
const DEFAULT_MIN_IDLE: u32 = 2;
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure to build the pool or to obtain a connection from it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("failed to get connection from pool: {message}")]
    Checkout { message: String },
    #[error("failed to build connection pool: {message}")]
    Build { message: String },
}

impl PoolError {
    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }
}

/// Pool sizing for one PostgreSQL database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    database_url: String,
    max_size: u32,
}

impl PoolConfig {
    /// Ten connections, two kept idle, thirty second checkout timeout.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    /// Cap the number of pooled connections; zero is raised to one.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// `None` when no database is configured.
    pub fn from_settings(settings: &TandemSettings) -> Option<Self> {
        let config = Self::new(settings.database_url()?);
        Some(match settings.db_pool_max_size {
            Some(max_size) => config.with_max_size(max_size),
            None => config,
        })
    }

    fn min_idle(&self) -> u32 {
        DEFAULT_MIN_IDLE.min(self.max_size)
    }
}

/// Async connection pool for PostgreSQL via Diesel.
#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
}

impl DbPool {
    /// Build the pool and open its idle connections.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Build`] when the URL is invalid or the initial
    /// connections cannot be opened.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
        let inner = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle()))
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(manager)
            .await
            .map_err(|err| PoolError::build(err.to_string()))?;
        Ok(Self { inner })
    }

    /// Check out a connection that keeps its own handle on the pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Checkout`] when no connection frees up before the
    /// checkout timeout.
    pub async fn get_owned(
        &self,
    ) -> Result<PooledConnection<'static, AsyncPgConnection>, PoolError> {
        self.inner
            .get_owned()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn no_database_url_means_no_pool() {
        assert!(PoolConfig::from_settings(&TandemSettings::default()).is_none());
    }

    #[rstest]
    #[case(None, DEFAULT_MAX_SIZE, DEFAULT_MIN_IDLE)]
    #[case(Some(4), 4, DEFAULT_MIN_IDLE)]
    #[case(Some(1), 1, 1)]
    #[case(Some(0), 1, 1)]
    fn settings_size_the_pool(
        #[case] requested: Option<u32>,
        #[case] max_size: u32,
        #[case] min_idle: u32,
    ) {
        let settings = TandemSettings {
            database_url: Some("postgres://localhost/tandem".to_owned()),
            db_pool_max_size: requested,
            ..TandemSettings::default()
        };
        let config = PoolConfig::from_settings(&settings).expect("configured");
        assert_eq!(config.database_url(), "postgres://localhost/tandem");
        assert_eq!(config.max_size, max_size);
        assert_eq!(config.min_idle(), min_idle);
    }
}
