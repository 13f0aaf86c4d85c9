//! Diesel and pool error mapping for the linking store.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::StoreError;

use super::pool::PoolError;

/// Constraint name reported when Postgres omits one.
const UNKNOWN_CONSTRAINT: &str = "unknown";

/// Pool failures mean the database is unreachable.
pub(super) fn map_pool_error(error: PoolError) -> StoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            StoreError::connection(message)
        }
    }
}

/// Map Diesel errors, keeping the constraint name of unique violations.
pub(super) fn map_diesel_error(error: DieselError) -> StoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(
                ?kind,
                message = info.message(),
                constraint = info.constraint_name(),
                "diesel operation failed"
            );
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::duplicate(info.constraint_name().unwrap_or(UNKNOWN_CONSTRAINT))
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            StoreError::connection("database connection error")
        }
        DieselError::BrokenTransactionManager => {
            StoreError::connection("database transaction state lost")
        }
        DieselError::NotFound => StoreError::query("record not found"),
        DieselError::QueryBuilderError(_) => StoreError::query("database query error"),
        _ => StoreError::query("database error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct Violation(Option<&'static str>);

    impl diesel::result::DatabaseErrorInformation for Violation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }
        fn details(&self) -> Option<&str> {
            None
        }
        fn hint(&self) -> Option<&str> {
            None
        }
        fn table_name(&self) -> Option<&str> {
            Some("users")
        }
        fn column_name(&self) -> Option<&str> {
            None
        }
        fn constraint_name(&self) -> Option<&str> {
            self.0
        }
        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    #[rstest]
    #[case(Some("users_email_key"), "users_email_key")]
    #[case(None, UNKNOWN_CONSTRAINT)]
    fn unique_violation_keeps_constraint(
        #[case] constraint: Option<&'static str>,
        #[case] expected: &str,
    ) {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(Violation(constraint)),
        );
        assert!(map_diesel_error(error).is_duplicate_of(expected));
    }

    #[rstest]
    fn closed_connection_is_a_connection_error() {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::ClosedConnection,
            Box::new(Violation(None)),
        );
        assert!(matches!(
            map_diesel_error(error),
            StoreError::Connection { .. }
        ));
    }

    #[rstest]
    fn pool_errors_are_connection_errors() {
        let mapped = map_pool_error(PoolError::checkout("timed out"));
        assert_eq!(
            mapped,
            StoreError::connection("timed out"),
            "checkout failures should surface as connection errors"
        );
    }
}
