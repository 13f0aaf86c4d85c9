//! Port for one-way password hashing.

use super::define_port_error;

define_port_error! {
    /// Errors raised by password hashing adapters.
    pub enum PasswordHashError {
        /// The hash could not be produced.
        Hash { message: String } => "password hashing failed: {message}",
        /// The stored hash is not in a recognised format.
        Malformed { message: String } => "stored password hash is malformed: {message}",
    }
}

/// Hashes and verifies passwords.
///
/// Implementations are CPU bound; callers run them on a blocking thread.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    /// Produce a self-describing hash string for `password`.
    fn hash(&self, password: &str) -> Result<String, PasswordHashError>;

    /// Check `password` against a hash produced by [`Self::hash`].
    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError>;
}

/// Reversible stand-in for tests that do not exercise hashing cost.
///
/// # Examples
/// ```
/// use tandem::domain::ports::{FixturePasswordHasher, PasswordHasher};
///
/// let hasher = FixturePasswordHasher;
/// let hash = hasher.hash("CorrectHorse9!").expect("hash");
/// assert!(hasher.verify("CorrectHorse9!", &hash).expect("verify"));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct FixturePasswordHasher;

const FIXTURE_PREFIX: &str = "fixture$";

impl PasswordHasher for FixturePasswordHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        Ok(format!("{FIXTURE_PREFIX}{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError> {
        hash.strip_prefix(FIXTURE_PREFIX)
            .map(|stored| stored == password)
            .ok_or_else(|| PasswordHashError::malformed("missing fixture prefix"))
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn fixture_rejects_wrong_password() {
        let hasher = FixturePasswordHasher;
        let hash = hasher.hash("right").expect("hash");
        assert_eq!(hasher.verify("wrong", &hash), Ok(false));
    }

    #[rstest]
    fn fixture_flags_foreign_hashes() {
        let err = FixturePasswordHasher
            .verify("pw", "$argon2id$v=19$...")
            .expect_err("foreign hash");
        assert!(matches!(err, PasswordHashError::Malformed { .. }));
    }
}
