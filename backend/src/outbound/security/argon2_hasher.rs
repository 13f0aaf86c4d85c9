//! Argon2id implementation of the `PasswordHasher` port.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...`) with a fresh random salt,
//! so parameters can change later without invalidating stored hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher as _, PasswordVerifier as _};

use crate::domain::ports::{PasswordHashError, PasswordHasher};

/// Argon2id hasher with the crate's default parameters.
#[derive(Debug, Default, Clone)]
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
}

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| PasswordHashError::hash(err.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError> {
        let parsed =
            PasswordHash::new(hash).map_err(|err| PasswordHashError::malformed(err.to_string()))?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordHashError::malformed(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn hasher() -> Argon2PasswordHasher {
        Argon2PasswordHasher::new()
    }

    #[rstest]
    fn hash_is_phc_and_salted(hasher: Argon2PasswordHasher) {
        let first = hasher.hash("CorrectHorse9!").expect("hash");
        let second = hasher.hash("CorrectHorse9!").expect("hash");
        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second, "salts should differ");
    }

    #[rstest]
    fn verify_accepts_only_the_original_password(hasher: Argon2PasswordHasher) {
        let hash = hasher.hash("CorrectHorse9!").expect("hash");
        assert_eq!(hasher.verify("CorrectHorse9!", &hash), Ok(true));
        assert_eq!(hasher.verify("correcthorse9!", &hash), Ok(false));
    }

    #[rstest]
    fn verify_rejects_foreign_formats(hasher: Argon2PasswordHasher) {
        let err = hasher
            .verify("pw", "fixture$pw")
            .expect_err("not a PHC string");
        assert!(matches!(err, PasswordHashError::Malformed { .. }));
    }
}
