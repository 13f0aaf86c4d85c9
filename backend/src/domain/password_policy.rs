//! Password strength policy applied at signup and invitation acceptance.

use serde_json::{Value, json};
use zeroize::Zeroizing;

use super::{EmailAddress, Error};

/// Minimum password length in characters.
pub const PASSWORD_MIN_LEN: usize = 10;
/// Maximum password length in characters.
pub const PASSWORD_MAX_LEN: usize = 128;
/// Shortest email local part that is checked for inclusion.
const EMAIL_LOCAL_PART_MIN: usize = 3;

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "123456",
    "12345678",
    "123456789",
    "qwerty",
    "abc123",
    "monkey",
    "master",
    "dragon",
    "letmein",
    "login",
    "welcome",
    "shadow",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "iloveyou",
    "trustno1",
    "superman",
    "batman",
    "passw0rd",
    "admin",
    "qwerty123",
    "welcome1",
    "p@ssw0rd",
    "pass1234",
    "test1234",
    "guest",
    "changeme",
    "default",
    "secret",
    "asdf1234",
    "zxcvbnm",
    "qwertyuiop",
    "1234567890",
    "0987654321",
    "abcdefgh",
    "password!",
    "coparent",
    "tandem",
];

/// Rule a password failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    /// Shorter than [`PASSWORD_MIN_LEN`].
    TooShort,
    /// Longer than [`PASSWORD_MAX_LEN`].
    TooLong,
    /// Appears on the common-password list.
    Common,
    /// Contains the application name.
    ContainsAppName,
    /// Contains the local part of the account email.
    ContainsEmail,
}

impl PasswordRule {
    /// Identifier used in the `requirements.failed` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TooShort => "minLength",
            Self::TooLong => "maxLength",
            Self::Common => "blockedCommon",
            Self::ContainsAppName => "noAppName",
            Self::ContainsEmail => "noEmailLocalPart",
        }
    }

    fn message(self) -> String {
        match self {
            Self::TooShort => format!("Password must be at least {PASSWORD_MIN_LEN} characters"),
            Self::TooLong => format!("Password must be at most {PASSWORD_MAX_LEN} characters"),
            Self::Common => "This password is too common. Please choose another".to_owned(),
            Self::ContainsAppName => "Password must not contain the app name".to_owned(),
            Self::ContainsEmail => "Password must not contain your email address".to_owned(),
        }
    }
}

/// Password policy.
///
/// # Examples
/// ```
/// use tandem::domain::{EmailAddress, PasswordPolicy, PasswordRule};
///
/// let policy = PasswordPolicy::new("tandem");
/// let email = EmailAddress::parse("alice@example.com").expect("email");
/// assert!(policy.check("CorrectHorse9!", Some(&email)).is_ok());
/// assert_eq!(policy.check("short", None), Err(PasswordRule::TooShort));
/// ```
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    app_name: String,
}

impl PasswordPolicy {
    /// Build a policy that also rejects passwords containing `app_name`.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into().trim().to_lowercase(),
        }
    }

    /// Return the first rule the password breaks.
    pub fn check(&self, password: &str, email: Option<&EmailAddress>) -> Result<(), PasswordRule> {
        let length = password.chars().count();
        if length < PASSWORD_MIN_LEN {
            return Err(PasswordRule::TooShort);
        }
        if length > PASSWORD_MAX_LEN {
            return Err(PasswordRule::TooLong);
        }

        let lowered = Zeroizing::new(password.trim().to_lowercase());
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            return Err(PasswordRule::Common);
        }
        if !self.app_name.is_empty() && lowered.contains(self.app_name.as_str()) {
            return Err(PasswordRule::ContainsAppName);
        }
        if let Some(email) = email {
            let local = email.local_part();
            if local.chars().count() >= EMAIL_LOCAL_PART_MIN && lowered.contains(local) {
                return Err(PasswordRule::ContainsEmail);
            }
        }
        Ok(())
    }

    /// Requirements payload shown to clients next to policy failures.
    #[must_use]
    pub fn requirements(&self, failed: Option<PasswordRule>) -> Value {
        let mut payload = json!({
            "minLength": PASSWORD_MIN_LEN,
            "maxLength": PASSWORD_MAX_LEN,
            "blockedCommon": true,
            "noAppName": true,
            "noEmailLocalPart": true,
        });
        if let (Some(rule), Some(map)) = (failed, payload.as_object_mut()) {
            map.insert("failed".to_owned(), Value::from(rule.as_str()));
        }
        payload
    }

    /// Validate and map failures to a `VAL_003` error with requirements.
    pub fn enforce(&self, password: &str, email: Option<&EmailAddress>) -> Result<(), Error> {
        self.check(password, email).map_err(|rule| {
            Error::weak_password(rule.message()).with_requirements(self.requirements(Some(rule)))
        })
    }
}
