//! User identity model.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted email length.
pub const EMAIL_MAX_LEN: usize = 255;
/// Maximum length of a generated username handle.
pub const USERNAME_MAX_LEN: usize = 20;

/// Validation errors for user identity values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UserValidationError {
    /// The identifier was blank.
    #[error("user id must not be empty")]
    EmptyId,
    /// The identifier was not a UUID.
    #[error("user id must be a valid UUID")]
    InvalidId,
    /// The email was blank.
    #[error("Email is required")]
    EmptyEmail,
    /// The email exceeded [`EMAIL_MAX_LEN`].
    #[error("Email must be at most {max} characters")]
    EmailTooLong {
        /// Maximum length.
        max: usize,
    },
    /// The email did not look like `local@domain.tld`.
    #[error("Please enter a valid email address")]
    InvalidEmail,
}

/// Stable user identifier stored as a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Validate and construct a [`UserId`] from its string form.
    pub fn new(id: impl AsRef<str>) -> Result<Self, UserValidationError> {
        let raw = id.as_ref();
        if raw.is_empty() {
            return Err(UserValidationError::EmptyId);
        }
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| UserValidationError::InvalidId)
    }

    /// Generate a new random [`UserId`].
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

/// Normalised (trimmed, lower-cased) email address.
///
/// # Examples
/// ```
/// use tandem::domain::EmailAddress;
///
/// let email = EmailAddress::parse("  Alice@Example.COM ").expect("valid email");
/// assert_eq!(email.as_ref(), "alice@example.com");
/// assert_eq!(email.local_part(), "alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Normalise and validate an email address.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, UserValidationError> {
        let normalised = normalise_email(raw.as_ref());
        if normalised.is_empty() {
            return Err(UserValidationError::EmptyEmail);
        }
        if normalised.chars().count() > EMAIL_MAX_LEN {
            return Err(UserValidationError::EmailTooLong { max: EMAIL_MAX_LEN });
        }
        if !email_regex().is_match(&normalised) {
            return Err(UserValidationError::InvalidEmail);
        }
        Ok(Self(normalised))
    }

    /// Portion before the `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }
}

/// Trim and lower-case an email for comparison, without validating it.
#[must_use]
pub fn normalise_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = UserValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Optional first and last name supplied at signup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    /// Given name, trimmed; `None` when blank.
    pub first: Option<String>,
    /// Family name, trimmed; `None` when blank.
    pub last: Option<String>,
}

impl PersonName {
    /// Build a name from optional raw parts, dropping blank values.
    #[must_use]
    pub fn new(first: Option<&str>, last: Option<&str>) -> Self {
        Self {
            first: clean(first),
            last: clean(last),
        }
    }

    /// Compose a display name: "first last", either part alone, or the
    /// email local part.
    #[must_use]
    pub fn display_name(&self, email: &EmailAddress) -> String {
        match (&self.first, &self.last) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => email.local_part().to_owned(),
        }
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Derive the base username handle from an email local part.
///
/// Keeps ASCII alphanumerics and underscores, lower-cased, truncated to
/// [`USERNAME_MAX_LEN`]; falls back to `user` when nothing survives.
#[must_use]
pub fn username_base(email: &EmailAddress) -> String {
    let base: String = email
        .local_part()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .take(USERNAME_MAX_LEN)
        .collect();
    if base.is_empty() {
        "user".to_owned()
    } else {
        base
    }
}

/// Persisted user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    /// Primary key.
    pub id: UserId,
    /// Unique login email.
    pub email: EmailAddress,
    /// Unique handle derived from the email.
    pub username: String,
    /// Optional first and last name.
    pub name: PersonName,
    /// Name shown to other users.
    pub display_name: String,
    /// PHC-formatted password hash.
    pub password_hash: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Name this user appears under in a peer's contact list: first name,
    /// then display name, then the email local part.
    #[must_use]
    pub fn contact_name(&self) -> String {
        if let Some(first) = &self.name.first {
            return first.clone();
        }
        if !self.display_name.trim().is_empty() {
            return self.display_name.clone();
        }
        self.email.local_part().to_owned()
    }
}
