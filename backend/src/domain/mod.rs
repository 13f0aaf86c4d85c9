//! Domain primitives, services and ports.
//!
//! Purpose: model user accounts and the co-parent linking workflow without
//! reference to HTTP or storage. Adapters reach the domain through the
//! traits in [`ports`] and report failures as [`Error`].
//!
//! Public surface:
//! - Error and ErrorCode: transport-agnostic failure payload and its stable
//!   code.
//! - UserAccount and its value types.
//! - PasswordPolicy: signup password rules.
//! - linking: invitation, validation, room and contact services.

pub mod error;
pub mod linking;
pub mod password_policy;
pub mod ports;
pub mod trace_id;
pub mod user;

pub use self::error::{Error, ErrorCode};
pub use self::password_policy::{PASSWORD_MAX_LEN, PASSWORD_MIN_LEN, PasswordPolicy, PasswordRule};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};
pub use self::user::{
    EMAIL_MAX_LEN, EmailAddress, PersonName, USERNAME_MAX_LEN, UserAccount, UserId,
    UserValidationError, normalise_email, username_base,
};
