//! Domain-level error types.
//!
//! These errors are transport agnostic. Inbound adapters map them to HTTP
//! responses; the serialised shape (`error`, `code`, `traceId`, `details`,
//! `requirements`) is the contract consumed by clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TraceId;

/// Stable machine-readable error code describing the failure category.
///
/// Codes serialise to their wire form (`REG_001`, `VAL_002`, ...) and never
/// change once published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    /// An account already exists for the supplied email.
    #[serde(rename = "REG_001")]
    EmailExists,
    /// The invitation token or code is unknown, malformed, or unusable.
    ///
    /// Self-invitations and email mismatches share this code.
    #[serde(rename = "REG_002")]
    InvalidToken,
    /// The invitation or invite code has expired.
    #[serde(rename = "REG_003")]
    Expired,
    /// The invitation was already accepted.
    #[serde(rename = "REG_004")]
    AlreadyAccepted,
    /// The shared room could not be created or joined.
    #[serde(rename = "REG_005")]
    RoomFailed,
    /// Contact records could not be synchronised.
    #[serde(rename = "REG_006")]
    ContactFailed,
    /// The store was unavailable or the transaction could not commit.
    #[serde(rename = "REG_007")]
    DatabaseError,
    /// The inviting account no longer exists.
    #[serde(rename = "REG_008")]
    InviterGone,
    /// No free username handle could be allocated.
    #[serde(rename = "REG_009")]
    UsernameFailed,
    /// One of the parties already has a linked co-parent.
    #[serde(rename = "REG_010")]
    LimitReached,
    /// The request is malformed or fails validation.
    #[serde(rename = "VAL_001")]
    InvalidRequest,
    /// The email address is not well formed.
    #[serde(rename = "VAL_002")]
    InvalidEmail,
    /// The password does not satisfy the password policy.
    #[serde(rename = "VAL_003")]
    WeakPassword,
    /// Authentication failed or is missing.
    #[serde(rename = "AUTH_001")]
    Unauthorized,
    /// Authenticated but not permitted to perform this action.
    #[serde(rename = "GEN_403")]
    Forbidden,
    /// The requested resource does not exist.
    #[serde(rename = "GEN_404")]
    NotFound,
    /// The resource is in a state that does not allow the operation.
    #[serde(rename = "GEN_409")]
    Conflict,
    /// An unexpected error occurred inside the domain.
    #[serde(rename = "GEN_500")]
    InternalError,
}

impl ErrorCode {
    /// Wire representation of the code.
    ///
    /// # Examples
    /// ```
    /// use tandem::domain::ErrorCode;
    ///
    /// assert_eq!(ErrorCode::EmailExists.as_str(), "REG_001");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmailExists => "REG_001",
            Self::InvalidToken => "REG_002",
            Self::Expired => "REG_003",
            Self::AlreadyAccepted => "REG_004",
            Self::RoomFailed => "REG_005",
            Self::ContactFailed => "REG_006",
            Self::DatabaseError => "REG_007",
            Self::InviterGone => "REG_008",
            Self::UsernameFailed => "REG_009",
            Self::LimitReached => "REG_010",
            Self::InvalidRequest => "VAL_001",
            Self::InvalidEmail => "VAL_002",
            Self::WeakPassword => "VAL_003",
            Self::Unauthorized => "AUTH_001",
            Self::Forbidden => "GEN_403",
            Self::NotFound => "GEN_404",
            Self::Conflict => "GEN_409",
            Self::InternalError => "GEN_500",
        }
    }

    const fn default_message(self) -> &'static str {
        match self {
            Self::EmailExists => "An account with this email already exists",
            Self::InvalidToken => "Invalid invitation token",
            Self::Expired => "Invitation has expired",
            Self::AlreadyAccepted => "Invitation has already been accepted",
            Self::RoomFailed => "Failed to set up shared room",
            Self::ContactFailed => "Failed to create contacts",
            Self::DatabaseError => "Database error, please try again",
            Self::InviterGone => "The account that sent this invitation no longer exists",
            Self::UsernameFailed => "Could not allocate a username",
            Self::LimitReached => "Co-parent limit reached",
            Self::InvalidRequest => "Invalid request",
            Self::InvalidEmail => "Invalid email address",
            Self::WeakPassword => "Password does not meet requirements",
            Self::Unauthorized => "Authentication required",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not found",
            Self::Conflict => "Conflict",
            Self::InternalError => "Internal server error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` is never empty; blank messages fall back to the code's default
///   wording.
///
/// # Examples
/// ```
/// use tandem::domain::{Error, ErrorCode};
///
/// let err = Error::expired("Invitation has expired");
/// assert_eq!(err.code(), ErrorCode::Expired);
/// assert_eq!(err.message(), "Invitation has expired");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    #[serde(rename = "error")]
    message: String,
    code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requirements: Option<Value>,
}

impl Error {
    /// Create a new error, capturing the trace identifier in scope.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.default_message().to_owned()
        } else {
            message
        };
        Self {
            message,
            code,
            trace_id: TraceId::current().map(|id| id.to_string()),
            details: None,
            requirements: None,
        }
    }

    /// Create an error carrying the code's default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message returned to adapters.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Correlation identifier captured when the error was raised.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Supplementary error details for adapters.
    #[must_use]
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Password requirements attached to policy failures.
    #[must_use]
    pub fn requirements(&self) -> Option<&Value> {
        self.requirements.as_ref()
    }

    /// Attach structured details to the error.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach a requirements payload for client-side display.
    #[must_use]
    pub fn with_requirements(mut self, requirements: Value) -> Self {
        self.requirements = Some(requirements);
        self
    }

    /// Override the trace identifier.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// [`ErrorCode::EmailExists`] with the default message.
    #[must_use]
    pub fn email_exists() -> Self {
        Self::from_code(ErrorCode::EmailExists)
    }

    /// [`ErrorCode::InvalidToken`].
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    /// Self-invitation rejection, reported under [`ErrorCode::InvalidToken`].
    #[must_use]
    pub fn self_invite() -> Self {
        Self::new(ErrorCode::InvalidToken, "Cannot invite yourself")
    }

    /// [`ErrorCode::Expired`].
    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Expired, message)
    }

    /// [`ErrorCode::AlreadyAccepted`] with the default message.
    #[must_use]
    pub fn already_accepted() -> Self {
        Self::from_code(ErrorCode::AlreadyAccepted)
    }

    /// [`ErrorCode::RoomFailed`] with the default message.
    #[must_use]
    pub fn room_failed() -> Self {
        Self::from_code(ErrorCode::RoomFailed)
    }

    /// [`ErrorCode::ContactFailed`] with the default message.
    #[must_use]
    pub fn contact_failed() -> Self {
        Self::from_code(ErrorCode::ContactFailed)
    }

    /// [`ErrorCode::DatabaseError`].
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// [`ErrorCode::InviterGone`] with the default message.
    #[must_use]
    pub fn inviter_gone() -> Self {
        Self::from_code(ErrorCode::InviterGone)
    }

    /// [`ErrorCode::UsernameFailed`] with the default message.
    #[must_use]
    pub fn username_failed() -> Self {
        Self::from_code(ErrorCode::UsernameFailed)
    }

    /// [`ErrorCode::LimitReached`].
    pub fn limit_reached(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::LimitReached, message)
    }

    /// [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// [`ErrorCode::InvalidEmail`].
    pub fn invalid_email(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidEmail, message)
    }

    /// [`ErrorCode::WeakPassword`].
    pub fn weak_password(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WeakPassword, message)
    }

    /// [`ErrorCode::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// [`ErrorCode::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// [`ErrorCode::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// [`ErrorCode::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(ErrorCode::EmailExists, "REG_001")]
    #[case(ErrorCode::InvalidToken, "REG_002")]
    #[case(ErrorCode::InviterGone, "REG_008")]
    #[case(ErrorCode::UsernameFailed, "REG_009")]
    #[case(ErrorCode::InvalidEmail, "VAL_002")]
    #[case(ErrorCode::InternalError, "GEN_500")]
    fn codes_serialise_to_wire_form(#[case] code: ErrorCode, #[case] expected: &str) {
        let value = serde_json::to_value(code).expect("serialise code");
        assert_eq!(value, json!(expected));
        assert_eq!(code.as_str(), expected);
    }

    #[rstest]
    fn blank_message_falls_back_to_default() {
        let err = Error::new(ErrorCode::Expired, "   ");
        assert_eq!(err.message(), "Invitation has expired");
    }

    #[rstest]
    fn payload_uses_error_and_code_fields() {
        let err = Error::self_invite();
        let value = serde_json::to_value(&err).expect("serialise error");
        assert_eq!(
            value,
            json!({ "error": "Cannot invite yourself", "code": "REG_002" })
        );
    }

    #[rstest]
    fn requirements_are_serialised_when_present() {
        let err = Error::weak_password("too short").with_requirements(json!({ "minLength": 10 }));
        let value = serde_json::to_value(&err).expect("serialise error");
        assert_eq!(value["requirements"]["minLength"], json!(10));
    }

    #[tokio::test]
    async fn trace_id_is_captured_from_scope() {
        let trace_id: TraceId = "00000000-0000-0000-0000-000000000001"
            .parse()
            .expect("valid uuid");
        let err = TraceId::scope(trace_id, async { Error::internal("boom") }).await;
        assert_eq!(err.trace_id(), Some("00000000-0000-0000-0000-000000000001"));
    }
}
