//! OpenAPI schema definitions for domain types.
//!
//! Domain types stay free of utoipa; these mirrors describe the wire shape
//! of the error payload for the generated document.

use utoipa::ToSchema;

/// OpenAPI schema for [`crate::domain::ErrorCode`].
#[derive(ToSchema)]
#[schema(as = ErrorCode)]
pub enum ErrorCodeSchema {
    /// Email already registered.
    #[schema(rename = "REG_001")]
    EmailExists,
    /// Token or code unusable, self-invitation, or email mismatch.
    #[schema(rename = "REG_002")]
    InvalidToken,
    /// Invitation or invite code expired.
    #[schema(rename = "REG_003")]
    Expired,
    /// Invitation already accepted.
    #[schema(rename = "REG_004")]
    AlreadyAccepted,
    /// Shared room setup failed.
    #[schema(rename = "REG_005")]
    RoomFailed,
    /// Contact synchronisation failed.
    #[schema(rename = "REG_006")]
    ContactFailed,
    /// Store unavailable or commit failed.
    #[schema(rename = "REG_007")]
    DatabaseError,
    /// Inviting account no longer exists.
    #[schema(rename = "REG_008")]
    InviterGone,
    /// No free username.
    #[schema(rename = "REG_009")]
    UsernameFailed,
    /// Co-parent limit reached.
    #[schema(rename = "REG_010")]
    LimitReached,
    /// Malformed request.
    #[schema(rename = "VAL_001")]
    InvalidRequest,
    /// Malformed email.
    #[schema(rename = "VAL_002")]
    InvalidEmail,
    /// Password rejected by policy.
    #[schema(rename = "VAL_003")]
    WeakPassword,
    /// Not signed in or bad credentials.
    #[schema(rename = "AUTH_001")]
    Unauthorized,
    /// Not permitted.
    #[schema(rename = "GEN_403")]
    Forbidden,
    /// Not found.
    #[schema(rename = "GEN_404")]
    NotFound,
    /// State conflict.
    #[schema(rename = "GEN_409")]
    Conflict,
    /// Unexpected failure.
    #[schema(rename = "GEN_500")]
    InternalError,
}

/// OpenAPI schema for [`crate::domain::Error`].
#[derive(ToSchema)]
#[schema(as = Error, rename_all = "camelCase")]
#[expect(dead_code, reason = "Used only for OpenAPI schema generation via utoipa")]
pub struct ErrorSchema {
    /// Human-readable message.
    #[schema(example = "Invitation has expired")]
    error: String,
    /// Stable machine-readable code.
    code: ErrorCodeSchema,
    /// Correlation identifier, echoed in the `trace-id` header.
    #[schema(example = "5f0c6a52-9a7e-4a53-8d1c-7a3c2d8b6e11")]
    trace_id: Option<String>,
    /// Supplementary details.
    details: Option<serde_json::Value>,
    /// Password rules, present on `VAL_003`.
    requirements: Option<serde_json::Value>,
}
