//! HTTP adapter mapping for domain errors.
//!
//! Purpose: keep the domain error type HTTP-agnostic while allowing Actix
//! handlers to turn domain failures into consistent JSON responses and status
//! codes. Status selection lives only here.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use tracing::error;

use crate::domain::{Error, ErrorCode, TRACE_ID_HEADER};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, Error>;

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidToken
        | ErrorCode::InvalidRequest
        | ErrorCode::InvalidEmail
        | ErrorCode::WeakPassword => StatusCode::BAD_REQUEST,
        ErrorCode::Expired | ErrorCode::InviterGone => StatusCode::GONE,
        ErrorCode::EmailExists
        | ErrorCode::AlreadyAccepted
        | ErrorCode::LimitReached
        | ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::DatabaseError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::RoomFailed
        | ErrorCode::ContactFailed
        | ErrorCode::UsernameFailed
        | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Codes whose message and details never reach the client.
fn is_redacted(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::InternalError | ErrorCode::RoomFailed | ErrorCode::ContactFailed
    )
}

fn redact(error: &Error) -> Error {
    if !is_redacted(error.code()) {
        return error.clone();
    }
    error!(
        code = %error.code(),
        error = %error.message(),
        details = ?error.details(),
        "request failed with redacted error"
    );
    let mut redacted = Error::from_code(error.code());
    if let Some(id) = error.trace_id() {
        redacted = redacted.with_trace_id(id.to_owned());
    }
    redacted
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let Some(id) = self.trace_id() {
            builder.insert_header((TRACE_ID_HEADER, id.to_owned()));
        }

        builder.json(redact(self))
    }
}

impl From<actix_web::Error> for Error {
    fn from(err: actix_web::Error) -> Self {
        error!(error = %err, "actix error promoted to domain error");
        Error::internal("Internal server error")
    }
}

#[cfg(test)]
mod tests;
