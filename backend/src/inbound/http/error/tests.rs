//! Tests for HTTP error mapping.

use super::*;
use actix_web::ResponseError;
use actix_web::body::to_bytes;
use actix_web::http::StatusCode;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

const TRACE_ID: &str = "00000000-0000-0000-0000-000000000000";

#[fixture]
fn room_failure() -> Error {
    Error::new(ErrorCode::RoomFailed, "insert into room_members failed: deadlock")
        .with_trace_id(TRACE_ID)
        .with_details(json!({"roomId": "secret"}))
}

async fn response_parts(error: &Error) -> (StatusCode, Option<String>, Value) {
    let response = ResponseError::error_response(error);
    let status = response.status();
    let header = response
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let bytes = to_bytes(response.into_body())
        .await
        .expect("reading response body succeeds");
    let body = serde_json::from_slice(&bytes).expect("error body is JSON");
    (status, header, body)
}

#[rstest]
#[case(Error::email_exists(), StatusCode::CONFLICT)]
#[case(Error::self_invite(), StatusCode::BAD_REQUEST)]
#[case(Error::expired("late"), StatusCode::GONE)]
#[case(Error::already_accepted(), StatusCode::CONFLICT)]
#[case(Error::room_failed(), StatusCode::INTERNAL_SERVER_ERROR)]
#[case(Error::contact_failed(), StatusCode::INTERNAL_SERVER_ERROR)]
#[case(Error::database("down"), StatusCode::SERVICE_UNAVAILABLE)]
#[case(Error::inviter_gone(), StatusCode::GONE)]
#[case(Error::username_failed(), StatusCode::INTERNAL_SERVER_ERROR)]
#[case(Error::limit_reached("one"), StatusCode::CONFLICT)]
#[case(Error::invalid_request("bad"), StatusCode::BAD_REQUEST)]
#[case(Error::invalid_email("bad"), StatusCode::BAD_REQUEST)]
#[case(Error::weak_password("short"), StatusCode::BAD_REQUEST)]
#[case(Error::unauthorized("who"), StatusCode::UNAUTHORIZED)]
#[case(Error::forbidden("no"), StatusCode::FORBIDDEN)]
#[case(Error::not_found("gone"), StatusCode::NOT_FOUND)]
#[case(Error::conflict("busy"), StatusCode::CONFLICT)]
#[case(Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR)]
fn status_code_matches_error_code(#[case] error: Error, #[case] expected: StatusCode) {
    assert_eq!(ResponseError::status_code(&error), expected);
}

#[rstest]
#[actix_web::test]
async fn internal_errors_are_redacted_but_keep_trace_id() {
    let error = Error::internal("connection string postgres://secret")
        .with_trace_id(TRACE_ID)
        .with_details(json!({"secret": "x"}));

    let (status, header, body) = response_parts(&error).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header.as_deref(), Some(TRACE_ID));
    assert_eq!(body["error"], json!("Internal server error"));
    assert_eq!(body["code"], json!("GEN_500"));
    assert_eq!(body["traceId"], json!(TRACE_ID));
    assert!(body.get("details").is_none());
}

#[rstest]
#[actix_web::test]
async fn room_failures_keep_only_their_code(room_failure: Error) {
    let (status, _, body) = response_parts(&room_failure).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    insta::assert_json_snapshot!("redacted_room_failure_body", body);
}

#[rstest]
#[actix_web::test]
async fn client_errors_keep_message_and_requirements() {
    let error = Error::weak_password("Password must be at least 10 characters")
        .with_requirements(json!({"minLength": 10, "failed": "min_length"}));

    let (status, header, body) = response_parts(&error).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(header, None);
    assert_eq!(body["error"], json!("Password must be at least 10 characters"));
    assert_eq!(body["code"], json!("VAL_003"));
    assert_eq!(body["requirements"]["failed"], json!("min_length"));
}

#[test]
fn from_actix_error_is_redacted_internal_error() {
    let err: Error = actix_web::error::ErrorBadRequest("boom").into();

    assert_eq!(err.code(), ErrorCode::InternalError);
    assert_eq!(err.message(), "Internal server error");
    assert_eq!(err.details(), None);
}
