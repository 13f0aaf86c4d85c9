//! HTTP inbound adapter exposing REST endpoints.
//!
//! Handlers translate JSON bodies and the session cookie into calls on
//! [`crate::domain::linking::AccountRegistrar`] and render domain errors
//! through [`error`].

pub mod accounts;
pub mod connections;
pub mod contacts;
pub mod error;
pub mod health;
pub mod invitations;
pub mod rooms;
pub mod schemas;
pub mod session;
pub mod session_config;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod views;

use actix_web::web;

use crate::domain::Error;

pub use error::ApiResult;

/// Register every `/api/v1` handler on `cfg`.
///
/// Malformed JSON bodies are reported as `VAL_001` rather than actix's
/// plain-text 400.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        Error::invalid_request(format!("Invalid request body: {err}")).into()
    }))
    .service(accounts::signup)
    .service(accounts::register)
    .service(accounts::login)
    .service(accounts::logout)
    .service(invitations::create_invitation)
    .service(invitations::list_invitations)
    .service(invitations::validate_token)
    .service(invitations::validate_code)
    .service(invitations::accept_invitation)
    .service(invitations::accept_by_code)
    .service(invitations::decline_invitation)
    .service(invitations::resend_invitation)
    .service(invitations::cancel_invitation)
    .service(connections::create_connection)
    .service(connections::accept_connection)
    .service(rooms::current_room)
    .service(rooms::create_room_invite)
    .service(rooms::validate_room_invite)
    .service(rooms::redeem_room_invite)
    .service(contacts::list_contacts);
}
