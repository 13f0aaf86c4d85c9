//! Legacy pending-connection handlers.
//!
//! New links should use invitations; these endpoints remain for clients
//! still holding connection tokens. Acceptance runs the same pipeline as
//! invitation acceptance.

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::linking::AcceptingIdentity;
use crate::inbound::http::ApiResult;
use crate::inbound::http::invitations::linked_response;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::views::{ConnectionView, LinkedBody};

/// Body of `POST /api/v1/connections`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionBody {
    pub invitee_email: String,
}

/// Result of recording a pending connection.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedConnectionBody {
    pub connection: ConnectionView,
    /// Absent when a pending connection already existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub is_existing_user: bool,
}

/// Body of `POST /api/v1/connections/accept`.
#[derive(Deserialize, ToSchema)]
pub struct AcceptConnectionBody {
    pub token: String,
}

/// Record a pending connection to an email.
#[utoipa::path(
    post,
    path = "/api/v1/connections",
    request_body = CreateConnectionBody,
    responses(
        (status = 201, description = "Connection recorded", body = CreatedConnectionBody),
        (status = 400, description = "Invalid email or self-invitation", body = ErrorSchema),
        (status = 401, description = "Not signed in", body = ErrorSchema),
        (status = 409, description = "Co-parent limit reached", body = ErrorSchema)
    ),
    tags = ["connections"],
    operation_id = "createConnection"
)]
#[post("/connections")]
pub async fn create_connection(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<CreateConnectionBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let created = state
        .invitations()
        .create_pending_connection(&user_id, &payload.invitee_email)
        .await?;
    Ok(HttpResponse::Created().json(CreatedConnectionBody {
        connection: ConnectionView::from(&created.connection),
        token: created.token,
        is_existing_user: created.is_existing_user,
    }))
}

/// Accept a pending connection as the signed-in user.
#[utoipa::path(
    post,
    path = "/api/v1/connections/accept",
    request_body = AcceptConnectionBody,
    responses(
        (status = 200, description = "Accounts linked", body = LinkedBody),
        (status = 400, description = "Invalid token or email mismatch", body = ErrorSchema),
        (status = 401, description = "Not signed in", body = ErrorSchema),
        (status = 409, description = "Already accepted or limit reached", body = ErrorSchema),
        (status = 410, description = "Expired", body = ErrorSchema)
    ),
    tags = ["connections"],
    operation_id = "acceptConnection"
)]
#[post("/connections/accept")]
pub async fn accept_connection(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<AcceptConnectionBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let outcome = state
        .registrar()
        .accept_pending_connection(&payload.token, AcceptingIdentity::Existing(user_id))
        .await?;
    linked_response(&session, &outcome)
}
