//! Room handlers: current room and room invite codes.
//!
//! ```text
//! GET  /api/v1/rooms/current
//! POST /api/v1/rooms/invite         {"roomId":"..."}
//! GET  /api/v1/rooms/invite/{code}
//! POST /api/v1/rooms/invite/redeem  {"inviteCode":"AB12CD34"}
//! ```

use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::domain::Error;
use crate::domain::linking::{RoomId, RoomInviteValidation};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::views::RoomView;

/// `{room}`.
#[derive(Serialize, ToSchema)]
pub struct CurrentRoomBody {
    pub room: RoomView,
}

/// Body of `POST /api/v1/rooms/invite`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomInviteBody {
    pub room_id: String,
}

/// Issued room invite.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomInviteBody {
    pub invite_id: String,
    pub invite_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of looking up a room invite code.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomInviteValidationBody {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invited_by: Option<String>,
    /// `NOT_FOUND`, `USED` or `EXPIRED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl RoomInviteValidationBody {
    fn invalid(code: &str) -> Self {
        Self {
            valid: false,
            room_id: None,
            room_name: None,
            invited_by: None,
            code: Some(code.to_owned()),
        }
    }
}

impl From<RoomInviteValidation> for RoomInviteValidationBody {
    fn from(validation: RoomInviteValidation) -> Self {
        match validation {
            RoomInviteValidation::Valid {
                room_id,
                room_name,
                invited_by,
            } => Self {
                valid: true,
                room_id: Some(room_id.to_string()),
                room_name: Some(room_name),
                invited_by: Some(invited_by.to_string()),
                code: None,
            },
            RoomInviteValidation::NotFound => Self::invalid("NOT_FOUND"),
            RoomInviteValidation::Used => Self::invalid("USED"),
            RoomInviteValidation::Expired => Self::invalid("EXPIRED"),
        }
    }
}

/// Body of `POST /api/v1/rooms/invite/redeem`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRoomInviteBody {
    pub invite_code: String,
}

/// `{success, roomId}`.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedBody {
    pub success: bool,
    pub room_id: String,
}

/// The room the caller currently talks in: shared if any, else newest.
#[utoipa::path(
    get,
    path = "/api/v1/rooms/current",
    responses(
        (status = 200, description = "Current room", body = CurrentRoomBody),
        (status = 401, description = "Not signed in", body = ErrorSchema),
        (status = 404, description = "No room", body = ErrorSchema)
    ),
    tags = ["rooms"],
    operation_id = "currentRoom"
)]
#[get("/rooms/current")]
pub async fn current_room(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<CurrentRoomBody>> {
    let user_id = session.require_user_id()?;
    let room = state
        .rooms()
        .get_user_room(&user_id)
        .await?
        .ok_or_else(|| Error::not_found("No room found"))?;
    Ok(web::Json(CurrentRoomBody {
        room: RoomView::from(&room),
    }))
}

/// Issue a single-use invite code for a room the caller belongs to.
#[utoipa::path(
    post,
    path = "/api/v1/rooms/invite",
    request_body = CreateRoomInviteBody,
    responses(
        (status = 201, description = "Invite issued", body = RoomInviteBody),
        (status = 401, description = "Not signed in", body = ErrorSchema),
        (status = 403, description = "Not a member", body = ErrorSchema)
    ),
    tags = ["rooms"],
    operation_id = "createRoomInvite"
)]
#[post("/rooms/invite")]
pub async fn create_room_invite(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<CreateRoomInviteBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let room_id: RoomId = payload.room_id.parse().map_err(|_| {
        Error::invalid_request("Invalid room id").with_details(json!({ "field": "roomId" }))
    })?;
    let issued = state.rooms().create_invite(&room_id, &user_id).await?;
    Ok(HttpResponse::Created().json(RoomInviteBody {
        invite_id: issued.invite_id.to_string(),
        invite_code: issued.invite_code,
        expires_at: issued.expires_at,
    }))
}

/// Look up a room invite code without redeeming it.
#[utoipa::path(
    get,
    path = "/api/v1/rooms/invite/{code}",
    params(("code" = String, Path, description = "Room invite code")),
    responses((status = 200, description = "Lookup outcome", body = RoomInviteValidationBody)),
    tags = ["rooms"],
    operation_id = "validateRoomInvite",
    security([])
)]
#[get("/rooms/invite/{code}")]
pub async fn validate_room_invite(
    state: web::Data<HttpState>,
    code: web::Path<String>,
) -> ApiResult<web::Json<RoomInviteValidationBody>> {
    let validation = state.rooms().validate_invite(&code).await?;
    Ok(web::Json(validation.into()))
}

/// Join a room with an invite code.
#[utoipa::path(
    post,
    path = "/api/v1/rooms/invite/redeem",
    request_body = RedeemRoomInviteBody,
    responses(
        (status = 200, description = "Joined", body = RedeemedBody),
        (status = 400, description = "Unknown or used code", body = ErrorSchema),
        (status = 401, description = "Not signed in", body = ErrorSchema),
        (status = 410, description = "Expired code", body = ErrorSchema)
    ),
    tags = ["rooms"],
    operation_id = "redeemRoomInvite"
)]
#[post("/rooms/invite/redeem")]
pub async fn redeem_room_invite(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<RedeemRoomInviteBody>,
) -> ApiResult<web::Json<RedeemedBody>> {
    let user_id = session.require_user_id()?;
    let room_id = state
        .rooms()
        .use_invite(&payload.invite_code, &user_id)
        .await?;
    Ok(web::Json(RedeemedBody {
        success: true,
        room_id: room_id.to_string(),
    }))
}
