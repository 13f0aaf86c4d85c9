//! Co-parent invitation handlers.
//!
//! ```text
//! POST   /api/v1/invitations                      {"inviteeEmail":"bob@example.com"}
//! GET    /api/v1/invitations?status=pending
//! GET    /api/v1/invitations/validate/{token}
//! GET    /api/v1/invitations/validate-code/{code}
//! POST   /api/v1/invitations/accept               {"token":"..."}
//! POST   /api/v1/invitations/accept-by-code       {"shortCode":"LZ-7KQ2MX"}
//! POST   /api/v1/invitations/decline              {"token":"..."}
//! POST   /api/v1/invitations/{id}/resend
//! DELETE /api/v1/invitations/{id}
//! ```

use actix_web::{HttpResponse, delete, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use zeroize::Zeroizing;

use crate::domain::Error;
use crate::domain::linking::{
    AcceptingIdentity, InvitationId, InvitationStatus, LinkOutcome, NewAccount, TokenValidation,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::views::{InvitationView, LinkedBody, SuccessBody};

/// Body of `POST /api/v1/invitations`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationBody {
    #[schema(example = "bob@example.com")]
    pub invitee_email: String,
}

/// Result of issuing an invitation.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInvitationBody {
    pub invitation: InvitationView,
    /// Absent when an active invitation already existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub short_code: String,
    pub is_existing_user: bool,
}

/// Query for `GET /api/v1/invitations`.
#[derive(Deserialize, IntoParams)]
pub struct InvitationListQuery {
    /// Restrict both lists to one status.
    pub status: Option<String>,
}

/// Sent and received invitations, newest first.
#[derive(Serialize, ToSchema)]
pub struct InvitationListBody {
    pub sent: Vec<InvitationView>,
    pub received: Vec<InvitationView>,
}

/// Outcome of validating a token or short code.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationBody {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation: Option<InvitationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inviter_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inviter_email: Option<String>,
    /// `INVALID_TOKEN`, `EXPIRED`, `ALREADY_ACCEPTED`, `ALREADY_DECLINED` or
    /// `CANCELLED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TokenValidation> for ValidationBody {
    fn from(validation: TokenValidation) -> Self {
        match validation {
            TokenValidation::Valid(valid) => Self {
                valid: true,
                inviter_name: valid.inviter_name().map(str::to_owned),
                inviter_email: valid.inviter_email().map(str::to_owned),
                invitation: Some(InvitationView::from(&valid.invitation)),
                code: None,
                error: None,
            },
            TokenValidation::Invalid { reason, message } => Self {
                valid: false,
                invitation: None,
                inviter_name: None,
                inviter_email: None,
                code: Some(reason.as_str().to_owned()),
                error: Some(message),
            },
        }
    }
}

/// Account fields an invitee without a session supplies when accepting.
#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountFields {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Body of `POST /api/v1/invitations/accept`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub token: String,
    #[serde(flatten)]
    pub account: NewAccountFields,
}

/// Body of `POST /api/v1/invitations/accept-by-code`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AcceptByCodeBody {
    #[schema(example = "LZ-7KQ2MX")]
    pub short_code: String,
    #[serde(flatten)]
    pub account: NewAccountFields,
}

/// Body of `POST /api/v1/invitations/decline`.
#[derive(Deserialize, ToSchema)]
pub struct DeclineBody {
    pub token: String,
}

/// Result of re-sending an invitation.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResentInvitationBody {
    pub invitation: InvitationView,
    pub token: String,
    pub short_code: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Session user, or a new account described by `fields`.
pub(crate) fn accepting_identity(
    session: &SessionContext,
    fields: NewAccountFields,
) -> Result<AcceptingIdentity, Error> {
    if let Some(user_id) = session.user_id()? {
        return Ok(AcceptingIdentity::Existing(user_id));
    }
    let NewAccountFields {
        email,
        password,
        display_name,
        first_name,
        last_name,
    } = fields;
    match (present(email), present(password), present(display_name)) {
        (Some(email), Some(password), Some(display_name)) => {
            Ok(AcceptingIdentity::NewAccount(NewAccount {
                email,
                password: Zeroizing::new(password),
                display_name: Some(display_name),
                first_name,
                last_name,
            }))
        }
        (email, password, display_name) => {
            let missing: Vec<&str> = [
                ("email", email.is_none()),
                ("password", password.is_none()),
                ("displayName", display_name.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, absent)| absent.then_some(field))
            .collect();
            Err(Error::invalid_request(
                "Sign in or provide email, password and displayName",
            )
            .with_details(json!({ "missing": missing })))
        }
    }
}

/// Sign the accepting user in and render the outcome.
pub(crate) fn linked_response(
    session: &SessionContext,
    outcome: &LinkOutcome,
) -> ApiResult<HttpResponse> {
    session.persist_user(&outcome.user.id)?;
    Ok(HttpResponse::Ok().json(LinkedBody::from(outcome)))
}

fn parse_invitation_id(raw: &str) -> Result<InvitationId, Error> {
    raw.parse().map_err(|_| {
        Error::invalid_request("Invalid invitation id").with_details(json!({ "field": "id" }))
    })
}

fn parse_status(raw: Option<&str>) -> Result<Option<InvitationStatus>, Error> {
    raw.map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            raw.parse().map_err(|_| {
                Error::invalid_request(format!("Unknown invitation status: {raw}"))
                    .with_details(json!({ "field": "status" }))
            })
        })
        .transpose()
}

/// Invite a co-parent by email.
#[utoipa::path(
    post,
    path = "/api/v1/invitations",
    request_body = CreateInvitationBody,
    responses(
        (status = 201, description = "Invitation issued", body = CreatedInvitationBody),
        (status = 400, description = "Invalid email or self-invitation", body = ErrorSchema),
        (status = 401, description = "Not signed in", body = ErrorSchema),
        (status = 409, description = "Co-parent limit reached", body = ErrorSchema)
    ),
    tags = ["invitations"],
    operation_id = "createInvitation"
)]
#[post("/invitations")]
pub async fn create_invitation(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<CreateInvitationBody>,
) -> ApiResult<HttpResponse> {
    let user_id = session.require_user_id()?;
    let created = state
        .invitations()
        .create_invitation(&user_id, &payload.invitee_email)
        .await?;
    Ok(HttpResponse::Created().json(CreatedInvitationBody {
        invitation: InvitationView::from(&created.invitation),
        token: created.token,
        short_code: created.short_code,
        is_existing_user: created.is_existing_user,
    }))
}

/// List invitations the caller sent and received.
#[utoipa::path(
    get,
    path = "/api/v1/invitations",
    params(InvitationListQuery),
    responses(
        (status = 200, description = "Invitations", body = InvitationListBody),
        (status = 400, description = "Unknown status", body = ErrorSchema),
        (status = 401, description = "Not signed in", body = ErrorSchema)
    ),
    tags = ["invitations"],
    operation_id = "listInvitations"
)]
#[get("/invitations")]
pub async fn list_invitations(
    state: web::Data<HttpState>,
    session: SessionContext,
    query: web::Query<InvitationListQuery>,
) -> ApiResult<web::Json<InvitationListBody>> {
    let user_id = session.require_user_id()?;
    let status = parse_status(query.status.as_deref())?;
    let lists = state
        .invitations()
        .get_user_invitations(&user_id, status)
        .await?;
    Ok(web::Json(InvitationListBody {
        sent: lists.sent.iter().map(InvitationView::from).collect(),
        received: lists.received.iter().map(InvitationView::from).collect(),
    }))
}

/// Check a raw invitation token without redeeming it.
#[utoipa::path(
    get,
    path = "/api/v1/invitations/validate/{token}",
    params(("token" = String, Path, description = "Raw invitation token")),
    responses((status = 200, description = "Validation outcome", body = ValidationBody)),
    tags = ["invitations"],
    operation_id = "validateInvitationToken",
    security([])
)]
#[get("/invitations/validate/{token}")]
pub async fn validate_token(
    state: web::Data<HttpState>,
    token: web::Path<String>,
) -> ApiResult<web::Json<ValidationBody>> {
    let validation = state.validator().validate_token(&token).await?;
    Ok(web::Json(validation.into()))
}

/// Check a short code without redeeming it.
#[utoipa::path(
    get,
    path = "/api/v1/invitations/validate-code/{code}",
    params(("code" = String, Path, description = "Short code, e.g. LZ-7KQ2MX")),
    responses((status = 200, description = "Validation outcome", body = ValidationBody)),
    tags = ["invitations"],
    operation_id = "validateInvitationCode",
    security([])
)]
#[get("/invitations/validate-code/{code}")]
pub async fn validate_code(
    state: web::Data<HttpState>,
    code: web::Path<String>,
) -> ApiResult<web::Json<ValidationBody>> {
    let validation = state.validator().validate_by_short_code(&code).await?;
    Ok(web::Json(validation.into()))
}

/// Accept an invitation by token, creating the account when signed out.
#[utoipa::path(
    post,
    path = "/api/v1/invitations/accept",
    request_body = AcceptBody,
    responses(
        (status = 200, description = "Accounts linked", body = LinkedBody,
            headers(("Set-Cookie" = String, description = "Session cookie"))),
        (status = 400, description = "Invalid token or input", body = ErrorSchema),
        (status = 409, description = "Already accepted or limit reached", body = ErrorSchema),
        (status = 410, description = "Expired or inviter gone", body = ErrorSchema)
    ),
    tags = ["invitations"],
    operation_id = "acceptInvitation",
    security([])
)]
#[post("/invitations/accept")]
pub async fn accept_invitation(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<AcceptBody>,
) -> ApiResult<HttpResponse> {
    let AcceptBody { token, account } = payload.into_inner();
    let identity = accepting_identity(&session, account)?;
    let outcome = state
        .registrar()
        .accept_invitation(&token, identity)
        .await?;
    linked_response(&session, &outcome)
}

/// Accept an invitation by short code.
#[utoipa::path(
    post,
    path = "/api/v1/invitations/accept-by-code",
    request_body = AcceptByCodeBody,
    responses(
        (status = 200, description = "Accounts linked", body = LinkedBody),
        (status = 400, description = "Invalid or ambiguous code", body = ErrorSchema),
        (status = 409, description = "Already accepted or limit reached", body = ErrorSchema),
        (status = 410, description = "Expired or inviter gone", body = ErrorSchema)
    ),
    tags = ["invitations"],
    operation_id = "acceptInvitationByCode",
    security([])
)]
#[post("/invitations/accept-by-code")]
pub async fn accept_by_code(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<AcceptByCodeBody>,
) -> ApiResult<HttpResponse> {
    let AcceptByCodeBody {
        short_code,
        account,
    } = payload.into_inner();
    let identity = accepting_identity(&session, account)?;
    let outcome = state
        .registrar()
        .accept_by_short_code(&short_code, identity)
        .await?;
    linked_response(&session, &outcome)
}

/// Refuse an invitation.
#[utoipa::path(
    post,
    path = "/api/v1/invitations/decline",
    request_body = DeclineBody,
    responses(
        (status = 200, description = "Declined", body = SuccessBody),
        (status = 400, description = "Invalid token", body = ErrorSchema),
        (status = 401, description = "Not signed in", body = ErrorSchema)
    ),
    tags = ["invitations"],
    operation_id = "declineInvitation"
)]
#[post("/invitations/decline")]
pub async fn decline_invitation(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<DeclineBody>,
) -> ApiResult<web::Json<SuccessBody>> {
    let user_id = session.require_user_id()?;
    state
        .validator()
        .decline_invitation(&payload.token, &user_id)
        .await?;
    Ok(web::Json(SuccessBody::OK))
}

/// Rotate the token of a pending or expired invitation.
#[utoipa::path(
    post,
    path = "/api/v1/invitations/{id}/resend",
    params(("id" = String, Path, description = "Invitation id")),
    responses(
        (status = 200, description = "Invitation re-sent", body = ResentInvitationBody),
        (status = 403, description = "Not the inviter", body = ErrorSchema),
        (status = 404, description = "Unknown invitation", body = ErrorSchema),
        (status = 409, description = "Invitation cannot be resent", body = ErrorSchema)
    ),
    tags = ["invitations"],
    operation_id = "resendInvitation"
)]
#[post("/invitations/{id}/resend")]
pub async fn resend_invitation(
    state: web::Data<HttpState>,
    session: SessionContext,
    id: web::Path<String>,
) -> ApiResult<web::Json<ResentInvitationBody>> {
    let user_id = session.require_user_id()?;
    let invitation_id = parse_invitation_id(&id)?;
    let resent = state
        .invitations()
        .resend_invitation(&invitation_id, &user_id)
        .await?;
    Ok(web::Json(ResentInvitationBody {
        invitation: InvitationView::from(&resent.invitation),
        token: resent.token,
        short_code: resent.short_code,
    }))
}

/// Cancel a pending invitation.
#[utoipa::path(
    delete,
    path = "/api/v1/invitations/{id}",
    params(("id" = String, Path, description = "Invitation id")),
    responses(
        (status = 200, description = "Cancelled", body = SuccessBody),
        (status = 403, description = "Not the inviter", body = ErrorSchema),
        (status = 404, description = "Unknown invitation", body = ErrorSchema)
    ),
    tags = ["invitations"],
    operation_id = "cancelInvitation"
)]
#[delete("/invitations/{id}")]
pub async fn cancel_invitation(
    state: web::Data<HttpState>,
    session: SessionContext,
    id: web::Path<String>,
) -> ApiResult<web::Json<SuccessBody>> {
    let user_id = session.require_user_id()?;
    let invitation_id = parse_invitation_id(&id)?;
    state
        .invitations()
        .cancel_invitation(&invitation_id, &user_id)
        .await?;
    Ok(web::Json(SuccessBody::OK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(None, None)]
    #[case(Some(" "), None)]
    #[case(Some("pending"), Some(InvitationStatus::Pending))]
    #[case(Some("cancelled"), Some(InvitationStatus::Cancelled))]
    fn status_filter_is_optional(
        #[case] raw: Option<&str>,
        #[case] expected: Option<InvitationStatus>,
    ) {
        assert_eq!(parse_status(raw).expect("valid status"), expected);
    }

    #[rstest]
    fn unknown_status_is_a_bad_request() {
        let err = parse_status(Some("archived")).expect_err("unknown status");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[rstest]
    fn malformed_invitation_id_is_a_bad_request() {
        let err = parse_invitation_id("nope").expect_err("malformed id");
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert_eq!(err.details(), Some(&json!({ "field": "id" })));
    }
}
