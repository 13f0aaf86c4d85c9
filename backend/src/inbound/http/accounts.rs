//! Account handlers: signup, signup with a co-parent invite, login.
//!
//! ```text
//! POST /api/v1/signup   {"email":"alice@example.com","password":"..."}
//! POST /api/v1/register {"email":"alice@example.com","password":"...","coParentEmail":"bob@example.com"}
//! POST /api/v1/login    {"email":"alice@example.com","password":"..."}
//! ```

use actix_web::{HttpResponse, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::domain::Error;
use crate::domain::linking::{CreatedInvitation, SignupRequest};
use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::views::{SuccessBody, UserView};

/// Body of `POST /api/v1/signup`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl From<SignupBody> for SignupRequest {
    fn from(body: SignupBody) -> Self {
        Self {
            email: body.email,
            password: Zeroizing::new(body.password),
            first_name: body.first_name,
            last_name: body.last_name,
        }
    }
}

/// Body of `POST /api/v1/register`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    #[serde(flatten)]
    pub account: SignupBody,
    pub co_parent_email: String,
}

/// Body of `POST /api/v1/login`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// `{success, user}`.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountBody {
    pub success: bool,
    pub user: UserView,
}

/// Invitation summary returned by `/register`.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredInvitation {
    pub id: String,
    pub invitee_email: String,
    pub is_existing_user: bool,
    pub expires_at: DateTime<Utc>,
    pub short_code: String,
}

impl From<&CreatedInvitation> for RegisteredInvitation {
    fn from(created: &CreatedInvitation) -> Self {
        Self {
            id: created.invitation.id.to_string(),
            invitee_email: created.invitation.invitee_email.to_string(),
            is_existing_user: created.is_existing_user,
            expires_at: created.invitation.expires_at,
            short_code: created.short_code.clone(),
        }
    }
}

/// `{success, user, invitation}`.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredBody {
    pub success: bool,
    pub user: UserView,
    pub invitation: RegisteredInvitation,
}

/// Create an account with its private room and sign it in.
#[utoipa::path(
    post,
    path = "/api/v1/signup",
    request_body = SignupBody,
    responses(
        (status = 201, description = "Account created", body = AccountBody,
            headers(("Set-Cookie" = String, description = "Session cookie"))),
        (status = 400, description = "Invalid email or weak password", body = ErrorSchema),
        (status = 409, description = "Email already registered", body = ErrorSchema),
        (status = 503, description = "Store unavailable", body = ErrorSchema)
    ),
    tags = ["accounts"],
    operation_id = "signup",
    security([])
)]
#[post("/signup")]
pub async fn signup(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<SignupBody>,
) -> ApiResult<HttpResponse> {
    let registered = state
        .registrar()
        .signup(payload.into_inner().into())
        .await?;
    session.persist_user(&registered.user.id)?;
    Ok(HttpResponse::Created().json(AccountBody {
        success: true,
        user: UserView::from(&registered.user),
    }))
}

/// Create an account and invite a co-parent in one transaction.
#[utoipa::path(
    post,
    path = "/api/v1/register",
    request_body = RegisterBody,
    responses(
        (status = 201, description = "Account and invitation created", body = RegisteredBody,
            headers(("Set-Cookie" = String, description = "Session cookie"))),
        (status = 400, description = "Invalid input or self-invitation", body = ErrorSchema),
        (status = 409, description = "Email already registered", body = ErrorSchema),
        (status = 503, description = "Store unavailable", body = ErrorSchema)
    ),
    tags = ["accounts"],
    operation_id = "register",
    security([])
)]
#[post("/register")]
pub async fn register(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<RegisterBody>,
) -> ApiResult<HttpResponse> {
    let RegisterBody {
        account,
        co_parent_email,
    } = payload.into_inner();
    let registered = state
        .registrar()
        .register_with_invitation(account.into(), &co_parent_email)
        .await?;
    let invitation = registered
        .invitation
        .as_ref()
        .ok_or_else(|| Error::internal("registration returned no invitation"))?;
    session.persist_user(&registered.user.id)?;
    Ok(HttpResponse::Created().json(RegisteredBody {
        success: true,
        user: UserView::from(&registered.user),
        invitation: RegisteredInvitation::from(invitation),
    }))
}

/// Verify credentials and establish a session.
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginBody,
    responses(
        (status = 200, description = "Signed in", body = AccountBody,
            headers(("Set-Cookie" = String, description = "Session cookie"))),
        (status = 401, description = "Invalid credentials", body = ErrorSchema)
    ),
    tags = ["accounts"],
    operation_id = "login",
    security([])
)]
#[post("/login")]
pub async fn login(
    state: web::Data<HttpState>,
    session: SessionContext,
    payload: web::Json<LoginBody>,
) -> ApiResult<HttpResponse> {
    let LoginBody { email, password } = payload.into_inner();
    let password = Zeroizing::new(password);
    let user = state.registrar().login(&email, &password).await?;
    session.persist_user(&user.id)?;
    Ok(HttpResponse::Ok().json(AccountBody {
        success: true,
        user: UserView::from(&user),
    }))
}

/// End the session.
#[utoipa::path(
    post,
    path = "/api/v1/logout",
    responses((status = 200, description = "Signed out", body = SuccessBody)),
    tags = ["accounts"],
    operation_id = "logout",
    security([])
)]
#[post("/logout")]
pub async fn logout(session: SessionContext) -> HttpResponse {
    session.clear();
    HttpResponse::Ok().json(SuccessBody::OK)
}
