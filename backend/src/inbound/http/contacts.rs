//! Contact list handler.

use actix_web::{get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::inbound::http::ApiResult;
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::views::ContactView;

/// `{contacts}`.
#[derive(Serialize, ToSchema)]
pub struct ContactListBody {
    pub contacts: Vec<ContactView>,
}

/// Contacts owned by the caller, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/contacts",
    responses(
        (status = 200, description = "Contacts", body = ContactListBody),
        (status = 401, description = "Not signed in", body = ErrorSchema)
    ),
    tags = ["contacts"],
    operation_id = "listContacts"
)]
#[get("/contacts")]
pub async fn list_contacts(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<web::Json<ContactListBody>> {
    let user_id = session.require_user_id()?;
    let contacts = state.contacts().list_contacts(&user_id).await?;
    Ok(web::Json(ContactListBody {
        contacts: contacts.iter().map(ContactView::from).collect(),
    }))
}
