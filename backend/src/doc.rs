//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every linking endpoint, the shared error schema and
//! the session cookie security scheme. The generated document backs Swagger
//! UI in debug builds and is exported by `cargo run --bin openapi-dump`.

use crate::inbound::http::schemas::{ErrorCodeSchema, ErrorSchema};
use crate::inbound::http::{accounts, connections, contacts, health, invitations, rooms, views};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Enrich the generated document with the session cookie security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "session",
                "Session cookie issued by signup, register, login and unauthenticated accepts.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Tandem API",
        description = "Co-parent invitations, account linking and shared rooms."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("SessionCookie" = [])),
    paths(
        accounts::signup,
        accounts::register,
        accounts::login,
        accounts::logout,
        invitations::create_invitation,
        invitations::list_invitations,
        invitations::validate_token,
        invitations::validate_code,
        invitations::accept_invitation,
        invitations::accept_by_code,
        invitations::decline_invitation,
        invitations::resend_invitation,
        invitations::cancel_invitation,
        connections::create_connection,
        connections::accept_connection,
        rooms::current_room,
        rooms::create_room_invite,
        rooms::validate_room_invite,
        rooms::redeem_room_invite,
        contacts::list_contacts,
        health::ready,
        health::live,
    ),
    components(schemas(
        ErrorSchema,
        ErrorCodeSchema,
        views::UserView,
        views::InvitationView,
        views::ConnectionView,
        views::RoomView,
        views::ContactView,
        views::LinkedBody,
    )),
    tags(
        (name = "accounts", description = "Signup, registration and sessions"),
        (name = "invitations", description = "Co-parent invitations"),
        (name = "connections", description = "Legacy pending connections"),
        (name = "rooms", description = "Shared rooms and room invite codes"),
        (name = "contacts", description = "Contact lists"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    //! Structural checks on the generated document.

    use super::*;
    use crate::test_support::openapi::{object_schema, property_names};
    use rstest::rstest;

    #[rstest]
    fn error_schema_uses_wire_field_names() {
        let doc = ApiDoc::openapi();
        let fields = property_names(object_schema(&doc, "Error"));
        for field in ["error", "code", "traceId", "details", "requirements"] {
            assert!(fields.contains(&field), "missing {field} in {fields:?}");
        }
    }

    #[rstest]
    #[case("/api/v1/invitations/accept")]
    #[case("/api/v1/invitations/validate/{token}")]
    #[case("/api/v1/rooms/invite/redeem")]
    #[case("/api/v1/contacts")]
    #[case("/health/ready")]
    fn linking_paths_are_documented(#[case] path: &str) {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key(path), "{path} not documented");
    }

    #[rstest]
    fn session_cookie_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("SessionCookie"));
    }
}
