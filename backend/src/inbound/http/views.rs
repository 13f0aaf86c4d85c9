//! Response bodies shared by the linking handlers.
//!
//! Views are built from domain records and never carry token hashes or
//! password hashes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::UserAccount;
use crate::domain::linking::{
    Contact, Invitation, LinkOutcome, PendingConnection, Room, SyncSummary,
};

/// Public view of an account.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[schema(example = "3fa85f64-5717-4562-b3fc-2c963f66afa6")]
    pub id: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "Alice Smith")]
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl From<&UserAccount> for UserView {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.to_string(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            first_name: user.name.first.clone(),
            last_name: user.name.last.clone(),
        }
    }
}

/// Invitation as shown to its sender or recipient.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvitationView {
    pub id: String,
    pub inviter_id: String,
    pub invitee_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitee_id: Option<String>,
    #[schema(example = "coparent")]
    pub invitation_type: String,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(example = "LZ-7KQ2MX")]
    pub short_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
}

impl From<&Invitation> for InvitationView {
    fn from(invitation: &Invitation) -> Self {
        Self {
            id: invitation.id.to_string(),
            inviter_id: invitation.inviter_id.to_string(),
            invitee_email: invitation.invitee_email.to_string(),
            invitee_id: invitation.invitee_id.map(|id| id.to_string()),
            invitation_type: invitation.invitation_type.as_str().to_owned(),
            status: invitation.status.as_str().to_owned(),
            short_code: invitation.short_code.clone(),
            created_at: invitation.created_at,
            expires_at: invitation.expires_at,
            accepted_at: invitation.accepted_at,
        }
    }
}

/// Legacy pending connection.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub id: String,
    pub inviter_id: String,
    pub invitee_email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&PendingConnection> for ConnectionView {
    fn from(connection: &PendingConnection) -> Self {
        Self {
            id: connection.id.to_string(),
            inviter_id: connection.inviter_id.to_string(),
            invitee_email: connection.invitee_email.to_string(),
            status: connection.status.as_str().to_owned(),
            created_at: connection.created_at,
            expires_at: connection.expires_at,
        }
    }
}

/// Communication room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: String,
    #[schema(example = "Alice & Bob")]
    pub name: String,
    pub created_by: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        Self {
            id: room.id.to_string(),
            name: room.name.clone(),
            created_by: room.created_by.to_string(),
            is_private: room.is_private,
            created_at: room.created_at,
        }
    }
}

/// Entry in the caller's contact list.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub id: String,
    pub contact_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    /// Storage form, e.g. `co-parent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    /// Human label, e.g. `My Co-Parent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Contact> for ContactView {
    fn from(contact: &Contact) -> Self {
        Self {
            id: contact.id.to_string(),
            contact_name: contact.contact_name.clone(),
            contact_email: contact.contact_email.as_ref().map(ToString::to_string),
            relationship: contact.relationship.map(|kind| kind.as_str().to_owned()),
            relationship_label: contact
                .relationship
                .map(|kind| kind.display_label().to_owned()),
            linked_user_id: contact.linked_user_id.map(|id| id.to_string()),
            created_at: contact.created_at,
        }
    }
}

/// What an acceptance changed.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncView {
    pub contacts_created: bool,
    pub room_joined: bool,
}

impl From<SyncSummary> for SyncView {
    fn from(sync: SyncSummary) -> Self {
        Self {
            contacts_created: sync.contacts_created,
            room_joined: sync.room_joined,
        }
    }
}

/// Body returned by every accept endpoint.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkedBody {
    pub success: bool,
    pub user: UserView,
    pub co_parent: UserView,
    pub room: RoomView,
    pub sync: SyncView,
    /// The accepting account was created by this request.
    pub created_account: bool,
}

impl From<&LinkOutcome> for LinkedBody {
    fn from(outcome: &LinkOutcome) -> Self {
        Self {
            success: true,
            user: UserView::from(&outcome.user),
            co_parent: UserView::from(&outcome.co_parent),
            room: RoomView::from(&outcome.room),
            sync: SyncView::from(outcome.sync),
            created_account: outcome.created_account,
        }
    }
}

/// `{ "success": true }`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessBody {
    pub success: bool,
}

impl SuccessBody {
    /// The only value handlers send.
    pub const OK: Self = Self { success: true };
}
