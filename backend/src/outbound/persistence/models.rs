//! Internal Diesel row structs for the linking tables.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Reading a row back into a domain record
//! re-validates stored enums and emails; a value that no longer parses is
//! reported as a query error rather than silently coerced.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::linking::{
    Contact, ContactId, Invitation, InvitationId, PendingConnection, PendingConnectionId,
    Relationship, Room, RoomId, RoomInvite, RoomInviteId, RoomMember,
};
use crate::domain::ports::{StoreError, StoreResult};
use crate::domain::{EmailAddress, PersonName, UserAccount, UserId};

use super::schema::{
    contacts, invitations, pending_connections, room_invites, room_members, rooms, users,
};

fn stored<T>(column: &str, raw: &str) -> StoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|err: T::Err| StoreError::query(format!("corrupt {column}: {err}")))
}

fn stored_email(column: &str, raw: &str) -> StoreResult<EmailAddress> {
    EmailAddress::parse(raw).map_err(|err| StoreError::query(format!("corrupt {column}: {err}")))
}

fn user_id(id: Uuid) -> UserId {
    UserId::from_uuid(id)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: user_id(row.id),
            email: stored_email("users.email", &row.email)?,
            username: row.username,
            name: PersonName::new(row.first_name.as_deref(), row.last_name.as_deref()),
            display_name: row.display_name,
            password_hash: row.password_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub(crate) struct NewUserRow<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub username: &'a str,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub display_name: &'a str,
    pub password_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a UserAccount> for NewUserRow<'a> {
    fn from(user: &'a UserAccount) -> Self {
        Self {
            id: *user.id.as_uuid(),
            email: user.email.as_ref(),
            username: &user.username,
            first_name: user.name.first.as_deref(),
            last_name: user.name.last.as_deref(),
            display_name: &user.display_name,
            password_hash: &user.password_hash,
            created_at: user.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = invitations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct InvitationRow {
    pub id: Uuid,
    pub token_hash: String,
    pub short_code: String,
    pub inviter_id: Uuid,
    pub invitee_email: String,
    pub invitee_id: Option<Uuid>,
    pub invitation_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = StoreError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: InvitationId::from_uuid(row.id),
            token_hash: row.token_hash,
            short_code: row.short_code,
            inviter_id: user_id(row.inviter_id),
            invitee_email: stored_email("invitations.invitee_email", &row.invitee_email)?,
            invitee_id: row.invitee_id.map(user_id),
            invitation_type: stored("invitations.invitation_type", &row.invitation_type)?,
            status: stored("invitations.status", &row.status)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            accepted_at: row.accepted_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = invitations)]
pub(crate) struct NewInvitationRow<'a> {
    pub id: Uuid,
    pub token_hash: &'a str,
    pub short_code: &'a str,
    pub inviter_id: Uuid,
    pub invitee_email: &'a str,
    pub invitee_id: Option<Uuid>,
    pub invitation_type: &'static str,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Invitation> for NewInvitationRow<'a> {
    fn from(invitation: &'a Invitation) -> Self {
        Self {
            id: *invitation.id.as_uuid(),
            token_hash: &invitation.token_hash,
            short_code: &invitation.short_code,
            inviter_id: *invitation.inviter_id.as_uuid(),
            invitee_email: invitation.invitee_email.as_ref(),
            invitee_id: invitation.invitee_id.map(|id| *id.as_uuid()),
            invitation_type: invitation.invitation_type.as_str(),
            status: invitation.status.as_str(),
            created_at: invitation.created_at,
            expires_at: invitation.expires_at,
            accepted_at: invitation.accepted_at,
        }
    }
}

/// Status change; `None` fields are left untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = invitations)]
pub(crate) struct InvitationStatusChange {
    pub status: &'static str,
    pub invitee_id: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = invitations)]
pub(crate) struct InvitationReissueChange<'a> {
    pub token_hash: &'a str,
    pub short_code: &'a str,
    pub status: &'static str,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Pending connections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = pending_connections)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PendingConnectionRow {
    pub id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_email: String,
    pub token_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_by: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl TryFrom<PendingConnectionRow> for PendingConnection {
    type Error = StoreError;

    fn try_from(row: PendingConnectionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PendingConnectionId::from_uuid(row.id),
            inviter_id: user_id(row.inviter_id),
            invitee_email: stored_email("pending_connections.invitee_email", &row.invitee_email)?,
            token_hash: row.token_hash,
            status: stored("pending_connections.status", &row.status)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            accepted_by: row.accepted_by.map(user_id),
            accepted_at: row.accepted_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = pending_connections)]
pub(crate) struct NewPendingConnectionRow<'a> {
    pub id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_email: &'a str,
    pub token_hash: &'a str,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'a> From<&'a PendingConnection> for NewPendingConnectionRow<'a> {
    fn from(connection: &'a PendingConnection) -> Self {
        Self {
            id: *connection.id.as_uuid(),
            inviter_id: *connection.inviter_id.as_uuid(),
            invitee_email: connection.invitee_email.as_ref(),
            token_hash: &connection.token_hash,
            status: connection.status.as_str(),
            created_at: connection.created_at,
            expires_at: connection.expires_at,
        }
    }
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = pending_connections)]
pub(crate) struct PendingConnectionChange {
    pub status: &'static str,
    pub accepted_by: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = rooms)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RoomRow {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

impl From<RoomRow> for Room {
    fn from(row: RoomRow) -> Self {
        Self {
            id: RoomId::from_uuid(row.id),
            name: row.name,
            created_by: user_id(row.created_by),
            is_private: row.is_private,
            created_at: row.created_at,
        }
    }
}

impl From<&Room> for RoomRow {
    fn from(room: &Room) -> Self {
        Self {
            id: *room.id.as_uuid(),
            name: room.name.clone(),
            created_by: *room.created_by.as_uuid(),
            is_private: room.is_private,
            created_at: room.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = room_members)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RoomMemberRow {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

impl TryFrom<RoomMemberRow> for RoomMember {
    type Error = StoreError;

    fn try_from(row: RoomMemberRow) -> Result<Self, Self::Error> {
        Ok(Self {
            room_id: RoomId::from_uuid(row.room_id),
            user_id: user_id(row.user_id),
            role: stored("room_members.role", &row.role)?,
            joined_at: row.joined_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = room_members)]
pub(crate) struct NewRoomMemberRow {
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub role: &'static str,
    pub joined_at: DateTime<Utc>,
}

impl From<&RoomMember> for NewRoomMemberRow {
    fn from(member: &RoomMember) -> Self {
        Self {
            room_id: *member.room_id.as_uuid(),
            user_id: *member.user_id.as_uuid(),
            role: member.role.as_str(),
            joined_at: member.joined_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = room_invites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct RoomInviteRow {
    pub id: Uuid,
    pub room_id: Uuid,
    pub invited_by: Uuid,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_by: Option<Uuid>,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<RoomInviteRow> for RoomInvite {
    fn from(row: RoomInviteRow) -> Self {
        Self {
            id: RoomInviteId::from_uuid(row.id),
            room_id: RoomId::from_uuid(row.room_id),
            invited_by: user_id(row.invited_by),
            invite_code: row.invite_code,
            created_at: row.created_at,
            expires_at: row.expires_at,
            used_by: row.used_by.map(user_id),
            used_at: row.used_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = room_invites)]
pub(crate) struct NewRoomInviteRow<'a> {
    pub id: Uuid,
    pub room_id: Uuid,
    pub invited_by: Uuid,
    pub invite_code: &'a str,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'a> From<&'a RoomInvite> for NewRoomInviteRow<'a> {
    fn from(invite: &'a RoomInvite) -> Self {
        Self {
            id: *invite.id.as_uuid(),
            room_id: *invite.room_id.as_uuid(),
            invited_by: *invite.invited_by.as_uuid(),
            invite_code: &invite.invite_code,
            created_at: invite.created_at,
            expires_at: invite.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = contacts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ContactRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub contact_name: String,
    pub contact_email: Option<String>,
    pub relationship: Option<String>,
    pub linked_user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ContactRow> for Contact {
    type Error = StoreError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        let relationship = row
            .relationship
            .as_deref()
            .map(|raw| {
                Relationship::parse(raw).ok_or_else(|| {
                    StoreError::query(format!("corrupt contacts.relationship: {raw}"))
                })
            })
            .transpose()?;
        Ok(Self {
            id: ContactId::from_uuid(row.id),
            user_id: user_id(row.user_id),
            contact_name: row.contact_name,
            contact_email: row
                .contact_email
                .as_deref()
                .map(|raw| stored_email("contacts.contact_email", raw))
                .transpose()?,
            relationship,
            linked_user_id: row.linked_user_id.map(user_id),
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contacts)]
pub(crate) struct NewContactRow<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub contact_name: &'a str,
    pub contact_email: Option<&'a str>,
    pub relationship: Option<&'static str>,
    pub linked_user_id: Option<Uuid>,
    pub notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a Contact> for NewContactRow<'a> {
    fn from(contact: &'a Contact) -> Self {
        Self {
            id: *contact.id.as_uuid(),
            user_id: *contact.user_id.as_uuid(),
            contact_name: &contact.contact_name,
            contact_email: contact.contact_email.as_ref().map(AsRef::as_ref),
            relationship: contact.relationship.map(Relationship::as_str),
            linked_user_id: contact.linked_user_id.map(|id| *id.as_uuid()),
            notes: contact.notes.as_deref(),
            created_at: contact.created_at,
        }
    }
}
