//! Transactional store port for the linking subsystem.
//!
//! A [`LinkingStore`] hands out [`LinkingUnit`]s. Every read and write issued
//! through one unit belongs to a single transaction that becomes visible to
//! other units only after [`LinkingUnit::commit`]. Dropping a unit without
//! committing discards its writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::linking::{
    Contact, Invitation, InvitationId, InvitationStatus, Membership, PendingConnection,
    PendingConnectionId, PendingConnectionStatus, Relationship, Room, RoomId, RoomInvite, RoomMember,
};
use crate::domain::{EmailAddress, UserAccount, UserId};

/// Unique constraint on `users.email`.
pub const USERS_EMAIL_CONSTRAINT: &str = "users_email_key";
/// Unique constraint on `users.username`.
pub const USERS_USERNAME_CONSTRAINT: &str = "users_username_key";
/// Unique constraint on `invitations.token_hash`.
pub const INVITATIONS_TOKEN_CONSTRAINT: &str = "invitations_token_hash_key";
/// Unique constraint on `pending_connections.token_hash`.
pub const PENDING_CONNECTIONS_TOKEN_CONSTRAINT: &str = "pending_connections_token_hash_key";
/// Unique constraint on `room_invites.invite_code`.
pub const ROOM_INVITES_CODE_CONSTRAINT: &str = "room_invites_invite_code_key";

define_port_error! {
    /// Persistence errors raised by linking store adapters.
    pub enum StoreError {
        /// Store connection could not be established or was lost.
        Connection { message: String } => "linking store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "linking store query failed: {message}",
        /// A unique constraint rejected the write.
        Duplicate { constraint: String } => "linking store unique violation on {constraint}",
    }
}

impl StoreError {
    /// Whether this is a unique violation on `constraint`.
    #[must_use]
    pub fn is_duplicate_of(&self, constraint: &str) -> bool {
        matches!(self, Self::Duplicate { constraint: name } if name == constraint)
    }
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// User rows.
#[async_trait]
pub trait UserRepository: Send {
    /// Fetch a user by identifier.
    async fn find_user(&mut self, id: &UserId) -> StoreResult<Option<UserAccount>>;

    /// Fetch a user by normalised email.
    async fn find_user_by_email(&mut self, email: &EmailAddress)
    -> StoreResult<Option<UserAccount>>;

    /// Whether a username handle is taken.
    async fn username_exists(&mut self, username: &str) -> StoreResult<bool>;

    /// Insert a new user; duplicates surface as [`StoreError::Duplicate`].
    async fn insert_user(&mut self, user: &UserAccount) -> StoreResult<()>;
}

/// Invitation rows.
#[async_trait]
pub trait InvitationRepository: Send {
    /// Insert an invitation. Returns `false` and writes nothing when the token
    /// hash is taken or the inviter already holds a pending invitation for
    /// the same address.
    async fn insert_invitation(&mut self, invitation: &Invitation) -> StoreResult<bool>;

    /// Fetch by identifier.
    async fn find_invitation(&mut self, id: &InvitationId) -> StoreResult<Option<Invitation>>;

    /// Fetch by token hash.
    async fn find_invitation_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<Invitation>>;

    /// All invitations carrying `short_code`, most recent first.
    async fn find_invitations_by_short_code(
        &mut self,
        short_code: &str,
    ) -> StoreResult<Vec<Invitation>>;

    /// Latest pending invitation from `inviter_id` to `invitee_email`.
    async fn find_pending_invitation(
        &mut self,
        inviter_id: &UserId,
        invitee_email: &EmailAddress,
    ) -> StoreResult<Option<Invitation>>;

    /// Whether an unexpired pending invitation already uses `short_code`.
    async fn short_code_in_use(&mut self, short_code: &str, now: DateTime<Utc>)
    -> StoreResult<bool>;

    /// Move an invitation to `to` only if its status is one of `from`.
    /// Returns whether a row changed.
    async fn transition_invitation(
        &mut self,
        id: &InvitationId,
        from: &[InvitationStatus],
        change: InvitationTransition,
    ) -> StoreResult<bool>;

    /// Re-arm a pending or expired invitation with a new token, code and
    /// expiry. Returns whether a row changed.
    async fn reissue_invitation(
        &mut self,
        id: &InvitationId,
        reissue: InvitationReissue,
    ) -> StoreResult<bool>;

    /// Mark pending invitations with `expires_at <= now` expired.
    async fn expire_invitations(&mut self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Accepted co-parent invitations where `user_id` is either party.
    async fn count_accepted_links(&mut self, user_id: &UserId) -> StoreResult<u64>;

    /// Invitations sent by `inviter_id`, newest first.
    async fn list_sent(
        &mut self,
        inviter_id: &UserId,
        status: Option<InvitationStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Invitation>>;

    /// Invitations addressed to `email`, newest first.
    async fn list_received(
        &mut self,
        email: &EmailAddress,
        status: Option<InvitationStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Invitation>>;
}

/// Status change applied by [`InvitationRepository::transition_invitation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvitationTransition {
    /// Target status.
    pub to: InvitationStatus,
    /// Responding user, recorded on accept and decline.
    pub invitee_id: Option<UserId>,
    /// Acceptance timestamp, recorded on accept.
    pub accepted_at: Option<DateTime<Utc>>,
}

impl InvitationTransition {
    /// Transition to `status` with no responder.
    #[must_use]
    pub const fn to(status: InvitationStatus) -> Self {
        Self {
            to: status,
            invitee_id: None,
            accepted_at: None,
        }
    }

    /// Acceptance by `invitee_id` at `at`.
    #[must_use]
    pub const fn accepted(invitee_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            to: InvitationStatus::Accepted,
            invitee_id: Some(invitee_id),
            accepted_at: Some(at),
        }
    }

    /// Refusal by `invitee_id`.
    #[must_use]
    pub const fn declined(invitee_id: UserId) -> Self {
        Self {
            to: InvitationStatus::Declined,
            invitee_id: Some(invitee_id),
            accepted_at: None,
        }
    }
}

/// New credentials for [`InvitationRepository::reissue_invitation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationReissue {
    pub token_hash: String,
    pub short_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Legacy pending connection rows.
#[async_trait]
pub trait PendingConnectionRepository: Send {
    /// Insert a connection; duplicates surface as [`StoreError::Duplicate`].
    async fn insert_pending_connection(&mut self, connection: &PendingConnection)
    -> StoreResult<()>;

    /// Fetch by token hash.
    async fn find_pending_connection_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<PendingConnection>>;

    /// Latest pending connection from `inviter_id` to `invitee_email`.
    async fn find_open_pending_connection(
        &mut self,
        inviter_id: &UserId,
        invitee_email: &EmailAddress,
    ) -> StoreResult<Option<PendingConnection>>;

    /// Conditional status change from `pending`. Returns whether a row
    /// changed.
    async fn transition_pending_connection(
        &mut self,
        id: &PendingConnectionId,
        to: PendingConnectionStatus,
        accepted_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Accepted connections where `user_id` is either party.
    async fn count_accepted_connections(&mut self, user_id: &UserId) -> StoreResult<u64>;

    /// Mark pending connections with `expires_at <= now` expired.
    async fn expire_pending_connections(&mut self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Rooms, memberships and room invite codes.
#[async_trait]
pub trait RoomRepository: Send {
    /// Insert a room.
    async fn insert_room(&mut self, room: &Room) -> StoreResult<()>;

    /// Insert a membership unless one already exists. Returns whether a row
    /// was written.
    async fn add_member(&mut self, member: &RoomMember) -> StoreResult<bool>;

    /// Whether `user_id` belongs to `room_id`.
    async fn is_member(&mut self, room_id: &RoomId, user_id: &UserId) -> StoreResult<bool>;

    /// Every room `user_id` belongs to, with member counts.
    async fn memberships(&mut self, user_id: &UserId) -> StoreResult<Vec<Membership>>;

    /// Fetch a room.
    async fn find_room(&mut self, room_id: &RoomId) -> StoreResult<Option<Room>>;

    /// Members of a room, ordered by `joined_at`.
    async fn room_members(&mut self, room_id: &RoomId) -> StoreResult<Vec<RoomMember>>;

    /// Insert an invite code; duplicates surface as [`StoreError::Duplicate`].
    async fn insert_room_invite(&mut self, invite: &RoomInvite) -> StoreResult<()>;

    /// Fetch an invite by code.
    async fn find_room_invite(&mut self, invite_code: &str) -> StoreResult<Option<RoomInvite>>;

    /// Record use of an invite only if it is unused. Returns whether a row
    /// changed.
    async fn mark_room_invite_used(
        &mut self,
        invite: &RoomInvite,
        used_by: &UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

/// Contact list rows.
#[async_trait]
pub trait ContactRepository: Send {
    /// Case-insensitive lookup by name. `relationship: None` matches any
    /// relationship, including none.
    async fn find_contact_by_name(
        &mut self,
        user_id: &UserId,
        contact_name: &str,
        relationship: Option<Relationship>,
    ) -> StoreResult<Option<Contact>>;

    /// Insert a contact. Returns `false` when the owner already holds a
    /// co-parent contact under the same name, ignoring case.
    async fn insert_contact(&mut self, contact: &Contact) -> StoreResult<bool>;

    /// All contacts owned by `user_id`, oldest first.
    async fn list_contacts(&mut self, user_id: &UserId) -> StoreResult<Vec<Contact>>;
}

/// One transaction spanning every linking table.
#[async_trait]
pub trait LinkingUnit:
    UserRepository
    + InvitationRepository
    + PendingConnectionRepository
    + RoomRepository
    + ContactRepository
    + Send
{
    /// Make every write in this unit durable.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard every write in this unit.
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Factory for units of work.
#[async_trait]
pub trait LinkingStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> StoreResult<Box<dyn LinkingUnit>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn duplicate_matches_constraint() {
        let err = StoreError::duplicate(USERS_EMAIL_CONSTRAINT);
        assert!(err.is_duplicate_of(USERS_EMAIL_CONSTRAINT));
        assert!(!err.is_duplicate_of(USERS_USERNAME_CONSTRAINT));
        assert!(!StoreError::query("boom").is_duplicate_of(USERS_EMAIL_CONSTRAINT));
    }

    #[rstest]
    fn transition_constructors_set_responder() {
        let user = UserId::random();
        let now = Utc::now();
        let accepted = InvitationTransition::accepted(user, now);
        assert_eq!(accepted.to, InvitationStatus::Accepted);
        assert_eq!(accepted.invitee_id, Some(user));
        assert_eq!(accepted.accepted_at, Some(now));
        assert_eq!(
            InvitationTransition::to(InvitationStatus::Cancelled).invitee_id,
            None
        );
    }
}
