//! Unit of work over the in-memory tables.

use std::cmp::Reverse;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use super::{Fault, FaultPlan, Race, Tables};
use crate::domain::linking::{
    Contact, ContactId, Invitation, InvitationId, InvitationStatus, Membership, PendingConnection,
    PendingConnectionId, PendingConnectionStatus, Relationship, Room, RoomId, RoomInvite,
    RoomMember, TokenIssuer,
};
use crate::domain::ports::{
    ContactRepository, INVITATIONS_TOKEN_CONSTRAINT,
    InvitationReissue, InvitationRepository, InvitationTransition, LinkingUnit,
    PENDING_CONNECTIONS_TOKEN_CONSTRAINT, PendingConnectionRepository,
    ROOM_INVITES_CODE_CONSTRAINT, RoomRepository, StoreError, StoreResult,
    USERS_EMAIL_CONSTRAINT, USERS_USERNAME_CONSTRAINT, UserRepository,
};
use crate::domain::{EmailAddress, UserAccount, UserId};

pub(super) struct InMemoryUnit {
    committed: OwnedMutexGuard<Tables>,
    work: Tables,
    faults: FaultPlan,
}

impl InMemoryUnit {
    pub(super) fn new(committed: OwnedMutexGuard<Tables>, faults: FaultPlan) -> Self {
        let work = committed.clone();
        Self {
            committed,
            work,
            faults,
        }
    }

    fn invitation_mut(&mut self, id: &InvitationId) -> Option<&mut Invitation> {
        self.work
            .invitations
            .iter_mut()
            .find(|invitation| invitation.id == *id)
    }
}

fn count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| Reverse(created_at(row)));
    rows
}

#[async_trait]
impl UserRepository for InMemoryUnit {
    async fn find_user(&mut self, id: &UserId) -> StoreResult<Option<UserAccount>> {
        Ok(self.work.users.iter().find(|user| user.id == *id).cloned())
    }

    async fn find_user_by_email(
        &mut self,
        email: &EmailAddress,
    ) -> StoreResult<Option<UserAccount>> {
        Ok(self
            .work
            .users
            .iter()
            .find(|user| user.email == *email)
            .cloned())
    }

    async fn username_exists(&mut self, username: &str) -> StoreResult<bool> {
        Ok(self.work.users.iter().any(|user| user.username == username))
    }

    async fn insert_user(&mut self, user: &UserAccount) -> StoreResult<()> {
        self.faults.trip(Fault::InsertUser)?;
        if self.work.users.iter().any(|row| row.email == user.email) {
            return Err(StoreError::duplicate(USERS_EMAIL_CONSTRAINT));
        }
        if self.work.users.iter().any(|row| row.username == user.username) {
            return Err(StoreError::duplicate(USERS_USERNAME_CONSTRAINT));
        }
        self.work.users.push(user.clone());
        Ok(())
    }
}

#[async_trait]
impl InvitationRepository for InMemoryUnit {
    async fn insert_invitation(&mut self, invitation: &Invitation) -> StoreResult<bool> {
        self.faults.trip(Fault::InsertInvitation)?;
        if self.faults.lost(Race::InsertInvitation)? {
            self.work.invitations.push(Invitation {
                id: InvitationId::random(),
                token_hash: TokenIssuer::hash_token(&invitation.token_hash),
                ..invitation.clone()
            });
            return Ok(false);
        }
        let rows = &self.work.invitations;
        if rows.iter().any(|row| row.token_hash == invitation.token_hash) {
            return Ok(false);
        }
        let pair_taken = invitation.status == InvitationStatus::Pending
            && rows.iter().any(|row| {
                row.status == InvitationStatus::Pending
                    && row.inviter_id == invitation.inviter_id
                    && row.invitee_email == invitation.invitee_email
            });
        if pair_taken {
            return Ok(false);
        }
        self.work.invitations.push(invitation.clone());
        Ok(true)
    }

    async fn find_invitation(&mut self, id: &InvitationId) -> StoreResult<Option<Invitation>> {
        Ok(self
            .work
            .invitations
            .iter()
            .find(|invitation| invitation.id == *id)
            .cloned())
    }

    async fn find_invitation_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<Invitation>> {
        Ok(self
            .work
            .invitations
            .iter()
            .find(|invitation| invitation.token_hash == token_hash)
            .cloned())
    }

    async fn find_invitations_by_short_code(
        &mut self,
        short_code: &str,
    ) -> StoreResult<Vec<Invitation>> {
        let rows = self
            .work
            .invitations
            .iter()
            .filter(|invitation| invitation.short_code == short_code)
            .cloned()
            .collect();
        Ok(newest_first(rows, |invitation| invitation.created_at))
    }

    async fn find_pending_invitation(
        &mut self,
        inviter_id: &UserId,
        invitee_email: &EmailAddress,
    ) -> StoreResult<Option<Invitation>> {
        let rows = self
            .work
            .invitations
            .iter()
            .filter(|invitation| {
                invitation.status == InvitationStatus::Pending
                    && invitation.inviter_id == *inviter_id
                    && invitation.invitee_email == *invitee_email
            })
            .cloned()
            .collect();
        Ok(newest_first(rows, |invitation| invitation.created_at)
            .into_iter()
            .next())
    }

    async fn short_code_in_use(
        &mut self,
        short_code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(self.work.invitations.iter().any(|invitation| {
            invitation.short_code == short_code && invitation.is_active_at(now)
        }))
    }

    async fn transition_invitation(
        &mut self,
        id: &InvitationId,
        from: &[InvitationStatus],
        change: InvitationTransition,
    ) -> StoreResult<bool> {
        self.faults.trip(Fault::TransitionInvitation)?;
        if self.faults.lost(Race::TransitionInvitation)? {
            return Ok(false);
        }
        let Some(invitation) = self.invitation_mut(id) else {
            return Ok(false);
        };
        if !from.contains(&invitation.status) {
            return Ok(false);
        }
        invitation.status = change.to;
        if change.invitee_id.is_some() {
            invitation.invitee_id = change.invitee_id;
        }
        if change.accepted_at.is_some() {
            invitation.accepted_at = change.accepted_at;
        }
        Ok(true)
    }

    async fn reissue_invitation(
        &mut self,
        id: &InvitationId,
        reissue: InvitationReissue,
    ) -> StoreResult<bool> {
        let token_taken = self
            .work
            .invitations
            .iter()
            .any(|row| row.id != *id && row.token_hash == reissue.token_hash);
        if token_taken {
            return Err(StoreError::duplicate(INVITATIONS_TOKEN_CONSTRAINT));
        }
        let Some(invitation) = self.invitation_mut(id) else {
            return Ok(false);
        };
        if !matches!(
            invitation.status,
            InvitationStatus::Pending | InvitationStatus::Expired
        ) {
            return Ok(false);
        }
        invitation.status = InvitationStatus::Pending;
        invitation.token_hash = reissue.token_hash;
        invitation.short_code = reissue.short_code;
        invitation.expires_at = reissue.expires_at;
        Ok(true)
    }

    async fn expire_invitations(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut expired = 0;
        for invitation in &mut self.work.invitations {
            if invitation.status == InvitationStatus::Pending && invitation.is_expired_at(now) {
                invitation.status = InvitationStatus::Expired;
                expired += 1;
            }
        }
        Ok(count(expired))
    }

    async fn count_accepted_links(&mut self, user_id: &UserId) -> StoreResult<u64> {
        let links = self
            .work
            .invitations
            .iter()
            .filter(|invitation| {
                invitation.status == InvitationStatus::Accepted
                    && (invitation.inviter_id == *user_id
                        || invitation.invitee_id == Some(*user_id))
            })
            .count();
        Ok(count(links))
    }

    async fn list_sent(
        &mut self,
        inviter_id: &UserId,
        status: Option<InvitationStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Invitation>> {
        let rows = self
            .work
            .invitations
            .iter()
            .filter(|invitation| {
                invitation.inviter_id == *inviter_id
                    && status.is_none_or(|wanted| invitation.status == wanted)
            })
            .cloned()
            .collect();
        Ok(newest_first(rows, |invitation| invitation.created_at)
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn list_received(
        &mut self,
        email: &EmailAddress,
        status: Option<InvitationStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Invitation>> {
        let rows = self
            .work
            .invitations
            .iter()
            .filter(|invitation| {
                invitation.invitee_email == *email
                    && status.is_none_or(|wanted| invitation.status == wanted)
            })
            .cloned()
            .collect();
        Ok(newest_first(rows, |invitation| invitation.created_at)
            .into_iter()
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl PendingConnectionRepository for InMemoryUnit {
    async fn insert_pending_connection(
        &mut self,
        connection: &PendingConnection,
    ) -> StoreResult<()> {
        let taken = self
            .work
            .pending_connections
            .iter()
            .any(|row| row.token_hash == connection.token_hash);
        if taken {
            return Err(StoreError::duplicate(PENDING_CONNECTIONS_TOKEN_CONSTRAINT));
        }
        self.work.pending_connections.push(connection.clone());
        Ok(())
    }

    async fn find_pending_connection_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<PendingConnection>> {
        Ok(self
            .work
            .pending_connections
            .iter()
            .find(|connection| connection.token_hash == token_hash)
            .cloned())
    }

    async fn find_open_pending_connection(
        &mut self,
        inviter_id: &UserId,
        invitee_email: &EmailAddress,
    ) -> StoreResult<Option<PendingConnection>> {
        let rows = self
            .work
            .pending_connections
            .iter()
            .filter(|connection| {
                connection.status == PendingConnectionStatus::Pending
                    && connection.inviter_id == *inviter_id
                    && connection.invitee_email == *invitee_email
            })
            .cloned()
            .collect();
        Ok(newest_first(rows, |connection| connection.created_at)
            .into_iter()
            .next())
    }

    async fn transition_pending_connection(
        &mut self,
        id: &PendingConnectionId,
        to: PendingConnectionStatus,
        accepted_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let found = self
            .work
            .pending_connections
            .iter_mut()
            .find(|connection| connection.id == *id);
        let Some(connection) = found else {
            return Ok(false);
        };
        if connection.status != PendingConnectionStatus::Pending {
            return Ok(false);
        }
        connection.status = to;
        if to == PendingConnectionStatus::Accepted {
            connection.accepted_by = accepted_by;
            connection.accepted_at = Some(at);
        }
        Ok(true)
    }

    async fn count_accepted_connections(&mut self, user_id: &UserId) -> StoreResult<u64> {
        let links = self
            .work
            .pending_connections
            .iter()
            .filter(|connection| {
                connection.status == PendingConnectionStatus::Accepted
                    && (connection.inviter_id == *user_id
                        || connection.accepted_by == Some(*user_id))
            })
            .count();
        Ok(count(links))
    }

    async fn expire_pending_connections(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut expired = 0;
        for connection in &mut self.work.pending_connections {
            if connection.status == PendingConnectionStatus::Pending
                && connection.is_expired_at(now)
            {
                connection.status = PendingConnectionStatus::Expired;
                expired += 1;
            }
        }
        Ok(count(expired))
    }
}

#[async_trait]
impl RoomRepository for InMemoryUnit {
    async fn insert_room(&mut self, room: &Room) -> StoreResult<()> {
        self.faults.trip(Fault::InsertRoom)?;
        self.work.rooms.push(room.clone());
        Ok(())
    }

    async fn add_member(&mut self, member: &RoomMember) -> StoreResult<bool> {
        self.faults.trip(Fault::AddMember)?;
        let exists = self
            .work
            .room_members
            .iter()
            .any(|row| row.room_id == member.room_id && row.user_id == member.user_id);
        if exists {
            return Ok(false);
        }
        self.work.room_members.push(member.clone());
        Ok(true)
    }

    async fn is_member(&mut self, room_id: &RoomId, user_id: &UserId) -> StoreResult<bool> {
        Ok(self
            .work
            .room_members
            .iter()
            .any(|row| row.room_id == *room_id && row.user_id == *user_id))
    }

    async fn memberships(&mut self, user_id: &UserId) -> StoreResult<Vec<Membership>> {
        let tables = &self.work;
        Ok(tables
            .room_members
            .iter()
            .filter(|member| member.user_id == *user_id)
            .filter_map(|member| {
                let room = tables.rooms.iter().find(|room| room.id == member.room_id)?;
                let member_count = tables
                    .room_members
                    .iter()
                    .filter(|row| row.room_id == room.id)
                    .count();
                Some(Membership {
                    room: room.clone(),
                    joined_at: member.joined_at,
                    member_count,
                })
            })
            .collect())
    }

    async fn find_room(&mut self, room_id: &RoomId) -> StoreResult<Option<Room>> {
        Ok(self
            .work
            .rooms
            .iter()
            .find(|room| room.id == *room_id)
            .cloned())
    }

    async fn room_members(&mut self, room_id: &RoomId) -> StoreResult<Vec<RoomMember>> {
        let mut members: Vec<RoomMember> = self
            .work
            .room_members
            .iter()
            .filter(|member| member.room_id == *room_id)
            .cloned()
            .collect();
        members.sort_by_key(|member| member.joined_at);
        Ok(members)
    }

    async fn insert_room_invite(&mut self, invite: &RoomInvite) -> StoreResult<()> {
        let taken = self
            .work
            .room_invites
            .iter()
            .any(|row| row.invite_code == invite.invite_code);
        if taken {
            return Err(StoreError::duplicate(ROOM_INVITES_CODE_CONSTRAINT));
        }
        self.work.room_invites.push(invite.clone());
        Ok(())
    }

    async fn find_room_invite(&mut self, invite_code: &str) -> StoreResult<Option<RoomInvite>> {
        Ok(self
            .work
            .room_invites
            .iter()
            .find(|invite| invite.invite_code == invite_code)
            .cloned())
    }

    async fn mark_room_invite_used(
        &mut self,
        invite: &RoomInvite,
        used_by: &UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let found = self
            .work
            .room_invites
            .iter_mut()
            .find(|row| row.id == invite.id && row.used_by.is_none());
        let Some(row) = found else {
            return Ok(false);
        };
        row.used_by = Some(*used_by);
        row.used_at = Some(at);
        Ok(true)
    }
}

#[async_trait]
impl ContactRepository for InMemoryUnit {
    async fn find_contact_by_name(
        &mut self,
        user_id: &UserId,
        contact_name: &str,
        relationship: Option<Relationship>,
    ) -> StoreResult<Option<Contact>> {
        let wanted = contact_name.to_lowercase();
        Ok(self
            .work
            .contacts
            .iter()
            .find(|contact| {
                contact.user_id == *user_id
                    && contact.contact_name.to_lowercase() == wanted
                    && relationship.is_none_or(|kind| contact.relationship == Some(kind))
            })
            .cloned())
    }

    async fn insert_contact(&mut self, contact: &Contact) -> StoreResult<bool> {
        self.faults.trip(Fault::InsertContact)?;
        if contact.relationship == Some(Relationship::CoParent) {
            if self.faults.lost(Race::InsertContact)? {
                self.work.contacts.push(Contact {
                    id: ContactId::random(),
                    ..contact.clone()
                });
                return Ok(false);
            }
            let name = contact.contact_name.to_lowercase();
            let taken = self.work.contacts.iter().any(|row| {
                row.user_id == contact.user_id
                    && row.relationship == Some(Relationship::CoParent)
                    && row.contact_name.to_lowercase() == name
            });
            if taken {
                return Ok(false);
            }
        }
        self.work.contacts.push(contact.clone());
        Ok(true)
    }

    async fn list_contacts(&mut self, user_id: &UserId) -> StoreResult<Vec<Contact>> {
        let mut contacts: Vec<Contact> = self
            .work
            .contacts
            .iter()
            .filter(|contact| contact.user_id == *user_id)
            .cloned()
            .collect();
        contacts.sort_by_key(|contact| contact.created_at);
        Ok(contacts)
    }
}

#[async_trait]
impl LinkingUnit for InMemoryUnit {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.faults.trip(Fault::Commit)?;
        let Self {
            mut committed,
            work,
            ..
        } = *self;
        *committed = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
