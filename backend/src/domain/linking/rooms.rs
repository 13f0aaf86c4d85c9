//! Room creation, current-room selection, shared-room merging and room
//! invite codes.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{error, info};

use super::{
    ContactSync, Membership, Room, RoomId, RoomInvite, RoomInviteId, RoomMember, RoomRole,
    TokenIssuer, begin, finish, map_store_error,
};
use crate::domain::ports::{
    LinkingStore, LinkingUnit, RoomRepository, StoreError, StoreResult, UserRepository,
};
use crate::domain::{Error, UserAccount, UserId};

/// Attempts at drawing an unused room invite code.
const INVITE_CODE_ATTEMPTS: usize = 5;
/// Inviter label used when the inviter has no display name.
const FALLBACK_INVITER_LABEL: &str = "Co-Parent";

/// Room shared by two linked accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedRoom {
    pub room: Room,
    /// The invitee is a member after the merge.
    pub room_joined: bool,
}

/// Room invite code handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRoomInvite {
    pub invite_id: RoomInviteId,
    pub invite_code: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of looking up a room invite code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomInviteValidation {
    /// The code can be redeemed.
    Valid {
        room_id: RoomId,
        room_name: String,
        invited_by: UserId,
    },
    /// No invite carries this code.
    NotFound,
    /// The invite was already redeemed.
    Used,
    /// The invite passed its expiry.
    Expired,
}

/// Pick the room a user currently talks in.
///
/// Memberships are ordered by `joined_at` descending with the room id as a
/// tiebreak; the first shared room wins, otherwise the most recent room.
///
/// # Examples
/// ```
/// use tandem::domain::linking::select_current_room;
///
/// assert!(select_current_room(Vec::new()).is_none());
/// ```
#[must_use]
pub fn select_current_room(mut memberships: Vec<Membership>) -> Option<Membership> {
    memberships.sort_by_key(|m| Reverse((m.joined_at, m.room.id)));
    let shared = memberships.iter().position(Membership::is_shared);
    match shared {
        Some(index) => Some(memberships.swap_remove(index)),
        None => memberships.into_iter().next(),
    }
}

/// Creates and merges rooms and manages room invite codes.
#[derive(Clone)]
pub struct RoomMerger {
    store: Arc<dyn LinkingStore>,
    clock: Arc<dyn Clock>,
    invites: TokenIssuer,
    contacts: ContactSync,
}

impl RoomMerger {
    /// Create a merger; `invites` sets the room invite lifetime.
    pub fn new(
        store: Arc<dyn LinkingStore>,
        clock: Arc<dyn Clock>,
        invites: TokenIssuer,
        contacts: ContactSync,
    ) -> Self {
        Self {
            store,
            clock,
            invites,
            contacts,
        }
    }

    /// Create a private room owned by `user_id`.
    pub async fn create_private_room(
        &self,
        user_id: &UserId,
        display_name: &str,
    ) -> Result<Room, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self
            .create_private_room_in(unit.as_mut(), user_id, display_name)
            .await
            .map_err(room_error);
        finish(unit, result).await
    }

    /// [`Self::create_private_room`] inside an open unit.
    pub async fn create_private_room_in(
        &self,
        unit: &mut dyn LinkingUnit,
        user_id: &UserId,
        display_name: &str,
    ) -> StoreResult<Room> {
        let now = self.clock.utc();
        let room = Room {
            id: RoomId::random(),
            name: format!("{display_name}'s Room"),
            created_by: *user_id,
            is_private: true,
            created_at: now,
        };
        unit.insert_room(&room).await?;
        unit.add_member(&RoomMember {
            room_id: room.id,
            user_id: *user_id,
            role: RoomRole::Owner,
            joined_at: now,
        })
        .await?;
        Ok(room)
    }

    /// The user's current room, if they belong to any.
    pub async fn get_user_room(&self, user_id: &UserId) -> Result<Option<Room>, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self
            .get_user_room_in(unit.as_mut(), user_id)
            .await
            .map(|current| current.map(|membership| membership.room))
            .map_err(map_store_error);
        finish(unit, result).await
    }

    /// [`Self::get_user_room`] inside an open unit, with member counts.
    pub async fn get_user_room_in(
        &self,
        unit: &mut dyn LinkingUnit,
        user_id: &UserId,
    ) -> StoreResult<Option<Membership>> {
        let memberships = unit.memberships(user_id).await?;
        Ok(select_current_room(memberships))
    }

    /// Put `inviter` and `invitee` in one shared room.
    pub async fn merge_or_create_shared_room(
        &self,
        inviter_id: &UserId,
        invitee_id: &UserId,
    ) -> Result<SharedRoom, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let inviter = unit.find_user(inviter_id).await.map_err(room_error)?;
            let invitee = unit.find_user(invitee_id).await.map_err(room_error)?;
            let (Some(inviter), Some(invitee)) = (inviter, invitee) else {
                return Err(Error::not_found("User not found"));
            };
            self.merge_or_create_shared_room_in(unit.as_mut(), &inviter, &invitee)
                .await
                .map_err(room_error)
        }
        .await;
        finish(unit, result).await
    }

    /// [`Self::merge_or_create_shared_room`] inside an open unit.
    ///
    /// A shared room held by the inviter is preferred, then one held by the
    /// invitee. Otherwise a new room is created. Solo rooms are left alone.
    pub async fn merge_or_create_shared_room_in(
        &self,
        unit: &mut dyn LinkingUnit,
        inviter: &UserAccount,
        invitee: &UserAccount,
    ) -> StoreResult<SharedRoom> {
        let now = self.clock.utc();
        for (holder, joiner) in [(inviter, invitee), (invitee, inviter)] {
            let Some(current) = self.get_user_room_in(unit, &holder.id).await? else {
                continue;
            };
            if !current.is_shared() {
                continue;
            }
            unit.add_member(&RoomMember {
                room_id: current.room.id,
                user_id: joiner.id,
                role: RoomRole::Member,
                joined_at: now,
            })
            .await?;
            let room_joined = unit.is_member(&current.room.id, &invitee.id).await?;
            return Ok(SharedRoom {
                room: current.room,
                room_joined,
            });
        }

        let room = Room {
            id: RoomId::random(),
            name: shared_room_name(inviter, invitee),
            created_by: inviter.id,
            is_private: true,
            created_at: now,
        };
        unit.insert_room(&room).await?;
        for (user_id, role) in [(inviter.id, RoomRole::Owner), (invitee.id, RoomRole::Member)] {
            unit.add_member(&RoomMember {
                room_id: room.id,
                user_id,
                role,
                joined_at: now,
            })
            .await?;
        }
        let room_joined = unit.is_member(&room.id, &invitee.id).await?;
        info!(room_id = %room.id, inviter = %inviter.id, invitee = %invitee.id, "shared room created");
        Ok(SharedRoom { room, room_joined })
    }

    /// Issue a room invite code. Only members may invite.
    pub async fn create_invite(
        &self,
        room_id: &RoomId,
        invited_by: &UserId,
    ) -> Result<IssuedRoomInvite, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self.create_invite_in(unit.as_mut(), room_id, invited_by).await;
        finish(unit, result).await
    }

    async fn create_invite_in(
        &self,
        unit: &mut dyn LinkingUnit,
        room_id: &RoomId,
        invited_by: &UserId,
    ) -> Result<IssuedRoomInvite, Error> {
        let is_member = unit
            .is_member(room_id, invited_by)
            .await
            .map_err(map_store_error)?;
        if !is_member {
            return Err(Error::forbidden("Not a member of this room"));
        }

        let now = self.clock.utc();
        for _ in 0..INVITE_CODE_ATTEMPTS {
            let code = self.invites.generate_room_invite_code();
            let taken = unit
                .find_room_invite(&code)
                .await
                .map_err(map_store_error)?
                .is_some();
            if taken {
                continue;
            }
            let invite = RoomInvite {
                id: RoomInviteId::random(),
                room_id: *room_id,
                invited_by: *invited_by,
                invite_code: code,
                created_at: now,
                expires_at: self.invites.calculate_expiration(now)?,
                used_by: None,
                used_at: None,
            };
            unit.insert_room_invite(&invite)
                .await
                .map_err(map_store_error)?;
            return Ok(IssuedRoomInvite {
                invite_id: invite.id,
                invite_code: invite.invite_code,
                expires_at: invite.expires_at,
            });
        }
        error!(%room_id, "exhausted room invite code attempts");
        Err(Error::internal("could not allocate a room invite code"))
    }

    /// Look up an invite code without redeeming it.
    pub async fn validate_invite(&self, code: &str) -> Result<RoomInviteValidation, Error> {
        let code = TokenIssuer::normalize_short_code(code);
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self
            .validate_invite_in(unit.as_mut(), &code)
            .await
            .map_err(map_store_error);
        finish(unit, result).await
    }

    async fn validate_invite_in(
        &self,
        unit: &mut dyn LinkingUnit,
        code: &str,
    ) -> StoreResult<RoomInviteValidation> {
        let Some(invite) = unit.find_room_invite(code).await? else {
            return Ok(RoomInviteValidation::NotFound);
        };
        if invite.used_by.is_some() {
            return Ok(RoomInviteValidation::Used);
        }
        if invite.is_expired_at(self.clock.utc()) {
            return Ok(RoomInviteValidation::Expired);
        }
        let room_name = unit
            .find_room(&invite.room_id)
            .await?
            .map(|room| room.name)
            .unwrap_or_default();
        Ok(RoomInviteValidation::Valid {
            room_id: invite.room_id,
            room_name,
            invited_by: invite.invited_by,
        })
    }

    /// Redeem an invite code: join the room and link contacts with every
    /// existing member.
    pub async fn use_invite(&self, code: &str, user_id: &UserId) -> Result<RoomId, Error> {
        let code = TokenIssuer::normalize_short_code(code);
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self.use_invite_in(unit.as_mut(), &code, user_id).await;
        finish(unit, result).await
    }

    async fn use_invite_in(
        &self,
        unit: &mut dyn LinkingUnit,
        code: &str,
        user_id: &UserId,
    ) -> Result<RoomId, Error> {
        let now = self.clock.utc();
        let invite = unit
            .find_room_invite(code)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| Error::not_found("Invite code not found"))?;
        if invite.used_by.is_some() {
            return Err(Error::conflict("Invite code already used"));
        }
        if invite.is_expired_at(now) {
            return Err(Error::expired("Invite code has expired"));
        }
        if unit
            .is_member(&invite.room_id, user_id)
            .await
            .map_err(map_store_error)?
        {
            return Err(Error::conflict("Already a member of this room"));
        }
        if !unit
            .mark_room_invite_used(&invite, user_id, now)
            .await
            .map_err(map_store_error)?
        {
            return Err(Error::conflict("Invite code already used"));
        }
        unit.add_member(&RoomMember {
            room_id: invite.room_id,
            user_id: *user_id,
            role: RoomRole::Member,
            joined_at: now,
        })
        .await
        .map_err(room_error)?;
        self.contacts
            .ensure_contacts_for_room_members_in(unit, &invite.room_id)
            .await
            .map_err(|err| {
                error!(error = %err, room_id = %invite.room_id, "room contact sync failed");
                Error::contact_failed()
            })?;
        info!(room_id = %invite.room_id, %user_id, "room invite redeemed");
        Ok(invite.room_id)
    }
}

fn shared_room_name(inviter: &UserAccount, invitee: &UserAccount) -> String {
    let inviter_label = Some(inviter.display_name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_INVITER_LABEL);
    format!("{inviter_label} & {}", invitee.display_name)
}

pub(super) fn room_error(err: StoreError) -> Error {
    error!(error = %err, "room operation failed");
    Error::room_failed()
}
