//! Room, membership, room invite and contact queries for a Diesel unit.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, exists};
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::UserId;
use crate::domain::linking::{
    Contact, Membership, Relationship, Room, RoomId, RoomInvite, RoomMember,
};
use crate::domain::ports::{ContactRepository, RoomRepository, StoreResult};

use super::diesel_error_mapping::map_diesel_error;
use super::diesel_linking_store::DieselLinkingUnit;
use super::models::{
    ContactRow, NewContactRow, NewRoomInviteRow, NewRoomMemberRow, RoomInviteRow, RoomMemberRow,
    RoomRow,
};
use super::schema::{contacts, room_invites, room_members, rooms};

diesel::define_sql_function!(fn lower(x: Text) -> Text);

#[async_trait]
impl RoomRepository for DieselLinkingUnit {
    async fn insert_room(&mut self, room: &Room) -> StoreResult<()> {
        diesel::insert_into(rooms::table)
            .values(RoomRow::from(room))
            .execute(self.conn())
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn add_member(&mut self, member: &RoomMember) -> StoreResult<bool> {
        let inserted = diesel::insert_into(room_members::table)
            .values(NewRoomMemberRow::from(member))
            .on_conflict((room_members::room_id, room_members::user_id))
            .do_nothing()
            .execute(self.conn())
            .await
            .map_err(map_diesel_error)?;
        Ok(inserted > 0)
    }

    async fn is_member(&mut self, room_id: &RoomId, user_id: &UserId) -> StoreResult<bool> {
        diesel::select(exists(
            room_members::table
                .filter(room_members::room_id.eq(room_id.as_uuid()))
                .filter(room_members::user_id.eq(user_id.as_uuid())),
        ))
        .get_result(self.conn())
        .await
        .map_err(map_diesel_error)
    }

    async fn memberships(&mut self, user_id: &UserId) -> StoreResult<Vec<Membership>> {
        let joined: Vec<(RoomRow, DateTime<Utc>)> = room_members::table
            .inner_join(rooms::table)
            .filter(room_members::user_id.eq(user_id.as_uuid()))
            .order(room_members::joined_at.asc())
            .select((RoomRow::as_select(), room_members::joined_at))
            .load(self.conn())
            .await
            .map_err(map_diesel_error)?;
        let room_ids: Vec<Uuid> = joined.iter().map(|(room, _)| room.id).collect();
        let counts: HashMap<Uuid, i64> = room_members::table
            .filter(room_members::room_id.eq_any(room_ids))
            .group_by(room_members::room_id)
            .select((room_members::room_id, count_star()))
            .load::<(Uuid, i64)>(self.conn())
            .await
            .map_err(map_diesel_error)?
            .into_iter()
            .collect();

        Ok(joined
            .into_iter()
            .map(|(room, joined_at)| {
                let member_count = counts
                    .get(&room.id)
                    .and_then(|count| usize::try_from(*count).ok())
                    .unwrap_or_default();
                Membership {
                    room: Room::from(room),
                    joined_at,
                    member_count,
                }
            })
            .collect())
    }

    async fn find_room(&mut self, room_id: &RoomId) -> StoreResult<Option<Room>> {
        let row = rooms::table
            .find(room_id.as_uuid())
            .select(RoomRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(Room::from))
    }

    async fn room_members(&mut self, room_id: &RoomId) -> StoreResult<Vec<RoomMember>> {
        let rows = room_members::table
            .filter(room_members::room_id.eq(room_id.as_uuid()))
            .order(room_members::joined_at.asc())
            .select(RoomMemberRow::as_select())
            .load(self.conn())
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(RoomMember::try_from).collect()
    }

    async fn insert_room_invite(&mut self, invite: &RoomInvite) -> StoreResult<()> {
        diesel::insert_into(room_invites::table)
            .values(NewRoomInviteRow::from(invite))
            .execute(self.conn())
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_room_invite(&mut self, invite_code: &str) -> StoreResult<Option<RoomInvite>> {
        let row = room_invites::table
            .filter(room_invites::invite_code.eq(invite_code))
            .select(RoomInviteRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(RoomInvite::from))
    }

    async fn mark_room_invite_used(
        &mut self,
        invite: &RoomInvite,
        used_by: &UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let updated = diesel::update(
            room_invites::table
                .filter(room_invites::id.eq(invite.id.as_uuid()))
                .filter(room_invites::used_by.is_null()),
        )
        .set((
            room_invites::used_by.eq(Some(*used_by.as_uuid())),
            room_invites::used_at.eq(Some(at)),
        ))
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }
}

#[async_trait]
impl ContactRepository for DieselLinkingUnit {
    async fn find_contact_by_name(
        &mut self,
        user_id: &UserId,
        contact_name: &str,
        relationship: Option<Relationship>,
    ) -> StoreResult<Option<Contact>> {
        let mut query = contacts::table
            .filter(contacts::user_id.eq(*user_id.as_uuid()))
            .filter(lower(contacts::contact_name).eq(contact_name.to_lowercase()))
            .into_boxed();
        if let Some(kind) = relationship {
            query = query.filter(contacts::relationship.eq(kind.as_str()));
        }
        let row = query
            .order(contacts::created_at.asc())
            .select(ContactRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(Contact::try_from).transpose()
    }

    async fn insert_contact(&mut self, contact: &Contact) -> StoreResult<bool> {
        let inserted = diesel::insert_into(contacts::table)
            .values(NewContactRow::from(contact))
            .on_conflict_do_nothing()
            .execute(self.conn())
            .await
            .map_err(map_diesel_error)?;
        Ok(inserted > 0)
    }

    async fn list_contacts(&mut self, user_id: &UserId) -> StoreResult<Vec<Contact>> {
        let rows = contacts::table
            .filter(contacts::user_id.eq(user_id.as_uuid()))
            .order(contacts::created_at.asc())
            .select(ContactRow::as_select())
            .load(self.conn())
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(Contact::try_from).collect()
    }
}
