//! User, invitation and pending connection queries for a Diesel unit.
//!
//! Conditional transitions are single `UPDATE ... WHERE status IN (...)`
//! statements; the affected row count tells the caller whether it won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::linking::{
    Invitation, InvitationId, InvitationStatus, PendingConnection, PendingConnectionId,
    PendingConnectionStatus,
};
use crate::domain::ports::{
    InvitationReissue, InvitationRepository, InvitationTransition, PendingConnectionRepository,
    StoreResult, UserRepository,
};
use crate::domain::{EmailAddress, UserAccount, UserId};

use super::diesel_error_mapping::map_diesel_error;
use super::diesel_linking_store::DieselLinkingUnit;
use super::models::{
    InvitationReissueChange, InvitationRow, InvitationStatusChange, NewInvitationRow,
    NewPendingConnectionRow, NewUserRow, PendingConnectionChange, PendingConnectionRow, UserRow,
};
use super::schema::{invitations, pending_connections, users};

pub(super) fn row_count(rows: usize) -> u64 {
    u64::try_from(rows).unwrap_or(u64::MAX)
}

pub(super) fn tally(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

fn query_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn invitations_from(rows: Vec<InvitationRow>) -> StoreResult<Vec<Invitation>> {
    rows.into_iter().map(Invitation::try_from).collect()
}

#[async_trait]
impl UserRepository for DieselLinkingUnit {
    async fn find_user(&mut self, id: &UserId) -> StoreResult<Option<UserAccount>> {
        let row = users::table
            .find(id.as_uuid())
            .select(UserRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(UserAccount::try_from).transpose()
    }

    async fn find_user_by_email(
        &mut self,
        email: &EmailAddress,
    ) -> StoreResult<Option<UserAccount>> {
        let row = users::table
            .filter(users::email.eq(email.as_ref()))
            .select(UserRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(UserAccount::try_from).transpose()
    }

    async fn username_exists(&mut self, username: &str) -> StoreResult<bool> {
        diesel::select(exists(users::table.filter(users::username.eq(username))))
            .get_result(self.conn())
            .await
            .map_err(map_diesel_error)
    }

    async fn insert_user(&mut self, user: &UserAccount) -> StoreResult<()> {
        diesel::insert_into(users::table)
            .values(NewUserRow::from(user))
            .execute(self.conn())
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }
}

#[async_trait]
impl InvitationRepository for DieselLinkingUnit {
    async fn insert_invitation(&mut self, invitation: &Invitation) -> StoreResult<bool> {
        let inserted = diesel::insert_into(invitations::table)
            .values(NewInvitationRow::from(invitation))
            .on_conflict_do_nothing()
            .execute(self.conn())
            .await
            .map_err(map_diesel_error)?;
        Ok(inserted > 0)
    }

    async fn find_invitation(&mut self, id: &InvitationId) -> StoreResult<Option<Invitation>> {
        let row = invitations::table
            .find(id.as_uuid())
            .select(InvitationRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(Invitation::try_from).transpose()
    }

    async fn find_invitation_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<Invitation>> {
        let row = invitations::table
            .filter(invitations::token_hash.eq(token_hash))
            .select(InvitationRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(Invitation::try_from).transpose()
    }

    async fn find_invitations_by_short_code(
        &mut self,
        short_code: &str,
    ) -> StoreResult<Vec<Invitation>> {
        let rows = invitations::table
            .filter(invitations::short_code.eq(short_code))
            .order(invitations::created_at.desc())
            .select(InvitationRow::as_select())
            .load(self.conn())
            .await
            .map_err(map_diesel_error)?;
        invitations_from(rows)
    }

    async fn find_pending_invitation(
        &mut self,
        inviter_id: &UserId,
        invitee_email: &EmailAddress,
    ) -> StoreResult<Option<Invitation>> {
        let row = invitations::table
            .filter(invitations::inviter_id.eq(inviter_id.as_uuid()))
            .filter(invitations::invitee_email.eq(invitee_email.as_ref()))
            .filter(invitations::status.eq(InvitationStatus::Pending.as_str()))
            .order(invitations::created_at.desc())
            .select(InvitationRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(Invitation::try_from).transpose()
    }

    async fn short_code_in_use(
        &mut self,
        short_code: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        diesel::select(exists(
            invitations::table
                .filter(invitations::short_code.eq(short_code))
                .filter(invitations::status.eq(InvitationStatus::Pending.as_str()))
                .filter(invitations::expires_at.gt(now)),
        ))
        .get_result(self.conn())
        .await
        .map_err(map_diesel_error)
    }

    async fn transition_invitation(
        &mut self,
        id: &InvitationId,
        from: &[InvitationStatus],
        change: InvitationTransition,
    ) -> StoreResult<bool> {
        let from: Vec<&str> = from.iter().map(|status| status.as_str()).collect();
        let updated = diesel::update(
            invitations::table
                .filter(invitations::id.eq(id.as_uuid()))
                .filter(invitations::status.eq_any(from)),
        )
        .set(InvitationStatusChange {
            status: change.to.as_str(),
            invitee_id: change.invitee_id.map(|user| *user.as_uuid()),
            accepted_at: change.accepted_at,
        })
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn reissue_invitation(
        &mut self,
        id: &InvitationId,
        reissue: InvitationReissue,
    ) -> StoreResult<bool> {
        let reissuable = [
            InvitationStatus::Pending.as_str(),
            InvitationStatus::Expired.as_str(),
        ];
        let updated = diesel::update(
            invitations::table
                .filter(invitations::id.eq(id.as_uuid()))
                .filter(invitations::status.eq_any(reissuable)),
        )
        .set(InvitationReissueChange {
            token_hash: &reissue.token_hash,
            short_code: &reissue.short_code,
            status: InvitationStatus::Pending.as_str(),
            expires_at: reissue.expires_at,
        })
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn expire_invitations(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let updated = diesel::update(
            invitations::table
                .filter(invitations::status.eq(InvitationStatus::Pending.as_str()))
                .filter(invitations::expires_at.le(now)),
        )
        .set(invitations::status.eq(InvitationStatus::Expired.as_str()))
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        Ok(row_count(updated))
    }

    async fn count_accepted_links(&mut self, user_id: &UserId) -> StoreResult<u64> {
        let id = *user_id.as_uuid();
        let links: i64 = invitations::table
            .filter(invitations::status.eq(InvitationStatus::Accepted.as_str()))
            .filter(
                invitations::inviter_id
                    .eq(id)
                    .or(invitations::invitee_id.eq(id)),
            )
            .count()
            .get_result(self.conn())
            .await
            .map_err(map_diesel_error)?;
        Ok(tally(links))
    }

    async fn list_sent(
        &mut self,
        inviter_id: &UserId,
        status: Option<InvitationStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Invitation>> {
        let mut query = invitations::table
            .filter(invitations::inviter_id.eq(*inviter_id.as_uuid()))
            .into_boxed();
        if let Some(wanted) = status {
            query = query.filter(invitations::status.eq(wanted.as_str()));
        }
        let rows = query
            .order(invitations::created_at.desc())
            .limit(query_limit(limit))
            .select(InvitationRow::as_select())
            .load(self.conn())
            .await
            .map_err(map_diesel_error)?;
        invitations_from(rows)
    }

    async fn list_received(
        &mut self,
        email: &EmailAddress,
        status: Option<InvitationStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Invitation>> {
        let mut query = invitations::table
            .filter(invitations::invitee_email.eq(email.as_ref().to_owned()))
            .into_boxed();
        if let Some(wanted) = status {
            query = query.filter(invitations::status.eq(wanted.as_str()));
        }
        let rows = query
            .order(invitations::created_at.desc())
            .limit(query_limit(limit))
            .select(InvitationRow::as_select())
            .load(self.conn())
            .await
            .map_err(map_diesel_error)?;
        invitations_from(rows)
    }
}

#[async_trait]
impl PendingConnectionRepository for DieselLinkingUnit {
    async fn insert_pending_connection(
        &mut self,
        connection: &PendingConnection,
    ) -> StoreResult<()> {
        diesel::insert_into(pending_connections::table)
            .values(NewPendingConnectionRow::from(connection))
            .execute(self.conn())
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_pending_connection_by_token_hash(
        &mut self,
        token_hash: &str,
    ) -> StoreResult<Option<PendingConnection>> {
        let row = pending_connections::table
            .filter(pending_connections::token_hash.eq(token_hash))
            .select(PendingConnectionRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(PendingConnection::try_from).transpose()
    }

    async fn find_open_pending_connection(
        &mut self,
        inviter_id: &UserId,
        invitee_email: &EmailAddress,
    ) -> StoreResult<Option<PendingConnection>> {
        let row = pending_connections::table
            .filter(pending_connections::inviter_id.eq(inviter_id.as_uuid()))
            .filter(pending_connections::invitee_email.eq(invitee_email.as_ref()))
            .filter(pending_connections::status.eq(PendingConnectionStatus::Pending.as_str()))
            .order(pending_connections::created_at.desc())
            .select(PendingConnectionRow::as_select())
            .first(self.conn())
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(PendingConnection::try_from).transpose()
    }

    async fn transition_pending_connection(
        &mut self,
        id: &PendingConnectionId,
        to: PendingConnectionStatus,
        accepted_by: Option<UserId>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let accepted = to == PendingConnectionStatus::Accepted;
        let updated = diesel::update(
            pending_connections::table
                .filter(pending_connections::id.eq(id.as_uuid()))
                .filter(pending_connections::status.eq(PendingConnectionStatus::Pending.as_str())),
        )
        .set(PendingConnectionChange {
            status: to.as_str(),
            accepted_by: accepted_by
                .filter(|_| accepted)
                .map(|user| *user.as_uuid()),
            accepted_at: accepted.then_some(at),
        })
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        Ok(updated > 0)
    }

    async fn count_accepted_connections(&mut self, user_id: &UserId) -> StoreResult<u64> {
        let id = *user_id.as_uuid();
        let links: i64 = pending_connections::table
            .filter(pending_connections::status.eq(PendingConnectionStatus::Accepted.as_str()))
            .filter(
                pending_connections::inviter_id
                    .eq(id)
                    .or(pending_connections::accepted_by.eq(id)),
            )
            .count()
            .get_result(self.conn())
            .await
            .map_err(map_diesel_error)?;
        Ok(tally(links))
    }

    async fn expire_pending_connections(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let updated = diesel::update(
            pending_connections::table
                .filter(pending_connections::status.eq(PendingConnectionStatus::Pending.as_str()))
                .filter(pending_connections::expires_at.le(now)),
        )
        .set(pending_connections::status.eq(PendingConnectionStatus::Expired.as_str()))
        .execute(self.conn())
        .await
        .map_err(map_diesel_error)?;
        Ok(row_count(updated))
    }
}
