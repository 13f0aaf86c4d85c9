//! Co-parent invitations and account linking.
//!
//! Services in this module share one [`LinkingStore`]. Standalone operations
//! open and finish their own unit of work; the `*_in` variants run inside a
//! unit supplied by [`AccountRegistrar`] so a whole acceptance commits or
//! rolls back together.

mod contacts;
mod invitations;
mod model;
mod registrar;
mod relationship;
mod rooms;
mod settings;
mod token;
mod validator;

use tracing::{error, warn};

use crate::domain::Error;
use crate::domain::ports::{
    LinkingStore, LinkingUnit, StoreError, USERS_EMAIL_CONSTRAINT,
};

pub use contacts::{ContactSync, ContactSyncReport};
pub use invitations::{
    CreatedConnection, CreatedInvitation, INVITATION_LIST_LIMIT, InvitationLists,
    InvitationService, ResentInvitation,
};
pub use model::{
    Contact, ContactId, Invitation, InvitationId, InvitationStatus, InvitationType, Membership,
    PendingConnection, PendingConnectionId, PendingConnectionStatus, Room, RoomId, RoomInvite,
    RoomInviteId, RoomMember, RoomRole, UnknownVariant,
};
pub use registrar::{
    AcceptingIdentity, AccountRegistrar, LinkOutcome, NewAccount, RegisteredAccount, SignupRequest,
    SyncSummary,
};
pub use relationship::Relationship;
pub use rooms::{IssuedRoomInvite, RoomInviteValidation, RoomMerger, SharedRoom, select_current_room};
pub use settings::TandemSettings;
pub use token::{
    CODE_ALPHABET, DEFAULT_TTL_DAYS, MAX_TTL_DAYS, ROOM_INVITE_CODE_LEN, SHORT_CODE_LEN,
    SHORT_CODE_PREFIX, TokenIssuer,
};
pub use validator::{InvalidReason, InvitationValidator, TokenValidation, ValidInvitation};

/// Co-parent links a single account may hold.
pub const COPARENT_LIMIT: u64 = 1;

/// Map a store failure outside the acceptance pipeline to a domain error.
///
/// Connection loss is reported as `REG_007`; email unique violations as
/// `REG_001`; other unique violations as `GEN_409`. Everything else is an
/// internal error whose detail stays in the logs.
pub(crate) fn map_store_error(err: StoreError) -> Error {
    match &err {
        StoreError::Connection { message } => {
            error!(error = %message, "linking store unavailable");
            Error::database("Database error, please try again")
        }
        StoreError::Duplicate { constraint } if constraint == USERS_EMAIL_CONSTRAINT => {
            Error::email_exists()
        }
        StoreError::Duplicate { constraint } => {
            warn!(%constraint, "unique violation");
            Error::conflict("Resource already exists")
        }
        StoreError::Query { .. } => Error::internal(err.to_string()),
    }
}

/// Open a unit of work.
pub(crate) async fn begin(store: &dyn LinkingStore) -> Result<Box<dyn LinkingUnit>, Error> {
    store.begin().await.map_err(|err| {
        error!(error = %err, "failed to open linking unit of work");
        Error::database("Database error, please try again")
    })
}

/// Commit on success, roll back on failure.
///
/// A failed commit becomes `REG_007`. A failed rollback is logged and the
/// original error is returned.
pub(crate) async fn finish<T>(
    unit: Box<dyn LinkingUnit>,
    result: Result<T, Error>,
) -> Result<T, Error> {
    match result {
        Ok(value) => {
            unit.commit().await.map_err(|err| {
                error!(error = %err, "linking unit of work failed to commit");
                Error::database("Database error, please try again")
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = unit.rollback().await {
                warn!(error = %rollback_err, "linking unit of work failed to roll back");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case(StoreError::connection("refused"), ErrorCode::DatabaseError)]
    #[case(StoreError::duplicate(USERS_EMAIL_CONSTRAINT), ErrorCode::EmailExists)]
    #[case(StoreError::duplicate("room_invites_invite_code_key"), ErrorCode::Conflict)]
    #[case(StoreError::query("syntax"), ErrorCode::InternalError)]
    fn store_errors_map_to_codes(#[case] err: StoreError, #[case] expected: ErrorCode) {
        assert_eq!(map_store_error(err).code(), expected);
    }
}
