//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod invitation_notifier;
mod linking_store;
mod password_hasher;

#[cfg(test)]
pub use invitation_notifier::MockInvitationNotifier;
pub use invitation_notifier::{InvitationNotice, InvitationNotifier, NotifierError};
pub use linking_store::{
    ContactRepository, INVITATIONS_TOKEN_CONSTRAINT,
    InvitationReissue, InvitationRepository, InvitationTransition, LinkingStore, LinkingUnit,
    PENDING_CONNECTIONS_TOKEN_CONSTRAINT, PendingConnectionRepository,
    ROOM_INVITES_CODE_CONSTRAINT, RoomRepository, StoreError, StoreResult,
    USERS_EMAIL_CONSTRAINT, USERS_USERNAME_CONSTRAINT, UserRepository,
};
#[cfg(test)]
pub use password_hasher::MockPasswordHasher;
pub use password_hasher::{FixturePasswordHasher, PasswordHashError, PasswordHasher};
