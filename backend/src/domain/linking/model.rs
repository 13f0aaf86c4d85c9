//! Records persisted by the linking subsystem.
//!
//! All identifiers are UUID newtypes. Status and role columns are closed
//! enums with a stable storage form so adapters never bind free-form text.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Relationship;
use crate::domain::{EmailAddress, UserId};

macro_rules! define_record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

define_record_id!(
    /// Invitation primary key.
    InvitationId
);
define_record_id!(
    /// Legacy pending connection primary key.
    PendingConnectionId
);
define_record_id!(
    /// Room primary key.
    RoomId
);
define_record_id!(
    /// Room invite primary key.
    RoomInviteId
);
define_record_id!(
    /// Contact primary key.
    ContactId
);

/// Error returned when a stored enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

macro_rules! define_stored_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Storage and wire form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(UnknownVariant::new($kind, other)),
                }
            }
        }
    };
}

define_stored_enum!(
    /// Lifecycle state of an invitation.
    ///
    /// `Pending` is the only non-terminal state.
    InvitationStatus("invitation status") {
        /// Awaiting a response.
        Pending => "pending",
        /// Redeemed by the invitee.
        Accepted => "accepted",
        /// Refused by the invitee.
        Declined => "declined",
        /// Passed its expiry without a response.
        Expired => "expired",
        /// Withdrawn by the inviter.
        Cancelled => "cancelled",
    }
);

define_stored_enum!(
    /// Kind of link an invitation establishes.
    InvitationType("invitation type") {
        /// Co-parent link.
        CoParent => "coparent",
    }
);

define_stored_enum!(
    /// Lifecycle state of a legacy pending connection.
    PendingConnectionStatus("pending connection status") {
        /// Awaiting acceptance.
        Pending => "pending",
        /// Redeemed.
        Accepted => "accepted",
        /// Passed its expiry.
        Expired => "expired",
        /// Withdrawn.
        Cancelled => "cancelled",
    }
);

define_stored_enum!(
    /// Role of a room member.
    RoomRole("room role") {
        /// Creator of the room.
        Owner => "owner",
        /// Any other participant.
        Member => "member",
    }
);

/// Co-parent invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub id: InvitationId,
    /// SHA-256 hex of the raw token.
    pub token_hash: String,
    /// Human-typable `LZ-XXXXXX` code.
    pub short_code: String,
    pub inviter_id: UserId,
    pub invitee_email: EmailAddress,
    /// Set when the invitee accepts or declines.
    pub invitee_id: Option<UserId>,
    pub invitation_type: InvitationType,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Expiry is inclusive: an invitation is expired at `expires_at` itself.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the invitation can still be redeemed at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired_at(now)
    }
}

/// Legacy connection request addressed to an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConnection {
    pub id: PendingConnectionId,
    pub inviter_id: UserId,
    pub invitee_email: EmailAddress,
    pub token_hash: String,
    pub status: PendingConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_by: Option<UserId>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl PendingConnection {
    /// Same inclusive boundary as [`Invitation::is_expired_at`].
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Communication room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub created_by: UserId,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

/// Membership row linking a user to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMember {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub role: RoomRole,
    pub joined_at: DateTime<Utc>,
}

/// One of a user's rooms, as seen from that user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room: Room,
    /// When the user joined this room.
    pub joined_at: DateTime<Utc>,
    /// Total members in the room, the user included.
    pub member_count: usize,
}

impl Membership {
    /// A room is shared once it has more than one member.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.member_count > 1
    }
}

/// Single-use code granting entry to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInvite {
    pub id: RoomInviteId,
    pub room_id: RoomId,
    pub invited_by: UserId,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_by: Option<UserId>,
    pub used_at: Option<DateTime<Utc>>,
}

impl RoomInvite {
    /// Inclusive expiry, matching invitations.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Entry in a user's contact list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    /// Owner of the contact list.
    pub user_id: UserId,
    pub contact_name: String,
    pub contact_email: Option<EmailAddress>,
    /// `None` for placeholder contacts shared from a co-parent.
    pub relationship: Option<Relationship>,
    /// Account this contact represents, when known.
    pub linked_user_id: Option<UserId>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rstest::rstest;

    #[rstest]
    #[case("pending", InvitationStatus::Pending)]
    #[case("accepted", InvitationStatus::Accepted)]
    #[case("cancelled", InvitationStatus::Cancelled)]
    fn invitation_status_round_trips_storage_form(
        #[case] raw: &str,
        #[case] status: InvitationStatus,
    ) {
        assert_eq!(raw.parse::<InvitationStatus>(), Ok(status));
        assert_eq!(status.as_str(), raw);
    }

    #[rstest]
    fn unknown_status_is_rejected() {
        let err = "archived"
            .parse::<InvitationStatus>()
            .expect_err("unknown status");
        assert_eq!(err.to_string(), "unknown invitation status value: archived");
    }

    #[rstest]
    fn expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let invitation = Invitation {
            id: InvitationId::random(),
            token_hash: "hash".to_owned(),
            short_code: "LZ-ABCDEF".to_owned(),
            inviter_id: UserId::random(),
            invitee_email: EmailAddress::parse("bob@example.com").expect("email"),
            invitee_id: None,
            invitation_type: InvitationType::CoParent,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: now,
            accepted_at: None,
        };
        assert!(invitation.is_expired_at(now));
        assert!(!invitation.is_expired_at(now - TimeDelta::milliseconds(1)));
        assert!(!invitation.is_active_at(now));
    }
}
