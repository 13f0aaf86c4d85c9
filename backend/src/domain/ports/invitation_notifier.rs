//! Port for delivering invitation notices to invitees.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::EmailAddress;
use crate::domain::linking::InvitationId;

define_port_error! {
    /// Errors raised by invitation notifier adapters.
    pub enum NotifierError {
        /// The delivery channel rejected or dropped the notice.
        Delivery { message: String } => "invitation notice delivery failed: {message}",
    }
}

/// Content of an invitation notice.
///
/// The raw token is carried so the adapter can build an accept link. It must
/// never be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct InvitationNotice {
    pub invitation_id: InvitationId,
    pub invitee_email: EmailAddress,
    pub inviter_name: String,
    pub token: String,
    pub short_code: String,
    pub expires_at: DateTime<Utc>,
    /// Whether the invitee already has an account.
    pub is_existing_user: bool,
}

impl std::fmt::Debug for InvitationNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvitationNotice")
            .field("invitation_id", &self.invitation_id)
            .field("invitee_email", &self.invitee_email)
            .field("inviter_name", &self.inviter_name)
            .field("token", &"<redacted>")
            .field("short_code", &self.short_code)
            .field("expires_at", &self.expires_at)
            .field("is_existing_user", &self.is_existing_user)
            .finish()
    }
}

/// Sends invitation notices. Failures are reported but never undo the
/// invitation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvitationNotifier: Send + Sync {
    /// Notify the invitee that an invitation was created or re-sent.
    async fn invitation_created(&self, notice: &InvitationNotice) -> Result<(), NotifierError>;
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn debug_output_hides_token() {
        let notice = InvitationNotice {
            invitation_id: InvitationId::random(),
            invitee_email: EmailAddress::parse("bob@example.com").expect("email"),
            inviter_name: "Alice".to_owned(),
            token: "deadbeef".to_owned(),
            short_code: "LZ-ABCDEF".to_owned(),
            expires_at: Utc::now(),
            is_existing_user: false,
        };
        let rendered = format!("{notice:?}");
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("<redacted>"));
    }
}
