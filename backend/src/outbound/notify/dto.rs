//! Wire payload posted to the invitation relay.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ports::InvitationNotice;

/// Relay request body. Carries the raw token so the relay can build the
/// accept link.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InvitationNoticeDto<'a> {
    pub kind: &'static str,
    pub invitation_id: String,
    pub to: &'a str,
    pub inviter_name: &'a str,
    pub token: &'a str,
    pub short_code: &'a str,
    pub expires_at: DateTime<Utc>,
    pub is_existing_user: bool,
}

impl<'a> From<&'a InvitationNotice> for InvitationNoticeDto<'a> {
    fn from(notice: &'a InvitationNotice) -> Self {
        Self {
            kind: "coparent_invitation",
            invitation_id: notice.invitation_id.to_string(),
            to: notice.invitee_email.as_ref(),
            inviter_name: &notice.inviter_name,
            token: &notice.token,
            short_code: &notice.short_code,
            expires_at: notice.expires_at,
            is_existing_user: notice.is_existing_user,
        }
    }
}
