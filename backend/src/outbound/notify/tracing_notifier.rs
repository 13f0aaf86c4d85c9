//! Notifier that records notices in the log instead of sending them.

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{InvitationNotice, InvitationNotifier, NotifierError};

/// Logs invitation metadata. The token is never written.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInvitationNotifier;

#[async_trait]
impl InvitationNotifier for TracingInvitationNotifier {
    async fn invitation_created(&self, notice: &InvitationNotice) -> Result<(), NotifierError> {
        info!(
            target: "tandem::notify",
            invitation_id = %notice.invitation_id,
            invitee = %notice.invitee_email,
            short_code = %notice.short_code,
            expires_at = %notice.expires_at,
            existing_user = notice.is_existing_user,
            "invitation notice (no relay configured)"
        );
        Ok(())
    }
}
