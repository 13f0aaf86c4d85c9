//! Invitation issuing, cancellation, re-sending and listing.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, info, warn};

use super::{
    COPARENT_LIMIT, Invitation, InvitationId, InvitationStatus, InvitationType, PendingConnection,
    PendingConnectionId, PendingConnectionStatus, TokenIssuer, begin, finish, map_store_error,
};
use crate::domain::ports::{
    InvitationNotice, InvitationNotifier, InvitationReissue, InvitationRepository,
    InvitationTransition, LinkingStore, LinkingUnit, PendingConnectionRepository, StoreResult,
    UserRepository,
};
use crate::domain::{EmailAddress, Error, UserAccount, UserId};

/// Maximum invitations returned per list.
pub const INVITATION_LIST_LIMIT: usize = 50;
const TOKEN_ATTEMPTS: usize = 3;
const SHORT_CODE_ATTEMPTS: usize = 5;

/// Result of [`InvitationService::create_invitation`].
///
/// `token` is `None` when an active invitation already existed; re-sending
/// is the way to obtain a fresh token for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedInvitation {
    pub invitation: Invitation,
    pub token: Option<String>,
    pub short_code: String,
    pub is_existing_user: bool,
    pub existing_user: Option<UserAccount>,
}

/// Result of [`InvitationService::resend_invitation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResentInvitation {
    pub invitation: Invitation,
    pub token: String,
    pub short_code: String,
}

/// Invitations a user sent and received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvitationLists {
    pub sent: Vec<Invitation>,
    pub received: Vec<Invitation>,
}

/// Result of [`InvitationService::create_pending_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedConnection {
    pub connection: PendingConnection,
    pub token: Option<String>,
    pub is_existing_user: bool,
}

/// Whether `user_id` already holds [`COPARENT_LIMIT`] co-parent links.
pub(crate) async fn reached_coparent_limit(
    unit: &mut dyn LinkingUnit,
    user_id: &UserId,
) -> StoreResult<bool> {
    let invitations = unit.count_accepted_links(user_id).await?;
    let connections = unit.count_accepted_connections(user_id).await?;
    Ok(invitations + connections >= COPARENT_LIMIT)
}

/// Issues and manages co-parent invitations.
#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn LinkingStore>,
    clock: Arc<dyn Clock>,
    issuer: TokenIssuer,
    notifier: Arc<dyn InvitationNotifier>,
}

impl InvitationService {
    /// Create an invitation service.
    pub fn new(
        store: Arc<dyn LinkingStore>,
        clock: Arc<dyn Clock>,
        issuer: TokenIssuer,
        notifier: Arc<dyn InvitationNotifier>,
    ) -> Self {
        Self {
            store,
            clock,
            issuer,
            notifier,
        }
    }

    /// Invite `invitee_email` to link with `inviter_id`.
    ///
    /// The invitee is notified after the invitation commits; notifier
    /// failures are logged and do not fail the call.
    pub async fn create_invitation(
        &self,
        inviter_id: &UserId,
        invitee_email: &str,
    ) -> Result<CreatedInvitation, Error> {
        let email = parse_email(invitee_email)?;
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let inviter = load_inviter(unit.as_mut(), inviter_id).await?;
            let created = self
                .create_invitation_in(unit.as_mut(), &inviter, &email)
                .await?;
            Ok::<_, Error>((inviter, created))
        }
        .await;
        let (inviter, created) = finish(unit, result).await?;
        self.notify_created(&inviter, &created).await;
        Ok(created)
    }

    /// [`Self::create_invitation`] inside an open unit, without notifying.
    pub async fn create_invitation_in(
        &self,
        unit: &mut dyn LinkingUnit,
        inviter: &UserAccount,
        invitee_email: &EmailAddress,
    ) -> Result<CreatedInvitation, Error> {
        if inviter.email == *invitee_email {
            return Err(Error::self_invite());
        }
        if reached_coparent_limit(unit, &inviter.id)
            .await
            .map_err(map_store_error)?
        {
            return Err(Error::limit_reached("You already have a linked co-parent"));
        }

        let now = self.clock.utc();
        let existing_user = unit
            .find_user_by_email(invitee_email)
            .await
            .map_err(map_store_error)?;

        if let Some(pending) = unit
            .find_pending_invitation(&inviter.id, invitee_email)
            .await
            .map_err(map_store_error)?
        {
            if pending.is_active_at(now) {
                return Ok(CreatedInvitation {
                    short_code: pending.short_code.clone(),
                    invitation: pending,
                    token: None,
                    is_existing_user: existing_user.is_some(),
                    existing_user,
                });
            }
            unit.transition_invitation(
                &pending.id,
                &[InvitationStatus::Pending],
                InvitationTransition::to(InvitationStatus::Expired),
            )
            .await
            .map_err(map_store_error)?;
        }

        for _ in 0..TOKEN_ATTEMPTS {
            let token = self.issuer.generate_token();
            let short_code = self.allocate_short_code(unit).await?;
            let invitation = Invitation {
                id: InvitationId::random(),
                token_hash: TokenIssuer::hash_token(&token),
                short_code: short_code.clone(),
                inviter_id: inviter.id,
                invitee_email: invitee_email.clone(),
                invitee_id: None,
                invitation_type: InvitationType::CoParent,
                status: InvitationStatus::Pending,
                created_at: now,
                expires_at: self.issuer.calculate_expiration(now)?,
                accepted_at: None,
            };
            if unit
                .insert_invitation(&invitation)
                .await
                .map_err(map_store_error)?
            {
                info!(
                    invitation_id = %invitation.id,
                    inviter = %inviter.id,
                    existing_user = existing_user.is_some(),
                    "invitation created"
                );
                return Ok(CreatedInvitation {
                    invitation,
                    token: Some(token),
                    short_code,
                    is_existing_user: existing_user.is_some(),
                    existing_user,
                });
            }
            if let Some(rival) = unit
                .find_pending_invitation(&inviter.id, invitee_email)
                .await
                .map_err(map_store_error)?
                .filter(|rival| rival.is_active_at(now))
            {
                debug!(invitation_id = %rival.id, "concurrent invitation reused");
                return Ok(CreatedInvitation {
                    short_code: rival.short_code.clone(),
                    invitation: rival,
                    token: None,
                    is_existing_user: existing_user.is_some(),
                    existing_user,
                });
            }
            warn!("invitation token hash collision, retrying");
        }
        Err(Error::database("Could not issue an invitation token"))
    }

    /// Send the invitation notice for a freshly minted token.
    pub async fn notify_created(&self, inviter: &UserAccount, created: &CreatedInvitation) {
        if let Some(token) = &created.token {
            self.notify(inviter, &created.invitation, token, created.is_existing_user)
                .await;
        }
    }

    async fn notify(
        &self,
        inviter: &UserAccount,
        invitation: &Invitation,
        token: &str,
        is_existing_user: bool,
    ) {
        let notice = InvitationNotice {
            invitation_id: invitation.id,
            invitee_email: invitation.invitee_email.clone(),
            inviter_name: inviter.display_name.clone(),
            token: token.to_owned(),
            short_code: invitation.short_code.clone(),
            expires_at: invitation.expires_at,
            is_existing_user,
        };
        if let Err(err) = self.notifier.invitation_created(&notice).await {
            warn!(invitation_id = %invitation.id, error = %err, "invitation notice not delivered");
        }
    }

    async fn allocate_short_code(&self, unit: &mut dyn LinkingUnit) -> Result<String, Error> {
        let now = self.clock.utc();
        for _ in 0..SHORT_CODE_ATTEMPTS {
            let code = self.issuer.generate_short_code();
            if !unit
                .short_code_in_use(&code, now)
                .await
                .map_err(map_store_error)?
            {
                return Ok(code);
            }
        }
        Err(Error::database("Could not allocate an invitation code"))
    }

    /// Withdraw a pending invitation. Terminal invitations are left as they
    /// are and still report success.
    pub async fn cancel_invitation(
        &self,
        invitation_id: &InvitationId,
        inviter_id: &UserId,
    ) -> Result<(), Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let invitation = load_owned(unit.as_mut(), invitation_id, inviter_id).await?;
            if invitation.status == InvitationStatus::Pending {
                let changed = unit
                    .transition_invitation(
                        &invitation.id,
                        &[InvitationStatus::Pending],
                        InvitationTransition::to(InvitationStatus::Cancelled),
                    )
                    .await
                    .map_err(map_store_error)?;
                if changed {
                    info!(%invitation_id, "invitation cancelled");
                }
            }
            Ok::<_, Error>(())
        }
        .await;
        finish(unit, result).await
    }

    /// Rotate the token of a pending or expired invitation and reset its
    /// expiry.
    pub async fn resend_invitation(
        &self,
        invitation_id: &InvitationId,
        inviter_id: &UserId,
    ) -> Result<ResentInvitation, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let inviter = load_inviter(unit.as_mut(), inviter_id).await?;
            let resent = self
                .resend_invitation_in(unit.as_mut(), invitation_id, inviter_id)
                .await?;
            Ok::<_, Error>((inviter, resent))
        }
        .await;
        let (inviter, resent) = finish(unit, result).await?;

        let is_existing_user = self
            .find_existing_user(resent.invitation.invitee_email.as_ref())
            .await
            .map(|user| user.is_some())
            .unwrap_or(false);
        self.notify(&inviter, &resent.invitation, &resent.token, is_existing_user)
            .await;
        Ok(resent)
    }

    async fn resend_invitation_in(
        &self,
        unit: &mut dyn LinkingUnit,
        invitation_id: &InvitationId,
        inviter_id: &UserId,
    ) -> Result<ResentInvitation, Error> {
        let invitation = load_owned(unit, invitation_id, inviter_id).await?;
        if !matches!(
            invitation.status,
            InvitationStatus::Pending | InvitationStatus::Expired
        ) {
            return Err(Error::conflict("Invitation cannot be resent"));
        }
        let other_pending = unit
            .find_pending_invitation(inviter_id, &invitation.invitee_email)
            .await
            .map_err(map_store_error)?;
        if other_pending.is_some_and(|other| other.id != invitation.id) {
            return Err(Error::conflict("Invitation cannot be resent"));
        }

        let token = self.unused_token(unit).await?;
        let short_code = self.allocate_short_code(unit).await?;
        let now = self.clock.utc();
        let changed = unit
            .reissue_invitation(
                &invitation.id,
                InvitationReissue {
                    token_hash: TokenIssuer::hash_token(&token),
                    short_code: short_code.clone(),
                    expires_at: self.issuer.calculate_expiration(now)?,
                },
            )
            .await
            .map_err(map_store_error)?;
        if !changed {
            return Err(Error::conflict("Invitation cannot be resent"));
        }
        let invitation = unit
            .find_invitation(&invitation.id)
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| Error::not_found("Invitation not found"))?;
        info!(%invitation_id, "invitation re-sent");
        Ok(ResentInvitation {
            invitation,
            token,
            short_code,
        })
    }

    async fn unused_token(&self, unit: &mut dyn LinkingUnit) -> Result<String, Error> {
        for _ in 0..TOKEN_ATTEMPTS {
            let token = self.issuer.generate_token();
            let taken = unit
                .find_invitation_by_token_hash(&TokenIssuer::hash_token(&token))
                .await
                .map_err(map_store_error)?
                .is_some();
            if !taken {
                return Ok(token);
            }
            warn!("invitation token hash collision, retrying");
        }
        Err(Error::database("Could not issue an invitation token"))
    }

    /// Account registered under `email`, if any.
    pub async fn find_existing_user(&self, email: &str) -> Result<Option<UserAccount>, Error> {
        let email = parse_email(email)?;
        let mut unit = begin(self.store.as_ref()).await?;
        let result = unit
            .find_user_by_email(&email)
            .await
            .map_err(map_store_error);
        finish(unit, result).await
    }

    /// Active invitation from `inviter_id` to `invitee_email`, if any.
    pub async fn find_existing_invitation(
        &self,
        inviter_id: &UserId,
        invitee_email: &str,
    ) -> Result<Option<Invitation>, Error> {
        let email = parse_email(invitee_email)?;
        let now = self.clock.utc();
        let mut unit = begin(self.store.as_ref()).await?;
        let result = unit
            .find_pending_invitation(inviter_id, &email)
            .await
            .map(|found| found.filter(|invitation| invitation.is_active_at(now)))
            .map_err(map_store_error);
        finish(unit, result).await
    }

    /// Invitations sent by and addressed to `user_id`, newest first.
    pub async fn get_user_invitations(
        &self,
        user_id: &UserId,
        status: Option<InvitationStatus>,
    ) -> Result<InvitationLists, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let user = unit
                .find_user(user_id)
                .await
                .map_err(map_store_error)?
                .ok_or_else(|| Error::not_found("User not found"))?;
            let sent = unit
                .list_sent(user_id, status, INVITATION_LIST_LIMIT)
                .await
                .map_err(map_store_error)?;
            let received = unit
                .list_received(&user.email, status, INVITATION_LIST_LIMIT)
                .await
                .map_err(map_store_error)?;
            Ok::<_, Error>(InvitationLists { sent, received })
        }
        .await;
        finish(unit, result).await
    }

    /// Latest active invitation sent by `inviter_id`.
    pub async fn get_active_invitation(
        &self,
        inviter_id: &UserId,
    ) -> Result<Option<Invitation>, Error> {
        let now = self.clock.utc();
        let mut unit = begin(self.store.as_ref()).await?;
        let result = unit
            .list_sent(inviter_id, Some(InvitationStatus::Pending), INVITATION_LIST_LIMIT)
            .await
            .map(|sent| sent.into_iter().find(|invitation| invitation.is_active_at(now)))
            .map_err(map_store_error);
        finish(unit, result).await
    }

    /// Whether `user_id` already has a linked co-parent.
    pub async fn has_reached_coparent_limit(&self, user_id: &UserId) -> Result<bool, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = reached_coparent_limit(unit.as_mut(), user_id)
            .await
            .map_err(map_store_error);
        finish(unit, result).await
    }

    /// Record a legacy pending connection to `invitee_email`.
    pub async fn create_pending_connection(
        &self,
        inviter_id: &UserId,
        invitee_email: &str,
    ) -> Result<CreatedConnection, Error> {
        let email = parse_email(invitee_email)?;
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self
            .create_pending_connection_in(unit.as_mut(), inviter_id, &email)
            .await;
        finish(unit, result).await
    }

    async fn create_pending_connection_in(
        &self,
        unit: &mut dyn LinkingUnit,
        inviter_id: &UserId,
        invitee_email: &EmailAddress,
    ) -> Result<CreatedConnection, Error> {
        let inviter = load_inviter(unit, inviter_id).await?;
        if inviter.email == *invitee_email {
            return Err(Error::self_invite());
        }
        if reached_coparent_limit(unit, inviter_id)
            .await
            .map_err(map_store_error)?
        {
            return Err(Error::limit_reached("You already have a linked co-parent"));
        }
        let is_existing_user = unit
            .find_user_by_email(invitee_email)
            .await
            .map_err(map_store_error)?
            .is_some();

        let now = self.clock.utc();
        if let Some(open) = unit
            .find_open_pending_connection(inviter_id, invitee_email)
            .await
            .map_err(map_store_error)?
        {
            if !open.is_expired_at(now) {
                return Ok(CreatedConnection {
                    connection: open,
                    token: None,
                    is_existing_user,
                });
            }
        }

        for _ in 0..TOKEN_ATTEMPTS {
            let token = self.issuer.generate_token();
            let token_hash = TokenIssuer::hash_token(&token);
            let taken = unit
                .find_pending_connection_by_token_hash(&token_hash)
                .await
                .map_err(map_store_error)?
                .is_some();
            if taken {
                continue;
            }
            let connection = PendingConnection {
                id: PendingConnectionId::random(),
                inviter_id: *inviter_id,
                invitee_email: invitee_email.clone(),
                token_hash,
                status: PendingConnectionStatus::Pending,
                created_at: now,
                expires_at: self.issuer.calculate_expiration(now)?,
                accepted_by: None,
                accepted_at: None,
            };
            unit.insert_pending_connection(&connection)
                .await
                .map_err(map_store_error)?;
            info!(connection_id = %connection.id, inviter = %inviter_id, "pending connection created");
            return Ok(CreatedConnection {
                connection,
                token: Some(token),
                is_existing_user,
            });
        }
        Err(Error::database("Could not issue a connection token"))
    }
}

pub(crate) fn parse_email(raw: &str) -> Result<EmailAddress, Error> {
    EmailAddress::parse(raw).map_err(|err| Error::invalid_email(err.to_string()))
}

pub(crate) async fn load_inviter(
    unit: &mut dyn LinkingUnit,
    inviter_id: &UserId,
) -> Result<UserAccount, Error> {
    unit.find_user(inviter_id)
        .await
        .map_err(map_store_error)?
        .ok_or_else(Error::inviter_gone)
}

async fn load_owned(
    unit: &mut dyn LinkingUnit,
    invitation_id: &InvitationId,
    inviter_id: &UserId,
) -> Result<Invitation, Error> {
    unit.find_invitation(invitation_id)
        .await
        .map_err(map_store_error)?
        .filter(|invitation| invitation.inviter_id == *inviter_id)
        .ok_or_else(|| Error::not_found("Invitation not found"))
}
