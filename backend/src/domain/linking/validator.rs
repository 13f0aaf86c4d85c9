//! Invitation validation, acceptance, refusal and expiry.
//!
//! Expiry is evaluated lazily with an inclusive boundary; the periodic sweep
//! only brings stored statuses in line with what validation already reports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{info, warn};

use super::invitations::reached_coparent_limit;
use super::{
    Invitation, InvitationStatus, PendingConnection, PendingConnectionStatus, TokenIssuer, begin,
    finish, map_store_error,
};
use crate::domain::ports::{
    InvitationRepository, InvitationTransition, LinkingStore, LinkingUnit,
    PendingConnectionRepository, StoreError, StoreResult, UserRepository,
};
use crate::domain::{Error, UserAccount, UserId};

/// Why a token or code cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    /// Empty, malformed or unknown.
    InvalidToken,
    Expired,
    AlreadyAccepted,
    AlreadyDeclined,
    Cancelled,
}

impl InvalidReason {
    /// Wire code reported by validation endpoints.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Expired => "EXPIRED",
            Self::AlreadyAccepted => "ALREADY_ACCEPTED",
            Self::AlreadyDeclined => "ALREADY_DECLINED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Human-readable explanation.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidToken => "Invalid invitation token",
            Self::Expired => "Invitation has expired",
            Self::AlreadyAccepted => "Invitation has already been accepted",
            Self::AlreadyDeclined => "Invitation has already been declined",
            Self::Cancelled => "Invitation was cancelled",
        }
    }

    /// Domain error raised when an accept or decline hits this reason.
    #[must_use]
    pub fn into_error(self) -> Error {
        match self {
            Self::Expired => Error::expired(self.message()),
            Self::AlreadyAccepted => Error::already_accepted(),
            Self::InvalidToken | Self::AlreadyDeclined | Self::Cancelled => {
                Error::invalid_token(self.message())
            }
        }
    }

    fn for_invitation(invitation: &Invitation, now: DateTime<Utc>) -> Option<Self> {
        match invitation.status {
            InvitationStatus::Accepted => Some(Self::AlreadyAccepted),
            InvitationStatus::Declined => Some(Self::AlreadyDeclined),
            InvitationStatus::Cancelled => Some(Self::Cancelled),
            InvitationStatus::Expired => Some(Self::Expired),
            InvitationStatus::Pending if invitation.is_expired_at(now) => Some(Self::Expired),
            InvitationStatus::Pending => None,
        }
    }

    fn for_connection(connection: &PendingConnection, now: DateTime<Utc>) -> Option<Self> {
        match connection.status {
            PendingConnectionStatus::Accepted => Some(Self::AlreadyAccepted),
            PendingConnectionStatus::Cancelled => Some(Self::Cancelled),
            PendingConnectionStatus::Expired => Some(Self::Expired),
            PendingConnectionStatus::Pending if connection.is_expired_at(now) => Some(Self::Expired),
            PendingConnectionStatus::Pending => None,
        }
    }
}

/// A redeemable invitation with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidInvitation {
    pub invitation: Invitation,
    /// `None` when the inviting account no longer exists.
    pub inviter: Option<UserAccount>,
}

impl ValidInvitation {
    /// Inviter display name, if the inviter still exists.
    #[must_use]
    pub fn inviter_name(&self) -> Option<&str> {
        self.inviter.as_ref().map(|user| user.display_name.as_str())
    }

    /// Inviter email, if the inviter still exists.
    #[must_use]
    pub fn inviter_email(&self) -> Option<&str> {
        self.inviter.as_ref().map(|user| user.email.as_ref())
    }
}

/// Outcome of validating a token or short code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    Valid(ValidInvitation),
    Invalid {
        reason: InvalidReason,
        message: String,
    },
}

impl TokenValidation {
    fn invalid(reason: InvalidReason) -> Self {
        Self::Invalid {
            reason,
            message: reason.message().to_owned(),
        }
    }

    /// The valid invitation, or the error matching the invalid reason.
    pub fn into_result(self) -> Result<ValidInvitation, Error> {
        match self {
            Self::Valid(valid) => Ok(valid),
            Self::Invalid { reason, .. } => Err(reason.into_error()),
        }
    }
}

/// Validates and transitions invitations.
#[derive(Clone)]
pub struct InvitationValidator {
    store: Arc<dyn LinkingStore>,
    clock: Arc<dyn Clock>,
}

impl InvitationValidator {
    /// Create a validator.
    pub fn new(store: Arc<dyn LinkingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validate a raw token.
    pub async fn validate_token(&self, token: &str) -> Result<TokenValidation, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self
            .validate_token_in(unit.as_mut(), token)
            .await
            .map_err(map_store_error);
        finish(unit, result).await
    }

    /// [`Self::validate_token`] inside an open unit.
    pub async fn validate_token_in(
        &self,
        unit: &mut dyn LinkingUnit,
        token: &str,
    ) -> StoreResult<TokenValidation> {
        let token = token.trim();
        if !TokenIssuer::is_well_formed_token(token) {
            return Ok(TokenValidation::invalid(InvalidReason::InvalidToken));
        }
        let found = unit
            .find_invitation_by_token_hash(&TokenIssuer::hash_token(token))
            .await?;
        match found {
            Some(invitation) => self.classify(unit, invitation).await,
            None => Ok(TokenValidation::invalid(InvalidReason::InvalidToken)),
        }
    }

    /// Validate a short code. Ambiguous codes fail closed.
    pub async fn validate_by_short_code(&self, code: &str) -> Result<TokenValidation, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self
            .validate_by_short_code_in(unit.as_mut(), code)
            .await
            .map_err(map_store_error);
        finish(unit, result).await
    }

    /// [`Self::validate_by_short_code`] inside an open unit.
    pub async fn validate_by_short_code_in(
        &self,
        unit: &mut dyn LinkingUnit,
        code: &str,
    ) -> StoreResult<TokenValidation> {
        let code = TokenIssuer::normalize_short_code(code);
        if code.is_empty() {
            return Ok(TokenValidation::invalid(InvalidReason::InvalidToken));
        }
        let matches = unit.find_invitations_by_short_code(&code).await?;
        match select_by_short_code(matches, self.clock.utc()) {
            ShortCodeMatch::Unique(invitation) => self.classify(unit, invitation).await,
            ShortCodeMatch::Ambiguous(count) => {
                warn!(short_code = %code, count, "ambiguous short code rejected");
                Ok(TokenValidation::invalid(InvalidReason::InvalidToken))
            }
            ShortCodeMatch::Unknown => Ok(TokenValidation::invalid(InvalidReason::InvalidToken)),
        }
    }

    async fn classify(
        &self,
        unit: &mut dyn LinkingUnit,
        invitation: Invitation,
    ) -> StoreResult<TokenValidation> {
        if let Some(reason) = InvalidReason::for_invitation(&invitation, self.clock.utc()) {
            return Ok(TokenValidation::invalid(reason));
        }
        let inviter = unit.find_user(&invitation.inviter_id).await?;
        Ok(TokenValidation::Valid(ValidInvitation {
            invitation,
            inviter,
        }))
    }

    /// Look up a legacy pending connection by raw token.
    pub async fn validate_connection_token_in(
        &self,
        unit: &mut dyn LinkingUnit,
        token: &str,
    ) -> StoreResult<Result<PendingConnection, InvalidReason>> {
        let token = token.trim();
        if !TokenIssuer::is_well_formed_token(token) {
            return Ok(Err(InvalidReason::InvalidToken));
        }
        let found = unit
            .find_pending_connection_by_token_hash(&TokenIssuer::hash_token(token))
            .await?;
        let Some(connection) = found else {
            return Ok(Err(InvalidReason::InvalidToken));
        };
        Ok(
            match InvalidReason::for_connection(&connection, self.clock.utc()) {
                Some(reason) => Err(reason),
                None => Ok(connection),
            },
        )
    }

    /// Mark the invitation behind `token` accepted by `accepter_id`.
    ///
    /// This links no rooms or contacts; the full acceptance pipeline lives
    /// in the registrar.
    pub async fn accept_invitation(
        &self,
        token: &str,
        accepter_id: &UserId,
    ) -> Result<Invitation, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let valid = self
                .validate_token_in(unit.as_mut(), token)
                .await
                .map_err(map_store_error)?
                .into_result()?;
            self.accept_in(unit.as_mut(), valid.invitation, accepter_id)
                .await
        }
        .await;
        finish(unit, result).await
    }

    /// [`Self::accept_invitation`] keyed by short code.
    pub async fn accept_by_short_code(
        &self,
        code: &str,
        accepter_id: &UserId,
    ) -> Result<Invitation, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let valid = self
                .validate_by_short_code_in(unit.as_mut(), code)
                .await
                .map_err(map_store_error)?
                .into_result()?;
            self.accept_in(unit.as_mut(), valid.invitation, accepter_id)
                .await
        }
        .await;
        finish(unit, result).await
    }

    async fn accept_in(
        &self,
        unit: &mut dyn LinkingUnit,
        mut invitation: Invitation,
        accepter_id: &UserId,
    ) -> Result<Invitation, Error> {
        if invitation.inviter_id == *accepter_id {
            return Err(Error::self_invite());
        }
        if reached_coparent_limit(unit, accepter_id)
            .await
            .map_err(map_store_error)?
        {
            return Err(Error::limit_reached("You already have a linked co-parent"));
        }
        let now = self.clock.utc();
        let changed = unit
            .transition_invitation(
                &invitation.id,
                &[InvitationStatus::Pending],
                InvitationTransition::accepted(*accepter_id, now),
            )
            .await
            .map_err(map_store_error)?;
        if !changed {
            return Err(Error::already_accepted());
        }
        invitation.status = InvitationStatus::Accepted;
        invitation.invitee_id = Some(*accepter_id);
        invitation.accepted_at = Some(now);
        Ok(invitation)
    }

    /// Refuse the invitation behind `token`.
    pub async fn decline_invitation(&self, token: &str, decliner_id: &UserId) -> Result<(), Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let valid = self
                .validate_token_in(unit.as_mut(), token)
                .await
                .map_err(map_store_error)?
                .into_result()?;
            let changed = unit
                .transition_invitation(
                    &valid.invitation.id,
                    &[InvitationStatus::Pending],
                    InvitationTransition::declined(*decliner_id),
                )
                .await
                .map_err(map_store_error)?;
            if !changed {
                return Err(Error::conflict("Invitation is no longer pending"));
            }
            info!(invitation_id = %valid.invitation.id, "invitation declined");
            Ok::<_, Error>(())
        }
        .await;
        finish(unit, result).await
    }

    /// Mark overdue pending invitations and connections expired. Returns
    /// how many rows changed.
    pub async fn expire_old_invitations(&self) -> Result<u64, Error> {
        let now = self.clock.utc();
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let invitations = unit.expire_invitations(now).await?;
            let connections = unit.expire_pending_connections(now).await?;
            Ok::<_, StoreError>(invitations + connections)
        }
        .await
        .map_err(map_store_error);
        let expired = finish(unit, result).await?;
        if expired > 0 {
            info!(expired, "expired overdue invitations");
        }
        Ok(expired)
    }
}

enum ShortCodeMatch {
    Unique(Invitation),
    Ambiguous(usize),
    Unknown,
}

/// Resolve the rows sharing a short code.
///
/// Codes are only unique among active invitations, so a retired row never
/// competes with a live one. More than one active row fails closed. With no
/// active row the newest retired one is reported, so callers learn that the
/// code expired or was already used.
fn select_by_short_code(rows: Vec<Invitation>, now: DateTime<Utc>) -> ShortCodeMatch {
    let (mut active, retired): (Vec<_>, Vec<_>) =
        rows.into_iter().partition(|row| row.is_active_at(now));
    match active.len() {
        0 => retired
            .into_iter()
            .max_by_key(|row| row.created_at)
            .map_or(ShortCodeMatch::Unknown, ShortCodeMatch::Unique),
        1 => active
            .pop()
            .map_or(ShortCodeMatch::Unknown, ShortCodeMatch::Unique),
        count => ShortCodeMatch::Ambiguous(count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::linking::{InvitationId, InvitationType};
    use crate::domain::{EmailAddress, ErrorCode, PersonName};
    use crate::outbound::memory::InMemoryLinkingStore;
    use crate::test_support::MutableClock;
    use chrono::TimeDelta;
    use rstest::{fixture, rstest};

    const TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    struct Harness {
        store: Arc<InMemoryLinkingStore>,
        clock: Arc<MutableClock>,
        validator: InvitationValidator,
        inviter: UserAccount,
        invitation: Invitation,
    }

    fn account(first: &str, email: &str) -> UserAccount {
        let email = EmailAddress::parse(email).expect("email");
        let name = PersonName::new(Some(first), None);
        UserAccount {
            id: UserId::random(),
            display_name: name.display_name(&email),
            username: first.to_lowercase(),
            email,
            name,
            password_hash: "fixture$pw".to_owned(),
            created_at: Utc::now(),
        }
    }

    #[fixture]
    fn harness() -> Harness {
        let now = Utc::now();
        let store = Arc::new(InMemoryLinkingStore::default());
        let clock = Arc::new(MutableClock::new(now));
        let inviter = account("Alice", "alice@example.com");
        store.seed_user(inviter.clone());
        let invitation = Invitation {
            id: InvitationId::random(),
            token_hash: TokenIssuer::hash_token(TOKEN),
            short_code: "LZ-ABC234".to_owned(),
            inviter_id: inviter.id,
            invitee_email: EmailAddress::parse("bob@example.com").expect("email"),
            invitee_id: None,
            invitation_type: InvitationType::CoParent,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: now + TimeDelta::days(7),
            accepted_at: None,
        };
        store.seed_invitation(invitation.clone());
        let validator = InvitationValidator::new(store.clone(), clock.clone());
        Harness {
            store,
            clock,
            validator,
            inviter,
            invitation,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn valid_token_reports_inviter(harness: Harness) {
        let validation = harness.validator.validate_token(TOKEN).await.expect("validate");
        let TokenValidation::Valid(valid) = validation else {
            panic!("expected a valid invitation");
        };
        assert_eq!(valid.inviter_name(), Some("Alice"));
        assert_eq!(valid.inviter_email(), Some("alice@example.com"));
    }

    #[rstest]
    #[case("")]
    #[case("short")]
    #[case("fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210")]
    #[tokio::test]
    async fn unusable_tokens_are_invalid(harness: Harness, #[case] token: &str) {
        let validation = harness.validator.validate_token(token).await.expect("validate");
        assert!(matches!(
            validation,
            TokenValidation::Invalid {
                reason: InvalidReason::InvalidToken,
                ..
            }
        ));
    }

    #[rstest]
    #[case(-1, false)]
    #[case(0, true)]
    #[case(1, true)]
    #[tokio::test]
    async fn expiry_boundary_is_inclusive(
        harness: Harness,
        #[case] offset_ms: i64,
        #[case] expired: bool,
    ) {
        let until_expiry = harness.invitation.expires_at - harness.clock.utc();
        harness
            .clock
            .advance(until_expiry + TimeDelta::milliseconds(offset_ms));
        let validation = harness.validator.validate_token(TOKEN).await.expect("validate");
        let is_expired = matches!(
            validation,
            TokenValidation::Invalid {
                reason: InvalidReason::Expired,
                ..
            }
        );
        assert_eq!(is_expired, expired);
    }

    #[rstest]
    #[tokio::test]
    async fn short_code_lookup_is_normalised(harness: Harness) {
        let validation = harness
            .validator
            .validate_by_short_code("  lz-abc234 ")
            .await
            .expect("validate");
        assert!(matches!(validation, TokenValidation::Valid(_)));
    }

    fn sibling(harness: &Harness, status: InvitationStatus, created_offset: TimeDelta) -> Invitation {
        let mut row = harness.invitation.clone();
        row.id = InvitationId::random();
        row.token_hash = TokenIssuer::hash_token(&row.id.to_string());
        row.status = status;
        row.created_at += created_offset;
        row
    }

    #[rstest]
    #[case(InvitationStatus::Accepted)]
    #[case(InvitationStatus::Declined)]
    #[case(InvitationStatus::Cancelled)]
    #[tokio::test]
    async fn retired_code_does_not_shadow_live_invitation(
        harness: Harness,
        #[case] status: InvitationStatus,
    ) {
        let retired = sibling(&harness, status, TimeDelta::days(-30));
        harness.store.seed_invitation(retired);

        let validation = harness
            .validator
            .validate_by_short_code("LZ-ABC234")
            .await
            .expect("validate");
        let TokenValidation::Valid(valid) = validation else {
            panic!("expected the pending invitation");
        };
        assert_eq!(valid.invitation.id, harness.invitation.id);
    }

    #[rstest]
    #[tokio::test]
    async fn two_live_invitations_sharing_a_code_fail_closed(harness: Harness) {
        let twin = sibling(&harness, InvitationStatus::Pending, TimeDelta::minutes(1));
        harness.store.seed_invitation(twin);

        let validation = harness
            .validator
            .validate_by_short_code("LZ-ABC234")
            .await
            .expect("validate");
        assert!(matches!(
            validation,
            TokenValidation::Invalid {
                reason: InvalidReason::InvalidToken,
                ..
            }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn spent_code_reports_its_latest_use(harness: Harness) {
        let bob = account("Bob", "bob@example.com");
        harness.store.seed_user(bob.clone());
        harness
            .validator
            .accept_by_short_code("LZ-ABC234", &bob.id)
            .await
            .expect("accept");

        let validation = harness
            .validator
            .validate_by_short_code("LZ-ABC234")
            .await
            .expect("validate");
        assert!(matches!(
            validation,
            TokenValidation::Invalid {
                reason: InvalidReason::AlreadyAccepted,
                ..
            }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn accept_is_single_use(harness: Harness) {
        let bob = account("Bob", "bob@example.com");
        harness.store.seed_user(bob.clone());

        let accepted = harness
            .validator
            .accept_invitation(TOKEN, &bob.id)
            .await
            .expect("accept");
        assert_eq!(accepted.status, InvitationStatus::Accepted);
        assert_eq!(accepted.invitee_id, Some(bob.id));

        let err = harness
            .validator
            .accept_invitation(TOKEN, &bob.id)
            .await
            .expect_err("second accept");
        assert_eq!(err.code(), ErrorCode::AlreadyAccepted);
    }

    #[rstest]
    #[tokio::test]
    async fn inviter_cannot_accept_own_invitation(harness: Harness) {
        let err = harness
            .validator
            .accept_by_short_code("LZ-ABC234", &harness.inviter.id)
            .await
            .expect_err("self accept");
        assert_eq!(err.code(), ErrorCode::InvalidToken);
    }

    #[rstest]
    #[tokio::test]
    async fn declined_invitation_cannot_be_accepted(harness: Harness) {
        let bob = account("Bob", "bob@example.com");
        harness.store.seed_user(bob.clone());
        harness
            .validator
            .decline_invitation(TOKEN, &bob.id)
            .await
            .expect("decline");
        let err = harness
            .validator
            .accept_invitation(TOKEN, &bob.id)
            .await
            .expect_err("declined");
        assert_eq!(err.code(), ErrorCode::InvalidToken);
        assert_eq!(err.message(), "Invitation has already been declined");
    }

    #[rstest]
    #[tokio::test]
    async fn sweep_expires_overdue_invitations(harness: Harness) {
        assert_eq!(
            harness.validator.expire_old_invitations().await.expect("sweep"),
            0
        );
        harness.clock.advance(TimeDelta::days(7));
        assert_eq!(
            harness.validator.expire_old_invitations().await.expect("sweep"),
            1
        );
        assert_eq!(
            harness.validator.expire_old_invitations().await.expect("sweep"),
            0
        );
    }
}
