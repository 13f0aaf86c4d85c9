//! Account creation and the co-parent acceptance pipeline.
//!
//! Every acceptance path (token, short code, legacy pending connection)
//! runs the same steps inside one unit of work: re-validate, create the
//! account if needed, mark the invitation accepted, merge rooms, sync
//! contacts. Nothing becomes visible until the unit commits.

use std::sync::Arc;

use mockable::Clock;
use rand::Rng;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::contacts::contact_error;
use super::invitations::{load_inviter, parse_email, reached_coparent_limit};
use super::rooms::room_error;
use super::{
    ContactSync, CreatedInvitation, Invitation, InvitationService, InvitationStatus,
    InvitationValidator, PendingConnection, PendingConnectionStatus, Room, RoomMerger,
    TandemSettings, TokenIssuer, begin, finish, map_store_error,
};
use crate::domain::ports::{
    InvitationNotifier, InvitationRepository, InvitationTransition, LinkingStore, LinkingUnit,
    PasswordHashError, PasswordHasher, PendingConnectionRepository, StoreError,
    USERS_EMAIL_CONSTRAINT, USERS_USERNAME_CONSTRAINT, UserRepository,
};
use crate::domain::{
    EmailAddress, Error, PasswordPolicy, PersonName, USERNAME_MAX_LEN, UserAccount, UserId,
    username_base,
};

const AUDIT_TARGET: &str = "tandem::audit";
const USERNAME_ATTEMPTS: usize = 10;
const USERNAME_SUFFIX_LEN: usize = 4;
const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Fields collected by the signup and register forms.
#[derive(Clone)]
pub struct SignupRequest {
    pub email: String,
    pub password: Zeroizing<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Account details supplied by an invitee without a session.
#[derive(Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: Zeroizing<String>,
    /// Overrides the name composed from `first_name` and `last_name`.
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Who is accepting an invitation.
#[derive(Clone)]
pub enum AcceptingIdentity {
    /// Signed-in user taken from the session.
    Existing(UserId),
    /// Account to create as part of the acceptance.
    NewAccount(NewAccount),
}

/// Result of [`AccountRegistrar::signup`] and
/// [`AccountRegistrar::register_with_invitation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredAccount {
    pub user: UserAccount,
    /// The new user's private room.
    pub room: Room,
    pub invitation: Option<CreatedInvitation>,
}

/// What the acceptance changed besides the invitation itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Both co-parent contacts exist after the call.
    pub contacts_created: bool,
    /// The accepting user belongs to the shared room.
    pub room_joined: bool,
}

/// Result of an acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub user: UserAccount,
    pub co_parent: UserAccount,
    pub room: Room,
    pub sync: SyncSummary,
    /// The accepting account was created by this call.
    pub created_account: bool,
}

#[derive(Clone, Copy)]
enum Ticket<'a> {
    Token(&'a str),
    ShortCode(&'a str),
    Connection(&'a str),
}

impl Ticket<'_> {
    const fn kind(self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::ShortCode(_) => "short_code",
            Self::Connection(_) => "pending_connection",
        }
    }
}

enum Redeemable {
    Invitation(Invitation),
    Connection(PendingConnection),
}

impl Redeemable {
    const fn inviter_id(&self) -> &UserId {
        match self {
            Self::Invitation(invitation) => &invitation.inviter_id,
            Self::Connection(connection) => &connection.inviter_id,
        }
    }

    const fn invitee_email(&self) -> &EmailAddress {
        match self {
            Self::Invitation(invitation) => &invitation.invitee_email,
            Self::Connection(connection) => &connection.invitee_email,
        }
    }
}

/// A new account that passed validation and has a password hash.
struct PreparedAccount {
    email: EmailAddress,
    name: PersonName,
    display_name: String,
    password_hash: String,
}

enum PreparedIdentity {
    Existing(UserId),
    New(PreparedAccount),
}

/// Orchestrates signup, registration and invitation acceptance.
#[derive(Clone)]
pub struct AccountRegistrar {
    store: Arc<dyn LinkingStore>,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn PasswordHasher>,
    policy: PasswordPolicy,
    invitations: InvitationService,
    validator: InvitationValidator,
    rooms: RoomMerger,
    contacts: ContactSync,
}

impl AccountRegistrar {
    /// Wire the linking services over one store.
    pub fn new(
        store: Arc<dyn LinkingStore>,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn PasswordHasher>,
        notifier: Arc<dyn InvitationNotifier>,
        settings: &TandemSettings,
    ) -> Self {
        let contacts = ContactSync::new(store.clone(), clock.clone());
        let rooms = RoomMerger::new(
            store.clone(),
            clock.clone(),
            TokenIssuer::with_ttl_days(settings.room_invite_ttl_days()),
            contacts.clone(),
        );
        let invitations = InvitationService::new(
            store.clone(),
            clock.clone(),
            TokenIssuer::with_ttl_days(settings.invitation_ttl_days()),
            notifier,
        );
        let validator = InvitationValidator::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            hasher,
            policy: PasswordPolicy::new(settings.app_name()),
            invitations,
            validator,
            rooms,
            contacts,
        }
    }

    /// Invitation issuing and listing.
    pub fn invitations(&self) -> &InvitationService {
        &self.invitations
    }

    /// Token validation, decline and the expiry sweep.
    pub fn validator(&self) -> &InvitationValidator {
        &self.validator
    }

    /// Room lookup and room invite codes.
    pub fn rooms(&self) -> &RoomMerger {
        &self.rooms
    }

    /// Contact listing and synchronisation.
    pub fn contacts(&self) -> &ContactSync {
        &self.contacts
    }

    /// Load an account by id.
    pub async fn user(&self, user_id: &UserId) -> Result<UserAccount, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = unit
            .find_user(user_id)
            .await
            .map_err(map_store_error)
            .and_then(|user| user.ok_or_else(|| Error::not_found("User not found")));
        finish(unit, result).await
    }

    /// Create an account with its private room.
    pub async fn signup(&self, request: SignupRequest) -> Result<RegisteredAccount, Error> {
        let account = self.prepare_account(&request, None).await?;
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self.signup_in(unit.as_mut(), &account).await;
        let (user, room) = finish(unit, result).await?;
        info!(target: AUDIT_TARGET, event = "signup", user_id = %user.id, "account created");
        Ok(RegisteredAccount {
            user,
            room,
            invitation: None,
        })
    }

    /// Create an account and invite `co_parent_email` in the same unit.
    ///
    /// Self-invitations are rejected before anything is written.
    pub async fn register_with_invitation(
        &self,
        request: SignupRequest,
        co_parent_email: &str,
    ) -> Result<RegisteredAccount, Error> {
        let co_parent = parse_email(co_parent_email)?;
        let own = parse_email(&request.email)?;
        if own == co_parent {
            return Err(Error::self_invite());
        }
        let account = self.prepare_account(&request, None).await?;

        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let (user, room) = self.signup_in(unit.as_mut(), &account).await?;
            let invitation = self
                .invitations
                .create_invitation_in(unit.as_mut(), &user, &co_parent)
                .await?;
            Ok::<_, Error>((user, room, invitation))
        }
        .await;
        let (user, room, invitation) = finish(unit, result).await?;

        self.invitations.notify_created(&user, &invitation).await;
        info!(
            target: AUDIT_TARGET,
            event = "register",
            user_id = %user.id,
            invitation_id = %invitation.invitation.id,
            "account created with invitation"
        );
        Ok(RegisteredAccount {
            user,
            room,
            invitation: Some(invitation),
        })
    }

    /// Verify credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserAccount, Error> {
        let email = EmailAddress::parse(email).map_err(|_| Error::unauthorized(INVALID_CREDENTIALS))?;
        let mut unit = begin(self.store.as_ref()).await?;
        let result = unit.find_user_by_email(&email).await.map_err(map_store_error);
        let user = finish(unit, result)
            .await?
            .ok_or_else(|| Error::unauthorized(INVALID_CREDENTIALS))?;

        let hasher = self.hasher.clone();
        let candidate = Zeroizing::new(password.to_owned());
        let stored = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&candidate, &stored))
            .await
            .map_err(|err| Error::internal(format!("password verification task failed: {err}")))?;
        match verified {
            Ok(true) => Ok(user),
            Ok(false) => Err(Error::unauthorized(INVALID_CREDENTIALS)),
            Err(err) => {
                warn!(user_id = %user.id, error = %err, "stored password hash rejected");
                Err(Error::unauthorized(INVALID_CREDENTIALS))
            }
        }
    }

    /// Accept the invitation behind a raw token.
    pub async fn accept_invitation(
        &self,
        token: &str,
        identity: AcceptingIdentity,
    ) -> Result<LinkOutcome, Error> {
        self.accept(Ticket::Token(token), identity).await
    }

    /// Accept the invitation behind a short code.
    pub async fn accept_by_short_code(
        &self,
        code: &str,
        identity: AcceptingIdentity,
    ) -> Result<LinkOutcome, Error> {
        self.accept(Ticket::ShortCode(code), identity).await
    }

    /// Accept a legacy pending connection.
    pub async fn accept_pending_connection(
        &self,
        token: &str,
        identity: AcceptingIdentity,
    ) -> Result<LinkOutcome, Error> {
        self.accept(Ticket::Connection(token), identity).await
    }

    async fn accept(
        &self,
        ticket: Ticket<'_>,
        identity: AcceptingIdentity,
    ) -> Result<LinkOutcome, Error> {
        let identity = self.prepare_identity(identity).await?;

        // Cheap rejection of dead tickets before any account is written.
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self.resolve_in(unit.as_mut(), ticket).await;
        let precheck = finish(unit, result).await?;
        if let PreparedIdentity::New(account) = &identity {
            if account.email != *precheck.invitee_email() {
                return Err(Error::invalid_token("Email mismatch"));
            }
        }

        let mut unit = begin(self.store.as_ref()).await?;
        let result = self.link_in(unit.as_mut(), ticket, &identity).await;
        let outcome = finish(unit, result).await?;

        info!(
            target: AUDIT_TARGET,
            event = "coparents_linked",
            via = ticket.kind(),
            user_id = %outcome.user.id,
            co_parent_id = %outcome.co_parent.id,
            room_id = %outcome.room.id,
            created_account = outcome.created_account,
            "co-parents linked"
        );
        Ok(outcome)
    }

    async fn resolve_in(
        &self,
        unit: &mut dyn LinkingUnit,
        ticket: Ticket<'_>,
    ) -> Result<Redeemable, Error> {
        match ticket {
            Ticket::Token(token) => self
                .validator
                .validate_token_in(unit, token)
                .await
                .map_err(map_store_error)?
                .into_result()
                .map(|valid| Redeemable::Invitation(valid.invitation)),
            Ticket::ShortCode(code) => self
                .validator
                .validate_by_short_code_in(unit, code)
                .await
                .map_err(map_store_error)?
                .into_result()
                .map(|valid| Redeemable::Invitation(valid.invitation)),
            Ticket::Connection(token) => self
                .validator
                .validate_connection_token_in(unit, token)
                .await
                .map_err(map_store_error)?
                .map(Redeemable::Connection)
                .map_err(|reason| reason.into_error()),
        }
    }

    async fn link_in(
        &self,
        unit: &mut dyn LinkingUnit,
        ticket: Ticket<'_>,
        identity: &PreparedIdentity,
    ) -> Result<LinkOutcome, Error> {
        let redeemable = self.resolve_in(unit, ticket).await?;
        let inviter = load_inviter(unit, redeemable.inviter_id()).await?;

        let (user, created_account) = match identity {
            PreparedIdentity::Existing(user_id) => {
                let user = unit
                    .find_user(user_id)
                    .await
                    .map_err(map_store_error)?
                    .ok_or_else(|| Error::unauthorized("Session user no longer exists"))?;
                (user, false)
            }
            PreparedIdentity::New(account) => {
                if account.email != *redeemable.invitee_email() {
                    return Err(Error::invalid_token("Email mismatch"));
                }
                if account.email == inviter.email {
                    return Err(Error::self_invite());
                }
                (self.create_user_in(unit, account).await?, true)
            }
        };
        if user.id == inviter.id {
            return Err(Error::self_invite());
        }

        for party in [&user.id, &inviter.id] {
            if reached_coparent_limit(unit, party)
                .await
                .map_err(map_store_error)?
            {
                return Err(Error::limit_reached("A co-parent is already linked"));
            }
        }

        let now = self.clock.utc();
        let accepted = match &redeemable {
            Redeemable::Invitation(invitation) => unit
                .transition_invitation(
                    &invitation.id,
                    &[InvitationStatus::Pending],
                    InvitationTransition::accepted(user.id, now),
                )
                .await
                .map_err(map_store_error)?,
            Redeemable::Connection(connection) => unit
                .transition_pending_connection(
                    &connection.id,
                    PendingConnectionStatus::Accepted,
                    Some(user.id),
                    now,
                )
                .await
                .map_err(map_store_error)?,
        };
        if !accepted {
            return Err(Error::already_accepted());
        }

        let shared = self
            .rooms
            .merge_or_create_shared_room_in(unit, &inviter, &user)
            .await
            .map_err(room_error)?;
        let report = self
            .contacts
            .ensure_bidirectional_contact_in(unit, &inviter, &user)
            .await
            .map_err(contact_error)?;
        self.contacts
            .share_auxiliary_contacts_in(unit, &inviter, &user)
            .await
            .map_err(contact_error)?;

        Ok(LinkOutcome {
            user,
            co_parent: inviter,
            room: shared.room,
            sync: SyncSummary {
                contacts_created: report.present,
                room_joined: shared.room_joined,
            },
            created_account,
        })
    }

    async fn signup_in(
        &self,
        unit: &mut dyn LinkingUnit,
        account: &PreparedAccount,
    ) -> Result<(UserAccount, Room), Error> {
        let user = self.create_user_in(unit, account).await?;
        let room = self
            .rooms
            .create_private_room_in(unit, &user.id, &user.display_name)
            .await
            .map_err(room_error)?;
        Ok((user, room))
    }

    async fn create_user_in(
        &self,
        unit: &mut dyn LinkingUnit,
        account: &PreparedAccount,
    ) -> Result<UserAccount, Error> {
        let existing = unit
            .find_user_by_email(&account.email)
            .await
            .map_err(map_store_error)?;
        if existing.is_some() {
            return Err(Error::email_exists());
        }
        let username = allocate_username(unit, &account.email).await?;
        let user = UserAccount {
            id: UserId::random(),
            email: account.email.clone(),
            username,
            name: account.name.clone(),
            display_name: account.display_name.clone(),
            password_hash: account.password_hash.clone(),
            created_at: self.clock.utc(),
        };
        unit.insert_user(&user).await.map_err(user_insert_error)?;
        Ok(user)
    }

    async fn prepare_identity(
        &self,
        identity: AcceptingIdentity,
    ) -> Result<PreparedIdentity, Error> {
        match identity {
            AcceptingIdentity::Existing(user_id) => Ok(PreparedIdentity::Existing(user_id)),
            AcceptingIdentity::NewAccount(account) => {
                let request = SignupRequest {
                    email: account.email,
                    password: account.password,
                    first_name: account.first_name,
                    last_name: account.last_name,
                };
                let prepared = self
                    .prepare_account(&request, account.display_name.as_deref())
                    .await?;
                Ok(PreparedIdentity::New(prepared))
            }
        }
    }

    async fn prepare_account(
        &self,
        request: &SignupRequest,
        display_name: Option<&str>,
    ) -> Result<PreparedAccount, Error> {
        let email = parse_email(&request.email)?;
        self.policy.enforce(&request.password, Some(&email))?;

        let name = PersonName::new(request.first_name.as_deref(), request.last_name.as_deref());
        let display_name = display_name
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map_or_else(|| name.display_name(&email), str::to_owned);

        let hasher = self.hasher.clone();
        let password = request.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| Error::internal(format!("password hashing task failed: {err}")))?
            .map_err(hash_error)?;

        Ok(PreparedAccount {
            email,
            name,
            display_name,
            password_hash,
        })
    }
}

/// Pick an unused handle: the bare email-derived base, then the base with
/// random four digit suffixes.
async fn allocate_username(
    unit: &mut dyn LinkingUnit,
    email: &EmailAddress,
) -> Result<String, Error> {
    let base = username_base(email);
    if !unit.username_exists(&base).await.map_err(map_store_error)? {
        return Ok(base);
    }
    let stem: String = base
        .chars()
        .take(USERNAME_MAX_LEN - USERNAME_SUFFIX_LEN)
        .collect();
    for _ in 0..USERNAME_ATTEMPTS {
        let suffix: u16 = rand::thread_rng().gen_range(1000..10_000);
        let candidate = format!("{stem}{suffix}");
        if !unit
            .username_exists(&candidate)
            .await
            .map_err(map_store_error)?
        {
            return Ok(candidate);
        }
    }
    warn!(%base, "username space exhausted");
    Err(Error::username_failed())
}

fn user_insert_error(err: StoreError) -> Error {
    if err.is_duplicate_of(USERS_EMAIL_CONSTRAINT) {
        Error::email_exists()
    } else if err.is_duplicate_of(USERS_USERNAME_CONSTRAINT) {
        Error::username_failed()
    } else {
        map_store_error(err)
    }
}

fn hash_error(err: PasswordHashError) -> Error {
    Error::internal(format!("password hashing failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::linking::{
        Contact, ContactId, Invitation, InvitationId, InvitationStatus, InvitationType,
        Relationship, TokenIssuer, TokenValidation,
    };
    use crate::domain::ports::{FixturePasswordHasher, MockInvitationNotifier};
    use crate::domain::{EmailAddress, UserId};
    use crate::outbound::memory::{Fault, InMemoryLinkingStore, Race};
    use crate::test_support::MutableClock;
    use chrono::{TimeDelta, Utc};
    use rstest::{fixture, rstest};

    const PASSWORD: &str = "CorrectHorse9!";

    struct Harness {
        store: Arc<InMemoryLinkingStore>,
        registrar: AccountRegistrar,
    }

    fn notifier() -> MockInvitationNotifier {
        let mut notifier = MockInvitationNotifier::new();
        notifier.expect_invitation_created().returning(|_| Ok(()));
        notifier
    }

    #[fixture]
    fn harness() -> Harness {
        let store = Arc::new(InMemoryLinkingStore::default());
        let registrar = AccountRegistrar::new(
            store.clone(),
            Arc::new(MutableClock::new(Utc::now())),
            Arc::new(FixturePasswordHasher),
            Arc::new(notifier()),
            &TandemSettings::default(),
        );
        Harness { store, registrar }
    }

    fn signup(email: &str, first: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_owned(),
            password: Zeroizing::new(PASSWORD.to_owned()),
            first_name: Some(first.to_owned()),
            last_name: None,
        }
    }

    fn new_account(email: &str, name: &str) -> AcceptingIdentity {
        AcceptingIdentity::NewAccount(NewAccount {
            email: email.to_owned(),
            password: Zeroizing::new(PASSWORD.to_owned()),
            display_name: Some(name.to_owned()),
            first_name: None,
            last_name: None,
        })
    }

    async fn alice_invites_bob(harness: &Harness) -> (RegisteredAccount, String) {
        let registered = harness
            .registrar
            .register_with_invitation(signup("alice@example.com", "Alice"), "bob@example.com")
            .await
            .expect("register alice");
        let token = registered
            .invitation
            .as_ref()
            .and_then(|created| created.token.clone())
            .expect("fresh token");
        (registered, token)
    }

    #[rstest]
    #[tokio::test]
    async fn signup_creates_user_and_private_room(harness: Harness) {
        let registered = harness
            .registrar
            .signup(signup(" Alice@Example.com ", "Alice"))
            .await
            .expect("signup");

        assert_eq!(registered.user.email.as_ref(), "alice@example.com");
        assert_eq!(registered.user.username, "alice");
        assert_eq!(registered.room.name, "Alice's Room");
        let snapshot = harness.store.snapshot();
        assert_eq!((snapshot.users, snapshot.rooms, snapshot.room_members), (1, 1, 1));

        let err = harness
            .registrar
            .signup(signup("alice@example.com", "Other"))
            .await
            .expect_err("duplicate email");
        assert_eq!(err.code(), ErrorCode::EmailExists);
    }

    #[rstest]
    #[tokio::test]
    async fn weak_password_reports_requirements(harness: Harness) {
        let mut request = signup("alice@example.com", "Alice");
        request.password = Zeroizing::new("tandem-rocks-2024".to_owned());
        let err = harness.registrar.signup(request).await.expect_err("weak");
        assert_eq!(err.code(), ErrorCode::WeakPassword);
        assert!(err.requirements().is_some());
        assert_eq!(harness.store.snapshot().users, 0);
    }

    #[rstest]
    #[case("alice@example.com")]
    #[case("ALICE@example.com")]
    #[case("  alice@Example.COM ")]
    #[tokio::test]
    async fn register_rejects_self_invite_before_writing(harness: Harness, #[case] co_parent: &str) {
        let err = harness
            .registrar
            .register_with_invitation(signup("alice@example.com", "Alice"), co_parent)
            .await
            .expect_err("self invite");
        assert_eq!(err.code(), ErrorCode::InvalidToken);
        assert_eq!(err.message(), "Cannot invite yourself");
        assert_eq!(harness.store.snapshot().users, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn new_account_accepts_and_links(harness: Harness) {
        let (alice, token) = alice_invites_bob(&harness).await;
        let outcome = harness
            .registrar
            .accept_invitation(&token, new_account("bob@example.com", "Bob"))
            .await
            .expect("accept");

        assert!(outcome.created_account);
        assert_eq!(outcome.co_parent.id, alice.user.id);
        assert_eq!(outcome.room.name, "Alice & Bob");
        assert!(outcome.sync.contacts_created);
        assert!(outcome.sync.room_joined);

        let snapshot = harness.store.snapshot();
        assert_eq!(snapshot.users, 2);
        assert_eq!(snapshot.rooms, 2, "alice keeps her solo room");
        assert_eq!(snapshot.contacts, 2);

        let bob_room = harness
            .registrar
            .rooms()
            .get_user_room(&outcome.user.id)
            .await
            .expect("room lookup");
        let alice_room = harness
            .registrar
            .rooms()
            .get_user_room(&alice.user.id)
            .await
            .expect("room lookup");
        assert_eq!(bob_room, alice_room);
    }

    #[rstest]
    #[tokio::test]
    async fn existing_user_accepts_by_short_code(harness: Harness) {
        let (alice, _) = alice_invites_bob(&harness).await;
        let bob = harness
            .registrar
            .signup(signup("bob@example.com", "Bob"))
            .await
            .expect("bob signup");
        let code = alice
            .invitation
            .as_ref()
            .map(|created| created.short_code.to_lowercase())
            .expect("short code");

        let outcome = harness
            .registrar
            .accept_by_short_code(&code, AcceptingIdentity::Existing(bob.user.id))
            .await
            .expect("accept");
        assert!(!outcome.created_account);
        assert_eq!(harness.store.snapshot().rooms, 3, "solo rooms are kept");
    }

    #[rstest]
    #[tokio::test]
    async fn email_mismatch_is_rejected(harness: Harness) {
        let (_, token) = alice_invites_bob(&harness).await;
        let err = harness
            .registrar
            .accept_invitation(&token, new_account("mallory@example.com", "Mallory"))
            .await
            .expect_err("mismatch");
        assert_eq!(err.code(), ErrorCode::InvalidToken);
        assert_eq!(err.message(), "Email mismatch");
        assert_eq!(harness.store.snapshot().users, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn contact_failure_rolls_everything_back(harness: Harness) {
        let (_, token) = alice_invites_bob(&harness).await;
        let before = harness.store.snapshot();
        harness.store.inject_fault(Fault::InsertContact);

        let err = harness
            .registrar
            .accept_invitation(&token, new_account("bob@example.com", "Bob"))
            .await
            .expect_err("fault");
        assert_eq!(err.code(), ErrorCode::ContactFailed);
        assert_eq!(harness.store.snapshot(), before);

        let validation = harness
            .registrar
            .validator()
            .validate_token(&token)
            .await
            .expect("validate");
        assert!(matches!(validation, TokenValidation::Valid(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn commit_failure_is_a_database_error(harness: Harness) {
        let (_, token) = alice_invites_bob(&harness).await;
        harness.store.inject_fault(Fault::Commit);
        let err = harness
            .registrar
            .accept_invitation(&token, new_account("bob@example.com", "Bob"))
            .await
            .expect_err("commit fault");
        assert_eq!(err.code(), ErrorCode::DatabaseError);
        assert_eq!(harness.store.snapshot().users, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn concurrent_accepts_have_one_winner(harness: Harness) {
        let (_, token) = alice_invites_bob(&harness).await;
        let bob = harness
            .registrar
            .signup(signup("bob@example.com", "Bob"))
            .await
            .expect("bob");
        let carol = harness
            .registrar
            .signup(signup("carol@example.com", "Carol"))
            .await
            .expect("carol");

        let first = harness.registrar.clone();
        let second = harness.registrar.clone();
        let (token_a, token_b) = (token.clone(), token);
        let (a, b) = tokio::join!(
            async move {
                first
                    .accept_invitation(&token_a, AcceptingIdentity::Existing(bob.user.id))
                    .await
            },
            async move {
                second
                    .accept_invitation(&token_b, AcceptingIdentity::Existing(carol.user.id))
                    .await
            },
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes
            .into_iter()
            .find_map(Result::err)
            .expect("one failure");
        assert_eq!(loser.code(), ErrorCode::AlreadyAccepted);
    }

    #[rstest]
    #[tokio::test]
    async fn losing_the_status_transition_leaves_no_trace(harness: Harness) {
        let (_, token) = alice_invites_bob(&harness).await;
        let bob = harness
            .registrar
            .signup(signup("bob@example.com", "Bob"))
            .await
            .expect("bob");
        let before = harness.store.snapshot();
        harness.store.inject_race(Race::TransitionInvitation);

        let err = harness
            .registrar
            .accept_invitation(&token, AcceptingIdentity::Existing(bob.user.id))
            .await
            .expect_err("lost race");
        assert_eq!(err.code(), ErrorCode::AlreadyAccepted);
        assert_eq!(harness.store.snapshot(), before);
    }

    #[rstest]
    #[tokio::test]
    async fn deleted_inviter_reports_gone(harness: Harness) {
        let token = "89abcdef0123456789abcdef0123456789abcdef0123456789abcdef01234567";
        let now = Utc::now();
        harness.store.seed_invitation(Invitation {
            id: InvitationId::random(),
            token_hash: TokenIssuer::hash_token(token),
            short_code: "LZ-XYZ789".to_owned(),
            inviter_id: UserId::random(),
            invitee_email: EmailAddress::parse("bob@example.com").expect("email"),
            invitee_id: None,
            invitation_type: InvitationType::CoParent,
            status: InvitationStatus::Pending,
            created_at: now,
            expires_at: now + TimeDelta::days(7),
            accepted_at: None,
        });

        let err = harness
            .registrar
            .accept_invitation(token, new_account("bob@example.com", "Bob"))
            .await
            .expect_err("orphaned invitation");
        assert_eq!(err.code(), ErrorCode::InviterGone);
        assert_eq!(harness.store.snapshot().users, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn second_link_hits_the_limit(harness: Harness) {
        let (_, token) = alice_invites_bob(&harness).await;
        let linked = harness
            .registrar
            .accept_invitation(&token, new_account("bob@example.com", "Bob"))
            .await
            .expect("accept");

        let carol = harness
            .registrar
            .register_with_invitation(signup("carol@example.com", "Carol"), "dave@example.com")
            .await
            .expect("carol");
        let carol_token = carol
            .invitation
            .and_then(|created| created.token)
            .expect("token");
        let err = harness
            .registrar
            .accept_invitation(&carol_token, AcceptingIdentity::Existing(linked.user.id))
            .await
            .expect_err("limit");
        assert_eq!(err.code(), ErrorCode::LimitReached);
    }

    #[rstest]
    #[tokio::test]
    async fn auxiliary_contacts_are_shared_on_accept(harness: Harness) {
        let (alice, token) = alice_invites_bob(&harness).await;
        harness.store.seed_contact(Contact {
            id: ContactId::random(),
            user_id: alice.user.id,
            contact_name: "Grandma".to_owned(),
            contact_email: None,
            relationship: Some(Relationship::Family),
            linked_user_id: None,
            notes: None,
            created_at: Utc::now(),
        });
        let outcome = harness
            .registrar
            .accept_invitation(&token, new_account("bob@example.com", "Bob"))
            .await
            .expect("accept");
        let contacts = harness
            .registrar
            .contacts()
            .list_contacts(&outcome.user.id)
            .await
            .expect("contacts");
        assert!(contacts.iter().any(|c| c.contact_name == "Grandma"));
    }

    #[rstest]
    #[tokio::test]
    async fn pending_connection_links_through_same_pipeline(harness: Harness) {
        let alice = harness
            .registrar
            .signup(signup("alice@example.com", "Alice"))
            .await
            .expect("alice");
        let bob = harness
            .registrar
            .signup(signup("bob@example.com", "Bob"))
            .await
            .expect("bob");
        let created = harness
            .registrar
            .invitations()
            .create_pending_connection(&alice.user.id, "bob@example.com")
            .await
            .expect("connection");
        let token = created.token.expect("token");
        assert!(created.is_existing_user);

        let outcome = harness
            .registrar
            .accept_pending_connection(&token, AcceptingIdentity::Existing(bob.user.id))
            .await
            .expect("accept");
        assert_eq!(outcome.co_parent.id, alice.user.id);
        assert!(outcome.sync.contacts_created);

        let err = harness
            .registrar
            .accept_pending_connection(&token, AcceptingIdentity::Existing(bob.user.id))
            .await
            .expect_err("reuse");
        assert_eq!(err.code(), ErrorCode::AlreadyAccepted);
    }

    #[rstest]
    #[case("alice@example.com", "wrong-password-1")]
    #[case("nobody@example.com", PASSWORD)]
    #[case("not-an-email", PASSWORD)]
    #[tokio::test]
    async fn login_failures_are_uniform(
        harness: Harness,
        #[case] email: &str,
        #[case] password: &str,
    ) {
        harness
            .registrar
            .signup(signup("alice@example.com", "Alice"))
            .await
            .expect("signup");
        let err = harness
            .registrar
            .login(email, password)
            .await
            .expect_err("login");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert_eq!(err.message(), INVALID_CREDENTIALS);
    }

    #[rstest]
    #[tokio::test]
    async fn login_accepts_valid_credentials(harness: Harness) {
        let registered = harness
            .registrar
            .signup(signup("alice@example.com", "Alice"))
            .await
            .expect("signup");
        let user = harness
            .registrar
            .login("ALICE@example.com", PASSWORD)
            .await
            .expect("login");
        assert_eq!(user.id, registered.user.id);
    }

    #[rstest]
    #[tokio::test]
    async fn usernames_get_suffixes_on_collision(harness: Harness) {
        harness
            .registrar
            .signup(signup("alice@example.com", "Alice"))
            .await
            .expect("first");
        let second = harness
            .registrar
            .signup(signup("alice@example.org", "Alice"))
            .await
            .expect("second");
        assert!(second.user.username.starts_with("alice"));
        assert_eq!(second.user.username.len(), "alice".len() + USERNAME_SUFFIX_LEN);
    }
}
