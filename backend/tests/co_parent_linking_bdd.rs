//! Behaviour tests for the co-parent linking workflow.
//!
//! Scenarios drive the domain services directly over the in-memory store so
//! faults and clock movement can be injected between steps.

// Shared harness carries helpers used by other suites.
#[allow(dead_code)]
#[path = "support/linking.rs"]
mod linking_support;

use std::collections::HashMap;
use std::future::Future;

use chrono::TimeDelta;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tandem::domain::linking::{AcceptingIdentity, LinkOutcome, NewAccount, TokenValidation};
use tandem::domain::{Error, UserAccount};
use tandem::outbound::memory::Fault;
use tokio::runtime::Runtime;
use zeroize::Zeroizing;

use linking_support::{LinkingHarness, PASSWORD, signup_request};

struct LinkingWorld {
    runtime: Runtime,
    harness: LinkingHarness,
    users: HashMap<String, UserAccount>,
    token: Option<String>,
    outcome: Option<Result<LinkOutcome, Error>>,
    swept: Option<u64>,
}

impl LinkingWorld {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn user(&self, email: &str) -> &UserAccount {
        self.users
            .get(email)
            .unwrap_or_else(|| panic!("no registered parent {email}"))
    }

    fn token(&self) -> String {
        self.token.clone().expect("an invitation was issued")
    }

    fn linked(&self) -> &LinkOutcome {
        match self.outcome.as_ref().expect("an acceptance was attempted") {
            Ok(outcome) => outcome,
            Err(err) => panic!("acceptance failed: {} {}", err.code(), err.message()),
        }
    }

    fn accept(&mut self, identity: AcceptingIdentity) {
        let token = self.token();
        let registrar = self.harness.registrar.clone();
        let outcome = self.block_on(registrar.accept_invitation(&token, identity));
        if let Ok(linked) = &outcome {
            self.users
                .insert(linked.user.email.to_string(), linked.user.clone());
        }
        self.outcome = Some(outcome);
    }
}

#[fixture]
fn world() -> LinkingWorld {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime");
    LinkingWorld {
        runtime,
        harness: LinkingHarness::new(),
        users: HashMap::new(),
        token: None,
        outcome: None,
        swept: None,
    }
}

#[given("a registered parent {email} named {name}")]
fn a_registered_parent(world: &mut LinkingWorld, email: String, name: String) {
    let registrar = world.harness.registrar.clone();
    let registered = world
        .block_on(registrar.signup(signup_request(&email, &name)))
        .expect("signup succeeds");
    world.users.insert(email, registered.user);
}

#[when("{inviter} invites {invitee}")]
fn inviter_invites(world: &mut LinkingWorld, inviter: String, invitee: String) {
    let inviter_id = world.user(&inviter).id;
    let registrar = world.harness.registrar.clone();
    let created = world
        .block_on(registrar.invitations().create_invitation(&inviter_id, &invitee))
        .expect("invitation issued");
    world.token = Some(created.token.expect("fresh invitation carries a token"));
}

#[when("{email} accepts the invitation as a new account named {name}")]
fn accepts_as_new_account(world: &mut LinkingWorld, email: String, name: String) {
    world.accept(AcceptingIdentity::NewAccount(NewAccount {
        email,
        password: Zeroizing::new(PASSWORD.to_owned()),
        display_name: Some(name),
        first_name: None,
        last_name: None,
    }));
}

#[when("{email} accepts the invitation with their account")]
fn accepts_with_account(world: &mut LinkingWorld, email: String) {
    let user_id = world.user(&email).id;
    world.accept(AcceptingIdentity::Existing(user_id));
}

#[when("{email} declines the invitation")]
fn declines(world: &mut LinkingWorld, email: String) {
    let user_id = world.user(&email).id;
    let token = world.token();
    let registrar = world.harness.registrar.clone();
    world
        .block_on(registrar.validator().decline_invitation(&token, &user_id))
        .expect("decline succeeds");
}

#[when("{days} days pass")]
fn days_pass(world: &mut LinkingWorld, days: i64) {
    world.harness.clock.advance(TimeDelta::days(days));
}

#[when("the expiry sweep runs")]
fn the_expiry_sweep_runs(world: &mut LinkingWorld) {
    let registrar = world.harness.registrar.clone();
    let swept = world
        .block_on(registrar.validator().expire_old_invitations())
        .expect("sweep succeeds");
    world.swept = Some(swept);
}

#[when("the store fails the next contact insert")]
fn the_store_fails_the_next_contact_insert(world: &mut LinkingWorld) {
    world.harness.store.inject_fault(Fault::InsertContact);
}

#[then("the acceptance succeeds with a new account")]
fn the_acceptance_succeeds_with_a_new_account(world: &mut LinkingWorld) {
    assert!(world.linked().created_account);
}

#[then("the co-parents share a room named {name}")]
fn the_co_parents_share_a_room(world: &mut LinkingWorld, name: String) {
    let linked = world.linked().clone();
    assert_eq!(linked.room.name, name);
    let registrar = world.harness.registrar.clone();
    for party in [&linked.user.id, &linked.co_parent.id] {
        let room = world
            .block_on(registrar.rooms().get_user_room(party))
            .expect("room lookup")
            .expect("party has a room");
        assert_eq!(room.id, linked.room.id);
    }
}

#[then("each co-parent lists the other as a contact")]
fn each_co_parent_lists_the_other(world: &mut LinkingWorld) {
    let linked = world.linked().clone();
    let registrar = world.harness.registrar.clone();
    for (owner, other) in [
        (&linked.user, &linked.co_parent),
        (&linked.co_parent, &linked.user),
    ] {
        let contacts = world
            .block_on(registrar.contacts().list_contacts(&owner.id))
            .expect("contact listing");
        assert!(
            contacts
                .iter()
                .any(|contact| contact.linked_user_id == Some(other.id)),
            "{} should list {}",
            owner.email,
            other.email
        );
    }
}

#[then("the acceptance fails with code {code}")]
fn the_acceptance_fails_with_code(world: &mut LinkingWorld, code: String) {
    match world.outcome.as_ref().expect("an acceptance was attempted") {
        Ok(_) => panic!("expected acceptance to fail with {code}"),
        Err(err) => assert_eq!(err.code().as_str(), code),
    }
}

#[then("the sweep expired {count} record")]
fn the_sweep_expired(world: &mut LinkingWorld, count: u64) {
    assert_eq!(world.swept, Some(count));
}

#[then("validating the invitation reports {reason}")]
fn validating_reports(world: &mut LinkingWorld, reason: String) {
    let token = world.token();
    let registrar = world.harness.registrar.clone();
    let validation = world
        .block_on(registrar.validator().validate_token(&token))
        .expect("validation runs");
    match validation {
        TokenValidation::Invalid { reason: actual, .. } => assert_eq!(actual.as_str(), reason),
        TokenValidation::Valid(_) => panic!("expected {reason}, invitation is still valid"),
    }
}

#[then("the store holds {users} user and {pending} pending invitation")]
fn the_store_holds(world: &mut LinkingWorld, users: usize, pending: usize) {
    let snapshot = world.harness.store.snapshot();
    assert_eq!(snapshot.users, users);
    assert_eq!(snapshot.pending_invitations, pending);
}

#[scenario(
    path = "tests/features/co_parent_linking.feature",
    name = "Invitee without an account accepts and shares a room"
)]
fn invitee_without_account_accepts(world: LinkingWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/co_parent_linking.feature",
    name = "Declined invitations cannot be accepted"
)]
fn declined_invitations_cannot_be_accepted(world: LinkingWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/co_parent_linking.feature",
    name = "Stale invitations are swept to expired"
)]
fn stale_invitations_are_swept(world: LinkingWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/co_parent_linking.feature",
    name = "A failed contact sync rolls the acceptance back"
)]
fn failed_contact_sync_rolls_back(world: LinkingWorld) {
    drop(world);
}
