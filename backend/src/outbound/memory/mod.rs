//! In-process linking store.
//!
//! Units of work are serialised through an owned async mutex. Each unit
//! edits a private copy of the tables that replaces the shared copy on
//! commit and is dropped on rollback, so readers never see partial writes.
//! Used by the test suites and by local runs without `DATABASE_URL`.

mod unit;

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::UserAccount;
use crate::domain::linking::{
    Contact, Invitation, InvitationStatus, PendingConnection, Room, RoomInvite, RoomMember,
};
use crate::domain::ports::{LinkingStore, LinkingUnit, StoreError, StoreResult};

use self::unit::InMemoryUnit;

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<UserAccount>,
    invitations: Vec<Invitation>,
    pending_connections: Vec<PendingConnection>,
    rooms: Vec<Room>,
    room_members: Vec<RoomMember>,
    room_invites: Vec<RoomInvite>,
    contacts: Vec<Contact>,
}

/// Operation that an injected fault makes fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Begin,
    InsertUser,
    InsertInvitation,
    TransitionInvitation,
    InsertRoom,
    AddMember,
    InsertContact,
    Commit,
}

impl Fault {
    fn error(self) -> StoreError {
        match self {
            Self::Begin | Self::Commit => StoreError::connection(format!("injected {self:?} fault")),
            _ => StoreError::query(format!("injected {self:?} fault")),
        }
    }
}

/// Concurrent commit that the next matching operation loses to.
///
/// Units of work here are serialised, so these stand in for the interleavings
/// a database produces under concurrent transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Race {
    /// Another unit already inserted a pending invitation for the same pair.
    InsertInvitation,
    /// Another unit already moved the invitation out of its expected status.
    TransitionInvitation,
    /// Another unit already inserted the same co-parent contact.
    InsertContact,
}

#[derive(Debug, Default)]
struct Planned {
    faults: Vec<Fault>,
    races: Vec<Race>,
}

fn take<T: PartialEq>(planned: &mut Vec<T>, point: &T) -> bool {
    match planned.iter().position(|entry| entry == point) {
        Some(index) => {
            planned.remove(index);
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone, Default)]
struct FaultPlan(Arc<Mutex<Planned>>);

impl FaultPlan {
    fn lock(&self) -> StoreResult<MutexGuard<'_, Planned>> {
        self.0
            .lock()
            .map_err(|_| StoreError::query("fault plan lock poisoned"))
    }

    fn trip(&self, point: Fault) -> StoreResult<()> {
        if take(&mut self.lock()?.faults, &point) {
            return Err(point.error());
        }
        Ok(())
    }

    /// Whether a rival commit was planned for `point`; consumes the plan.
    fn lost(&self, point: Race) -> StoreResult<bool> {
        Ok(take(&mut self.lock()?.races, &point))
    }
}

/// Row counts at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkingSnapshot {
    pub users: usize,
    pub invitations: usize,
    pub pending_invitations: usize,
    pub pending_connections: usize,
    pub rooms: usize,
    pub room_members: usize,
    pub room_invites: usize,
    pub contacts: usize,
}

/// Transactional linking store held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLinkingStore {
    tables: Arc<AsyncMutex<Tables>>,
    faults: FaultPlan,
}

impl InMemoryLinkingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkingStore for InMemoryLinkingStore {
    async fn begin(&self) -> StoreResult<Box<dyn LinkingUnit>> {
        self.faults.trip(Fault::Begin)?;
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(InMemoryUnit::new(guard, self.faults.clone())))
    }
}

#[cfg(any(test, feature = "test-support"))]
impl InMemoryLinkingStore {
    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        match self.tables.try_lock() {
            Ok(mut tables) => f(&mut tables),
            Err(_) => panic!("in-memory store is held by an open unit of work"),
        }
    }

    /// Insert a user directly, bypassing validation.
    pub fn seed_user(&self, user: UserAccount) {
        self.with_tables(|tables| tables.users.push(user));
    }

    /// Insert an invitation directly.
    pub fn seed_invitation(&self, invitation: Invitation) {
        self.with_tables(|tables| tables.invitations.push(invitation));
    }

    /// Insert a contact directly.
    pub fn seed_contact(&self, contact: Contact) {
        self.with_tables(|tables| tables.contacts.push(contact));
    }

    /// Make the next `fault` operation fail once.
    pub fn inject_fault(&self, fault: Fault) {
        match self.faults.lock() {
            Ok(mut planned) => planned.faults.push(fault),
            Err(err) => panic!("{err}"),
        }
    }

    /// Make the next `race` operation observe a rival unit's commit.
    pub fn inject_race(&self, race: Race) {
        match self.faults.lock() {
            Ok(mut planned) => planned.races.push(race),
            Err(err) => panic!("{err}"),
        }
    }

    /// Current committed row counts.
    pub fn snapshot(&self) -> LinkingSnapshot {
        self.with_tables(|tables| LinkingSnapshot {
            users: tables.users.len(),
            invitations: tables.invitations.len(),
            pending_invitations: tables
                .invitations
                .iter()
                .filter(|invitation| invitation.status == InvitationStatus::Pending)
                .count(),
            pending_connections: tables.pending_connections.len(),
            rooms: tables.rooms.len(),
            room_members: tables.room_members.len(),
            room_invites: tables.room_invites.len(),
            contacts: tables.contacts.len(),
        })
    }
}
