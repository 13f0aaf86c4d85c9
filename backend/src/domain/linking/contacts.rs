//! Bidirectional contact synchronisation between linked accounts.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, error};

use super::{Contact, ContactId, Relationship, RoomId, begin, finish};
use crate::domain::ports::{
    ContactRepository, LinkingStore, LinkingUnit, RoomRepository, StoreError, StoreResult,
    UserRepository,
};
use crate::domain::{Error, UserAccount, UserId};

/// Outcome of [`ContactSync::ensure_bidirectional_contact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactSyncReport {
    /// Co-parent contacts inserted by this call, 0 to 2.
    pub created: usize,
    /// Both directions exist after the call.
    pub present: bool,
}

/// Keeps co-parent contact lists in step.
///
/// Every insert is preceded by a case-insensitive lookup, so running any
/// operation twice leaves the contact tables unchanged the second time.
#[derive(Clone)]
pub struct ContactSync {
    store: Arc<dyn LinkingStore>,
    clock: Arc<dyn Clock>,
}

impl ContactSync {
    /// Create a contact synchroniser.
    pub fn new(store: Arc<dyn LinkingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Ensure `a` and `b` list each other as co-parents.
    pub async fn ensure_bidirectional_contact(
        &self,
        a: &UserId,
        b: &UserId,
    ) -> Result<ContactSyncReport, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = async {
            let (first, second) = load_pair(unit.as_mut(), a, b).await?;
            self.ensure_bidirectional_contact_in(unit.as_mut(), &first, &second)
                .await
                .map_err(contact_error)
        }
        .await;
        finish(unit, result).await
    }

    /// Link every pair of members in `room_id`.
    pub async fn ensure_contacts_for_room_members(&self, room_id: &RoomId) -> Result<usize, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = self
            .ensure_contacts_for_room_members_in(unit.as_mut(), room_id)
            .await
            .map_err(contact_error);
        finish(unit, result).await
    }

    /// Contacts owned by `user_id`.
    pub async fn list_contacts(&self, user_id: &UserId) -> Result<Vec<Contact>, Error> {
        let mut unit = begin(self.store.as_ref()).await?;
        let result = unit.list_contacts(user_id).await.map_err(super::map_store_error);
        finish(unit, result).await
    }

    /// [`Self::ensure_bidirectional_contact`] inside an open unit.
    pub async fn ensure_bidirectional_contact_in(
        &self,
        unit: &mut dyn LinkingUnit,
        a: &UserAccount,
        b: &UserAccount,
    ) -> StoreResult<ContactSyncReport> {
        let mut created = 0;
        let mut present = true;
        for (owner, peer) in [(a, b), (b, a)] {
            let name = peer.contact_name();
            let existing = unit
                .find_contact_by_name(&owner.id, &name, Some(Relationship::CoParent))
                .await?;
            if existing.is_some() {
                continue;
            }
            let inserted = unit
                .insert_contact(&Contact {
                    id: ContactId::random(),
                    user_id: owner.id,
                    contact_name: name.clone(),
                    contact_email: Some(peer.email.clone()),
                    relationship: Some(Relationship::CoParent),
                    linked_user_id: Some(peer.id),
                    notes: None,
                    created_at: self.clock.utc(),
                })
                .await?;
            if inserted {
                created += 1;
                continue;
            }
            // A concurrent writer holds the name; confirm its row is visible.
            let rival = unit
                .find_contact_by_name(&owner.id, &name, Some(Relationship::CoParent))
                .await?;
            present &= rival.is_some();
        }
        debug!(user_a = %a.id, user_b = %b.id, created, present, "co-parent contacts ensured");
        Ok(ContactSyncReport { created, present })
    }

    /// Copy each side's non-co-parent contacts to the other as bare
    /// placeholders. Returns how many placeholders were inserted.
    pub async fn share_auxiliary_contacts_in(
        &self,
        unit: &mut dyn LinkingUnit,
        a: &UserAccount,
        b: &UserAccount,
    ) -> StoreResult<usize> {
        let mut shared = 0;
        for (source, target) in [(a, b), (b, a)] {
            let contacts = unit.list_contacts(&source.id).await?;
            for contact in contacts {
                if contact.relationship == Some(Relationship::CoParent)
                    || names_target(&contact, target)
                {
                    continue;
                }
                let existing = unit
                    .find_contact_by_name(&target.id, &contact.contact_name, None)
                    .await?;
                if existing.is_some() {
                    continue;
                }
                let inserted = unit
                    .insert_contact(&Contact {
                        id: ContactId::random(),
                        user_id: target.id,
                        contact_name: contact.contact_name,
                        contact_email: None,
                        relationship: None,
                        linked_user_id: None,
                        notes: None,
                        created_at: self.clock.utc(),
                    })
                    .await?;
                shared += usize::from(inserted);
            }
        }
        Ok(shared)
    }

    /// [`Self::ensure_contacts_for_room_members`] inside an open unit.
    /// Returns the number of contacts inserted.
    pub async fn ensure_contacts_for_room_members_in(
        &self,
        unit: &mut dyn LinkingUnit,
        room_id: &RoomId,
    ) -> StoreResult<usize> {
        let members = unit.room_members(room_id).await?;
        let mut users = Vec::with_capacity(members.len());
        for member in &members {
            if let Some(user) = unit.find_user(&member.user_id).await? {
                users.push(user);
            }
        }

        let mut created = 0;
        for (index, first) in users.iter().enumerate() {
            for second in users.iter().skip(index + 1) {
                created += self
                    .ensure_bidirectional_contact_in(unit, first, second)
                    .await?
                    .created;
                created += self.share_auxiliary_contacts_in(unit, first, second).await?;
            }
        }
        Ok(created)
    }
}

fn names_target(contact: &Contact, target: &UserAccount) -> bool {
    contact.linked_user_id == Some(target.id)
        || contact
            .contact_name
            .eq_ignore_ascii_case(&target.contact_name())
        || contact
            .contact_name
            .eq_ignore_ascii_case(&target.display_name)
}

async fn load_pair(
    unit: &mut dyn LinkingUnit,
    a: &UserId,
    b: &UserId,
) -> Result<(UserAccount, UserAccount), Error> {
    let first = unit.find_user(a).await.map_err(contact_error)?;
    let second = unit.find_user(b).await.map_err(contact_error)?;
    match (first, second) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(Error::not_found("User not found")),
    }
}

pub(super) fn contact_error(err: StoreError) -> Error {
    error!(error = %err, "contact synchronisation failed");
    Error::contact_failed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmailAddress, PersonName};
    use crate::outbound::memory::{InMemoryLinkingStore, Race};
    use chrono::Utc;
    use mockable::DefaultClock;
    use rstest::{fixture, rstest};

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

    struct Harness {
        store: Arc<InMemoryLinkingStore>,
        sync: ContactSync,
        alice: UserAccount,
        bob: UserAccount,
    }

    #[fixture]
    fn harness() -> Harness {
        let store = Arc::new(InMemoryLinkingStore::default());
        let alice = account("Alice", "alice@example.com");
        let bob = account("Bob", "bob@example.com");
        store.seed_user(alice.clone());
        store.seed_user(bob.clone());
        let sync = ContactSync::new(store.clone(), Arc::new(DefaultClock));
        Harness {
            store,
            sync,
            alice,
            bob,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn bidirectional_contact_is_idempotent(harness: Harness) {
        let first = harness
            .sync
            .ensure_bidirectional_contact(&harness.alice.id, &harness.bob.id)
            .await
            .expect("first sync");
        let second = harness
            .sync
            .ensure_bidirectional_contact(&harness.bob.id, &harness.alice.id)
            .await
            .expect("second sync");

        assert_eq!(first.created, 2);
        assert_eq!(second.created, 0);
        assert!(second.present);
        assert_eq!(harness.store.snapshot().contacts, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn concurrent_insert_counts_only_own_rows(harness: Harness) {
        harness.store.inject_race(Race::InsertContact);

        let report = harness
            .sync
            .ensure_bidirectional_contact(&harness.alice.id, &harness.bob.id)
            .await
            .expect("sync");

        assert_eq!(report.created, 1);
        assert!(report.present);
        assert_eq!(harness.store.snapshot().contacts, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn existing_contact_with_other_case_is_reused(harness: Harness) {
        harness.store.seed_contact(Contact {
            id: ContactId::random(),
            user_id: harness.alice.id,
            contact_name: "BOB".to_owned(),
            contact_email: None,
            relationship: Some(Relationship::CoParent),
            linked_user_id: None,
            notes: None,
            created_at: Utc::now(),
        });

        let report = harness
            .sync
            .ensure_bidirectional_contact(&harness.alice.id, &harness.bob.id)
            .await
            .expect("sync");
        assert_eq!(report.created, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn auxiliary_contacts_skip_own_name(harness: Harness) {
        for name in ["Grandma", "bob", "Dr Smith"] {
            harness.store.seed_contact(Contact {
                id: ContactId::random(),
                user_id: harness.alice.id,
                contact_name: name.to_owned(),
                contact_email: None,
                relationship: Some(Relationship::Family),
                linked_user_id: None,
                notes: None,
                created_at: Utc::now(),
            });
        }

        let mut unit = harness.store.begin().await.expect("unit");
        let shared = harness
            .sync
            .share_auxiliary_contacts_in(unit.as_mut(), &harness.alice, &harness.bob)
            .await
            .expect("share");
        let again = harness
            .sync
            .share_auxiliary_contacts_in(unit.as_mut(), &harness.alice, &harness.bob)
            .await
            .expect("share again");
        let bob_contacts = unit.list_contacts(&harness.bob.id).await.expect("list");
        unit.commit().await.expect("commit");

        assert_eq!(shared, 2);
        assert_eq!(again, 0);
        assert!(bob_contacts.iter().all(|c| c.relationship.is_none()));
        assert!(
            bob_contacts
                .iter()
                .all(|c| !c.contact_name.eq_ignore_ascii_case("bob"))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_user_is_not_found(harness: Harness) {
        let err = harness
            .sync
            .ensure_bidirectional_contact(&harness.alice.id, &UserId::random())
            .await
            .expect_err("missing user");
        assert_eq!(err.code(), crate::domain::ErrorCode::NotFound);
    }
}
