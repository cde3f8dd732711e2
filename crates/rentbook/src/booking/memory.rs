use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{Account, AccountId, Hold, HoldId, HoldState, Listing, ListingId, Money};
use super::ledger::LedgerEntry;
use super::repository::{
    BookingRepository, ChangeSet, ChangeSetParts, RecordWrite, RepositoryError, Versioned,
};

/// Process-local repository. One mutex covers every table, so a commit is validated and
/// applied as a single step and readers never observe half of it.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBookingRepository {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Versioned<Account>>,
    listings: HashMap<ListingId, Versioned<Listing>>,
    holds: HashMap<HoldId, Versioned<Hold>>,
    entries: Vec<LedgerEntry>,
    hold_sequence: u64,
}

trait Keyed {
    type Key: Eq + Hash + Clone + Display;
    fn key(&self) -> &Self::Key;

    /// Reason the record must not be stored, if any.
    fn defect(&self) -> Option<&'static str> {
        None
    }
}

impl Keyed for Account {
    type Key = AccountId;
    fn key(&self) -> &AccountId {
        &self.id
    }

    fn defect(&self) -> Option<&'static str> {
        if self.available_balance() < Money::ZERO || self.pending_balance() < Money::ZERO {
            Some("balances cannot be negative")
        } else {
            None
        }
    }
}

impl Keyed for Listing {
    type Key = ListingId;
    fn key(&self) -> &ListingId {
        &self.id
    }

    fn defect(&self) -> Option<&'static str> {
        self.pricing
            .is_empty()
            .then_some("listing must offer at least one pricing tier")
    }
}

impl Keyed for Hold {
    type Key = HoldId;
    fn key(&self) -> &HoldId {
        &self.id
    }
}

fn check_writes<T: Keyed>(
    table: &HashMap<T::Key, Versioned<T>>,
    writes: &[RecordWrite<T>],
) -> Result<(), RepositoryError> {
    for write in writes {
        let key = write.record.key();
        if let Some(reason) = write.record.defect() {
            return Err(RepositoryError::InvalidRecord {
                id: key.to_string(),
                reason: reason.to_string(),
            });
        }
        match (table.get(key), write.expected_version) {
            (Some(_), None) => return Err(RepositoryError::Conflict(key.to_string())),
            (None, Some(_)) => return Err(RepositoryError::NotFound(key.to_string())),
            (Some(stored), Some(expected)) if stored.version != expected => {
                return Err(RepositoryError::VersionConflict(key.to_string()))
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply_writes<T: Keyed>(table: &mut HashMap<T::Key, Versioned<T>>, writes: Vec<RecordWrite<T>>) {
    for write in writes {
        let version = write.expected_version.map_or(1, |version| version + 1);
        table.insert(
            write.record.key().clone(),
            Versioned {
                version,
                record: write.record,
            },
        );
    }
}

fn sorted_holds<'a>(holds: impl Iterator<Item = &'a Versioned<Hold>>) -> Vec<Versioned<Hold>> {
    let mut holds: Vec<_> = holds.cloned().collect();
    holds.sort_by(|a, b| a.record.id.cmp(&b.record.id));
    holds
}

impl InMemoryBookingRepository {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }

    /// Insert collaborator-owned accounts and listings.
    pub fn seed(
        &self,
        accounts: impl IntoIterator<Item = Account>,
        listings: impl IntoIterator<Item = Listing>,
    ) -> Result<(), RepositoryError> {
        let mut changes = ChangeSet::new();
        for account in accounts {
            changes.insert_account(account);
        }
        for listing in listings {
            changes.insert_listing(listing);
        }
        self.commit(changes)
    }
}

impl BookingRepository for InMemoryBookingRepository {
    fn account(&self, id: &AccountId) -> Result<Option<Versioned<Account>>, RepositoryError> {
        Ok(self.tables()?.accounts.get(id).cloned())
    }

    fn listing(&self, id: &ListingId) -> Result<Option<Versioned<Listing>>, RepositoryError> {
        Ok(self.tables()?.listings.get(id).cloned())
    }

    fn hold(&self, id: &HoldId) -> Result<Option<Versioned<Hold>>, RepositoryError> {
        Ok(self.tables()?.holds.get(id).cloned())
    }

    fn holds_for_listing(&self, id: &ListingId) -> Result<Vec<Versioned<Hold>>, RepositoryError> {
        let tables = self.tables()?;
        Ok(sorted_holds(
            tables
                .holds
                .values()
                .filter(|hold| hold.record.listing_id == *id),
        ))
    }

    fn holds_for_requester(
        &self,
        requester: &AccountId,
    ) -> Result<Vec<Versioned<Hold>>, RepositoryError> {
        let tables = self.tables()?;
        Ok(sorted_holds(
            tables
                .holds
                .values()
                .filter(|hold| hold.record.requester == *requester),
        ))
    }

    fn holds_in_state(&self, state: HoldState) -> Result<Vec<Versioned<Hold>>, RepositoryError> {
        let tables = self.tables()?;
        Ok(sorted_holds(
            tables
                .holds
                .values()
                .filter(|hold| hold.record.state == state),
        ))
    }

    fn listings_for_owner(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<Versioned<Listing>>, RepositoryError> {
        let tables = self.tables()?;
        let mut listings: Vec<_> = tables
            .listings
            .values()
            .filter(|listing| listing.record.owner == *owner)
            .cloned()
            .collect();
        listings.sort_by(|a, b| a.record.id.cmp(&b.record.id));
        Ok(listings)
    }

    fn ledger_entries(&self, hold: &HoldId) -> Result<Vec<LedgerEntry>, RepositoryError> {
        Ok(self
            .tables()?
            .entries
            .iter()
            .filter(|entry| entry.hold_id == *hold)
            .cloned()
            .collect())
    }

    fn next_hold_id(&self) -> Result<HoldId, RepositoryError> {
        let mut tables = self.tables()?;
        loop {
            tables.hold_sequence += 1;
            let id = HoldId(format!("hold-{:06}", tables.hold_sequence));
            if !tables.holds.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError> {
        let ChangeSetParts {
            accounts,
            listings,
            holds,
            listing_guards,
            entries,
        } = changes.into_parts();
        let mut tables = self.tables()?;

        for (id, version) in &listing_guards {
            match tables.listings.get(id) {
                Some(stored) if stored.version == *version => {}
                Some(_) => return Err(RepositoryError::VersionConflict(id.to_string())),
                None => return Err(RepositoryError::NotFound(id.to_string())),
            }
        }
        check_writes(&tables.accounts, &accounts)?;
        check_writes(&tables.listings, &listings)?;
        check_writes(&tables.holds, &holds)?;

        apply_writes(&mut tables.accounts, accounts);
        apply_writes(&mut tables.listings, listings);
        apply_writes(&mut tables.holds, holds);
        tables.entries.extend(entries);
        Ok(())
    }
}
