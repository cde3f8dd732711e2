use serde::Serialize;

use super::domain::{Account, AccountId, Hold, HoldId, HoldState, Listing, ListingId};
use super::ledger::LedgerEntry;

/// A stored record together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

impl<T> Versioned<T> {
    pub fn into_record(self) -> T {
        self.record
    }
}

/// One record write inside a [`ChangeSet`].
///
/// `expected_version` is `None` for inserts (the key must not exist yet) and the version
/// read by the caller for updates.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWrite<T> {
    pub record: T,
    pub expected_version: Option<u64>,
}

/// Every write produced by one booking operation. Repositories apply a change set
/// completely or not at all.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    accounts: Vec<RecordWrite<Account>>,
    listings: Vec<RecordWrite<Listing>>,
    holds: Vec<RecordWrite<Hold>>,
    listing_guards: Vec<(ListingId, u64)>,
    entries: Vec<LedgerEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_account(&mut self, account: Account) -> &mut Self {
        self.accounts.push(RecordWrite {
            record: account,
            expected_version: None,
        });
        self
    }

    pub fn update_account(&mut self, account: Versioned<Account>) -> &mut Self {
        self.accounts.push(RecordWrite {
            record: account.record,
            expected_version: Some(account.version),
        });
        self
    }

    pub fn insert_listing(&mut self, listing: Listing) -> &mut Self {
        self.listings.push(RecordWrite {
            record: listing,
            expected_version: None,
        });
        self
    }

    pub fn update_listing(&mut self, listing: Versioned<Listing>) -> &mut Self {
        self.listings.push(RecordWrite {
            record: listing.record,
            expected_version: Some(listing.version),
        });
        self
    }

    pub fn insert_hold(&mut self, hold: Hold) -> &mut Self {
        self.holds.push(RecordWrite {
            record: hold,
            expected_version: None,
        });
        self
    }

    pub fn update_hold(&mut self, hold: Versioned<Hold>) -> &mut Self {
        self.holds.push(RecordWrite {
            record: hold.record,
            expected_version: Some(hold.version),
        });
        self
    }

    /// Require that a listing the operation depends on, but does not write, is unchanged.
    pub fn guard_listing(&mut self, listing: &Versioned<Listing>) -> &mut Self {
        self.listing_guards
            .push((listing.record.id.clone(), listing.version));
        self
    }

    pub fn record_entry(&mut self, entry: LedgerEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Split into owned parts for repositories applying the writes.
    pub fn into_parts(self) -> ChangeSetParts {
        ChangeSetParts {
            accounts: self.accounts,
            listings: self.listings,
            holds: self.holds,
            listing_guards: self.listing_guards,
            entries: self.entries,
        }
    }
}

/// Owned contents of a [`ChangeSet`].
#[derive(Debug, Clone, Default)]
pub struct ChangeSetParts {
    pub accounts: Vec<RecordWrite<Account>>,
    pub listings: Vec<RecordWrite<Listing>>,
    pub holds: Vec<RecordWrite<Hold>>,
    pub listing_guards: Vec<(ListingId, u64)>,
    pub entries: Vec<LedgerEntry>,
}

/// Storage abstraction for accounts, listings, holds and the ledger journal.
pub trait BookingRepository: Send + Sync {
    fn account(&self, id: &AccountId) -> Result<Option<Versioned<Account>>, RepositoryError>;
    fn listing(&self, id: &ListingId) -> Result<Option<Versioned<Listing>>, RepositoryError>;
    fn hold(&self, id: &HoldId) -> Result<Option<Versioned<Hold>>, RepositoryError>;
    fn holds_for_listing(&self, id: &ListingId) -> Result<Vec<Versioned<Hold>>, RepositoryError>;
    fn holds_for_requester(
        &self,
        requester: &AccountId,
    ) -> Result<Vec<Versioned<Hold>>, RepositoryError>;
    fn holds_in_state(&self, state: HoldState) -> Result<Vec<Versioned<Hold>>, RepositoryError>;
    fn listings_for_owner(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<Versioned<Listing>>, RepositoryError>;
    fn ledger_entries(&self, hold: &HoldId) -> Result<Vec<LedgerEntry>, RepositoryError>;

    /// Allocate a hold id that no stored or previously allocated hold uses. Every service
    /// sharing the repository draws from the same sequence.
    fn next_hold_id(&self) -> Result<HoldId, RepositoryError>;

    /// Atomically apply every write in `changes`, bumping each written record's version.
    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record {0} already exists")]
    Conflict(String),
    #[error("record {0} changed since it was read")]
    VersionConflict(String),
    #[error("record {0} not found")]
    NotFound(String),
    #[error("record {id} is invalid: {reason}")]
    InvalidRecord { id: String, reason: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
