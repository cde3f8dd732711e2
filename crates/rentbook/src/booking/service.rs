use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::domain::{
    Account, AccountId, CancelledBy, Hold, HoldId, HoldState, Listing, ListingId, Money,
    RequesterDetails, Role,
};
use super::gate::{AvailabilityGate, ListingLocks};
use super::ledger::{self, LedgerEntry, LedgerError};
use super::pricing::{self, PriceQuote, PricingError, RentalTier};
use super::repository::{BookingRepository, ChangeSet, RepositoryError, Versioned};
use crate::config::BookingConfig;

/// Booking request as submitted by a prospective tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateHoldRequest {
    pub listing_id: ListingId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub check_in_time: NaiveTime,
    pub occupants: u32,
    pub requester: RequesterDetails,
    pub description: Option<String>,
}

/// Result of a successful booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldReceipt {
    pub hold_id: HoldId,
    pub total_price: Money,
    pub rental_type: RentalTier,
}

/// Result of a successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmOutcome {
    pub hold_id: HoldId,
    pub cancelled_competitors: Vec<HoldId>,
}

/// Price for a prospective stay along with every rental type the listing offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingQuote {
    pub listing_id: ListingId,
    pub quote: PriceQuote,
    pub rental_types: Vec<RentalTier>,
}

/// The booking state machine. Every mutating operation runs under the listing's lock and
/// persists its writes through one atomic commit, retried when a concurrent writer changed
/// a record it read. Hold ids come from the repository, so several services may share one.
pub struct BookingService<R> {
    repository: Arc<R>,
    locks: ListingLocks,
    commit_retries: u32,
}

impl<R> BookingService<R>
where
    R: BookingRepository + 'static,
{
    pub fn new(repository: Arc<R>, config: &BookingConfig) -> Self {
        Self {
            repository,
            locks: ListingLocks::default(),
            commit_retries: config.commit_retries,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub(crate) fn locks(&self) -> &ListingLocks {
        &self.locks
    }

    /// Validate a booking request, reserve its price from the requester's balance, and
    /// persist a pending hold.
    pub fn create_hold(
        &self,
        caller: &AccountId,
        request: CreateHoldRequest,
    ) -> Result<HoldReceipt, BookingError> {
        if request.date_from > request.date_to {
            return Err(BookingError::InvalidDateRange {
                from: request.date_from,
                to: request.date_to,
            });
        }
        if request.occupants == 0 {
            return Err(BookingError::InvalidOccupants);
        }

        self.locks.with_listing(&request.listing_id, || {
            self.with_retries("create_hold", || self.try_create_hold(caller, &request))
        })
    }

    fn try_create_hold(
        &self,
        caller: &AccountId,
        request: &CreateHoldRequest,
    ) -> Result<HoldReceipt, BookingError> {
        let mut account = self.load_account(caller)?;
        if !account.record.matches(&request.requester) {
            return Err(BookingError::IdentityMismatch);
        }

        let listing = self.load_listing(&request.listing_id)?;
        if !listing.record.is_moderated {
            return Err(BookingError::NotModerated(listing.record.id.clone()));
        }
        if listing.record.is_occupied() {
            return Err(BookingError::AlreadyOccupied(listing.record.id.clone()));
        }
        if request.occupants > listing.record.max_occupants {
            return Err(BookingError::OccupancyExceeded {
                requested: request.occupants,
                max: listing.record.max_occupants,
            });
        }
        if request.check_in_time < listing.record.check_in_time {
            return Err(BookingError::InvalidCheckIn {
                requested: request.check_in_time,
                earliest: listing.record.check_in_time,
            });
        }

        let quote = pricing::quote(&listing.record.pricing, request.date_from, request.date_to)?;
        let hold_id = self.repository.next_hold_id()?;
        let entry = ledger::reserve(&mut account.record, quote.total, &hold_id)?;

        let hold = Hold {
            id: hold_id.clone(),
            listing_id: listing.record.id.clone(),
            requester: caller.clone(),
            date_from: request.date_from,
            date_to: request.date_to,
            check_in_time: request.check_in_time,
            occupants: request.occupants,
            total_price: quote.total,
            rental_tier: quote.tier,
            description: request.description.clone(),
            state: HoldState::Pending,
            created_at: Utc::now(),
        };

        let mut changes = ChangeSet::new();
        changes
            .guard_listing(&listing)
            .update_account(account)
            .insert_hold(hold)
            .record_entry(entry);
        self.repository.commit(changes)?;

        info!(
            hold_id = %hold_id,
            listing_id = %request.listing_id,
            requester = %caller,
            total_price = %quote.total,
            tier = quote.tier.label(),
            "booking hold created"
        );

        Ok(HoldReceipt {
            hold_id,
            total_price: quote.total,
            rental_type: quote.tier,
        })
    }

    /// Confirm one pending hold: refund and cancel every competing hold on the listing,
    /// capture the winner's price into the owner's balance, and occupy the listing.
    pub fn confirm_hold(
        &self,
        caller: &AccountId,
        hold_id: &HoldId,
    ) -> Result<ConfirmOutcome, BookingError> {
        let listing_id = self.load_hold(hold_id)?.record.listing_id;
        self.locks.with_listing(&listing_id, || {
            self.with_retries("confirm_hold", || self.try_confirm_hold(caller, hold_id))
        })
    }

    fn try_confirm_hold(
        &self,
        caller: &AccountId,
        hold_id: &HoldId,
    ) -> Result<ConfirmOutcome, BookingError> {
        let mut hold = self.load_hold(hold_id)?;
        let mut listing = self.load_listing(&hold.record.listing_id)?;

        if !listing.record.is_owned_by(caller) {
            return Err(BookingError::PermissionDenied(
                "only the listing owner can confirm a booking".to_string(),
            ));
        }
        match hold.record.state {
            HoldState::Pending => {}
            HoldState::Confirmed => return Err(BookingError::AlreadyConfirmed(hold_id.clone())),
            state => {
                return Err(BookingError::HoldNotPending {
                    hold_id: hold_id.clone(),
                    state,
                })
            }
        }
        if listing.record.is_occupied() {
            return Err(BookingError::AlreadyOccupied(listing.record.id.clone()));
        }

        let mut accounts: BTreeMap<AccountId, Versioned<Account>> = BTreeMap::new();
        let mut entries: Vec<LedgerEntry> = Vec::new();
        let mut changes = ChangeSet::new();
        let mut cancelled = Vec::new();

        let competitors = self
            .repository
            .holds_for_listing(&listing.record.id)?
            .into_iter()
            .filter(|other| other.record.id != *hold_id && other.record.state.is_active());
        for mut competitor in competitors {
            if competitor.record.state == HoldState::Confirmed {
                return Err(BookingError::AlreadyOccupied(listing.record.id.clone()));
            }
            let payer = self.cached_account(&mut accounts, &competitor.record.requester)?;
            entries.push(ledger::release(
                &mut payer.record,
                competitor.record.total_price,
                &competitor.record.id,
            )?);
            competitor.record.state = HoldState::Cancelled;
            cancelled.push(competitor.record.id.clone());
            changes.update_hold(competitor);
        }

        let requester = hold.record.requester.clone();
        let owner = listing.record.owner.clone();
        if requester == owner {
            let account = self.cached_account(&mut accounts, &owner)?;
            entries.push(ledger::capture_within(
                &mut account.record,
                hold.record.total_price,
                hold_id,
            )?);
        } else {
            self.cached_account(&mut accounts, &requester)?;
            self.cached_account(&mut accounts, &owner)?;
            let (mut payer, mut payee) = match (accounts.remove(&requester), accounts.remove(&owner)) {
                (Some(payer), Some(payee)) => (payer, payee),
                _ => return Err(BookingError::AccountNotFound(requester)),
            };
            entries.push(ledger::capture(
                &mut payer.record,
                &mut payee.record,
                hold.record.total_price,
                hold_id,
            )?);
            accounts.insert(requester, payer);
            accounts.insert(owner, payee);
        }

        hold.record.state = HoldState::Confirmed;
        AvailabilityGate::occupy(&mut listing.record);

        let listing_id = listing.record.id.clone();
        changes.update_hold(hold).update_listing(listing);
        for account in accounts.into_values() {
            changes.update_account(account);
        }
        for entry in entries {
            changes.record_entry(entry);
        }
        self.repository.commit(changes)?;

        info!(
            hold_id = %hold_id,
            listing_id = %listing_id,
            cancelled = cancelled.len(),
            "booking confirmed"
        );

        Ok(ConfirmOutcome {
            hold_id: hold_id.clone(),
            cancelled_competitors: cancelled,
        })
    }

    /// Withdraw a pending hold and refund its price to the requester.
    pub fn cancel_hold(
        &self,
        caller: &AccountId,
        hold_id: &HoldId,
    ) -> Result<CancelledBy, BookingError> {
        let listing_id = self.load_hold(hold_id)?.record.listing_id;
        self.locks.with_listing(&listing_id, || {
            self.with_retries("cancel_hold", || self.try_cancel_hold(caller, hold_id))
        })
    }

    fn try_cancel_hold(
        &self,
        caller: &AccountId,
        hold_id: &HoldId,
    ) -> Result<CancelledBy, BookingError> {
        let mut hold = self.load_hold(hold_id)?;
        let listing = self.load_listing(&hold.record.listing_id)?;

        let cancelled_by = if hold.record.requester == *caller {
            CancelledBy::Tenant
        } else if listing.record.is_owned_by(caller) {
            CancelledBy::Owner
        } else {
            return Err(BookingError::PermissionDenied(
                "only the tenant or listing owner can cancel the booking".to_string(),
            ));
        };

        match hold.record.state {
            HoldState::Pending => {}
            HoldState::Confirmed => {
                return Err(BookingError::CannotCancelConfirmed(hold_id.clone()))
            }
            state => {
                return Err(BookingError::HoldNotPending {
                    hold_id: hold_id.clone(),
                    state,
                })
            }
        }

        let mut requester = self.load_account(&hold.record.requester)?;
        let entry = ledger::release(&mut requester.record, hold.record.total_price, hold_id)?;
        hold.record.state = HoldState::Cancelled;

        let mut changes = ChangeSet::new();
        changes
            .update_account(requester)
            .update_hold(hold)
            .record_entry(entry);
        self.repository.commit(changes)?;

        info!(hold_id = %hold_id, cancelled_by = ?cancelled_by, "booking cancelled");
        Ok(cancelled_by)
    }

    /// Admin approval that opens a listing for bookings.
    pub fn moderate_listing(
        &self,
        caller: &AccountId,
        listing_id: &ListingId,
    ) -> Result<(), BookingError> {
        let admin = self.load_account(caller)?;
        if !admin.record.has_role(Role::Admin) {
            return Err(BookingError::PermissionDenied(
                "only an admin can moderate listings".to_string(),
            ));
        }

        self.locks.with_listing(listing_id, || {
            self.with_retries("moderate_listing", || {
                let mut listing = self.load_listing(listing_id)?;
                if listing.record.is_moderated {
                    return Err(BookingError::AlreadyModerated(listing_id.clone()));
                }
                listing.record.is_moderated = true;

                let mut changes = ChangeSet::new();
                changes.update_listing(listing);
                self.repository.commit(changes)?;
                info!(listing_id = %listing_id, moderator = %caller, "listing moderated");
                Ok(())
            })
        })
    }

    /// Hold details, visible to its requester and the listing owner.
    pub fn hold(&self, caller: &AccountId, hold_id: &HoldId) -> Result<Hold, BookingError> {
        let hold = self.load_hold(hold_id)?.into_record();
        if hold.requester == *caller {
            return Ok(hold);
        }
        let listing = self.load_listing(&hold.listing_id)?;
        if listing.record.is_owned_by(caller) {
            Ok(hold)
        } else {
            Err(BookingError::PermissionDenied(
                "only the tenant or listing owner can view the booking".to_string(),
            ))
        }
    }

    pub fn account(&self, caller: &AccountId) -> Result<Account, BookingError> {
        Ok(self.load_account(caller)?.into_record())
    }

    pub fn quote(
        &self,
        listing_id: &ListingId,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<ListingQuote, BookingError> {
        let listing = self.load_listing(listing_id)?.into_record();
        let quote = pricing::quote(&listing.pricing, date_from, date_to)?;
        Ok(ListingQuote {
            listing_id: listing.id,
            quote,
            rental_types: pricing::available_tiers(&listing.pricing),
        })
    }

    /// Confirmed stays of the caller, past ones included.
    pub fn trips(&self, caller: &AccountId) -> Result<Vec<Hold>, BookingError> {
        Ok(self
            .repository
            .holds_for_requester(caller)?
            .into_iter()
            .map(Versioned::into_record)
            .filter(|hold| matches!(hold.state, HoldState::Confirmed | HoldState::Expired))
            .collect())
    }

    /// Every hold placed on the caller's listings.
    pub fn landlord_bookings(&self, caller: &AccountId) -> Result<Vec<Hold>, BookingError> {
        let mut holds = Vec::new();
        for listing in self.landlord_listings(caller)? {
            holds.extend(
                self.repository
                    .holds_for_listing(&listing.id)?
                    .into_iter()
                    .map(Versioned::into_record),
            );
        }
        Ok(holds)
    }

    pub fn landlord_listings(&self, caller: &AccountId) -> Result<Vec<Listing>, BookingError> {
        let landlord = self.load_account(caller)?;
        if !landlord.record.has_role(Role::Landlord) {
            return Err(BookingError::PermissionDenied(
                "only landlords can view their listings".to_string(),
            ));
        }
        Ok(self
            .repository
            .listings_for_owner(caller)?
            .into_iter()
            .map(Versioned::into_record)
            .collect())
    }

    fn with_retries<T>(
        &self,
        operation: &'static str,
        mut attempt: impl FnMut() -> Result<T, BookingError>,
    ) -> Result<T, BookingError> {
        let mut retries = 0;
        loop {
            match attempt() {
                Err(BookingError::Repository(RepositoryError::VersionConflict(record))) => {
                    if retries >= self.commit_retries {
                        return Err(BookingError::Contention(record));
                    }
                    retries += 1;
                    debug!(operation, %record, retries, "commit raced a concurrent writer, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    fn load_account(&self, id: &AccountId) -> Result<Versioned<Account>, BookingError> {
        self.repository
            .account(id)?
            .ok_or_else(|| BookingError::AccountNotFound(id.clone()))
    }

    pub(crate) fn load_listing(&self, id: &ListingId) -> Result<Versioned<Listing>, BookingError> {
        self.repository
            .listing(id)?
            .ok_or_else(|| BookingError::ListingNotFound(id.clone()))
    }

    pub(crate) fn load_hold(&self, id: &HoldId) -> Result<Versioned<Hold>, BookingError> {
        self.repository
            .hold(id)?
            .ok_or_else(|| BookingError::HoldNotFound(id.clone()))
    }

    fn cached_account<'a>(
        &self,
        accounts: &'a mut BTreeMap<AccountId, Versioned<Account>>,
        id: &AccountId,
    ) -> Result<&'a mut Versioned<Account>, BookingError> {
        if !accounts.contains_key(id) {
            let account = self.load_account(id)?;
            accounts.insert(id.clone(), account);
        }
        accounts
            .get_mut(id)
            .ok_or_else(|| BookingError::AccountNotFound(id.clone()))
    }
}

/// Error category surfaced to callers so transports can map causes consistently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Permission,
    State,
    Conflict,
    InsufficientFunds,
    NoPricingAvailable,
    Unavailable,
    Internal,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Permission => "permission",
            Self::State => "state",
            Self::Conflict => "conflict",
            Self::InsufficientFunds => "insufficient_funds",
            Self::NoPricingAvailable => "no_pricing_available",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("provided personal details do not match the requesting account")]
    IdentityMismatch,
    #[error("date_from {from} cannot be later than date_to {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },
    #[error("number of occupants must be positive")]
    InvalidOccupants,
    #[error("number of occupants ({requested}) exceeds maximum allowed ({max})")]
    OccupancyExceeded { requested: u32, max: u32 },
    #[error("check-in time must be at least {earliest} (requested {requested})")]
    InvalidCheckIn {
        requested: NaiveTime,
        earliest: NaiveTime,
    },
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),
    #[error("booking {0} not found")]
    HoldNotFound(HoldId),
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("booking {0} is already confirmed")]
    AlreadyConfirmed(HoldId),
    #[error("cannot cancel confirmed booking {0}")]
    CannotCancelConfirmed(HoldId),
    #[error("booking {hold_id} is {} and can no longer change", .state.label())]
    HoldNotPending { hold_id: HoldId, state: HoldState },
    #[error("listing {0} must be moderated before it accepts bookings")]
    NotModerated(ListingId),
    #[error("listing {0} is already moderated")]
    AlreadyModerated(ListingId),
    #[error("listing {0} is already booked")]
    AlreadyOccupied(ListingId),
    #[error("record {0} kept changing under concurrent updates")]
    Contention(String),
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientFunds { required: Money, available: Money },
    #[error("no valid pricing option for a stay of {days} days")]
    NoPricingAvailable { days: i64 },
    #[error("price of a {days}-day stay exceeds the supported amount")]
    PriceOverflow { days: i64 },
    #[error(transparent)]
    Ledger(LedgerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IdentityMismatch
            | Self::InvalidDateRange { .. }
            | Self::InvalidOccupants
            | Self::OccupancyExceeded { .. }
            | Self::InvalidCheckIn { .. }
            | Self::PriceOverflow { .. } => ErrorKind::Validation,
            Self::ListingNotFound(_) | Self::HoldNotFound(_) | Self::AccountNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::PermissionDenied(_) => ErrorKind::Permission,
            Self::AlreadyConfirmed(_)
            | Self::CannotCancelConfirmed(_)
            | Self::HoldNotPending { .. }
            | Self::NotModerated(_)
            | Self::AlreadyModerated(_) => ErrorKind::State,
            Self::AlreadyOccupied(_) | Self::Contention(_) => ErrorKind::Conflict,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::NoPricingAvailable { .. } => ErrorKind::NoPricingAvailable,
            Self::Ledger(_) => ErrorKind::Internal,
            Self::Repository(RepositoryError::NotFound(_)) => ErrorKind::NotFound,
            Self::Repository(RepositoryError::InvalidRecord { .. }) => ErrorKind::Validation,
            Self::Repository(RepositoryError::Conflict(_))
            | Self::Repository(RepositoryError::VersionConflict(_)) => ErrorKind::Conflict,
            Self::Repository(RepositoryError::Unavailable(_)) => ErrorKind::Unavailable,
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientFunds {
                required,
                available,
                ..
            } => Self::InsufficientFunds {
                required,
                available,
            },
            other => Self::Ledger(other),
        }
    }
}

impl From<PricingError> for BookingError {
    fn from(value: PricingError) -> Self {
        match value {
            PricingError::InvalidRange { from, to } => Self::InvalidDateRange { from, to },
            PricingError::NoPricingAvailable { days } => Self::NoPricingAvailable { days },
            PricingError::Overflow { days } => Self::PriceOverflow { days },
        }
    }
}
