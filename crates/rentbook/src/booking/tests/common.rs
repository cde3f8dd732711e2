use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::booking::domain::{
    Account, AccountId, Hold, HoldId, HoldState, Listing, ListingId, Money, PricingTiers,
    RequesterDetails, Role,
};
use crate::booking::ledger::LedgerEntry;
use crate::booking::memory::InMemoryBookingRepository;
use crate::booking::repository::{BookingRepository, ChangeSet, RepositoryError, Versioned};
use crate::booking::service::{BookingService, CreateHoldRequest};
use crate::config::BookingConfig;

pub(crate) const OWNER: &str = "owner-1";
pub(crate) const ADMIN: &str = "admin-1";
pub(crate) const TENANT_A: &str = "tenant-a";
pub(crate) const TENANT_B: &str = "tenant-b";
pub(crate) const LISTING: &str = "listing-1";
pub(crate) const SECOND_LISTING: &str = "listing-2";

pub(crate) fn profile(key: &str) -> RequesterDetails {
    RequesterDetails {
        first_name: "Jordan".to_string(),
        last_name: key.to_string(),
        email: format!("{key}@example.com"),
        phone: "+1-515-555-0100".to_string(),
    }
}

pub(crate) fn account(key: &str, roles: Vec<Role>, funds: i64) -> Account {
    Account::new(AccountId(key.to_string()), profile(key), roles, Money::from(funds))
}

pub(crate) fn time(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).expect("valid time")
}

pub(crate) fn june(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, day).expect("valid date")
}

/// Daily 100 and weekly 500, four guests, check-in from 14:00, check-out at 11:00.
pub(crate) fn listing(moderated: bool) -> Listing {
    listing_with_id(LISTING, moderated)
}

pub(crate) fn listing_with_id(id: &str, moderated: bool) -> Listing {
    let mut listing = Listing::new(
        ListingId(id.to_string()),
        AccountId(OWNER.to_string()),
        "Riverside loft",
        PricingTiers {
            per_day: Some(Money::from(100)),
            per_week: Some(Money::from(500)),
            per_month: None,
        },
        4,
        time(14),
        time(11),
    );
    listing.is_moderated = moderated;
    listing
}

pub(crate) fn seed_accounts() -> Vec<Account> {
    vec![
        account(OWNER, vec![Role::Landlord], 0),
        account(ADMIN, vec![Role::Admin], 0),
        account(TENANT_A, vec![Role::Tenant], 1000),
        account(TENANT_B, vec![Role::Tenant], 1000),
    ]
}

pub(crate) fn stay_request(requester: &str, from_day: u32, to_day: u32) -> CreateHoldRequest {
    stay_request_on(LISTING, requester, from_day, to_day)
}

pub(crate) fn stay_request_on(
    listing: &str,
    requester: &str,
    from_day: u32,
    to_day: u32,
) -> CreateHoldRequest {
    CreateHoldRequest {
        listing_id: ListingId(listing.to_string()),
        date_from: june(from_day),
        date_to: june(to_day),
        check_in_time: time(15),
        occupants: 2,
        requester: profile(requester),
        description: None,
    }
}

pub(crate) struct Marketplace {
    pub(crate) service: Arc<BookingService<InMemoryBookingRepository>>,
    pub(crate) repository: Arc<InMemoryBookingRepository>,
    pub(crate) owner: AccountId,
    pub(crate) admin: AccountId,
    pub(crate) listing: ListingId,
}

impl Marketplace {
    pub(crate) fn balances(&self, key: &str) -> (Money, Money) {
        let account = self
            .service
            .account(&AccountId(key.to_string()))
            .expect("account exists");
        (account.available_balance(), account.pending_balance())
    }

    pub(crate) fn hold_state(&self, hold_id: &HoldId) -> HoldState {
        self.repository
            .hold(hold_id)
            .expect("repository readable")
            .expect("hold stored")
            .record
            .state
    }

    pub(crate) fn listing_record(&self) -> Listing {
        self.repository
            .listing(&self.listing)
            .expect("repository readable")
            .expect("listing stored")
            .record
    }
}

/// Moderated listing owned by [`OWNER`], two funded tenants and an admin.
pub(crate) fn marketplace() -> Marketplace {
    marketplace_with_listing(listing(true))
}

pub(crate) fn marketplace_with_listing(listing: Listing) -> Marketplace {
    marketplace_with_listings(vec![listing], &BookingConfig::default())
}

/// Marketplace over several listings; the first one becomes [`Marketplace::listing`].
pub(crate) fn marketplace_with_listings(
    listings: Vec<Listing>,
    config: &BookingConfig,
) -> Marketplace {
    let repository = Arc::new(InMemoryBookingRepository::default());
    let listing_id = listings
        .first()
        .map(|listing| listing.id.clone())
        .expect("at least one listing");
    repository
        .seed(seed_accounts(), listings)
        .expect("seed succeeds");
    let service = Arc::new(BookingService::new(repository.clone(), config));
    Marketplace {
        service,
        repository,
        owner: AccountId(OWNER.to_string()),
        admin: AccountId(ADMIN.to_string()),
        listing: listing_id,
    }
}

/// Repository whose next `failures` commits fail with `error`, then behaves normally.
/// A scan of holds by state panics while `panic_on_scan` is set.
pub(crate) struct FlakyRepository {
    pub(crate) inner: InMemoryBookingRepository,
    failures: AtomicU32,
    error: RepositoryError,
    panic_on_scan: AtomicBool,
}

impl FlakyRepository {
    pub(crate) fn new(failures: u32, error: RepositoryError) -> Self {
        let inner = InMemoryBookingRepository::default();
        inner
            .seed(seed_accounts(), [listing(true)])
            .expect("seed succeeds");
        Self {
            inner,
            failures: AtomicU32::new(failures),
            error,
            panic_on_scan: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_next(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    pub(crate) fn panic_on_scan(&self, enabled: bool) {
        self.panic_on_scan.store(enabled, Ordering::SeqCst);
    }
}

impl BookingRepository for FlakyRepository {
    fn account(&self, id: &AccountId) -> Result<Option<Versioned<Account>>, RepositoryError> {
        self.inner.account(id)
    }

    fn listing(&self, id: &ListingId) -> Result<Option<Versioned<Listing>>, RepositoryError> {
        self.inner.listing(id)
    }

    fn hold(&self, id: &HoldId) -> Result<Option<Versioned<Hold>>, RepositoryError> {
        self.inner.hold(id)
    }

    fn holds_for_listing(&self, id: &ListingId) -> Result<Vec<Versioned<Hold>>, RepositoryError> {
        self.inner.holds_for_listing(id)
    }

    fn holds_for_requester(
        &self,
        requester: &AccountId,
    ) -> Result<Vec<Versioned<Hold>>, RepositoryError> {
        self.inner.holds_for_requester(requester)
    }

    fn holds_in_state(&self, state: HoldState) -> Result<Vec<Versioned<Hold>>, RepositoryError> {
        if self.panic_on_scan.load(Ordering::SeqCst) {
            panic!("storage driver crashed while scanning holds");
        }
        self.inner.holds_in_state(state)
    }

    fn listings_for_owner(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<Versioned<Listing>>, RepositoryError> {
        self.inner.listings_for_owner(owner)
    }

    fn ledger_entries(&self, hold: &HoldId) -> Result<Vec<LedgerEntry>, RepositoryError> {
        self.inner.ledger_entries(hold)
    }

    fn next_hold_id(&self) -> Result<HoldId, RepositoryError> {
        self.inner.next_hold_id()
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        self.inner.commit(changes)
    }
}

pub(crate) fn flaky_service(
    failures: u32,
    error: RepositoryError,
) -> (Arc<BookingService<FlakyRepository>>, Arc<FlakyRepository>) {
    let repository = Arc::new(FlakyRepository::new(failures, error));
    let service = Arc::new(BookingService::new(
        repository.clone(),
        &BookingConfig::default(),
    ));
    (service, repository)
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
