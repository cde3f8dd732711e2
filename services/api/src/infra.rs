use chrono::{NaiveDate, NaiveTime};
use metrics_exporter_prometheus::PrometheusHandle;
use rentbook::booking::{
    Account, AccountId, InMemoryBookingRepository, Listing, ListingId, Money, PricingTiers,
    RepositoryError, RequesterDetails, Role,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) const DEMO_ADMIN: &str = "admin";
pub(crate) const DEMO_LANDLORD: &str = "landlord";
pub(crate) const DEMO_TENANTS: [&str; 2] = ["tenant-1", "tenant-2"];
pub(crate) const DEMO_LISTING: &str = "listing-1";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn demo_profile(key: &str) -> RequesterDetails {
    RequesterDetails {
        first_name: "Demo".to_string(),
        last_name: key.to_string(),
        email: format!("{key}@rentbook.test"),
        phone: "+1-555-0100".to_string(),
    }
}

fn clock(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Moderated listing with daily and weekly rates, check-in from 14:00, check-out at 11:00.
pub(crate) fn demo_listing() -> Listing {
    let mut listing = Listing::new(
        ListingId(DEMO_LISTING.to_string()),
        AccountId(DEMO_LANDLORD.to_string()),
        "Two-bedroom flat near the station",
        PricingTiers {
            per_day: Some(Money::from(100)),
            per_week: Some(Money::from(500)),
            per_month: Some(Money::from(1_800)),
        },
        4,
        clock(14),
        clock(11),
    );
    listing.is_moderated = true;
    listing
}

/// Seed an admin, a landlord, two funded tenants and one listing.
pub(crate) fn seed_demo_marketplace(
    repository: &InMemoryBookingRepository,
    tenant_funds: Money,
) -> Result<(), RepositoryError> {
    let mut accounts = vec![
        Account::new(
            AccountId(DEMO_ADMIN.to_string()),
            demo_profile(DEMO_ADMIN),
            vec![Role::Admin],
            Money::ZERO,
        ),
        Account::new(
            AccountId(DEMO_LANDLORD.to_string()),
            demo_profile(DEMO_LANDLORD),
            vec![Role::Landlord],
            Money::ZERO,
        ),
    ];
    accounts.extend(DEMO_TENANTS.iter().map(|key| {
        Account::new(
            AccountId(key.to_string()),
            demo_profile(key),
            vec![Role::Tenant],
            tenant_funds,
        )
    }));
    repository.seed(accounts, [demo_listing()])
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
