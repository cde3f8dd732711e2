use crate::infra::{
    demo_profile, seed_demo_marketplace, DEMO_ADMIN, DEMO_LANDLORD, DEMO_LISTING, DEMO_TENANTS,
};
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use clap::Args;
use rentbook::booking::pricing;
use rentbook::booking::{
    AccountId, BookingError, BookingService, CreateHoldRequest, ExpirationSweeper,
    InMemoryBookingRepository, ListingId, Money, PricingTiers,
};
use rentbook::config::BookingConfig;
use rentbook::error::AppError;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct QuoteArgs {
    /// First night of the stay (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date_from: NaiveDate,
    /// Last night of the stay, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date_to: NaiveDate,
    /// Daily rate
    #[arg(long)]
    pub(crate) per_day: Option<Money>,
    /// Weekly rate
    #[arg(long)]
    pub(crate) per_week: Option<Money>,
    /// Monthly (30-day) rate
    #[arg(long)]
    pub(crate) per_month: Option<Money>,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// First night of the winning stay (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date_from: Option<NaiveDate>,
    /// Starting balance of each demo tenant.
    #[arg(long, default_value_t = Money::from(1_000))]
    pub(crate) tenant_funds: Money,
}

pub(crate) fn run_quote(args: QuoteArgs) -> Result<(), AppError> {
    let tiers = PricingTiers {
        per_day: args.per_day,
        per_week: args.per_week,
        per_month: args.per_month,
    };
    let quote =
        pricing::quote(&tiers, args.date_from, args.date_to).map_err(BookingError::from)?;

    println!(
        "Stay {} -> {} ({} days)",
        args.date_from, args.date_to, quote.days
    );
    println!(
        "Total {} billed as {} x {}",
        quote.total,
        quote.billed_units,
        quote.tier.label()
    );
    let offered: Vec<_> = pricing::available_tiers(&tiers)
        .into_iter()
        .map(|tier| tier.label())
        .collect();
    println!("Offered rental types: {}", offered.join(", "));
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let date_from = args
        .date_from
        .unwrap_or_else(|| Local::now().date_naive());
    let date_to = date_from + Duration::days(2);

    let repository = Arc::new(InMemoryBookingRepository::default());
    seed_demo_marketplace(&repository, args.tenant_funds).map_err(BookingError::from)?;
    let service = Arc::new(BookingService::new(repository, &BookingConfig::default()));

    let admin = AccountId(DEMO_ADMIN.to_string());
    let landlord = AccountId(DEMO_LANDLORD.to_string());
    let listing_id = ListingId(DEMO_LISTING.to_string());
    let [first, second] = DEMO_TENANTS.map(|key| AccountId(key.to_string()));

    println!("Rental booking demo");
    match service.moderate_listing(&admin, &listing_id) {
        Ok(()) => println!("- {} moderated {}", admin, listing_id),
        Err(BookingError::AlreadyModerated(_)) => {
            println!("- {} already moderated", listing_id)
        }
        Err(err) => return Err(err.into()),
    }

    let winner = service.create_hold(&first, request(&first, date_from, date_to))?;
    println!(
        "- {} requested {} -> {} for {} ({})",
        first,
        date_from,
        date_to,
        winner.total_price,
        winner.rental_type.label()
    );
    let loser_to = date_from + Duration::days(9);
    let loser = service.create_hold(&second, request(&second, date_from, loser_to))?;
    println!(
        "- {} requested {} -> {} for {} ({})",
        second,
        date_from,
        loser_to,
        loser.total_price,
        loser.rental_type.label()
    );
    print_balances(&service, &[&first, &second, &landlord])?;

    let outcome = service.confirm_hold(&landlord, &winner.hold_id)?;
    println!("\n{} confirmed {}", landlord, outcome.hold_id);
    for cancelled in &outcome.cancelled_competitors {
        println!("  - competing booking {} cancelled and refunded", cancelled);
    }
    print_balances(&service, &[&first, &second, &landlord])?;

    let check_out = service
        .landlord_listings(&landlord)?
        .into_iter()
        .find(|listing| listing.id == listing_id)
        .map(|listing| listing.check_out_time)
        .ok_or_else(|| BookingError::ListingNotFound(listing_id.clone()))?;
    let after_checkout = date_to.and_time(check_out).and_utc() + Duration::minutes(1);

    let sweeper = ExpirationSweeper::new(service.clone());
    let report = sweeper.run_once(after_checkout);
    println!(
        "\nSweep at {}: scanned {}, expired {}, failed {}",
        after_checkout, report.scanned, report.expired, report.failed
    );
    for trip in service.trips(&first)? {
        println!("  - {} for {} is {}", trip.id, first, trip.state.label());
    }
    let reopened = service
        .landlord_listings(&landlord)?
        .into_iter()
        .any(|listing| listing.id == listing_id && !listing.is_occupied());
    println!(
        "  - {} is {}",
        listing_id,
        if reopened { "open for bookings" } else { "still occupied" }
    );
    Ok(())
}

fn request(account: &AccountId, date_from: NaiveDate, date_to: NaiveDate) -> CreateHoldRequest {
    CreateHoldRequest {
        listing_id: ListingId(DEMO_LISTING.to_string()),
        date_from,
        date_to,
        check_in_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or(NaiveTime::MIN),
        occupants: 2,
        requester: demo_profile(&account.0),
        description: None,
    }
}

fn print_balances(
    service: &BookingService<InMemoryBookingRepository>,
    accounts: &[&AccountId],
) -> Result<(), AppError> {
    println!("  Balances (available / pending):");
    for id in accounts {
        let account = service.account(id)?;
        println!(
            "    {:<10} {:>8} / {:>8}",
            id.0,
            account.available_balance(),
            account.pending_balance()
        );
    }
    Ok(())
}
