//! Booking engine: pricing, balance ledger, per-listing availability gate, the hold state
//! machine and the background sweeper that expires finished stays.

pub mod domain;
pub mod gate;
pub mod ledger;
pub mod memory;
pub mod pricing;
pub mod repository;
pub mod router;
pub mod service;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use domain::{
    Account, AccountId, CancelledBy, Hold, HoldId, HoldState, Listing, ListingId, Money,
    PricingTiers, RequesterDetails, Role,
};
pub use gate::{AvailabilityGate, ListingLocks};
pub use ledger::{LedgerEntry, LedgerError, LedgerOperation};
pub use memory::InMemoryBookingRepository;
pub use pricing::{PriceQuote, PricingError, RentalTier};
pub use repository::{BookingRepository, ChangeSet, RepositoryError, Versioned};
pub use router::{booking_router, CreateBookingBody, ACCOUNT_HEADER};
pub use service::{
    BookingError, BookingService, ConfirmOutcome, CreateHoldRequest, ErrorKind, HoldReceipt,
    ListingQuote,
};
pub use sweeper::{ExpirationSweeper, SweepReport};
