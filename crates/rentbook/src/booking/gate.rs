use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::{Listing, ListingId};

/// Sole writer of a listing's occupancy flag.
///
/// Confirmation occupies, the expiration sweep vacates; nothing else touches the flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvailabilityGate;

impl AvailabilityGate {
    /// Mark the listing as booked. Returns `false` when it already was.
    pub(crate) fn occupy(listing: &mut Listing) -> bool {
        if listing.is_occupied {
            return false;
        }
        listing.is_occupied = true;
        true
    }

    /// Release the listing for new bookings. Returns `false` when it was already free.
    pub(crate) fn vacate(listing: &mut Listing) -> bool {
        if !listing.is_occupied {
            return false;
        }
        listing.is_occupied = false;
        true
    }
}

/// Registry of per-listing mutexes serializing booking operations on one listing.
#[derive(Debug, Default)]
pub struct ListingLocks {
    locks: Mutex<HashMap<ListingId, Arc<Mutex<()>>>>,
}

impl ListingLocks {
    /// Run `f` while holding the listing's lock.
    pub fn with_listing<T>(&self, listing_id: &ListingId, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(listing_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn lock_for(&self, listing_id: &ListingId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(listing_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
