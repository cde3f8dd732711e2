use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::pricing::RentalTier;

/// Monetary amounts are exact decimals in the marketplace's single currency.
pub type Money = Decimal;

/// Identifier of a marketplace account (tenant, landlord, or admin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

/// Identifier of a rental listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingId(pub String);

/// Identifier of a booking hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HoldId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for HoldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tenant,
    Landlord,
    Admin,
}

/// Personal details a requester submits with a booking; they must match the account profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// Account balances plus the profile fields used to verify booking requests.
///
/// Balances are only written through the ledger, so they are readable but not settable
/// from outside the booking module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub profile: RequesterDetails,
    pub roles: Vec<Role>,
    pub(in crate::booking) available_balance: Money,
    pub(in crate::booking) pending_balance: Money,
}

impl Account {
    /// Opening funds are stored as given. Repositories refuse accounts with a negative
    /// balance, so collaborators must not pass one.
    pub fn new(id: AccountId, profile: RequesterDetails, roles: Vec<Role>, funds: Money) -> Self {
        Self {
            id,
            profile,
            roles,
            available_balance: funds,
            pending_balance: Money::ZERO,
        }
    }

    pub fn available_balance(&self) -> Money {
        self.available_balance
    }

    pub fn pending_balance(&self) -> Money {
        self.pending_balance
    }

    pub fn total_balance(&self) -> Money {
        self.available_balance + self.pending_balance
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Exact, case-sensitive comparison of every identity field.
    pub fn matches(&self, details: &RequesterDetails) -> bool {
        self.profile == *details
    }
}

/// Optional rates a landlord publishes for a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTiers {
    pub per_day: Option<Money>,
    pub per_week: Option<Money>,
    pub per_month: Option<Money>,
}

impl PricingTiers {
    /// A listing must offer at least one tier.
    pub fn is_empty(&self) -> bool {
        self.per_day.is_none() && self.per_week.is_none() && self.per_month.is_none()
    }
}

/// Booking-relevant view of a listing supplied by the listing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub owner: AccountId,
    pub title: String,
    pub pricing: PricingTiers,
    pub is_moderated: bool,
    pub max_occupants: u32,
    pub check_in_time: NaiveTime,
    pub check_out_time: NaiveTime,
    pub(in crate::booking) is_occupied: bool,
}

impl Listing {
    pub fn new(
        id: ListingId,
        owner: AccountId,
        title: impl Into<String>,
        pricing: PricingTiers,
        max_occupants: u32,
        check_in_time: NaiveTime,
        check_out_time: NaiveTime,
    ) -> Self {
        Self {
            id,
            owner,
            title: title.into(),
            pricing,
            is_moderated: false,
            max_occupants,
            check_in_time,
            check_out_time,
            is_occupied: false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.is_occupied
    }

    pub fn is_owned_by(&self, account: &AccountId) -> bool {
        self.owner == *account
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl HoldState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Pending and confirmed holds still own funds or occupancy.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

/// A tenant's request to reserve a listing for an inclusive date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub id: HoldId,
    pub listing_id: ListingId,
    pub requester: AccountId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub check_in_time: NaiveTime,
    pub occupants: u32,
    pub total_price: Money,
    pub rental_tier: RentalTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub state: HoldState,
    pub created_at: DateTime<Utc>,
}

impl Hold {
    /// Instant the stay ends: the last night's date at the listing's check-out time.
    pub fn stay_ends_at(&self, check_out_time: NaiveTime) -> DateTime<Utc> {
        self.date_to.and_time(check_out_time).and_utc()
    }
}

/// Which party withdrew a pending hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Tenant,
    Owner,
}
