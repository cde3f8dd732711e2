use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{Money, PricingTiers};

const DAILY_MAX_DAYS: i64 = 7;
const WEEK_DAYS: i64 = 7;
const WEEKLY_MAX_DAYS: i64 = 30;
const MONTH_DAYS: i64 = 30;

/// Rate tier selected for a stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentalTier {
    #[serde(rename = "per-day")]
    Daily,
    #[serde(rename = "per-week")]
    Weekly,
    #[serde(rename = "per-month")]
    Monthly,
}

impl RentalTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Daily => "per-day",
            Self::Weekly => "per-week",
            Self::Monthly => "per-month",
        }
    }
}

/// Priced stay: total, the tier that produced it, and how many tier units were billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    pub total: Money,
    pub tier: RentalTier,
    pub days: i64,
    pub billed_units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("date_from {from} is later than date_to {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("no pricing option covers a stay of {days} days")]
    NoPricingAvailable { days: i64 },
    #[error("price of a {days}-day stay overflows")]
    Overflow { days: i64 },
}

/// Number of nights billed for an inclusive range.
pub fn stay_days(date_from: NaiveDate, date_to: NaiveDate) -> Result<i64, PricingError> {
    if date_from > date_to {
        return Err(PricingError::InvalidRange {
            from: date_from,
            to: date_to,
        });
    }
    Ok((date_to - date_from).num_days() + 1)
}

/// Price an inclusive stay.
///
/// Tiers are tried in order: daily for stays up to a week, weekly for one week up to
/// thirty days (rounded up to whole weeks), monthly beyond thirty days (rounded up to
/// whole thirty-day months). A seven-day stay prefers the daily rate when one exists.
pub fn quote(
    tiers: &PricingTiers,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<PriceQuote, PricingError> {
    let days = stay_days(date_from, date_to)?;

    let (tier, rate, units) = match (tiers.per_day, tiers.per_week, tiers.per_month) {
        (Some(rate), _, _) if days <= DAILY_MAX_DAYS => (RentalTier::Daily, rate, days),
        (_, Some(rate), _) if (WEEK_DAYS..=WEEKLY_MAX_DAYS).contains(&days) => {
            (RentalTier::Weekly, rate, ceil_div(days, WEEK_DAYS))
        }
        (_, _, Some(rate)) if days > WEEKLY_MAX_DAYS => {
            (RentalTier::Monthly, rate, ceil_div(days, MONTH_DAYS))
        }
        _ => return Err(PricingError::NoPricingAvailable { days }),
    };

    let total = rate
        .checked_mul(Money::from(units))
        .ok_or(PricingError::Overflow { days })?;

    Ok(PriceQuote {
        total,
        tier,
        days,
        billed_units: units,
    })
}

/// Rental types a listing advertises, in display order (weekly, daily, monthly).
pub fn available_tiers(tiers: &PricingTiers) -> Vec<RentalTier> {
    [
        (tiers.per_week, RentalTier::Weekly),
        (tiers.per_day, RentalTier::Daily),
        (tiers.per_month, RentalTier::Monthly),
    ]
    .into_iter()
    .filter_map(|(rate, tier)| rate.map(|_| tier))
    .collect()
}

fn ceil_div(value: i64, divisor: i64) -> i64 {
    (value + divisor - 1) / divisor
}
