//! Balance movements between an account's available and pending buckets.
//!
//! Every operation validates before it mutates, so an `Err` leaves the accounts exactly as
//! they were. Durability comes from recording the updated accounts and the returned
//! [`LedgerEntry`] in the same repository commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Account, AccountId, HoldId, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOperation {
    Reserve,
    Release,
    Capture,
}

/// Journal line describing one applied ledger operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hold_id: HoldId,
    pub operation: LedgerOperation,
    pub account: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<AccountId>,
    pub amount: Money,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds on account {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        required: Money,
        available: Money,
    },
    #[error("invalid amount {amount} for account {account} (pending {pending})")]
    InvalidAmount {
        account: AccountId,
        amount: Money,
        pending: Money,
    },
    #[error("balance overflow on account {account}")]
    Overflow { account: AccountId },
}

/// Move `amount` from available into pending.
pub fn reserve(
    account: &mut Account,
    amount: Money,
    hold_id: &HoldId,
) -> Result<LedgerEntry, LedgerError> {
    ensure_non_negative(account, amount)?;
    if account.available_balance < amount {
        return Err(LedgerError::InsufficientFunds {
            account: account.id.clone(),
            required: amount,
            available: account.available_balance,
        });
    }
    let pending = checked_add(account, account.pending_balance, amount)?;

    account.available_balance -= amount;
    account.pending_balance = pending;
    Ok(entry(hold_id, LedgerOperation::Reserve, &account.id, None, amount))
}

/// Return `amount` from pending to available.
pub fn release(
    account: &mut Account,
    amount: Money,
    hold_id: &HoldId,
) -> Result<LedgerEntry, LedgerError> {
    ensure_non_negative(account, amount)?;
    ensure_pending_covers(account, amount)?;
    let available = checked_add(account, account.available_balance, amount)?;

    account.pending_balance -= amount;
    account.available_balance = available;
    Ok(entry(hold_id, LedgerOperation::Release, &account.id, None, amount))
}

/// Transfer `amount` from `from`'s pending into `to`'s available balance.
pub fn capture(
    from: &mut Account,
    to: &mut Account,
    amount: Money,
    hold_id: &HoldId,
) -> Result<LedgerEntry, LedgerError> {
    ensure_non_negative(from, amount)?;
    ensure_pending_covers(from, amount)?;
    let available = checked_add(to, to.available_balance, amount)?;

    from.pending_balance -= amount;
    to.available_balance = available;
    Ok(entry(
        hold_id,
        LedgerOperation::Capture,
        &from.id,
        Some(&to.id),
        amount,
    ))
}

/// Capture where payer and payee are the same account, e.g. a landlord booking their own
/// listing.
pub fn capture_within(
    account: &mut Account,
    amount: Money,
    hold_id: &HoldId,
) -> Result<LedgerEntry, LedgerError> {
    ensure_non_negative(account, amount)?;
    ensure_pending_covers(account, amount)?;
    let available = checked_add(account, account.available_balance, amount)?;

    account.pending_balance -= amount;
    account.available_balance = available;
    Ok(entry(
        hold_id,
        LedgerOperation::Capture,
        &account.id,
        Some(&account.id),
        amount,
    ))
}

fn ensure_non_negative(account: &Account, amount: Money) -> Result<(), LedgerError> {
    if amount < Money::ZERO {
        return Err(LedgerError::InvalidAmount {
            account: account.id.clone(),
            amount,
            pending: account.pending_balance,
        });
    }
    Ok(())
}

fn ensure_pending_covers(account: &Account, amount: Money) -> Result<(), LedgerError> {
    if account.pending_balance < amount {
        return Err(LedgerError::InvalidAmount {
            account: account.id.clone(),
            amount,
            pending: account.pending_balance,
        });
    }
    Ok(())
}

fn checked_add(account: &Account, balance: Money, amount: Money) -> Result<Money, LedgerError> {
    balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::Overflow {
            account: account.id.clone(),
        })
}

fn entry(
    hold_id: &HoldId,
    operation: LedgerOperation,
    account: &AccountId,
    counterparty: Option<&AccountId>,
    amount: Money,
) -> LedgerEntry {
    LedgerEntry {
        hold_id: hold_id.clone(),
        operation,
        account: account.clone(),
        counterparty: counterparty.cloned(),
        amount,
        recorded_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::domain::{RequesterDetails, Role};

    fn account(id: &str, funds: i64) -> Account {
        Account::new(
            AccountId(id.to_string()),
            RequesterDetails {
                first_name: "Test".to_string(),
                last_name: id.to_string(),
                email: format!("{id}@example.com"),
                phone: "+10000000".to_string(),
            },
            vec![Role::Tenant],
            Money::from(funds),
        )
    }

    fn hold() -> HoldId {
        HoldId("hold-000001".to_string())
    }

    #[test]
    fn reserve_then_release_restores_balances() {
        let mut tenant = account("tenant", 1000);
        let before = (tenant.available_balance(), tenant.pending_balance());

        reserve(&mut tenant, Money::new(31025, 2), &hold()).expect("reserve");
        assert_eq!(tenant.available_balance(), Money::new(68975, 2));
        assert_eq!(tenant.pending_balance(), Money::new(31025, 2));

        release(&mut tenant, Money::new(31025, 2), &hold()).expect("release");
        assert_eq!((tenant.available_balance(), tenant.pending_balance()), before);
    }

    #[test]
    fn reserve_then_capture_conserves_grand_total() {
        let mut tenant = account("tenant", 1000);
        let mut owner = account("owner", 50);
        let grand_total = tenant.total_balance() + owner.total_balance();

        reserve(&mut tenant, Money::from(300), &hold()).expect("reserve");
        let entry = capture(&mut tenant, &mut owner, Money::from(300), &hold()).expect("capture");

        assert_eq!(entry.operation, LedgerOperation::Capture);
        assert_eq!(entry.counterparty, Some(owner.id.clone()));
        assert_eq!(tenant.available_balance(), Money::from(700));
        assert_eq!(tenant.pending_balance(), Money::ZERO);
        assert_eq!(owner.available_balance(), Money::from(350));
        assert_eq!(tenant.total_balance() + owner.total_balance(), grand_total);
    }

    #[test]
    fn insufficient_funds_leaves_account_untouched() {
        let mut tenant = account("tenant", 100);
        let snapshot = tenant.clone();

        match reserve(&mut tenant, Money::from(101), &hold()) {
            Err(LedgerError::InsufficientFunds { required, .. }) => {
                assert_eq!(required, Money::from(101))
            }
            other => panic!("expected insufficient funds, got {other:?}"),
        }
        assert_eq!(tenant, snapshot);
    }

    #[test]
    fn release_and_capture_require_pending_cover() {
        let mut tenant = account("tenant", 100);
        let mut owner = account("owner", 0);
        reserve(&mut tenant, Money::from(40), &hold()).expect("reserve");
        let snapshot = (tenant.clone(), owner.clone());

        assert!(matches!(
            release(&mut tenant, Money::from(41), &hold()),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert!(matches!(
            capture(&mut tenant, &mut owner, Money::from(41), &hold()),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert_eq!((tenant, owner), snapshot);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let mut tenant = account("tenant", 100);
        assert!(matches!(
            reserve(&mut tenant, Money::from(-1), &hold()),
            Err(LedgerError::InvalidAmount { .. })
        ));
        assert_eq!(tenant.available_balance(), Money::from(100));
    }

    #[test]
    fn self_capture_moves_pending_back_to_available() {
        let mut landlord = account("landlord", 200);
        reserve(&mut landlord, Money::from(200), &hold()).expect("reserve");
        capture_within(&mut landlord, Money::from(200), &hold()).expect("capture");
        assert_eq!(landlord.available_balance(), Money::from(200));
        assert_eq!(landlord.pending_balance(), Money::ZERO);
    }
}
