use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::types::Currency;

/// outstanding balance: total minus payments, floored at zero and rounded
/// half-up to the currency's minor unit
pub fn compute_balance<'a, I>(total: Money, payments: I, currency: &Currency) -> Money
where
    I: IntoIterator<Item = &'a Money>,
{
    let paid: Money = payments.into_iter().sum();
    total
        .saturating_sub(paid)
        .round_half_up(currency.minor_units())
}

/// how much of a candidate payment the invoice will accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// amount recorded on the invoice
    pub applied: Money,
    /// amount above the balance, only non-zero when overpayment is allowed
    pub excess: Money,
}

/// decide whether `candidate` may be recorded against `outstanding`
pub fn admit_payment(
    candidate: Money,
    outstanding: Money,
    currency: &Currency,
    allow_overpayment: bool,
) -> Result<Admission> {
    let amount = candidate.round_half_up(currency.minor_units());
    if !amount.is_positive() {
        return Err(BillingError::InvalidAmount { amount: candidate });
    }

    if amount <= outstanding {
        return Ok(Admission {
            applied: amount,
            excess: Money::ZERO,
        });
    }

    // a settled invoice has nothing left to absorb, flag or not
    if allow_overpayment && outstanding.is_positive() {
        Ok(Admission {
            applied: outstanding,
            excess: amount - outstanding,
        })
    } else {
        Err(BillingError::ExceedsBalance {
            outstanding,
            requested: amount,
        })
    }
}
