//! invoice status derivation
//!
//! Status is never set directly. It is recomputed from the outstanding
//! balance, the due date and the current calendar day every time one of
//! them changes. The only exception is cancellation, which is an explicit
//! and terminal action.

use chrono::NaiveDate;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::types::InvoiceStatus;

/// derive the status an invoice should have today
///
/// `overdue` wins over `partiallyPaid`; an invoice due today is not overdue yet.
pub fn derive_status(
    current: InvoiceStatus,
    total: Money,
    outstanding: Money,
    due_date: NaiveDate,
    today: NaiveDate,
) -> InvoiceStatus {
    if current == InvoiceStatus::Cancelled {
        InvoiceStatus::Cancelled
    } else if !outstanding.is_positive() {
        InvoiceStatus::Paid
    } else if today > due_date {
        InvoiceStatus::Overdue
    } else if outstanding < total {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Pending
    }
}

/// whole calendar days past the due date, zero on or before it
pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    if today <= due_date {
        0
    } else {
        (today - due_date).num_days()
    }
}

/// check that an invoice in `status` may be cancelled
pub fn ensure_cancellable(status: InvoiceStatus) -> Result<()> {
    match status {
        InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue => Ok(()),
        InvoiceStatus::Paid | InvoiceStatus::Cancelled => Err(BillingError::InvalidTransition {
            from: status,
            action: "cancel",
        }),
    }
}

/// check that an invoice in `status` may receive a payment
pub fn ensure_payable(status: InvoiceStatus) -> Result<()> {
    if status == InvoiceStatus::Cancelled {
        return Err(BillingError::InvalidTransition {
            from: status,
            action: "pay",
        });
    }
    Ok(())
}
