use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::ledger::balance::compute_balance;
use crate::status::{days_overdue, derive_status};
use crate::types::{Currency, InvoiceId, InvoiceStatus, PaymentId, PaymentMethod};

/// one billable line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub tax: Option<Money>,
}

impl LineItem {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Money) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            discount: None,
            tax: None,
        }
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_tax(mut self, tax: Money) -> Self {
        self.tax = Some(tax);
        self
    }

    fn gross(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }

    /// quantity x unit price - discount + tax, rounded to the currency
    ///
    /// `None` when the amount does not fit in a decimal.
    pub fn line_total(&self, currency: &Currency) -> Option<Money> {
        let discount = self.discount.unwrap_or(Money::ZERO);
        let tax = self.tax.unwrap_or(Money::ZERO);
        let net = self.gross()?.checked_sub(discount)?.checked_add(tax)?;
        Some(net.round_half_up(currency.minor_units()))
    }

    fn validate(&self, index: usize, currency: &Currency) -> Result<()> {
        let fail = |message: &str| -> Result<()> {
            Err(BillingError::InvalidLineItem {
                index,
                message: message.to_string(),
            })
        };

        if self.quantity <= Decimal::ZERO {
            return fail("quantity must be positive");
        }
        if self.unit_price.is_negative() {
            return fail("unit price cannot be negative");
        }
        let Some(gross) = self.gross() else {
            return fail("amount out of range");
        };
        if let Some(discount) = self.discount {
            if discount.is_negative() {
                return fail("discount cannot be negative");
            }
            if discount > gross {
                return fail("discount exceeds line amount");
            }
        }
        if self.tax.is_some_and(|tax: Money| tax.is_negative()) {
            return fail("tax cannot be negative");
        }
        if self.line_total(currency).is_none() {
            return fail("amount out of range");
        }
        Ok(())
    }
}

/// invoice as submitted by the crud surface, before numbering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub customer_id: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Currency,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub notes: String,
}

impl InvoiceDraft {
    pub fn new(
        customer_id: impl Into<String>,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        currency: Currency,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            issue_date,
            due_date,
            currency,
            line_items: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn line(mut self, item: LineItem) -> Self {
        self.line_items.push(item);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// reject malformed drafts before anything is stored
    pub fn validate(&self) -> Result<()> {
        if self.customer_id.trim().is_empty() {
            return Err(BillingError::InvalidInvoice {
                message: "customer reference is required".to_string(),
            });
        }
        if self.due_date < self.issue_date {
            return Err(BillingError::InvalidInvoice {
                message: format!(
                    "due date {} is before issue date {}",
                    self.due_date, self.issue_date
                ),
            });
        }
        if self.line_items.is_empty() {
            return Err(BillingError::InvalidInvoice {
                message: "an invoice needs at least one line item".to_string(),
            });
        }
        for (index, item) in self.line_items.iter().enumerate() {
            item.validate(index, &self.currency)?;
        }
        if self.total()?.is_negative() {
            return Err(BillingError::InvalidInvoice {
                message: "invoice total cannot be negative".to_string(),
            });
        }
        Ok(())
    }

    /// sum of line totals; fails when a line or the sum is out of range
    pub fn total(&self) -> Result<Money> {
        self.line_items
            .iter()
            .enumerate()
            .try_fold(Money::ZERO, |total, (index, item)| {
                let line = item.line_total(&self.currency).ok_or_else(|| {
                    BillingError::InvalidLineItem {
                        index,
                        message: "amount out of range".to_string(),
                    }
                })?;
                total
                    .checked_add(line)
                    .ok_or_else(|| BillingError::InvalidInvoice {
                        message: "invoice total out of range".to_string(),
                    })
            })
    }
}

/// settled payment, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    pub external_ref: Option<String>,
    pub notes: Option<String>,
    pub recurring: bool,
    pub recorded_at: DateTime<Utc>,
}

/// status transition produced by a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

/// invoice entity with its payments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub number: String,
    pub customer_id: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Currency,
    pub line_items: Vec<LineItem>,
    pub total: Money,
    pub outstanding_balance: Money,
    pub status: InvoiceStatus,
    pub notes: String,
    /// ordered by payment date
    pub payments: Vec<Payment>,
    /// bumped on every stored mutation
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_status_change: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// build an invoice from a validated draft, status derived for `now`
    pub fn issue(
        id: InvoiceId,
        number: String,
        draft: InvoiceDraft,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        draft.validate()?;
        let total = draft.total()?;

        let mut invoice = Self {
            id,
            number,
            customer_id: draft.customer_id,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
            currency: draft.currency,
            line_items: draft.line_items,
            total,
            outstanding_balance: total,
            status: InvoiceStatus::Pending,
            notes: draft.notes,
            payments: Vec::new(),
            version: 0,
            created_at: now,
            last_status_change: now,
            cancelled_at: None,
        };
        invoice.reconcile(now);
        Ok(invoice)
    }

    /// sum of all recorded payments
    pub fn amount_paid(&self) -> Money {
        self.payments.iter().map(|p| &p.amount).sum()
    }

    /// status as of `today`, without touching the stored value
    pub fn status_on(&self, today: NaiveDate) -> InvoiceStatus {
        derive_status(
            self.status,
            self.total,
            self.outstanding_balance,
            self.due_date,
            today,
        )
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        days_overdue(self.due_date, today)
    }

    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == id)
    }

    /// recompute balance from payments and re-derive status
    ///
    /// Returns the status change, if any.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        self.outstanding_balance = compute_balance(
            self.total,
            self.payments.iter().map(|p| &p.amount),
            &self.currency,
        );
        self.rederive(now)
    }

    /// re-derive status only; balance is assumed current
    pub(crate) fn rederive(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        let new_status = self.status_on(now.date_naive());
        if new_status == self.status {
            return None;
        }
        let transition = Transition {
            from: self.status,
            to: new_status,
        };
        self.status = new_status;
        self.last_status_change = now;
        Some(transition)
    }

    /// insert keeping payments ordered by date, after any same-day payments
    pub(crate) fn push_payment(&mut self, payment: Payment) {
        let position = self.payments.partition_point(|p| p.date <= payment.date);
        self.payments.insert(position, payment);
    }

    pub(crate) fn take_payment(&mut self, id: PaymentId) -> Option<Payment> {
        let position = self.payments.iter().position(|p| p.id == id)?;
        Some(self.payments.remove(position))
    }

    pub(crate) fn mark_cancelled(&mut self, now: DateTime<Utc>) -> Transition {
        let transition = Transition {
            from: self.status,
            to: InvoiceStatus::Cancelled,
        };
        self.status = InvoiceStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.last_status_change = now;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    fn draft() -> InvoiceDraft {
        InvoiceDraft::new("cust-1", date(2024, 3, 1), date(2024, 3, 31), usd())
            .line(LineItem::new("consulting", dec!(10), Money::from_major(80)))
            .line(
                LineItem::new("travel", dec!(1), Money::from_major(250))
                    .with_discount(Money::from_major(50))
                    .with_tax(Money::from_str_exact("19.99").unwrap()),
            )
    }

    #[test]
    fn test_total_from_line_items() {
        // 10 x 80 + (250 - 50 + 19.99)
        assert_eq!(draft().total().unwrap(), Money::from_str_exact("1019.99").unwrap());
    }

    #[test]
    fn test_line_total_rounds_half_up() {
        let item = LineItem::new("hours", dec!(1.5), Money::from_str_exact("33.33").unwrap());
        // 49.995 -> 50.00
        assert_eq!(item.line_total(&usd()), Some(Money::from_str_exact("50.00").unwrap()));
    }

    #[test]
    fn test_draft_validation() {
        let mut bad = draft();
        bad.due_date = date(2024, 2, 1);
        assert!(matches!(bad.validate(), Err(BillingError::InvalidInvoice { .. })));

        let mut bad = draft();
        bad.customer_id = "  ".to_string();
        assert!(bad.validate().is_err());

        let bad = InvoiceDraft::new("c", date(2024, 3, 1), date(2024, 3, 1), usd());
        assert!(bad.validate().is_err());

        let bad = draft().line(LineItem::new("free", dec!(0), Money::from_major(1)));
        assert!(matches!(
            bad.validate(),
            Err(BillingError::InvalidLineItem { index: 2, .. })
        ));

        let bad = draft().line(
            LineItem::new("oops", dec!(1), Money::from_major(10))
                .with_discount(Money::from_major(11)),
        );
        assert!(matches!(
            bad.validate(),
            Err(BillingError::InvalidLineItem { index: 2, .. })
        ));

        let bad = draft().line(
            LineItem::new("refund", dec!(1), Money::from_major(10)).with_tax(Money::from_major(-1)),
        );
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_out_of_range_amounts_are_rejected() {
        let json = r#"{
            "customer_id": "cust-1",
            "issue_date": "2024-03-01",
            "due_date": "2024-03-31",
            "currency": "USD",
            "line_items": [
                {
                    "description": "bulk",
                    "quantity": "100000000000000000000",
                    "unit_price": "10000000000"
                }
            ]
        }"#;
        let draft: InvoiceDraft = serde_json::from_str(json).unwrap();
        assert!(matches!(
            draft.validate(),
            Err(BillingError::InvalidLineItem { index: 0, .. })
        ));
        assert!(draft.total().is_err());

        // each line fits, their sum does not
        let mut many = InvoiceDraft::new("cust-1", date(2024, 3, 1), date(2024, 3, 31), usd());
        for _ in 0..20 {
            many = many.line(LineItem::new(
                "block",
                dec!(1),
                Money::from_decimal(Decimal::from_i128_with_scale(7 * 10_i128.pow(27), 0)),
            ));
        }
        let err = many.validate().unwrap_err();
        assert!(matches!(err, BillingError::InvalidInvoice { .. }));
        assert_eq!(err.kind(), crate::errors::ErrorKind::Validation);

        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert!(Invoice::issue(Uuid::new_v4(), "INV-1".into(), many, now).is_err());
    }

    #[test]
    fn test_issue_derives_initial_status() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();
        let invoice = Invoice::issue(Uuid::new_v4(), "INV-000001".into(), draft(), now).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.outstanding_balance, invoice.total);
        assert_eq!(invoice.version, 0);

        // issued after its own due date
        let late = Utc.with_ymd_and_hms(2024, 4, 10, 0, 0, 0).unwrap();
        let invoice = Invoice::issue(Uuid::new_v4(), "INV-000002".into(), draft(), late).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Overdue);
        assert_eq!(invoice.days_overdue(late.date_naive()), 10);
    }

    #[test]
    fn test_zero_total_invoice_is_paid() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let draft = InvoiceDraft::new("cust", date(2024, 3, 1), date(2024, 3, 31), usd())
            .line(LineItem::new("courtesy", dec!(1), Money::ZERO));
        let invoice = Invoice::issue(Uuid::new_v4(), "INV-1".into(), draft, now).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_payments_kept_in_date_order() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let mut invoice = Invoice::issue(Uuid::new_v4(), "INV-1".into(), draft(), now).unwrap();

        for (day, amount) in [(8, 10), (2, 20), (8, 30), (5, 40)] {
            invoice.push_payment(Payment {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                date: date(2024, 3, day),
                amount: Money::from_major(amount),
                method: PaymentMethod::Cash,
                external_ref: None,
                notes: None,
                recurring: false,
                recorded_at: now,
            });
        }

        let amounts: Vec<Money> = invoice.payments.iter().map(|p| p.amount).collect();
        assert_eq!(
            amounts,
            vec![
                Money::from_major(20),
                Money::from_major(40),
                Money::from_major(10),
                Money::from_major(30)
            ]
        );

        let transition = invoice.reconcile(now).unwrap();
        assert_eq!(transition.to, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.amount_paid(), Money::from_major(100));
        assert_eq!(
            invoice.outstanding_balance,
            Money::from_str_exact("919.99").unwrap()
        );
    }
}
