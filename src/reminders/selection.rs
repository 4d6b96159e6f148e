use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::invoice::Invoice;
use crate::types::InvoiceId;

/// an invoice that still owes money, with how late it is
#[derive(Debug, Clone, PartialEq)]
pub struct OverdueInvoice {
    pub invoice: Invoice,
    pub days_overdue: i64,
}

impl OverdueInvoice {
    pub fn id(&self) -> InvoiceId {
        self.invoice.id
    }

    pub fn outstanding(&self) -> Money {
        self.invoice.outstanding_balance
    }
}

/// open invoices at least `min_days_overdue` late, worst offenders first
///
/// Sorted by days overdue, then outstanding balance, both descending.
pub fn select_overdue_invoices(
    invoices: &[Invoice],
    min_days_overdue: u32,
    today: NaiveDate,
) -> Vec<OverdueInvoice> {
    let mut selected: Vec<OverdueInvoice> = invoices
        .iter()
        .filter(|invoice| invoice.status_on(today).is_open())
        .filter(|invoice| invoice.outstanding_balance.is_positive())
        .filter_map(|invoice| {
            let days_overdue = invoice.days_overdue(today);
            (days_overdue >= i64::from(min_days_overdue)).then(|| OverdueInvoice {
                invoice: invoice.clone(),
                days_overdue,
            })
        })
        .collect();

    selected.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then_with(|| b.outstanding().cmp(&a.outstanding()))
    });
    selected
}

/// receivables aging bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingBucket {
    pub label: String,
    pub count: usize,
    pub outstanding: Money,
}

/// open balances grouped by how late they are
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of: NaiveDate,
    pub buckets: Vec<AgingBucket>,
    pub total_outstanding: Money,
}

impl AgingReport {
    const BUCKETS: [(&'static str, i64, i64); 5] = [
        ("current", 0, 0),
        ("1-30", 1, 30),
        ("31-60", 31, 60),
        ("61-90", 61, 90),
        ("90+", 91, i64::MAX),
    ];

    pub fn build(invoices: &[Invoice], today: NaiveDate) -> Self {
        let mut buckets: Vec<AgingBucket> = Self::BUCKETS
            .iter()
            .map(|(label, _, _)| AgingBucket {
                label: label.to_string(),
                count: 0,
                outstanding: Money::ZERO,
            })
            .collect();

        let open = invoices.iter().filter(|invoice| {
            invoice.status_on(today).is_open() && invoice.outstanding_balance.is_positive()
        });
        for invoice in open {
            let days = invoice.days_overdue(today);
            if let Some(index) = Self::BUCKETS
                .iter()
                .position(|(_, low, high)| days >= *low && days <= *high)
            {
                buckets[index].count += 1;
                buckets[index].outstanding += invoice.outstanding_balance;
            }
        }

        let total_outstanding = buckets.iter().map(|b| &b.outstanding).sum();
        Self {
            as_of: today,
            buckets,
            total_outstanding,
        }
    }

    pub fn bucket(&self, label: &str) -> Option<&AgingBucket> {
        self.buckets.iter().find(|b| b.label == label)
    }
}
