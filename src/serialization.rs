//! serializable read model for invoices
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::invoice::{Invoice, LineItem};
use crate::types::{InvoiceId, InvoiceStatus, PaymentId, PaymentMethod};

/// serializable view of an invoice, with read-time projections for a given day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceView {
    pub id: InvoiceId,
    pub number: String,
    pub customer_id: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: String,
    pub line_items: Vec<LineItemView>,
    pub totals: TotalsView,
    pub status: InvoiceStatus,
    pub days_overdue: i64,
    pub payments: Vec<PaymentView>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemView {
    pub description: String,
    pub quantity: rust_decimal::Decimal,
    pub unit_price: Money,
    pub discount: Option<Money>,
    pub tax: Option<Money>,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    pub total: Money,
    pub paid: Money,
    pub outstanding_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl InvoiceView {
    pub fn from_invoice(invoice: &Invoice, today: NaiveDate) -> Self {
        let line_item = |item: &LineItem| LineItemView {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount: item.discount,
            tax: item.tax,
            // issued lines were range-checked at validation
            line_total: item.line_total(&invoice.currency).unwrap_or_default(),
        };

        InvoiceView {
            id: invoice.id,
            number: invoice.number.clone(),
            customer_id: invoice.customer_id.clone(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            currency: invoice.currency.code().to_string(),
            line_items: invoice.line_items.iter().map(line_item).collect(),
            totals: TotalsView {
                total: invoice.total,
                paid: invoice.amount_paid(),
                outstanding_balance: invoice.outstanding_balance,
            },
            status: invoice.status_on(today),
            days_overdue: invoice.days_overdue(today),
            payments: invoice
                .payments
                .iter()
                .map(|p| PaymentView {
                    id: p.id,
                    invoice_id: p.invoice_id,
                    date: p.date,
                    amount: p.amount,
                    method: p.method,
                    external_ref: p.external_ref.clone(),
                    notes: p.notes.clone(),
                })
                .collect(),
            notes: invoice.notes.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::InvoiceDraft;
    use crate::types::Currency;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_view_projects_status_and_days_overdue() {
        let draft = InvoiceDraft::new(
            "acme",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            Currency::new("EUR").unwrap(),
        )
        .line(
            LineItem::new("audit", dec!(2), Money::from_major(150))
                .with_tax(Money::from_major(63)),
        )
        .notes("net 30");
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let invoice = Invoice::issue(Uuid::new_v4(), "INV-000009".into(), draft, now).unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 2, 5).unwrap();
        let view = InvoiceView::from_invoice(&invoice, today);
        assert_eq!(view.status, InvoiceStatus::Overdue);
        assert_eq!(view.days_overdue, 5);
        assert_eq!(view.totals.total, Money::from_major(363));
        assert_eq!(view.totals.paid, Money::ZERO);
        assert_eq!(view.line_items[0].line_total, Money::from_major(363));
        assert!(view.to_json().unwrap().contains("\"customerId\":\"acme\""));

        let pretty = view.to_json_pretty().unwrap();
        let json: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(json["number"], "INV-000009");
        assert_eq!(json["currency"], "EUR");
        assert_eq!(json["status"], "overdue");
        let outstanding: Money = json["totals"]["outstandingBalance"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(outstanding, Money::from_major(363));
        assert_eq!(json["daysOverdue"], 5);
    }
}
