use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{ChannelKind, InvoiceId, InvoiceStatus, PaymentId, PaymentMethod};

/// all events that can be emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BillingEvent {
    // invoice lifecycle events
    InvoiceIssued {
        invoice_id: InvoiceId,
        number: String,
        total: Money,
        due_date: NaiveDate,
        timestamp: DateTime<Utc>,
    },
    InvoiceCancelled {
        invoice_id: InvoiceId,
        previous_status: InvoiceStatus,
        outstanding: Money,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        invoice_id: InvoiceId,
        old_status: InvoiceStatus,
        new_status: InvoiceStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRegistered {
        invoice_id: InvoiceId,
        payment_id: PaymentId,
        amount: Money,
        method: PaymentMethod,
        outstanding: Money,
        timestamp: DateTime<Utc>,
    },
    PaymentRemoved {
        invoice_id: InvoiceId,
        payment_id: PaymentId,
        amount: Money,
        outstanding: Money,
        timestamp: DateTime<Utc>,
    },

    // reminder events
    ReminderSent {
        invoice_id: InvoiceId,
        channel: ChannelKind,
        days_overdue: i64,
        timestamp: DateTime<Utc>,
    },
    ReminderFailed {
        invoice_id: InvoiceId,
        channel: ChannelKind,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<BillingEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: BillingEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<BillingEvent> {
        std::mem::take(&mut self.events)
    }
}
