use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{ChannelKind, DeliveryOutcome, InvoiceId, NotificationId};

/// one reminder attempt, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub invoice_id: InvoiceId,
    pub channel: ChannelKind,
    pub sent_at: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl NotificationRecord {
    pub fn sent(invoice_id: InvoiceId, channel: ChannelKind, sent_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            invoice_id,
            channel,
            sent_at,
            outcome: DeliveryOutcome::Sent,
            failure_reason: None,
        }
    }

    pub fn failed(
        invoice_id: InvoiceId,
        channel: ChannelKind,
        sent_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            invoice_id,
            channel,
            sent_at,
            outcome: DeliveryOutcome::Failed,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.outcome == DeliveryOutcome::Sent
    }
}

/// append-only reminder history
pub trait NotificationLog: Send + Sync {
    fn append(&self, record: NotificationRecord) -> Result<()>;

    /// every attempt for one invoice, oldest first
    fn history(&self, invoice_id: InvoiceId) -> Vec<NotificationRecord>;

    fn last_for(&self, invoice_id: InvoiceId) -> Option<NotificationRecord> {
        self.history(invoice_id)
            .into_iter()
            .max_by_key(|record| record.sent_at)
    }

    /// total number of records across all invoices
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// in-memory log keyed by invoice; each entry lock serializes one invoice's appends
#[derive(Debug, Default)]
pub struct InMemoryNotificationLog {
    records: DashMap<InvoiceId, Vec<NotificationRecord>>,
}

impl InMemoryNotificationLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationLog for InMemoryNotificationLog {
    fn append(&self, record: NotificationRecord) -> Result<()> {
        self.records.entry(record.invoice_id).or_default().push(record);
        Ok(())
    }

    fn history(&self, invoice_id: InvoiceId) -> Vec<NotificationRecord> {
        self.records
            .get(&invoice_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }
}
