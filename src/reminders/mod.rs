pub mod dispatch;
pub mod log;
pub mod selection;
pub mod throttle;

use async_trait::async_trait;
use thiserror::Error;

use crate::invoice::Invoice;
use crate::types::ChannelKind;

pub use dispatch::{BatchOutcome, ReminderDispatcher};
pub use log::{InMemoryNotificationLog, NotificationLog, NotificationRecord};
pub use selection::{select_overdue_invoices, AgingBucket, AgingReport, OverdueInvoice};
pub use throttle::{days_since_last_attempt, should_notify};

/// why a channel could not deliver a reminder
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("channel unavailable: {0}")]
    Unavailable(String),

    #[error("no usable recipient for customer {0}")]
    InvalidRecipient(String),
}

/// transport for one kind of reminder (email, sms, chat)
#[async_trait]
pub trait ReminderChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, invoice: &Invoice) -> std::result::Result<(), DeliveryError>;
}
