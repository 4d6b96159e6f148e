pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod invoice;
pub mod ledger;
pub mod reminders;
pub mod serialization;
pub mod status;
pub mod types;

// re-export key types
pub use config::{BillingConfig, LedgerConfig, PolicyHandle, ReminderPolicy};
pub use decimal::Money;
pub use errors::{BillingError, ErrorKind, Result};
pub use events::{BillingEvent, EventStore};
pub use invoice::{Invoice, InvoiceDraft, LineItem, Payment, Transition};
pub use ledger::{
    InMemoryInvoiceRepository, InvoiceLedger, InvoiceRepository, PaymentReceipt, PaymentRemoval,
    PaymentRequest, SaveOutcome,
};
pub use reminders::{
    select_overdue_invoices, should_notify, AgingReport, BatchOutcome, DeliveryError,
    InMemoryNotificationLog, NotificationLog, NotificationRecord, OverdueInvoice,
    ReminderChannel, ReminderDispatcher,
};
pub use serialization::InvoiceView;
pub use status::derive_status;
pub use types::{
    ChannelKind, Currency, DeliveryOutcome, InvoiceId, InvoiceStatus, NotificationId, PaymentId,
    PaymentMethod, ReminderFrequency,
};

// re-export external dependencies that users will need
pub use async_trait::async_trait;
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
