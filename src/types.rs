use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{BillingError, Result};

/// unique identifier for an invoice
pub type InvoiceId = Uuid;

/// unique identifier for a payment
pub type PaymentId = Uuid;

/// unique identifier for a notification record
pub type NotificationId = Uuid;

/// invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvoiceStatus {
    /// issued, nothing paid, not yet past due
    Pending,
    /// some amount paid, not yet past due
    PartiallyPaid,
    /// outstanding balance is zero
    Paid,
    /// past due date with a balance left
    Overdue,
    /// explicitly cancelled, terminal
    Cancelled,
}

impl InvoiceStatus {
    /// statuses that still expect money from the customer
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "pending"),
            InvoiceStatus::PartiallyPaid => write!(f, "partiallyPaid"),
            InvoiceStatus::Paid => write!(f, "paid"),
            InvoiceStatus::Overdue => write!(f, "overdue"),
            InvoiceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// how a payment was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    /// paypal, stripe and similar processors
    ThirdPartyProcessor,
    /// recorded by the payment-link checkout flow
    OnlineTransfer,
    Other,
}

/// reminder delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    Chat,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Sms => write!(f, "sms"),
            ChannelKind::Chat => write!(f, "chat"),
        }
    }
}

/// result of one reminder attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// how often an overdue invoice may be reminded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderFrequency {
    /// a single successful reminder, never repeated
    Once,
    /// at most one reminder per calendar day
    Daily,
    /// at least seven calendar days between reminders
    Weekly,
}

impl ReminderFrequency {
    /// minimum calendar days between two reminders, none for `Once`
    pub fn min_spacing_days(&self) -> Option<i64> {
        match self {
            ReminderFrequency::Once => None,
            ReminderFrequency::Daily => Some(1),
            ReminderFrequency::Weekly => Some(7),
        }
    }
}

/// ISO 4217 alphabetic currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// parse and validate a three-letter uppercase code
    pub fn new(code: &str) -> Result<Self> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Currency(code.to_string()))
        } else {
            Err(BillingError::InvalidCurrency {
                code: code.to_string(),
            })
        }
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// number of decimal places of the currency's minor unit
    pub fn minor_units(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "UGX" | "XAF" | "XOF" => 0,
            "BHD" | "JOD" | "KWD" | "OMR" | "TND" => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = BillingError;

    fn try_from(code: String) -> Result<Self> {
        Currency::new(&code)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}
