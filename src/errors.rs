use thiserror::Error;

use crate::decimal::Money;
use crate::types::{ChannelKind, InvoiceId, InvoiceStatus, PaymentId};

/// broad class of a failure, used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// malformed input, nothing was mutated
    Validation,
    /// rejected by the current state of the invoice, no retry
    Conflict,
    /// referenced invoice or payment does not exist
    NotFound,
    /// reminder could not be delivered
    Delivery,
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("invalid invoice: {message}")]
    InvalidInvoice {
        message: String,
    },

    #[error("invalid line item {index}: {message}")]
    InvalidLineItem {
        index: usize,
        message: String,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("invalid currency code: {code:?}")]
    InvalidCurrency {
        code: String,
    },

    #[error("payment of {requested} exceeds outstanding balance of {outstanding}")]
    ExceedsBalance {
        outstanding: Money,
        requested: Money,
    },

    #[error("cannot {action} an invoice in status {from}")]
    InvalidTransition {
        from: InvoiceStatus,
        action: &'static str,
    },

    #[error("invoice {invoice_id} kept changing underneath us after {attempts} attempts")]
    ConcurrentModification {
        invoice_id: InvoiceId,
        attempts: u32,
    },

    #[error("invoice not found: {id}")]
    InvoiceNotFound {
        id: InvoiceId,
    },

    #[error("payment not found: {id}")]
    PaymentNotFound {
        id: PaymentId,
    },

    #[error("delivery of reminder for invoice {invoice_id} via {channel} failed: {message}")]
    Delivery {
        invoice_id: InvoiceId,
        channel: ChannelKind,
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::InvalidInvoice { .. }
            | BillingError::InvalidLineItem { .. }
            | BillingError::InvalidAmount { .. }
            | BillingError::InvalidCurrency { .. }
            | BillingError::InvalidConfiguration { .. }
            | BillingError::Serialization(_) => ErrorKind::Validation,
            BillingError::ExceedsBalance { .. }
            | BillingError::InvalidTransition { .. }
            | BillingError::ConcurrentModification { .. } => ErrorKind::Conflict,
            BillingError::InvoiceNotFound { .. } | BillingError::PaymentNotFound { .. } => {
                ErrorKind::NotFound
            }
            BillingError::Delivery { .. } => ErrorKind::Delivery,
        }
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
