//! Invoice storage seam.
//!
//! The ledger talks to storage only through [`InvoiceRepository`]. Writes use
//! optimistic concurrency: every stored invoice carries a version, and a save
//! only lands when the version it was loaded at is still current. A SQL
//! backend maps this to `UPDATE .. WHERE id = $1 AND version = $2`.

use dashmap::DashMap;

use crate::errors::{BillingError, Result};
use crate::invoice::Invoice;
use crate::types::{InvoiceId, PaymentId};

/// result of a versioned save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// stored, the invoice's version was bumped
    Committed,
    /// someone else saved first; reload and try again
    Stale { current_version: u64 },
}

/// storage for invoices and their payments
pub trait InvoiceRepository: Send + Sync {
    /// store a freshly issued invoice
    fn insert(&self, invoice: Invoice) -> Result<()>;

    /// load the current version of an invoice
    fn load(&self, id: InvoiceId) -> Result<Invoice>;

    /// store `invoice` if nobody saved since it was loaded
    ///
    /// On commit `invoice.version` is incremented to match storage.
    fn save(&self, invoice: &mut Invoice) -> Result<SaveOutcome>;

    /// invoice owning a payment, if the payment exists
    fn find_by_payment(&self, payment_id: PaymentId) -> Option<InvoiceId>;

    /// point-in-time copy of every invoice, ordered by number
    fn list(&self) -> Vec<Invoice>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// in-memory repository backed by sharded concurrent maps
///
/// Invoices on different shards never contend; a save holds only the
/// shard entry of the invoice being written.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceRepository {
    invoices: DashMap<InvoiceId, Invoice>,
    payment_index: DashMap<PaymentId, InvoiceId>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvoiceRepository for InMemoryInvoiceRepository {
    fn insert(&self, invoice: Invoice) -> Result<()> {
        if self.invoices.contains_key(&invoice.id) {
            return Err(BillingError::InvalidInvoice {
                message: format!("invoice {} already exists", invoice.id),
            });
        }
        for payment in &invoice.payments {
            self.payment_index.insert(payment.id, invoice.id);
        }
        self.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    fn load(&self, id: InvoiceId) -> Result<Invoice> {
        self.invoices
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(BillingError::InvoiceNotFound { id })
    }

    fn save(&self, invoice: &mut Invoice) -> Result<SaveOutcome> {
        let mut stored = self
            .invoices
            .get_mut(&invoice.id)
            .ok_or(BillingError::InvoiceNotFound { id: invoice.id })?;

        if stored.version != invoice.version {
            return Ok(SaveOutcome::Stale {
                current_version: stored.version,
            });
        }

        // keep the payment index in step while the entry is held
        for old in &stored.payments {
            if invoice.payment(old.id).is_none() {
                self.payment_index.remove(&old.id);
            }
        }
        for new in &invoice.payments {
            if stored.payment(new.id).is_none() {
                self.payment_index.insert(new.id, invoice.id);
            }
        }

        invoice.version += 1;
        *stored = invoice.clone();
        Ok(SaveOutcome::Committed)
    }

    fn find_by_payment(&self, payment_id: PaymentId) -> Option<InvoiceId> {
        self.payment_index.get(&payment_id).map(|entry| *entry.value())
    }

    fn list(&self) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        invoices.sort_by(|a, b| a.number.cmp(&b.number));
        invoices
    }

    fn len(&self) -> usize {
        self.invoices.len()
    }
}
