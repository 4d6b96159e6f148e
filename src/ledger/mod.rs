pub mod balance;
pub mod repository;

use chrono::{DateTime, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{BillingEvent, EventStore};
use crate::invoice::{Invoice, InvoiceDraft, Payment, Transition};
use crate::serialization::InvoiceView;
use crate::status::{ensure_cancellable, ensure_payable};
use crate::types::{InvoiceId, InvoiceStatus, PaymentId, PaymentMethod};

pub use balance::{admit_payment, compute_balance, Admission};
pub use repository::{InMemoryInvoiceRepository, InvoiceRepository, SaveOutcome};

/// payment request
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount: Money,
    pub date: NaiveDate,
    pub method: PaymentMethod,
    pub external_ref: Option<String>,
    pub notes: Option<String>,
    pub recurring: bool,
}

impl PaymentRequest {
    pub fn new(amount: Money, date: NaiveDate, method: PaymentMethod) -> Self {
        Self {
            amount,
            date,
            method,
            external_ref: None,
            notes: None,
            recurring: false,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_ref = Some(reference.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn recurring(mut self) -> Self {
        self.recurring = true;
        self
    }
}

/// what a successful registration did to the invoice
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub applied: Money,
    pub excess: Money,
    pub outstanding: Money,
    pub status: InvoiceStatus,
}

/// what a successful removal did to the invoice
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRemoval {
    pub payment: Payment,
    pub invoice: Invoice,
}

/// invoice ledger: issues invoices and reconciles them with payments
///
/// Every mutation of a single invoice goes through a load, modify,
/// versioned-save loop, so concurrent writers to the same invoice are
/// serialized while different invoices never wait on each other.
pub struct InvoiceLedger<R: InvoiceRepository = InMemoryInvoiceRepository> {
    config: LedgerConfig,
    repository: R,
    sequence: AtomicU64,
    events: Mutex<EventStore>,
}

impl InvoiceLedger<InMemoryInvoiceRepository> {
    /// ledger over a fresh in-memory repository
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_repository(config, InMemoryInvoiceRepository::new())
    }
}

impl<R: InvoiceRepository> InvoiceLedger<R> {
    /// ledger over an existing repository; numbering continues after its contents
    pub fn with_repository(config: LedgerConfig, repository: R) -> Self {
        let sequence = AtomicU64::new(repository.len() as u64);
        Self {
            config,
            repository,
            sequence,
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// validate a draft, number it and store it
    pub fn issue_invoice(
        &self,
        draft: InvoiceDraft,
        time_provider: &SafeTimeProvider,
    ) -> Result<Invoice> {
        draft.validate()?;

        let now = time_provider.now();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let number = self.config.format_number(sequence);
        let invoice = Invoice::issue(Uuid::new_v4(), number, draft, now)?;

        self.repository.insert(invoice.clone())?;

        info!(
            invoice_id = %invoice.id,
            number = %invoice.number,
            total = %invoice.total,
            due_date = %invoice.due_date,
            status = %invoice.status,
            "invoice issued"
        );
        self.emit(BillingEvent::InvoiceIssued {
            invoice_id: invoice.id,
            number: invoice.number.clone(),
            total: invoice.total,
            due_date: invoice.due_date,
            timestamp: now,
        });

        Ok(invoice)
    }

    /// record a settled payment and reconcile the invoice
    pub fn register_payment(
        &self,
        invoice_id: InvoiceId,
        request: PaymentRequest,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let now = time_provider.now();
        let today = now.date_naive();
        let payment_id = Uuid::new_v4();
        let allow_overpayment = self.config.allow_overpayment;

        let (invoice, (payment, admission, transition)) = self.mutate(invoice_id, |invoice| {
            ensure_payable(invoice.status_on(today))?;

            let admission = admit_payment(
                request.amount,
                invoice.outstanding_balance,
                &invoice.currency,
                allow_overpayment,
            )?;

            let payment = Payment {
                id: payment_id,
                invoice_id: invoice.id,
                date: request.date,
                amount: admission.applied,
                method: request.method,
                external_ref: request.external_ref.clone(),
                notes: request.notes.clone(),
                recurring: request.recurring,
                recorded_at: now,
            };
            invoice.push_payment(payment.clone());
            let transition = invoice.reconcile(now);

            Ok((payment, admission, transition))
        })?;

        info!(
            invoice_id = %invoice.id,
            payment_id = %payment.id,
            amount = %payment.amount,
            excess = %admission.excess,
            outstanding = %invoice.outstanding_balance,
            status = %invoice.status,
            "payment registered"
        );
        self.emit(BillingEvent::PaymentRegistered {
            invoice_id: invoice.id,
            payment_id: payment.id,
            amount: payment.amount,
            method: payment.method,
            outstanding: invoice.outstanding_balance,
            timestamp: now,
        });
        self.emit_transition(&invoice, transition, "payment registered", now);

        Ok(PaymentReceipt {
            payment,
            applied: admission.applied,
            excess: admission.excess,
            outstanding: invoice.outstanding_balance,
            status: invoice.status,
        })
    }

    /// delete a payment and reconcile its invoice; the balance simply grows back
    pub fn remove_payment(
        &self,
        payment_id: PaymentId,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentRemoval> {
        let now = time_provider.now();
        let invoice_id = self
            .repository
            .find_by_payment(payment_id)
            .ok_or(BillingError::PaymentNotFound { id: payment_id })?;

        let (invoice, (payment, transition)) = self.mutate(invoice_id, |invoice| {
            let payment = invoice
                .take_payment(payment_id)
                .ok_or(BillingError::PaymentNotFound { id: payment_id })?;
            let transition = invoice.reconcile(now);
            Ok((payment, transition))
        })?;

        info!(
            invoice_id = %invoice.id,
            payment_id = %payment.id,
            amount = %payment.amount,
            outstanding = %invoice.outstanding_balance,
            status = %invoice.status,
            "payment removed"
        );
        self.emit(BillingEvent::PaymentRemoved {
            invoice_id: invoice.id,
            payment_id: payment.id,
            amount: payment.amount,
            outstanding: invoice.outstanding_balance,
            timestamp: now,
        });
        self.emit_transition(&invoice, transition, "payment removed", now);

        Ok(PaymentRemoval { payment, invoice })
    }

    /// cancel an unpaid or partially paid invoice; payments are kept
    pub fn cancel_invoice(
        &self,
        invoice_id: InvoiceId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Invoice> {
        let now = time_provider.now();

        let (invoice, (drift, transition)) = self.mutate(invoice_id, |invoice| {
            let drift = invoice.rederive(now);
            ensure_cancellable(invoice.status)?;
            Ok((drift, invoice.mark_cancelled(now)))
        })?;
        self.emit_transition(&invoice, drift, "due date passed", now);

        info!(
            invoice_id = %invoice.id,
            previous_status = %transition.from,
            outstanding = %invoice.outstanding_balance,
            "invoice cancelled"
        );
        self.emit(BillingEvent::InvoiceCancelled {
            invoice_id: invoice.id,
            previous_status: transition.from,
            outstanding: invoice.outstanding_balance,
            timestamp: now,
        });

        Ok(invoice)
    }

    /// re-derive and persist status for every invoice whose status drifted
    /// with the calendar; per-invoice failures are logged and skipped
    pub fn refresh_statuses(
        &self,
        time_provider: &SafeTimeProvider,
    ) -> Vec<(InvoiceId, Transition)> {
        let now = time_provider.now();
        let today = now.date_naive();
        let mut applied = Vec::new();

        for invoice in self.repository.list() {
            if invoice.status_on(today) == invoice.status {
                continue;
            }
            match self.mutate(invoice.id, |invoice| Ok(invoice.rederive(now))) {
                Ok((stored, Some(transition))) => {
                    self.emit_transition(&stored, Some(transition), "due date passed", now);
                    applied.push((stored.id, transition));
                }
                Ok((_, None)) => {}
                Err(err) => {
                    warn!(invoice_id = %invoice.id, error = %err, "status refresh skipped");
                }
            }
        }

        debug!(changed = applied.len(), "status refresh finished");
        applied
    }

    pub fn get(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        self.repository.load(invoice_id)
    }

    pub fn payments(&self, invoice_id: InvoiceId) -> Result<Vec<Payment>> {
        Ok(self.repository.load(invoice_id)?.payments)
    }

    /// stored invoices, ordered by number
    pub fn list(&self) -> Vec<Invoice> {
        self.repository.list()
    }

    /// invoices with status projected onto today, nothing persisted
    pub fn snapshot(&self, time_provider: &SafeTimeProvider) -> Vec<Invoice> {
        let today = time_provider.now().date_naive();
        self.repository
            .list()
            .into_iter()
            .map(|mut invoice| {
                invoice.status = invoice.status_on(today);
                invoice
            })
            .collect()
    }

    /// read model for rendering and export
    pub fn invoice_view(
        &self,
        invoice_id: InvoiceId,
        time_provider: &SafeTimeProvider,
    ) -> Result<InvoiceView> {
        let invoice = self.repository.load(invoice_id)?;
        Ok(InvoiceView::from_invoice(&invoice, time_provider.now().date_naive()))
    }

    pub fn take_events(&self) -> Vec<BillingEvent> {
        self.event_store().take_events()
    }

    /// optimistic load-modify-save loop, retried on version conflicts
    fn mutate<T, F>(&self, invoice_id: InvoiceId, mut apply: F) -> Result<(Invoice, T)>
    where
        F: FnMut(&mut Invoice) -> Result<T>,
    {
        let attempts = self.config.max_conflict_retries.max(1);
        for attempt in 1..=attempts {
            let mut invoice = self.repository.load(invoice_id)?;
            let outcome = apply(&mut invoice)?;
            match self.repository.save(&mut invoice)? {
                SaveOutcome::Committed => return Ok((invoice, outcome)),
                SaveOutcome::Stale { current_version } => {
                    debug!(
                        invoice_id = %invoice_id,
                        attempt,
                        loaded_version = invoice.version,
                        current_version,
                        "version conflict, retrying"
                    );
                }
            }
        }

        warn!(invoice_id = %invoice_id, attempts, "giving up on contended invoice");
        Err(BillingError::ConcurrentModification {
            invoice_id,
            attempts,
        })
    }

    fn emit_transition(
        &self,
        invoice: &Invoice,
        transition: Option<Transition>,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        if let Some(transition) = transition {
            debug!(
                invoice_id = %invoice.id,
                from = %transition.from,
                to = %transition.to,
                reason,
                "status changed"
            );
            self.emit(BillingEvent::StatusChanged {
                invoice_id: invoice.id,
                old_status: transition.from,
                new_status: transition.to,
                reason: reason.to_string(),
                timestamp: now,
            });
        }
    }

    fn emit(&self, event: BillingEvent) {
        self.event_store().emit(event);
    }

    fn event_store(&self) -> MutexGuard<'_, EventStore> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
