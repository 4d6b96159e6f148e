use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{PolicyHandle, ReminderPolicy};
use crate::errors::{BillingError, Result};
use crate::events::{BillingEvent, EventStore};
use crate::ledger::{InvoiceLedger, InvoiceRepository};
use crate::reminders::log::{InMemoryNotificationLog, NotificationLog, NotificationRecord};
use crate::reminders::selection::{select_overdue_invoices, OverdueInvoice};
use crate::reminders::throttle::should_notify;
use crate::reminders::ReminderChannel;
use crate::types::ChannelKind;

/// tally of one reminder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub sent: usize,
    pub failed: usize,
    /// candidates the throttle held back
    pub skipped: usize,
}

impl BatchOutcome {
    pub fn attempts(&self) -> usize {
        self.sent + self.failed
    }
}

/// sends reminders over registered channels and keeps the notification history
pub struct ReminderDispatcher<L: NotificationLog = InMemoryNotificationLog> {
    channels: HashMap<ChannelKind, Arc<dyn ReminderChannel>>,
    log: L,
    policy: PolicyHandle,
    events: Mutex<EventStore>,
}

impl ReminderDispatcher<InMemoryNotificationLog> {
    pub fn new(policy: PolicyHandle) -> Self {
        Self::with_log(policy, InMemoryNotificationLog::new())
    }
}

impl<L: NotificationLog> ReminderDispatcher<L> {
    pub fn with_log(policy: PolicyHandle, log: L) -> Self {
        Self {
            channels: HashMap::new(),
            log,
            policy,
            events: Mutex::new(EventStore::new()),
        }
    }

    /// register a transport, replacing any previous one of the same kind
    pub fn register_channel(
        &mut self,
        channel: Arc<dyn ReminderChannel>,
    ) -> Option<Arc<dyn ReminderChannel>> {
        self.channels.insert(channel.kind(), channel)
    }

    pub fn with_channel(mut self, channel: impl ReminderChannel + 'static) -> Self {
        self.register_channel(Arc::new(channel));
        self
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    pub fn take_events(&self) -> Vec<BillingEvent> {
        self.event_store().take_events()
    }

    /// refresh statuses, pick overdue invoices and remind them
    ///
    /// The policy is read once up front; updates made while the batch runs
    /// apply to the next run.
    pub async fn check_overdue<R: InvoiceRepository>(
        &self,
        ledger: &InvoiceLedger<R>,
        time_provider: &SafeTimeProvider,
    ) -> BatchOutcome {
        let policy = self.policy.snapshot();
        let today = time_provider.now().date_naive();

        let changed = ledger.refresh_statuses(time_provider);
        let candidates = select_overdue_invoices(
            &ledger.snapshot(time_provider),
            policy.min_days_overdue,
            today,
        );
        debug!(
            status_changes = changed.len(),
            candidates = candidates.len(),
            "overdue scan complete"
        );

        self.send_batch(&candidates, &policy, time_provider).await
    }

    /// one attempt per eligible candidate and enabled channel; failures never stop the batch
    #[tracing::instrument(
        skip_all,
        fields(candidates = candidates.len(), frequency = ?policy.frequency)
    )]
    pub async fn send_batch(
        &self,
        candidates: &[OverdueInvoice],
        policy: &ReminderPolicy,
        time_provider: &SafeTimeProvider,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let today = time_provider.now().date_naive();

        for candidate in candidates {
            let history = self.log.history(candidate.id());
            if !should_notify(&candidate.invoice, &history, policy, today) {
                debug!(invoice_id = %candidate.id(), "reminder throttled");
                outcome.skipped += 1;
                continue;
            }

            for &channel in &policy.channels {
                let result = self.attempt(candidate, channel, policy).await;
                let now = time_provider.now();
                match result {
                    Ok(()) => {
                        info!(
                            invoice_id = %candidate.id(),
                            number = %candidate.invoice.number,
                            %channel,
                            days_overdue = candidate.days_overdue,
                            "reminder sent"
                        );
                        self.record(NotificationRecord::sent(candidate.id(), channel, now));
                        self.emit(BillingEvent::ReminderSent {
                            invoice_id: candidate.id(),
                            channel,
                            days_overdue: candidate.days_overdue,
                            timestamp: now,
                        });
                        outcome.sent += 1;
                    }
                    Err(err) => {
                        warn!(error = %err, "reminder failed");
                        let reason = match err {
                            BillingError::Delivery { message, .. } => message,
                            other => other.to_string(),
                        };
                        self.record(NotificationRecord::failed(
                            candidate.id(),
                            channel,
                            now,
                            reason.clone(),
                        ));
                        self.emit(BillingEvent::ReminderFailed {
                            invoice_id: candidate.id(),
                            channel,
                            reason,
                            timestamp: now,
                        });
                        outcome.failed += 1;
                    }
                }
            }
        }

        info!(
            sent = outcome.sent,
            failed = outcome.failed,
            skipped = outcome.skipped,
            "reminder batch finished"
        );
        outcome
    }

    async fn attempt(
        &self,
        candidate: &OverdueInvoice,
        channel: ChannelKind,
        policy: &ReminderPolicy,
    ) -> Result<()> {
        let delivery = |message: String| BillingError::Delivery {
            invoice_id: candidate.id(),
            channel,
            message,
        };

        let transport = self
            .channels
            .get(&channel)
            .ok_or_else(|| delivery(format!("no transport registered for {channel}")))?;

        let send = transport.send(&candidate.invoice);
        match tokio::time::timeout(policy.send_timeout(), send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(delivery(err.to_string())),
            Err(_) => Err(delivery(format!(
                "timed out after {}ms",
                policy.send_timeout_ms
            ))),
        }
    }

    fn record(&self, record: NotificationRecord) {
        let invoice_id = record.invoice_id;
        if let Err(err) = self.log.append(record) {
            warn!(%invoice_id, error = %err, "notification record not stored");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::decimal::Money;
    use crate::invoice::{Invoice, InvoiceDraft, LineItem};
    use crate::ledger::PaymentRequest;
    use crate::reminders::DeliveryError;
    use crate::types::{Currency, DeliveryOutcome, InvoiceId, PaymentMethod};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
    }

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(start()))
    }

    fn draft(days_late: i64, total: i64) -> InvoiceDraft {
        let due = start().date_naive() - Duration::days(days_late);
        InvoiceDraft::new("cust-7", due - Duration::days(30), due, Currency::new("USD").unwrap())
            .line(LineItem::new("hosting", dec!(1), Money::from_major(total)))
    }

    /// test transport that fails or stalls for chosen invoices
    #[derive(Default)]
    struct ScriptedChannel {
        reject: Vec<InvoiceId>,
        stall: Vec<InvoiceId>,
        calls: Mutex<Vec<InvoiceId>>,
    }

    impl ScriptedChannel {
        fn email() -> Self {
            Self::default()
        }

        fn calls(&self) -> Vec<InvoiceId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReminderChannel for ScriptedChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Email
        }

        async fn send(&self, invoice: &Invoice) -> std::result::Result<(), DeliveryError> {
            self.calls.lock().unwrap().push(invoice.id);
            if self.stall.contains(&invoice.id) {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
            if self.reject.contains(&invoice.id) {
                return Err(DeliveryError::Rejected("mailbox full".into()));
            }
            Ok(())
        }
    }

    /// transport that rewrites the shared policy on its first send
    struct PolicyChangingChannel {
        handle: PolicyHandle,
    }

    #[async_trait]
    impl ReminderChannel for PolicyChangingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Email
        }

        async fn send(&self, _invoice: &Invoice) -> std::result::Result<(), DeliveryError> {
            let changed = ReminderPolicy::daily()
                .with_channels(vec![ChannelKind::Sms])
                .with_min_days_overdue(100);
            self.handle
                .update(changed)
                .map_err(|err| DeliveryError::Unavailable(err.to_string()))
        }
    }

    fn overdue_candidates(
        ledger: &InvoiceLedger,
        time: &SafeTimeProvider,
        count: i64,
    ) -> Vec<OverdueInvoice> {
        for n in 1..=count {
            ledger.issue_invoice(draft(n * 3, 100 * n), time).unwrap();
        }
        select_overdue_invoices(&ledger.snapshot(time), 1, time.now().date_naive())
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let time = test_time();
        let ledger = InvoiceLedger::new(LedgerConfig::default());
        let candidates = overdue_candidates(&ledger, &time, 5);
        assert_eq!(candidates.len(), 5);

        let failing = candidates[2].id();
        let channel = Arc::new(ScriptedChannel {
            reject: vec![failing],
            ..ScriptedChannel::email()
        });
        let mut dispatcher = ReminderDispatcher::new(PolicyHandle::default());
        dispatcher.register_channel(channel.clone());

        let policy = ReminderPolicy::weekly();
        let outcome = dispatcher.send_batch(&candidates, &policy, &time).await;

        assert_eq!(
            outcome,
            BatchOutcome {
                sent: 4,
                failed: 1,
                skipped: 0
            }
        );
        assert_eq!(outcome.attempts(), 5);
        assert_eq!(dispatcher.log().len(), 5);
        assert_eq!(channel.calls().len(), 5);

        let record = dispatcher.log().last_for(failing).unwrap();
        assert_eq!(record.outcome, DeliveryOutcome::Failed);
        assert_eq!(record.failure_reason.as_deref(), Some("rejected by provider: mailbox full"));

        let events = dispatcher.take_events();
        let failures = events
            .iter()
            .filter(|e| matches!(e, BillingEvent::ReminderFailed { .. }))
            .count();
        assert_eq!(events.len(), 5);
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_rerun_same_day_is_throttled() {
        let time = test_time();
        let ledger = InvoiceLedger::new(LedgerConfig::default());
        let candidates = overdue_candidates(&ledger, &time, 3);
        let dispatcher =
            ReminderDispatcher::new(PolicyHandle::default()).with_channel(ScriptedChannel::email());

        let policy = ReminderPolicy::weekly();
        let first = dispatcher.send_batch(&candidates, &policy, &time).await;
        assert_eq!(first.sent, 3);

        let second = dispatcher.send_batch(&candidates, &policy, &time).await;
        assert_eq!(second, BatchOutcome { sent: 0, failed: 0, skipped: 3 });
        assert_eq!(dispatcher.log().len(), 3);

        time.test_control().unwrap().advance(Duration::days(7));
        let third = dispatcher.send_batch(&candidates, &policy, &time).await;
        assert_eq!(third.sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_times_out() {
        let time = test_time();
        let ledger = InvoiceLedger::new(LedgerConfig::default());
        let candidates = overdue_candidates(&ledger, &time, 2);

        let stalled = candidates[0].id();
        let dispatcher =
            ReminderDispatcher::new(PolicyHandle::default()).with_channel(ScriptedChannel {
                stall: vec![stalled],
                ..ScriptedChannel::email()
            });

        let policy =
            ReminderPolicy::weekly().with_send_timeout(std::time::Duration::from_millis(250));
        let outcome = dispatcher.send_batch(&candidates, &policy, &time).await;

        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.failed, 1);
        let record = dispatcher.log().last_for(stalled).unwrap();
        assert_eq!(record.failure_reason.as_deref(), Some("timed out after 250ms"));
    }

    #[tokio::test]
    async fn test_missing_transport_records_failure() {
        let time = test_time();
        let ledger = InvoiceLedger::new(LedgerConfig::default());
        let candidates = overdue_candidates(&ledger, &time, 1);
        let dispatcher =
            ReminderDispatcher::new(PolicyHandle::default()).with_channel(ScriptedChannel::email());

        // daily preset enables email and sms
        let outcome = dispatcher
            .send_batch(&candidates, &ReminderPolicy::daily(), &time)
            .await;
        assert_eq!(outcome, BatchOutcome { sent: 1, failed: 1, skipped: 0 });

        let history = dispatcher.log().history(candidates[0].id());
        let sms = history.iter().find(|r| r.channel == ChannelKind::Sms).unwrap();
        assert_eq!(sms.failure_reason.as_deref(), Some("no transport registered for sms"));
    }

    #[tokio::test]
    async fn test_check_overdue_end_to_end() {
        let time = test_time();
        let ledger = InvoiceLedger::new(LedgerConfig::default());

        let late = ledger.issue_invoice(draft(10, 1000), &time).unwrap();
        let settled = ledger.issue_invoice(draft(20, 300), &time).unwrap();
        ledger.issue_invoice(draft(-5, 800), &time).unwrap();
        ledger
            .register_payment(
                settled.id,
                PaymentRequest::new(
                    Money::from_major(300),
                    time.now().date_naive(),
                    PaymentMethod::Card,
                ),
                &time,
            )
            .unwrap();

        let channel = Arc::new(ScriptedChannel::email());
        let mut dispatcher = ReminderDispatcher::new(PolicyHandle::new(ReminderPolicy::once()));
        dispatcher.register_channel(channel.clone());

        let outcome = dispatcher.check_overdue(&ledger, &time).await;
        assert_eq!(outcome, BatchOutcome { sent: 1, failed: 0, skipped: 0 });
        assert_eq!(channel.calls(), vec![late.id]);

        time.test_control().unwrap().advance(Duration::days(30));
        let outcome = dispatcher.check_overdue(&ledger, &time).await;
        // the first invoice is locked out under `once`; the other one fell due meanwhile
        assert_eq!(outcome, BatchOutcome { sent: 1, failed: 0, skipped: 1 });
    }

    #[tokio::test]
    async fn test_policy_read_once_per_batch() {
        let time = test_time();
        let ledger = InvoiceLedger::new(LedgerConfig::default());
        overdue_candidates(&ledger, &time, 3);

        let handle = PolicyHandle::new(ReminderPolicy::weekly());
        let dispatcher =
            ReminderDispatcher::new(handle.clone()).with_channel(PolicyChangingChannel {
                handle: handle.clone(),
            });

        let outcome = dispatcher.check_overdue(&ledger, &time).await;
        assert_eq!(outcome, BatchOutcome { sent: 3, failed: 0, skipped: 0 });

        let current = handle.snapshot();
        assert_eq!(current.channels, vec![ChannelKind::Sms]);
        assert_eq!(current.min_days_overdue, 100);
    }
}
