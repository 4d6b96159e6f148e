/// overdue reminders - scan the ledger, throttle, deliver over channels
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, TimeZone, Utc};
use invoice_reconciliation_rs::{
    async_trait, AgingReport, ChannelKind, Currency, Decimal, DeliveryError, Invoice, InvoiceDraft,
    InvoiceLedger, LedgerConfig, LineItem, Money, NotificationLog, PolicyHandle, ReminderChannel,
    ReminderDispatcher, ReminderPolicy, SafeTimeProvider, TimeSource,
};

/// prints the reminder instead of mailing it
struct ConsoleEmail;

#[async_trait]
impl ReminderChannel for ConsoleEmail {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, invoice: &Invoice) -> Result<(), DeliveryError> {
        println!(
            "  [email] {} to {}: ${} still open",
            invoice.number, invoice.customer_id, invoice.outstanding_balance
        );
        Ok(())
    }
}

/// sms gateway that drops every other message
#[derive(Default)]
struct FlakySms {
    calls: AtomicUsize,
}

#[async_trait]
impl ReminderChannel for FlakySms {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, invoice: &Invoice) -> Result<(), DeliveryError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
            return Err(DeliveryError::Unavailable("gateway returned 503".into()));
        }
        println!("  [sms]   {} to {}", invoice.number, invoice.customer_id);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== overdue reminders example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let today = time.now().date_naive();

    let ledger = InvoiceLedger::new(LedgerConfig::default());
    let customers = [
        ("globex", 1_200, -40),
        ("initech", 300, -12),
        ("umbrella", 5_000, -3),
        ("hooli", 750, 10),
    ];
    for (customer, amount, due_in) in customers {
        let draft = InvoiceDraft::new(
            customer,
            today + Duration::days(due_in - 30),
            today + Duration::days(due_in),
            Currency::new("USD")?,
        )
        .line(LineItem::new("subscription", Decimal::ONE, Money::from_major(amount)));
        let invoice = ledger.issue_invoice(draft, &time)?;
        println!("issued {} to {} ({})", invoice.number, customer, invoice.status);
    }

    let aging = AgingReport::build(&ledger.snapshot(&time), today);
    println!("\naging as of {}:", aging.as_of);
    for bucket in &aging.buckets {
        println!("  {:>8}: {} invoice(s), ${}", bucket.label, bucket.count, bucket.outstanding);
    }

    let policy = PolicyHandle::new(ReminderPolicy::daily());
    let dispatcher = ReminderDispatcher::new(policy.clone())
        .with_channel(ConsoleEmail)
        .with_channel(FlakySms::default());

    for day in 0..3 {
        println!("\nrun on {}:", time.now().format("%Y-%m-%d"));
        let outcome = dispatcher.check_overdue(&ledger, &time).await;
        println!(
            "sent {}, failed {}, skipped {}",
            outcome.sent, outcome.failed, outcome.skipped
        );

        // switch to weekly after the first day; the next run picks it up
        if day == 0 {
            policy.update(ReminderPolicy::weekly())?;
        }
        controller.advance(Duration::days(1));
    }

    println!("\nnotification log holds {} record(s)", dispatcher.log().len());
    for event in dispatcher.take_events() {
        println!("  {:?}", event);
    }

    Ok(())
}
