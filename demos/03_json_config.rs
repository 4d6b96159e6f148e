/// json config - load engine settings and export invoices as json
use chrono::{Duration, TimeZone, Utc};
use invoice_reconciliation_rs::{
    BillingConfig, Currency, Decimal, InvoiceDraft, InvoiceLedger, LineItem, Money, PaymentMethod,
    PaymentRequest, SafeTimeProvider, TimeSource,
};

const CONFIG: &str = r#"{
    "ledger": {
        "allow_overpayment": true,
        "number_prefix": "ACME-",
        "number_width": 4
    },
    "reminders": {
        "min_days_overdue": 3,
        "channels": ["email", "chat"],
        "frequency": "daily"
    }
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== json config example ===\n");

    let config = BillingConfig::from_json(CONFIG)?;
    println!("loaded config:\n{}\n", config.to_json()?);

    // a bad config is refused up front
    match BillingConfig::from_json(r#"{ "reminders": { "channels": [] } }"#) {
        Ok(_) => println!("unexpected: empty channel list accepted"),
        Err(err) => println!("rejected config: {}\n", err),
    }

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 11, 4, 12, 0, 0).unwrap()
    ));
    let today = time.now().date_naive();
    let ledger = InvoiceLedger::new(config.ledger.clone());

    let due = today + Duration::days(30);
    let draft = InvoiceDraft::new("wayne-enterprises", today, due, Currency::new("EUR")?)
        .line(LineItem::new("design review", Decimal::from(3), Money::from_major(250)));
    let invoice = ledger.issue_invoice(draft, &time)?;

    // overpayments are allowed here: only the balance is recorded
    let receipt = ledger.register_payment(
        invoice.id,
        PaymentRequest::new(Money::from_major(800), today, PaymentMethod::BankTransfer)
            .with_reference("SEPA-2024-1104"),
        &time,
    )?;
    println!(
        "{}: applied {}, excess {}, status {}",
        invoice.number, receipt.applied, receipt.excess, receipt.status
    );

    println!("\n{}", ledger.invoice_view(invoice.id, &time)?.to_json_pretty()?);

    Ok(())
}
