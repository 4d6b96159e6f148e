/// payment lifecycle - issue, pay in parts, remove a payment, cancel
use chrono::{Duration, TimeZone, Utc};
use invoice_reconciliation_rs::{
    Currency, Decimal, InvoiceDraft, InvoiceLedger, LedgerConfig, LineItem, Money, PaymentMethod,
    PaymentRequest, SafeTimeProvider, TimeSource,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== payment lifecycle example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let today = time.now().date_naive();

    let ledger = InvoiceLedger::new(LedgerConfig::default());

    // consulting invoice, net 14
    let due = today + Duration::days(14);
    let draft = InvoiceDraft::new("acme-corp", today, due, Currency::new("USD")?)
        .line(LineItem::new("consulting hours", Decimal::from(8), Money::from_major(120)))
        .line(
            LineItem::new("travel", Decimal::ONE, Money::from_major(80))
                .with_discount(Money::from_major(20))
                .with_tax(Money::from_str_exact("4.80")?),
        )
        .notes("thank you for your business");
    let invoice = ledger.issue_invoice(draft, &time)?;
    println!("issued {} for ${} ({})", invoice.number, invoice.total, invoice.status);

    // first instalment by card
    let receipt = ledger.register_payment(
        invoice.id,
        PaymentRequest::new(Money::from_major(400), today, PaymentMethod::Card),
        &time,
    )?;
    println!(
        "paid ${} -> outstanding ${} ({})",
        receipt.applied, receipt.outstanding, receipt.status
    );

    // let the due date pass
    controller.advance(Duration::days(20));
    let changed = ledger.refresh_statuses(&time);
    for (id, transition) in &changed {
        println!("\n{} moved {} -> {}", id, transition.from, transition.to);
    }

    // an overpayment is refused and nothing changes
    let too_much = PaymentRequest::new(
        Money::from_major(10_000),
        time.now().date_naive(),
        PaymentMethod::BankTransfer,
    );
    match ledger.register_payment(invoice.id, too_much, &time) {
        Ok(_) => println!("unexpected: overpayment accepted"),
        Err(err) => println!("rejected: {}", err),
    }

    // settle the rest through a payment link
    let balance = ledger.get(invoice.id)?.outstanding_balance;
    let receipt = ledger.register_payment(
        invoice.id,
        PaymentRequest::new(balance, time.now().date_naive(), PaymentMethod::OnlineTransfer)
            .with_reference("checkout-7f3a"),
        &time,
    )?;
    println!("\nsettled ${} -> {}", receipt.applied, receipt.status);

    // the transfer bounced: remove it again
    let removal = ledger.remove_payment(receipt.payment.id, &time)?;
    println!(
        "removed payment, outstanding ${} ({})",
        removal.invoice.outstanding_balance, removal.invoice.status
    );

    // write the remainder off
    let cancelled = ledger.cancel_invoice(invoice.id, &time)?;
    println!("cancelled {} ({})", cancelled.number, cancelled.status);

    println!("\nevents:");
    for event in ledger.take_events() {
        println!("  {:?}", event);
    }

    println!("\n{}", ledger.invoice_view(invoice.id, &time)?.to_json_pretty()?);

    Ok(())
}
