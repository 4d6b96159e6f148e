use chrono::NaiveDate;

use crate::config::ReminderPolicy;
use crate::invoice::Invoice;
use crate::reminders::log::NotificationRecord;

/// whether a new reminder for `invoice` is due today under `policy`
///
/// An invoice never reminded always qualifies. With `Once`, only a
/// successful send closes the door, so a failed first attempt is retried.
/// `Daily` and `Weekly` measure calendar days since the latest attempt.
pub fn should_notify(
    invoice: &Invoice,
    history: &[NotificationRecord],
    policy: &ReminderPolicy,
    today: NaiveDate,
) -> bool {
    let mut attempts = history.iter().filter(|r| r.invoice_id == invoice.id).peekable();
    if attempts.peek().is_none() {
        return true;
    }

    match policy.frequency.min_spacing_days() {
        None => !attempts.any(|r| r.is_sent()),
        Some(spacing) => match attempts.max_by_key(|r| r.sent_at) {
            Some(last) => (today - last.sent_at.date_naive()).num_days() >= spacing,
            None => true,
        },
    }
}

/// calendar days since the latest attempt for `invoice`, if any
pub fn days_since_last_attempt(
    invoice: &Invoice,
    history: &[NotificationRecord],
    today: NaiveDate,
) -> Option<i64> {
    history
        .iter()
        .filter(|r| r.invoice_id == invoice.id)
        .map(|r| r.sent_at)
        .max()
        .map(|last| (today - last.date_naive()).num_days())
}

impl ReminderPolicy {
    /// shorthand used by callers holding a policy
    pub fn allows(
        &self,
        invoice: &Invoice,
        history: &[NotificationRecord],
        today: NaiveDate,
    ) -> bool {
        should_notify(invoice, history, self, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::invoice::{InvoiceDraft, LineItem};
    use crate::types::{ChannelKind, Currency};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 20, 9, 0, 0).unwrap()
    }

    fn invoice() -> Invoice {
        let draft = InvoiceDraft::new(
            "c",
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            Currency::new("USD").unwrap(),
        )
        .line(LineItem::new("x", dec!(1), Money::from_major(100)));
        Invoice::issue(Uuid::new_v4(), "INV-1".into(), draft, now()).unwrap()
    }

    fn sent_days_ago(invoice: &Invoice, days: i64) -> NotificationRecord {
        NotificationRecord::sent(invoice.id, ChannelKind::Email, now() - Duration::days(days))
    }

    #[test]
    fn test_first_reminder_always_fires() {
        let inv = invoice();
        let today = now().date_naive();
        for policy in [ReminderPolicy::once(), ReminderPolicy::daily(), ReminderPolicy::weekly()] {
            assert!(should_notify(&inv, &[], &policy, today));
        }

        // history for other invoices is ignored
        let other = invoice();
        let history = vec![sent_days_ago(&other, 0)];
        assert!(should_notify(&inv, &history, &ReminderPolicy::once(), today));
    }

    #[test]
    fn test_once_is_idempotent() {
        let inv = invoice();
        let today = now().date_naive();
        let history = vec![sent_days_ago(&inv, 0)];
        let policy = ReminderPolicy::once();

        assert!(!should_notify(&inv, &history, &policy, today));
        assert!(!should_notify(&inv, &history, &policy, today));
        assert!(!should_notify(&inv, &history, &policy, today + Duration::days(365)));
    }

    #[test]
    fn test_once_retries_after_failed_attempt() {
        let inv = invoice();
        let history = vec![NotificationRecord::failed(inv.id, ChannelKind::Sms, now(), "timeout")];
        assert!(should_notify(&inv, &history, &ReminderPolicy::once(), now().date_naive()));
    }

    #[test]
    fn test_daily_spacing() {
        let inv = invoice();
        let today = now().date_naive();
        let policy = ReminderPolicy::daily();

        assert!(!should_notify(&inv, &[sent_days_ago(&inv, 0)], &policy, today));
        assert!(should_notify(&inv, &[sent_days_ago(&inv, 1)], &policy, today));
    }

    #[test]
    fn test_daily_uses_calendar_days_not_hours() {
        let inv = invoice();
        let policy = ReminderPolicy::daily();
        // late last night, checked early this morning
        let late = Utc.with_ymd_and_hms(2024, 7, 19, 23, 50, 0).unwrap();
        let history = vec![NotificationRecord::sent(inv.id, ChannelKind::Email, late)];
        assert!(should_notify(&inv, &history, &policy, now().date_naive()));
    }

    #[test]
    fn test_weekly_spacing() {
        let inv = invoice();
        let today = now().date_naive();
        let policy = ReminderPolicy::weekly();

        assert!(!should_notify(&inv, &[sent_days_ago(&inv, 3)], &policy, today));
        assert!(should_notify(&inv, &[sent_days_ago(&inv, 8)], &policy, today));
        assert!(should_notify(&inv, &[sent_days_ago(&inv, 7)], &policy, today));

        // the latest attempt counts, not the first
        let history = vec![sent_days_ago(&inv, 20), sent_days_ago(&inv, 2)];
        assert!(!policy.allows(&inv, &history, today));
        assert_eq!(days_since_last_attempt(&inv, &history, today), Some(2));
    }
}
