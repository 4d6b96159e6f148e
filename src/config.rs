use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::errors::{BillingError, Result};
use crate::types::{ChannelKind, ReminderFrequency};

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BillingConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub reminders: ReminderPolicy,
}

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// accept payments above the outstanding balance, recording only the balance
    pub allow_overpayment: bool,
    /// attempts before giving up on a contended invoice
    pub max_conflict_retries: u32,
    /// prefix for human-readable invoice numbers
    pub number_prefix: String,
    /// zero-padded width of the sequence part
    pub number_width: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            allow_overpayment: false,
            max_conflict_retries: 16,
            number_prefix: "INV-".to_string(),
            number_width: 6,
        }
    }
}

impl LedgerConfig {
    /// format a sequence value as an invoice number
    pub fn format_number(&self, sequence: u64) -> String {
        format!(
            "{}{:0width$}",
            self.number_prefix,
            sequence,
            width = self.number_width
        )
    }
}

/// reminder policy, read once at the start of every batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderPolicy {
    /// days past due before the first reminder may go out
    pub min_days_overdue: u32,
    /// channels a reminder is attempted on
    pub channels: Vec<ChannelKind>,
    pub frequency: ReminderFrequency,
    /// upper bound for a single send attempt
    pub send_timeout_ms: u64,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self::weekly()
    }
}

impl ReminderPolicy {
    /// one reminder per invoice, ever
    pub fn once() -> Self {
        Self {
            min_days_overdue: 1,
            channels: vec![ChannelKind::Email],
            frequency: ReminderFrequency::Once,
            send_timeout_ms: 5_000,
        }
    }

    /// daily nagging, email and sms
    pub fn daily() -> Self {
        Self {
            min_days_overdue: 1,
            channels: vec![ChannelKind::Email, ChannelKind::Sms],
            frequency: ReminderFrequency::Daily,
            send_timeout_ms: 5_000,
        }
    }

    /// weekly reminders by email
    pub fn weekly() -> Self {
        Self {
            min_days_overdue: 1,
            channels: vec![ChannelKind::Email],
            frequency: ReminderFrequency::Weekly,
            send_timeout_ms: 5_000,
        }
    }

    pub fn with_channels(mut self, channels: Vec<ChannelKind>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_min_days_overdue(mut self, days: u32) -> Self {
        self.min_days_overdue = days;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(BillingError::InvalidConfiguration {
                message: "at least one reminder channel must be enabled".to_string(),
            });
        }
        if self.send_timeout_ms == 0 {
            return Err(BillingError::InvalidConfiguration {
                message: "send timeout must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl BillingConfig {
    /// load from a json document, missing sections fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: BillingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.max_conflict_retries == 0 {
            return Err(BillingError::InvalidConfiguration {
                message: "max_conflict_retries must be at least 1".to_string(),
            });
        }
        self.reminders.validate()
    }
}

/// shared reminder policy that operators may change while batches run
#[derive(Debug, Clone, Default)]
pub struct PolicyHandle {
    inner: Arc<RwLock<ReminderPolicy>>,
}

impl PolicyHandle {
    pub fn new(policy: ReminderPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(policy)),
        }
    }

    /// copy of the current policy; later updates do not affect it
    pub fn snapshot(&self) -> ReminderPolicy {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// replace the policy after validating it
    pub fn update(&self, policy: ReminderPolicy) -> Result<()> {
        policy.validate()?;
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::info!(
            frequency = ?policy.frequency,
            min_days_overdue = policy.min_days_overdue,
            channels = ?policy.channels,
            "reminder policy updated"
        );
        *guard = policy;
        Ok(())
    }
}
