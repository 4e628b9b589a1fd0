//! Sequence Step - builds the email for one position in the escalation sequence.
//!
//! Every step but the last is a `Checking` step (reminder to the manager);
//! the last one is the `Completion` step (legacy email to the family).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt::Write as _;
use std::sync::Arc;

use super::email::{Email, EmailTemplate, EmailVariables};
use super::errors::NotifierError;
use super::escalation;
use super::month_days::MonthDaySequence;
use super::notification::{ActiveStatus, PendingNotification};

pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Addresses and templates shared by every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub sender: String,
    pub manager: String,
    pub family: String,
    pub check_email: EmailTemplate,
    pub legacy_email: EmailTemplate,
    pub cancellation_email: EmailTemplate,
    /// chrono strftime pattern for the date variables.
    pub date_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Checking,
    Completion,
}

#[derive(Debug, Clone)]
pub struct SequenceStep {
    kind: StepKind,
    month_day: u32,
    emails: Arc<EmailSettings>,
}

impl SequenceStep {
    /// One step per configured day, the last one being the completion step.
    pub fn build_all(sequence: &MonthDaySequence, emails: Arc<EmailSettings>) -> Vec<SequenceStep> {
        let last = sequence.last_index();
        sequence
            .days()
            .iter()
            .enumerate()
            .map(|(index, &month_day)| SequenceStep {
                kind: if index == last {
                    StepKind::Completion
                } else {
                    StepKind::Checking
                },
                month_day,
                emails: Arc::clone(&emails),
            })
            .collect()
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn month_day(&self) -> u32 {
        self.month_day
    }

    pub fn is_notification_due(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        escalation::is_notification_due(started_at, self.month_day, now)
    }

    /// Email announcing this step. The record must already carry the status
    /// the step produces.
    pub fn build_email(&self, pending: &PendingNotification, now: DateTime<Utc>) -> Result<Email, NotifierError> {
        let (expected, recipient, template) = match self.kind {
            StepKind::Checking => (ActiveStatus::Checking, &self.emails.manager, &self.emails.check_email),
            StepKind::Completion => (ActiveStatus::Completed, &self.emails.family, &self.emails.legacy_email),
        };
        if pending.status != expected {
            return Err(NotifierError::Precondition(format!(
                "{:?} step cannot build an email for a {:?} notification",
                self.kind, pending.status
            )));
        }
        Ok(Email::render(
            pending.reply_to.clone(),
            &self.emails.sender,
            recipient,
            template,
            &self.variables(pending, now),
        ))
    }

    /// Cancellation notice to the manager, using this step's variables.
    pub fn build_cancellation_email(
        &self,
        pending: &PendingNotification,
        now: DateTime<Utc>,
    ) -> Result<Email, NotifierError> {
        if pending.status != ActiveStatus::Cancelled {
            return Err(NotifierError::Precondition(format!(
                "cancellation email requires a cancelled notification, got {:?}",
                pending.status
            )));
        }
        Ok(Email::render(
            pending.reply_to.clone(),
            &self.emails.sender,
            &self.emails.manager,
            &self.emails.cancellation_email,
            &self.variables(pending, now),
        ))
    }

    pub fn variables(&self, pending: &PendingNotification, now: DateTime<Utc>) -> EmailVariables {
        let sequence = &pending.sequence_of_month_days;
        // a cancelled cycle is next checked once the following month begins
        let next_check = match pending.status {
            ActiveStatus::Cancelled => escalation::date_in_next_month_of(now, self.month_day),
            _ => escalation::date_in_month_of(now, self.month_day),
        };
        let completion = escalation::date_in_month_of(now, sequence.last_day());

        vec![
            ("notificationsTotal", sequence.len().to_string()),
            ("notificationNumber", (pending.last_sequence_index_sent + 1).to_string()),
            (
                "notificationLabel",
                format!("{}/{}", pending.started_at.month(), pending.started_at.year()),
            ),
            ("notificationNextCheckDate", self.format_date(next_check)),
            ("notificationCompletionDate", self.format_date(completion)),
        ]
    }

    fn format_date(&self, date: NaiveDate) -> String {
        let mut out = String::new();
        if write!(out, "{}", date.format(&self.emails.date_format)).is_err() {
            // unusable pattern: fall back to ISO dates
            return date.format(DEFAULT_DATE_FORMAT).to_string();
        }
        out
    }
}
