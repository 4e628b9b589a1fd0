//! Notificator - the notification state machine.
//!
//! One `notify()` call performs at most one transition:
//!
//! ```text
//!   (empty) ──> Draft ──start──> Checking ──advance──> Checking
//!                                   │  │
//!                       reply ──────┘  └── last step ──> Completed
//!                         v
//!                     Cancelled ──(new month, step 0 due)──> Checking
//! ```
//!
//! A change of the configured sequence restarts the cycle from any status.
//!
//! # Persistence
//! - each transition builds a `PendingNotification` from the current record
//! - the record is saved only after the email was sent, with the thread
//!   handle the provider returned
//! - a failed send leaves the stored record untouched, so the next run
//!   retries the same transition

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::authenticate;
use crate::domain::escalation::has_new_month_begun;
use crate::domain::{
    ActiveNotification, Email, EmailSettings, MonthDaySequence, Notification, NotifierError,
    PendingNotification, SequenceStep,
};
use crate::ports::{Clock, EmailClient, Storage};

pub struct Notificator {
    sequence: MonthDaySequence,
    steps: Vec<SequenceStep>,
    storage: Arc<dyn Storage>,
    email_client: Arc<dyn EmailClient>,
    clock: Arc<dyn Clock>,
}

impl Notificator {
    /// Wires the ports around the configured sequence.
    ///
    /// Prefer `NotificatorBuilder` which also validates the configuration
    /// and resolves adapters.
    pub fn new(
        sequence: MonthDaySequence,
        emails: Arc<EmailSettings>,
        storage: Arc<dyn Storage>,
        email_client: Arc<dyn EmailClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NotifierError> {
        let steps = SequenceStep::build_all(&sequence, emails);
        if steps.is_empty() {
            return Err(NotifierError::Configuration(
                "at least one sequence step must be configured".to_string(),
            ));
        }
        Ok(Self {
            sequence,
            steps,
            storage,
            email_client,
            clock,
        })
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    /// Runs the transition due now and returns the resulting record.
    pub async fn notify(&self) -> Result<Notification, NotifierError> {
        let now = self.clock.now();
        let notification = self.get_or_create_notification(now).await?;

        if notification.sequence_of_month_days() != &self.sequence {
            return self.start(now).await;
        }

        match &notification {
            Notification::Completed(_) => Ok(notification),
            Notification::Draft(_) => self.start(now).await,
            Notification::Cancelled(active) => self.restart_from_cancelled(active, now).await,
            Notification::Checking(_) => self.check_and_escalate(&notification, now).await,
        }
    }

    /// One-shot OAuth handshake for the configured email client.
    ///
    /// `on_request_url` receives the local callback address and the URL the
    /// user has to open.
    pub async fn authenticate<F>(&self, on_request_url: F) -> Result<(), NotifierError>
    where
        F: FnOnce(SocketAddr, &str) + Send,
    {
        authenticate::run(self.email_client.as_ref(), on_request_url).await
    }

    async fn get_or_create_notification(&self, now: DateTime<Utc>) -> Result<Notification, NotifierError> {
        if let Some(existing) = self.storage.get_notification().await? {
            existing.validate(now)?;
            return Ok(existing);
        }

        let draft = Notification::draft(now, self.sequence.clone());
        draft.validate(now)?;
        self.storage.save_notification(&draft).await?;
        Ok(draft)
    }

    /// New cycle from step 0, whatever the previous record was.
    async fn start(&self, now: DateTime<Utc>) -> Result<Notification, NotifierError> {
        let pending = PendingNotification::start(&self.sequence, now);
        let email = self.first_step().build_email(&pending, now)?;
        self.send_and_save(pending, email, now).await
    }

    async fn restart_from_cancelled(
        &self,
        cancelled: &ActiveNotification,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotifierError> {
        let can_restart = has_new_month_begun(cancelled.started_at, now)
            && self.first_step().is_notification_due(cancelled.started_at, now);

        if !can_restart {
            return Ok(Notification::Cancelled(cancelled.clone()));
        }
        self.start(now).await
    }

    async fn check_and_escalate(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotifierError> {
        let Notification::Checking(active) = notification else {
            return Err(NotifierError::InvariantViolation(format!(
                "check-and-escalate requires a checking notification, got {}",
                notification.status()
            )));
        };

        if self.email_client.has_thread_been_answered(&active.thread_id).await? {
            return self.cancel(active, now).await;
        }

        let next_index = active.last_sequence_index_sent + 1;
        let Some(next_step) = self.steps.get(next_index) else {
            return Err(NotifierError::InvariantViolation(format!(
                "lastSequenceIndexSent {} has no next step in a sequence of {}",
                active.last_sequence_index_sent,
                self.steps.len()
            )));
        };

        if next_index == self.steps.len() - 1 {
            return self.complete(active, now).await;
        }

        if !next_step.is_notification_due(active.started_at, now) {
            return Ok(notification.clone());
        }

        let pending = active.advance(next_index, now);
        let email = next_step.build_email(&pending, now)?;
        self.send_and_save(pending, email, now).await
    }

    async fn cancel(&self, active: &ActiveNotification, now: DateTime<Utc>) -> Result<Notification, NotifierError> {
        let pending = active.cancel();
        let email = self.first_step().build_cancellation_email(&pending, now)?;
        self.send_and_save(pending, email, now).await
    }

    async fn complete(&self, active: &ActiveNotification, now: DateTime<Utc>) -> Result<Notification, NotifierError> {
        let pending = active.complete(now);
        let email = self.last_step().build_email(&pending, now)?;
        self.send_and_save(pending, email, now).await
    }

    /// Send first, persist second.
    async fn send_and_save(
        &self,
        pending: PendingNotification,
        email: Email,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotifierError> {
        pending.validate()?;
        let sent = self.email_client.send_email(&email).await?;
        let notification = pending.into_notification(sent.thread_id);
        notification.validate(now)?;
        self.storage.save_notification(&notification).await?;
        Ok(notification)
    }

    fn first_step(&self) -> &SequenceStep {
        &self.steps[0]
    }

    fn last_step(&self) -> &SequenceStep {
        &self.steps[self.steps.len() - 1]
    }
}
