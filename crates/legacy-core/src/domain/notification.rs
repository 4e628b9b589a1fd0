//! Notification - the single persisted record of an escalation cycle.
//!
//! # Record shape
//! - `Draft`: created when storage is empty, carries no progress
//! - `Checking` / `Completed` / `Cancelled`: carry the index of the last
//!   step sent, when it was sent, and the thread it was sent in
//!
//! Field presence is enforced by the type, so the only checks left for
//! `validate` are the ordering ones.
//!
//! # Transitions
//! Transitions borrow the current record and return a `PendingNotification`:
//! the record as it should be persisted, minus the thread handle that only
//! the email provider can hand back. Turning it into a `Notification`
//! therefore requires a successful send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::NotificationError;
use super::ids::ThreadId;
use super::month_days::MonthDaySequence;

/// Notification record, tagged by `status` in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Notification {
    #[serde(alias = "DRAFT")]
    Draft(DraftNotification),
    Checking(ActiveNotification),
    Completed(ActiveNotification),
    Cancelled(ActiveNotification),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftNotification {
    pub started_at: DateTime<Utc>,
    pub sequence_of_month_days: MonthDaySequence,
}

/// Progress of a cycle that has sent at least one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveNotification {
    pub started_at: DateTime<Utc>,
    pub sequence_of_month_days: MonthDaySequence,
    pub last_sequence_index_sent: usize,
    pub last_sequence_sent_at: DateTime<Utc>,
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationStatus {
    Draft,
    Checking,
    Completed,
    Cancelled,
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationStatus::Draft => "draft",
            NotificationStatus::Checking => "checking",
            NotificationStatus::Completed => "completed",
            NotificationStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl Notification {
    /// Fresh record for an empty storage.
    pub fn draft(now: DateTime<Utc>, sequence: MonthDaySequence) -> Self {
        Notification::Draft(DraftNotification {
            started_at: now,
            sequence_of_month_days: sequence,
        })
    }

    pub fn status(&self) -> NotificationStatus {
        match self {
            Notification::Draft(_) => NotificationStatus::Draft,
            Notification::Checking(_) => NotificationStatus::Checking,
            Notification::Completed(_) => NotificationStatus::Completed,
            Notification::Cancelled(_) => NotificationStatus::Cancelled,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        match self {
            Notification::Draft(draft) => draft.started_at,
            Notification::Checking(active)
            | Notification::Completed(active)
            | Notification::Cancelled(active) => active.started_at,
        }
    }

    pub fn sequence_of_month_days(&self) -> &MonthDaySequence {
        match self {
            Notification::Draft(draft) => &draft.sequence_of_month_days,
            Notification::Checking(active)
            | Notification::Completed(active)
            | Notification::Cancelled(active) => &active.sequence_of_month_days,
        }
    }

    /// Progress fields, absent only for a draft.
    pub fn progress(&self) -> Option<&ActiveNotification> {
        match self {
            Notification::Draft(_) => None,
            Notification::Checking(active)
            | Notification::Completed(active)
            | Notification::Cancelled(active) => Some(active),
        }
    }

    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.progress().map(|active| &active.thread_id)
    }

    /// Checks the ordering invariants against the current time.
    ///
    /// # Invariants
    /// - `lastSequenceIndexSent < len(sequenceOfMonthDays)`
    /// - `lastSequenceSentAt >= startedAt`
    /// - `startedAt <= now`
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), NotificationError> {
        if let Some(active) = self.progress() {
            check_progress(
                &active.sequence_of_month_days,
                active.started_at,
                active.last_sequence_index_sent,
                active.last_sequence_sent_at,
            )?;
        }
        if self.started_at() > now {
            return Err(NotificationError::StartedInFuture);
        }
        Ok(())
    }
}

fn check_progress(
    sequence: &MonthDaySequence,
    started_at: DateTime<Utc>,
    index: usize,
    sent_at: DateTime<Utc>,
) -> Result<(), NotificationError> {
    if index >= sequence.len() {
        return Err(NotificationError::IndexOutOfRange {
            index,
            len: sequence.len(),
        });
    }
    if sent_at < started_at {
        return Err(NotificationError::SentBeforeStart);
    }
    Ok(())
}

/// Status a record can reach by sending an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveStatus {
    Checking,
    Completed,
    Cancelled,
}

impl From<ActiveStatus> for NotificationStatus {
    fn from(status: ActiveStatus) -> Self {
        match status {
            ActiveStatus::Checking => NotificationStatus::Checking,
            ActiveStatus::Completed => NotificationStatus::Completed,
            ActiveStatus::Cancelled => NotificationStatus::Cancelled,
        }
    }
}

/// Record a transition wants to persist, waiting for the thread handle
/// returned by the send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub status: ActiveStatus,
    pub started_at: DateTime<Utc>,
    pub sequence_of_month_days: MonthDaySequence,
    pub last_sequence_index_sent: usize,
    pub last_sequence_sent_at: DateTime<Utc>,
    /// Thread the email goes into; `None` opens a new conversation.
    pub reply_to: Option<ThreadId>,
}

impl PendingNotification {
    /// New cycle: step 0 sent now, in a new thread.
    pub fn start(sequence: &MonthDaySequence, now: DateTime<Utc>) -> Self {
        Self {
            status: ActiveStatus::Checking,
            started_at: now,
            sequence_of_month_days: sequence.clone(),
            last_sequence_index_sent: 0,
            last_sequence_sent_at: now,
            reply_to: None,
        }
    }

    pub fn validate(&self) -> Result<(), NotificationError> {
        check_progress(
            &self.sequence_of_month_days,
            self.started_at,
            self.last_sequence_index_sent,
            self.last_sequence_sent_at,
        )
    }

    pub fn into_notification(self, thread_id: ThreadId) -> Notification {
        let active = ActiveNotification {
            started_at: self.started_at,
            sequence_of_month_days: self.sequence_of_month_days,
            last_sequence_index_sent: self.last_sequence_index_sent,
            last_sequence_sent_at: self.last_sequence_sent_at,
            thread_id,
        };
        match self.status {
            ActiveStatus::Checking => Notification::Checking(active),
            ActiveStatus::Completed => Notification::Completed(active),
            ActiveStatus::Cancelled => Notification::Cancelled(active),
        }
    }
}

impl ActiveNotification {
    fn pending(&self, status: ActiveStatus, index: usize, sent_at: DateTime<Utc>) -> PendingNotification {
        PendingNotification {
            status,
            started_at: self.started_at,
            sequence_of_month_days: self.sequence_of_month_days.clone(),
            last_sequence_index_sent: index,
            last_sequence_sent_at: sent_at,
            reply_to: Some(self.thread_id.clone()),
        }
    }

    /// Next checking step sent now, in the current thread.
    pub fn advance(&self, next_index: usize, now: DateTime<Utc>) -> PendingNotification {
        self.pending(ActiveStatus::Checking, next_index, now)
    }

    /// Reply received: the cycle stops, progress stays as it was.
    pub fn cancel(&self) -> PendingNotification {
        self.pending(
            ActiveStatus::Cancelled,
            self.last_sequence_index_sent,
            self.last_sequence_sent_at,
        )
    }

    /// No reply by the last step: the legacy email goes out now.
    pub fn complete(&self, now: DateTime<Utc>) -> PendingNotification {
        self.pending(
            ActiveStatus::Completed,
            self.sequence_of_month_days.last_index(),
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn seq(days: &[u32]) -> MonthDaySequence {
        MonthDaySequence::new(days.to_vec()).unwrap()
    }

    fn active(index: usize) -> ActiveNotification {
        let started_at = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        ActiveNotification {
            started_at,
            sequence_of_month_days: seq(&[10, 20, 28]),
            last_sequence_index_sent: index,
            last_sequence_sent_at: started_at + Duration::days(index as i64 * 10),
            thread_id: ThreadId::new("thread-1"),
        }
    }

    #[test]
    fn draft_serializes_without_progress_fields() {
        let started_at = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let draft = Notification::draft(started_at, seq(&[10, 20]));
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "draft",
                "startedAt": "2025-03-10T08:00:00Z",
                "sequenceOfMonthDays": [10, 20],
            })
        );
        let back: Notification = serde_json::from_value(value).unwrap();
        assert_eq!(back, draft);
    }

    #[test]
    fn active_record_keeps_every_field() {
        let record = Notification::Cancelled(active(1));
        let text = serde_json::to_string(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "cancelled");
        assert_eq!(value["lastSequenceIndexSent"], 1);
        assert_eq!(value["threadId"], "thread-1");
        assert_eq!(serde_json::from_str::<Notification>(&text).unwrap(), record);
    }

    #[test]
    fn reads_legacy_uppercase_draft() {
        let record: Notification = serde_json::from_value(json!({
            "status": "DRAFT",
            "startedAt": "2024-11-02T10:00:00.000Z",
            "sequenceOfMonthDays": [1, 15],
        }))
        .unwrap();
        assert_eq!(record.status(), NotificationStatus::Draft);
        assert!(record.progress().is_none());
    }

    #[test]
    fn active_status_requires_progress_fields() {
        let err = serde_json::from_value::<Notification>(json!({
            "status": "checking",
            "startedAt": "2025-03-10T08:00:00Z",
            "sequenceOfMonthDays": [10, 20],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("lastSequenceIndexSent"));
    }

    #[test]
    fn stored_sequence_is_validated_on_read() {
        let err = serde_json::from_value::<Notification>(json!({
            "status": "draft",
            "startedAt": "2025-03-10T08:00:00Z",
            "sequenceOfMonthDays": [20, 10],
        }));
        assert!(err.is_err());
    }

    #[test]
    fn validate_rejects_broken_ordering() {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        assert!(Notification::Checking(active(2)).validate(now).is_ok());

        let mut out_of_range = active(0);
        out_of_range.last_sequence_index_sent = 3;
        assert_eq!(
            Notification::Checking(out_of_range).validate(now),
            Err(NotificationError::IndexOutOfRange { index: 3, len: 3 })
        );

        let mut sent_early = active(0);
        sent_early.last_sequence_sent_at = sent_early.started_at - Duration::seconds(1);
        assert_eq!(
            Notification::Checking(sent_early).validate(now),
            Err(NotificationError::SentBeforeStart)
        );

        let before_start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            Notification::Completed(active(0)).validate(before_start),
            Err(NotificationError::StartedInFuture)
        );
    }

    #[test]
    fn transitions_keep_thread_and_cycle() {
        let now = Utc.with_ymd_and_hms(2025, 3, 28, 8, 0, 0).unwrap();
        let current = active(1);

        let cancelled = current.cancel();
        assert_eq!(cancelled.status, ActiveStatus::Cancelled);
        assert_eq!(cancelled.last_sequence_index_sent, 1);
        assert_eq!(cancelled.last_sequence_sent_at, current.last_sequence_sent_at);
        assert_eq!(cancelled.reply_to, Some(ThreadId::new("thread-1")));

        let completed = current.complete(now);
        assert_eq!(completed.status, ActiveStatus::Completed);
        assert_eq!(completed.last_sequence_index_sent, 2);
        assert_eq!(completed.last_sequence_sent_at, now);
        assert_eq!(completed.started_at, current.started_at);

        let record = completed.into_notification(ThreadId::new("thread-2"));
        assert_eq!(record.status(), NotificationStatus::Completed);
        assert_eq!(record.thread_id(), Some(&ThreadId::new("thread-2")));
    }

    #[test]
    fn start_opens_a_new_thread() {
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 8, 0, 0).unwrap();
        let pending = PendingNotification::start(&seq(&[10, 20]), now);
        assert_eq!(pending.reply_to, None);
        assert_eq!(pending.last_sequence_index_sent, 0);
        assert_eq!(pending.started_at, now);
        assert_eq!(pending.last_sequence_sent_at, now);
        assert!(pending.validate().is_ok());
    }
}
