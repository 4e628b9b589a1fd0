//! Domain model (record, escalation policy, sequence steps, emails, errors).
//!
//! Everything here is pure: no I/O, time is always passed in as `now`.

pub mod email;
pub mod errors;
pub mod escalation;
pub mod ids;
pub mod month_days;
pub mod notification;
pub mod sequence;

pub use self::email::{Email, EmailTemplate, EmailVariables};
pub use self::errors::{ErrorKind, NotificationError, NotifierError, PortError};
pub use self::ids::ThreadId;
pub use self::month_days::MonthDaySequence;
pub use self::notification::{
    ActiveNotification, ActiveStatus, DraftNotification, Notification, NotificationStatus,
    PendingNotification,
};
pub use self::sequence::{EmailSettings, SequenceStep, StepKind};
