//! Ports - capability traits the notificator depends on.
//!
//! Each trait hides an external system (email provider, key/value store,
//! system clock). Implementations live in `impls`.

pub mod clock;
pub mod email_client;
pub mod storage;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::email_client::{Authentication, EmailClient, RedirectRequest, SendEmailOutput};
pub use self::storage::{EmailClientCredentials, Storage};
