//! App - application layer combining the ports.
//!
//! # Components
//! - **Notificator**: the notification state machine (`notify`, `authenticate`)
//! - **NotificatorBuilder**: wiring and start-up validation
//! - **authenticate**: one-shot OAuth callback listener

pub mod authenticate;
pub mod builder;
pub mod notificator;

pub use self::builder::NotificatorBuilder;
pub use self::notificator::Notificator;
