//! legacy-core
//!
//! Core of the legacy notifier: a dead-man's switch that sends escalating
//! check emails and, without a reply, a final legacy email.
//!
//! # Modules
//! - **domain**: notification record, escalation policy, sequence steps, errors
//! - **ports**: `Storage`, `EmailClient`, `Clock`
//! - **app**: `Notificator` state machine, builder, OAuth handshake
//! - **impls**: memory, dry-run, SQLite and Gmail adapters
//! - **config**: configuration types and loading

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use self::app::{Notificator, NotificatorBuilder};
pub use self::config::{AppConfig, ConfigError, load_config};
pub use self::domain::{ErrorKind, Notification, NotificationStatus, NotifierError};
