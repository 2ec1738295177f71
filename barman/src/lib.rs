//! A Rust client for the barman connection manager.
//!
//! This crate keeps a local, always up to date mirror of what the barman
//! daemon knows: its connectable services, its radio technologies and which
//! service is currently the default route.
//!
//! - Listing services with their state, security, strength and IP settings
//! - Following the default service as connections come and go
//! - Per-technology state (Wi-Fi, Ethernet, Bluetooth, cellular)
//! - Writing passphrases, autoconnect, nameservers and IP configuration
//! - Connecting, disconnecting and toggling technologies or offline mode
//!
//! # Example
//!
//! ```no_run
//! use barman::Barman;
//!
//! # async fn example() -> barman::Result<()> {
//! let barman = Barman::new().await?;
//! barman.wait_until_connected().await?;
//!
//! if let Some(default) = barman.default_service() {
//!     println!("online through {} ({})", default.name(), default.service_type());
//! }
//!
//! for service in barman.services() {
//!     println!("{:<24} {:>3}% {}", service.name(), service.strength(), service.state());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # How the mirror is kept
//!
//! [`ManagerDirectory`] holds the state and decides what to fetch, what to
//! announce and which service is the default. It does no I/O, so it can be
//! driven and tested without a bus. [`Barman`] runs it in a background task
//! over a [`Transport`], which is [`BusTransport`] on a real system.
//!
//! A service only shows up once all of its properties have been fetched,
//! and the directory only reports itself connected once every service the
//! daemon listed has done so.
//!
//! # Error Handling
//!
//! All fallible operations return [`Result`] with a [`BarmanError`]. Bad
//! values pushed by the daemon are not errors: unknown enum strings fall
//! back to a default member and are logged.
//!
//! # Logging
//!
//! This crate uses the [`log`](https://docs.rs/log) facade for logging. To see
//! log output, add a logging implementation like `env_logger`.

pub mod api;
mod core;
mod dbus;
pub mod monitoring;
mod types;
mod util;

// Re-exported public API
pub use crate::api::barman::Barman;
pub use crate::api::config::BarmanConfig;
pub use crate::api::models::{
    BarmanError, ServiceMode, ServiceParams, ServiceSecurity, ServiceState, ServiceType,
    TechnologyState, TechnologyType, UnknownValue,
};
pub use crate::core::directory::{
    DirectoryEvent, DirectorySnapshot, EntryToken, ManagerDirectory, ObjectRef, PropertyMap,
    Request,
};
pub use crate::core::ip_config::{Ipv4Config, Ipv4Method, Ipv6Config, Ipv6Method};
pub use crate::core::service::{ServiceChange, ServiceEntry, UNNAMED_SERVICE};
pub use crate::core::technology::TechnologyEntry;
pub use crate::core::value::{ManagerProperty, PropertyValue, ServiceProperty, TechnologyProperty};
pub use crate::monitoring::transport::{Action, BusEvent, BusTransport, Transport};

/// A specialized `Result` type for barman operations.
pub type Result<T> = std::result::Result<T, BarmanError>;
