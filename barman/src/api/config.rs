//! Client configuration.

use std::time::Duration;

use crate::types::constants::{BUS_NAME, MANAGER_PATH, timeouts};

/// Settings for a [`Barman`](crate::Barman) client.
///
/// The defaults talk to `net.barman` at `/`, give actions two minutes and
/// let property calls wait as long as the daemon takes.
///
/// # Example
///
/// ```rust
/// use barman::BarmanConfig;
/// use std::time::Duration;
///
/// let config = BarmanConfig::new()
///     .with_action_timeout(Duration::from_secs(30))
///     .with_property_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.action_timeout, Duration::from_secs(30));
/// assert_eq!(config.property_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarmanConfig {
    /// Well-known bus name of the daemon.
    pub bus_name: String,
    /// Object path of the manager.
    pub manager_path: String,
    /// Limit for connect, disconnect, technology and connect-service calls.
    pub action_timeout: Duration,
    /// Limit for property fetches and writes. `None` waits forever.
    pub property_timeout: Option<Duration>,
    /// Events buffered per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl Default for BarmanConfig {
    fn default() -> Self {
        Self {
            bus_name: BUS_NAME.to_owned(),
            manager_path: MANAGER_PATH.to_owned(),
            action_timeout: timeouts::action_timeout(),
            property_timeout: None,
            event_capacity: timeouts::EVENT_CAPACITY,
        }
    }
}

impl BarmanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bus_name(mut self, bus_name: impl Into<String>) -> Self {
        self.bus_name = bus_name.into();
        self
    }

    #[must_use]
    pub fn with_manager_path(mut self, path: impl Into<String>) -> Self {
        self.manager_path = path.into();
        self
    }

    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_property_timeout(mut self, timeout: Duration) -> Self {
        self.property_timeout = Some(timeout);
        self
    }

    /// Sets the per-subscriber event buffer. Zero is raised to one.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
