//! Constants for the barman D-Bus interface.
//!
//! These correspond to the bus name, object paths and interface names
//! exported by the barman daemon, plus the timeouts used for its calls.

/// Well-known bus name of the daemon.
pub const BUS_NAME: &str = "net.barman";

/// Object path of the manager.
pub const MANAGER_PATH: &str = "/";

/// Interface names of the exported objects.
pub mod interface {
    pub const MANAGER: &str = "net.barman.Manager";
    pub const SERVICE: &str = "net.barman.Service";
    pub const TECHNOLOGY: &str = "net.barman.Technology";
}

/// Name of the signal every barman object emits when a property changes.
pub const PROPERTY_CHANGED: &str = "PropertyChanged";

/// Keys of the dictionary passed to `ConnectService`.
pub mod connect_service_key {
    pub const TYPE: &str = "Type";
    pub const MODE: &str = "Mode";
    pub const SECURITY: &str = "Security";
    pub const SSID: &str = "SSID";
}

/// Keys of the `IPv4` / `IPv6` dictionaries.
pub mod ip_key {
    pub const METHOD: &str = "Method";
    pub const ADDRESS: &str = "Address";
    pub const NETMASK: &str = "Netmask";
    pub const PREFIX_LENGTH: &str = "PrefixLength";
    pub const GATEWAY: &str = "Gateway";
}

/// Timeout defaults.
pub mod timeouts {
    use std::time::Duration;

    /// Connecting a service can involve association and DHCP on the
    /// daemon side before the call returns (120 seconds).
    const ACTION_TIMEOUT_SECS: u64 = 120;

    /// Buffered events per subscriber before it starts lagging.
    pub const EVENT_CAPACITY: usize = 64;

    /// Returns the default timeout for connect, disconnect and technology
    /// calls.
    pub fn action_timeout() -> Duration {
        Duration::from_secs(ACTION_TIMEOUT_SECS)
    }
}
