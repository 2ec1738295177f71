//! barman Manager proxy.

use std::collections::HashMap;
use zbus::proxy;
use zvariant::{OwnedObjectPath, OwnedValue, Value};

/// Proxy for the `net.barman.Manager` interface.
///
/// Provides the manager's property bag (`Services`, `Technologies`,
/// `OfflineMode`) and the technology and hidden-network actions. Property
/// changes are announced with a `PropertyChanged(s, v)` signal, which the
/// transport receives through a match rule rather than through this proxy.
#[proxy(
    interface = "net.barman.Manager",
    default_service = "net.barman",
    default_path = "/"
)]
pub trait BarmanManager {
    /// Returns every manager property.
    fn get_properties(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    /// Writes one manager property, such as `OfflineMode`.
    fn set_property(&self, name: &str, value: &Value<'_>) -> zbus::Result<()>;

    /// Powers on every device of a technology kind (`"wifi"`, `"ethernet"`, ...).
    fn enable_technology(&self, technology: &str) -> zbus::Result<()>;

    /// Powers off every device of a technology kind.
    fn disable_technology(&self, technology: &str) -> zbus::Result<()>;

    /// Connects to a service that is not listed yet, such as a hidden
    /// Wi-Fi network.
    ///
    /// Returns the path of the service that was created or reused.
    fn connect_service(
        &self,
        properties: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<OwnedObjectPath>;
}
