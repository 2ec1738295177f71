//! barman Service proxy.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::{OwnedValue, Value};

/// Proxy for the `net.barman.Service` interface.
///
/// One object exists per connectable service. Build it per path:
///
/// ```ignore
/// let service = BarmanServiceProxy::builder(conn)
///     .destination("net.barman")?
///     .path("/service/wifi_home")?
///     .build()
///     .await?;
/// service.connect().await?;
/// ```
#[proxy(interface = "net.barman.Service", default_service = "net.barman")]
pub trait BarmanService {
    /// Returns every service property.
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;

    /// Writes one writable property (`Passphrase`, `AutoConnect`, `APN`,
    /// the `*.Configuration` values).
    fn set_property(&self, name: &str, value: &Value<'_>) -> Result<()>;

    /// Starts connecting. May only return once the daemon is done.
    fn connect(&self) -> Result<()>;

    fn disconnect(&self) -> Result<()>;
}
