//! barman Technology proxy.

use std::collections::HashMap;
use zbus::{Result, proxy};
use zvariant::OwnedValue;

/// Proxy for the `net.barman.Technology` interface.
///
/// Only `Type` and `State` are read from it.
#[proxy(interface = "net.barman.Technology", default_service = "net.barman")]
pub trait BarmanTechnology {
    fn get_properties(&self) -> Result<HashMap<String, OwnedValue>>;
}
