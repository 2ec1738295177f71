use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Connection state of a barman service.
///
/// Only [`Ready`](Self::Ready), [`Login`](Self::Login) and
/// [`Online`](Self::Online) qualify a service to become the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Not connected and not trying to.
    #[default]
    Idle,
    /// The last connection attempt failed.
    Failure,
    /// Associating with the access point or link.
    Association,
    /// Obtaining addresses.
    Configuration,
    /// Connected with addresses configured.
    Ready,
    /// Connected, but a captive portal login is required.
    Login,
    /// Connected and verified online.
    Online,
    /// Tearing the connection down.
    Disconnect,
}

impl ServiceState {
    /// Returns the wire string for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Failure => "failure",
            Self::Association => "association",
            Self::Configuration => "configuration",
            Self::Ready => "ready",
            Self::Login => "login",
            Self::Online => "online",
            Self::Disconnect => "disconnect",
        }
    }

    /// Returns `true` if a service in this state can be the default service.
    pub fn is_qualifying(self) -> bool {
        matches!(self, Self::Ready | Self::Login | Self::Online)
    }

    /// Parses a remote value, falling back to [`Idle`](Self::Idle).
    pub fn from_remote(s: &str) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{e}, using idle");
            Self::Idle
        })
    }
}

impl FromStr for ServiceState {
    type Err = UnknownValue;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "failure" => Ok(Self::Failure),
            "association" => Ok(Self::Association),
            "configuration" => Ok(Self::Configuration),
            "ready" => Ok(Self::Ready),
            "login" => Ok(Self::Login),
            "online" => Ok(Self::Online),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(UnknownValue::new("service state", other)),
        }
    }
}

impl Display for ServiceState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Link type of a barman service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Wired Ethernet.
    #[default]
    Ethernet,
    /// Wi-Fi network.
    Wifi,
    /// Bluetooth PAN.
    Bluetooth,
    /// Cellular bearer.
    Cellular,
}

impl ServiceType {
    /// Returns the wire string for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Bluetooth => "bluetooth",
            Self::Cellular => "cellular",
        }
    }

    /// Parses a remote value, falling back to [`Ethernet`](Self::Ethernet).
    pub fn from_remote(s: &str) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{e}, using ethernet");
            Self::Ethernet
        })
    }
}

impl FromStr for ServiceType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ethernet" => Ok(Self::Ethernet),
            "wifi" => Ok(Self::Wifi),
            "bluetooth" => Ok(Self::Bluetooth),
            "cellular" => Ok(Self::Cellular),
            other => Err(UnknownValue::new("service type", other)),
        }
    }
}

impl Display for ServiceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Security scheme of a barman service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceSecurity {
    /// Not reported or not recognised.
    #[default]
    Unknown,
    /// Open network.
    None,
    /// Static WEP key.
    Wep,
    /// WPA/WPA2 pre-shared key.
    Psk,
    /// 802.1x / enterprise.
    Ieee8021x,
}

impl ServiceSecurity {
    /// Returns the wire string for this security scheme.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::None => "none",
            Self::Wep => "wep",
            Self::Psk => "psk",
            Self::Ieee8021x => "ieee8021x",
        }
    }

    /// Parses a remote value, falling back to [`Unknown`](Self::Unknown).
    pub fn from_remote(s: &str) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{e}");
            Self::Unknown
        })
    }

    /// Picks the first recognised scheme from the list the remote reports.
    ///
    /// A service may advertise several schemes (e.g. `["wpa", "rsn"]`).
    pub fn from_list<S: AsRef<str>>(list: &[S]) -> Self {
        list.iter()
            .map(|s| Self::from_remote(s.as_ref()))
            .find(|s| *s != Self::Unknown)
            .unwrap_or(Self::Unknown)
    }
}

impl FromStr for ServiceSecurity {
    type Err = UnknownValue;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "none" => Ok(Self::None),
            "wep" => Ok(Self::Wep),
            "psk" | "wpa" | "rsn" => Ok(Self::Psk),
            "ieee8021x" => Ok(Self::Ieee8021x),
            other => Err(UnknownValue::new("service security", other)),
        }
    }
}

impl Display for ServiceSecurity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Operating mode of a barman service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Infrastructure Wi-Fi.
    #[default]
    Managed,
    /// Ad-hoc Wi-Fi.
    Adhoc,
    /// GPRS cellular.
    Gprs,
    /// EDGE cellular.
    Edge,
    /// UMTS cellular.
    Umts,
}

impl ServiceMode {
    /// Returns the wire string for this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Adhoc => "adhoc",
            Self::Gprs => "gprs",
            Self::Edge => "edge",
            Self::Umts => "umts",
        }
    }

    /// Parses a remote value, falling back to [`Managed`](Self::Managed).
    pub fn from_remote(s: &str) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{e}, using managed");
            Self::Managed
        })
    }
}

impl FromStr for ServiceMode {
    type Err = UnknownValue;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "managed" => Ok(Self::Managed),
            "adhoc" => Ok(Self::Adhoc),
            "gprs" => Ok(Self::Gprs),
            "edge" => Ok(Self::Edge),
            "umts" => Ok(Self::Umts),
            other => Err(UnknownValue::new("service mode", other)),
        }
    }
}

impl Display for ServiceMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Kind of radio or interface hardware a technology represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnologyType {
    /// Not reported yet, or not recognised.
    #[default]
    Unknown,
    Ethernet,
    Wifi,
    Bluetooth,
    Cellular,
}

impl TechnologyType {
    /// Returns the wire string for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Bluetooth => "bluetooth",
            Self::Cellular => "cellular",
        }
    }

    /// Parses a remote value, falling back to [`Unknown`](Self::Unknown).
    pub fn from_remote(s: &str) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{e}");
            Self::Unknown
        })
    }
}

impl FromStr for TechnologyType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "ethernet" => Ok(Self::Ethernet),
            "wifi" => Ok(Self::Wifi),
            "bluetooth" => Ok(Self::Bluetooth),
            "cellular" => Ok(Self::Cellular),
            other => Err(UnknownValue::new("technology type", other)),
        }
    }
}

impl Display for TechnologyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Aggregate state of one technology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnologyState {
    /// Not reported yet, or not recognised.
    #[default]
    Unknown,
    /// No hardware present, or the technology went away.
    Unavailable,
    /// Hardware present but disabled.
    Available,
    /// Disabled by offline mode.
    Offline,
    /// Enabled but not connected.
    Enabled,
    /// At least one service of this kind is connected.
    Connected,
}

impl TechnologyState {
    /// Returns the wire string for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unavailable => "unavailable",
            Self::Available => "available",
            Self::Offline => "offline",
            Self::Enabled => "enabled",
            Self::Connected => "connected",
        }
    }

    /// Parses a remote value, falling back to [`Unknown`](Self::Unknown).
    pub fn from_remote(s: &str) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{e}");
            Self::Unknown
        })
    }
}

impl FromStr for TechnologyState {
    type Err = UnknownValue;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "unavailable" => Ok(Self::Unavailable),
            "available" => Ok(Self::Available),
            "offline" => Ok(Self::Offline),
            "enabled" => Ok(Self::Enabled),
            "connected" => Ok(Self::Connected),
            other => Err(UnknownValue::new("technology state", other)),
        }
    }
}

impl Display for TechnologyState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A string that is not part of an enum's wire table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownValue {
    kind: &'static str,
    value: String,
}

impl UnknownValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }

    /// The rejected string.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Parameters for asking the manager to connect to a service that is not
/// listed yet, such as a hidden Wi-Fi network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceParams {
    pub service_type: ServiceType,
    pub mode: ServiceMode,
    pub security: ServiceSecurity,
    pub ssid: String,
}

impl ServiceParams {
    /// Parameters for a managed Wi-Fi network.
    pub fn wifi(ssid: impl Into<String>, security: ServiceSecurity) -> Self {
        Self {
            service_type: ServiceType::Wifi,
            mode: ServiceMode::Managed,
            security,
            ssid: ssid.into(),
        }
    }
}

/// Errors produced by the barman client.
///
/// # Example
///
/// ```no_run
/// use barman::{Barman, BarmanError};
///
/// # async fn example() -> barman::Result<()> {
/// let barman = Barman::new().await?;
///
/// match barman.connect("/service/wifi_home").await {
///     Ok(()) => println!("Connect requested"),
///     Err(BarmanError::ServiceNotFound(path)) => eprintln!("No service at {path}"),
///     Err(BarmanError::Timeout(after)) => eprintln!("Gave up after {after:?}"),
///     Err(e) => eprintln!("Error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Error)]
pub enum BarmanError {
    /// A D-Bus communication error occurred.
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    /// A value could not be converted to or from its D-Bus representation.
    #[error("D-Bus value error: {0}")]
    Variant(#[from] zvariant::Error),

    /// The remote side rejected a call.
    #[error("remote call failed: {0}")]
    Remote(String),

    /// A remote call did not complete in time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// An IP configuration was built from an unrecognised method string.
    #[error("invalid {family} method: {method:?}")]
    InvalidMethod {
        family: &'static str,
        method: Option<String>,
    },

    /// A property name outside the known set for its object kind.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// A property value did not have the expected shape.
    #[error("unexpected value for {property}, expected {expected}")]
    UnexpectedType {
        property: &'static str,
        expected: &'static str,
    },

    /// No service is known at the given path.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// No technology of the given kind is known.
    #[error("technology not found: {0}")]
    TechnologyNotFound(TechnologyType),

    /// The manager is not running or not yet synchronised.
    #[error("not connected to barman")]
    NotConnected,

    /// The background driver has stopped.
    #[error("barman driver closed")]
    Closed,
}
