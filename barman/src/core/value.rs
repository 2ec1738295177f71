//! Property values and the closed property-name sets of each remote object.
//!
//! Values arrive from the bus as variants; the D-Bus layer converts them into
//! [`PropertyValue`] once so the directory never touches `zvariant` types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::api::models::BarmanError;

/// A property value as carried by `GetProperties`, `SetProperty` and
/// `PropertyChanged`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Byte(u8),
    Str(String),
    StrList(Vec<String>),
    /// A list of object paths, in the order the remote sent them.
    PathList(Vec<String>),
    Dict(HashMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Short description of the value shape, used in log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::Str(_) => "string",
            Self::StrList(_) => "string list",
            Self::PathList(_) => "path list",
            Self::Dict(_) => "dict",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Self::Byte(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// String lists and path lists both read as a list of strings.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::StrList(l) | Self::PathList(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<String, PropertyValue>> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Builds a `{string: string}` dictionary value.
    pub fn string_dict<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Dict(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Self::Str(v.into())))
                .collect(),
        )
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u8> for PropertyValue {
    fn from(b: u8) -> Self {
        Self::Byte(b)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(l: Vec<String>) -> Self {
        Self::StrList(l)
    }
}

/// Properties of a `net.barman.Service` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceProperty {
    State,
    Error,
    Name,
    Type,
    Mode,
    Security,
    LoginRequired,
    Passphrase,
    PassphraseRequired,
    Strength,
    Favorite,
    Immutable,
    AutoConnect,
    SetupRequired,
    Apn,
    Mcc,
    Mnc,
    Roaming,
    Nameservers,
    NameserversConfiguration,
    Domains,
    DomainsConfiguration,
    Ipv4,
    Ipv4Configuration,
    Ipv6,
    Ipv6Configuration,
}

impl ServiceProperty {
    /// The property name used on the bus.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::State => "State",
            Self::Error => "Error",
            Self::Name => "Name",
            Self::Type => "Type",
            Self::Mode => "Mode",
            Self::Security => "Security",
            Self::LoginRequired => "LoginRequired",
            Self::Passphrase => "Passphrase",
            Self::PassphraseRequired => "PassphraseRequired",
            Self::Strength => "Strength",
            Self::Favorite => "Favorite",
            Self::Immutable => "Immutable",
            Self::AutoConnect => "AutoConnect",
            Self::SetupRequired => "SetupRequired",
            Self::Apn => "APN",
            Self::Mcc => "MCC",
            Self::Mnc => "MNC",
            Self::Roaming => "Roaming",
            Self::Nameservers => "Nameservers",
            Self::NameserversConfiguration => "Nameservers.Configuration",
            Self::Domains => "Domains",
            Self::DomainsConfiguration => "Domains.Configuration",
            Self::Ipv4 => "IPv4",
            Self::Ipv4Configuration => "IPv4.Configuration",
            Self::Ipv6 => "IPv6",
            Self::Ipv6Configuration => "IPv6.Configuration",
        }
    }
}

impl FromStr for ServiceProperty {
    type Err = BarmanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "State" => Self::State,
            "Error" => Self::Error,
            "Name" => Self::Name,
            "Type" => Self::Type,
            "Mode" => Self::Mode,
            "Security" => Self::Security,
            "LoginRequired" => Self::LoginRequired,
            "Passphrase" => Self::Passphrase,
            "PassphraseRequired" => Self::PassphraseRequired,
            "Strength" => Self::Strength,
            "Favorite" => Self::Favorite,
            "Immutable" => Self::Immutable,
            "AutoConnect" => Self::AutoConnect,
            "SetupRequired" => Self::SetupRequired,
            "APN" => Self::Apn,
            "MCC" => Self::Mcc,
            "MNC" => Self::Mnc,
            "Roaming" => Self::Roaming,
            "Nameservers" => Self::Nameservers,
            "Nameservers.Configuration" => Self::NameserversConfiguration,
            "Domains" => Self::Domains,
            "Domains.Configuration" => Self::DomainsConfiguration,
            "IPv4" => Self::Ipv4,
            "IPv4.Configuration" => Self::Ipv4Configuration,
            "IPv6" => Self::Ipv6,
            "IPv6.Configuration" => Self::Ipv6Configuration,
            other => return Err(BarmanError::UnknownProperty(other.to_owned())),
        })
    }
}

impl Display for ServiceProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Properties of a `net.barman.Technology` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TechnologyProperty {
    Type,
    State,
}

impl TechnologyProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Type => "Type",
            Self::State => "State",
        }
    }
}

impl FromStr for TechnologyProperty {
    type Err = BarmanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Type" => Ok(Self::Type),
            "State" => Ok(Self::State),
            other => Err(BarmanError::UnknownProperty(other.to_owned())),
        }
    }
}

/// Properties of the `net.barman.Manager` object that the directory tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagerProperty {
    Services,
    Technologies,
    OfflineMode,
}

impl ManagerProperty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Services => "Services",
            Self::Technologies => "Technologies",
            Self::OfflineMode => "OfflineMode",
        }
    }
}

impl FromStr for ManagerProperty {
    type Err = BarmanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Services" => Ok(Self::Services),
            "Technologies" => Ok(Self::Technologies),
            "OfflineMode" => Ok(Self::OfflineMode),
            other => Err(BarmanError::UnknownProperty(other.to_owned())),
        }
    }
}
