//! Immutable IPv4 and IPv6 address configurations.
//!
//! A configuration is only ever built from a recognised method. Remote
//! dictionaries with an unknown or missing method are rejected with
//! [`BarmanError::InvalidMethod`] so the owning attribute ends up absent
//! instead of holding a half-filled value.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::api::models::BarmanError;
use crate::Result;
use crate::types::constants::ip_key;

/// How an IPv4 address is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ipv4Method {
    Off,
    Manual,
    Fixed,
    Dhcp,
}

impl Ipv4Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Manual => "manual",
            Self::Fixed => "fixed",
            Self::Dhcp => "dhcp",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "manual" => Some(Self::Manual),
            "fixed" => Some(Self::Fixed),
            "dhcp" => Some(Self::Dhcp),
            _ => None,
        }
    }
}

impl Display for Ipv4Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// How an IPv6 address is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ipv6Method {
    Off,
    Manual,
    Fixed,
    Auto,
}

impl Ipv6Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Manual => "manual",
            Self::Fixed => "fixed",
            Self::Auto => "auto",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "manual" => Some(Self::Manual),
            "fixed" => Some(Self::Fixed),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

impl Display for Ipv6Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// An IPv4 address configuration, either reported by the manager or
/// requested by the user.
///
/// # Example
///
/// ```rust
/// use barman::{Ipv4Config, Ipv4Method};
///
/// let dhcp = Ipv4Config::from_strings(Some("dhcp"), None, None, None).unwrap();
/// assert_eq!(dhcp.method(), Ipv4Method::Dhcp);
///
/// let manual = Ipv4Config::new(Ipv4Method::Manual)
///     .with_address("192.168.1.20")
///     .with_netmask("255.255.255.0")
///     .with_gateway("192.168.1.1");
/// assert_eq!(manual.gateway(), Some("192.168.1.1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Config {
    method: Ipv4Method,
    address: Option<String>,
    netmask: Option<String>,
    gateway: Option<String>,
}

impl Ipv4Config {
    /// Creates a configuration with the given method and no addresses.
    pub fn new(method: Ipv4Method) -> Self {
        Self {
            method,
            address: None,
            netmask: None,
            gateway: None,
        }
    }

    /// Builds a configuration from the raw strings found in a remote
    /// dictionary.
    ///
    /// Fails when `method` is missing or not one of `off`, `manual`,
    /// `fixed`, `dhcp`.
    pub fn from_strings(
        method: Option<&str>,
        address: Option<&str>,
        netmask: Option<&str>,
        gateway: Option<&str>,
    ) -> Result<Self> {
        let method =
            method
                .and_then(Ipv4Method::parse)
                .ok_or_else(|| BarmanError::InvalidMethod {
                    family: "ipv4",
                    method: method.map(str::to_owned),
                })?;

        Ok(Self {
            method,
            address: address.map(str::to_owned),
            netmask: netmask.map(str::to_owned),
            gateway: gateway.map(str::to_owned),
        })
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn with_netmask(mut self, netmask: impl Into<String>) -> Self {
        self.netmask = Some(netmask.into());
        self
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    pub fn method(&self) -> Ipv4Method {
        self.method
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn netmask(&self) -> Option<&str> {
        self.netmask.as_deref()
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    /// Key/value pairs sent as `IPv4.Configuration`. Absent fields are left out.
    pub(crate) fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![(ip_key::METHOD.to_owned(), self.method.as_str().to_owned())];
        for (key, value) in [
            (ip_key::ADDRESS, &self.address),
            (ip_key::NETMASK, &self.netmask),
            (ip_key::GATEWAY, &self.gateway),
        ] {
            if let Some(value) = value {
                pairs.push((key.to_owned(), value.clone()));
            }
        }
        pairs
    }
}

/// An IPv6 address configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Config {
    method: Ipv6Method,
    address: Option<String>,
    prefix_length: u8,
    gateway: Option<String>,
}

impl Ipv6Config {
    pub fn new(method: Ipv6Method) -> Self {
        Self {
            method,
            address: None,
            prefix_length: 0,
            gateway: None,
        }
    }

    /// Builds a configuration from remote values.
    ///
    /// Fails when `method` is missing or not one of `off`, `manual`,
    /// `fixed`, `auto`.
    pub fn from_strings(
        method: Option<&str>,
        address: Option<&str>,
        prefix_length: u8,
        gateway: Option<&str>,
    ) -> Result<Self> {
        let method =
            method
                .and_then(Ipv6Method::parse)
                .ok_or_else(|| BarmanError::InvalidMethod {
                    family: "ipv6",
                    method: method.map(str::to_owned),
                })?;

        Ok(Self {
            method,
            address: address.map(str::to_owned),
            prefix_length,
            gateway: gateway.map(str::to_owned),
        })
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>, prefix_length: u8) -> Self {
        self.address = Some(address.into());
        self.prefix_length = prefix_length;
        self
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    pub fn method(&self) -> Ipv6Method {
        self.method
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    /// Key/value pairs sent as `IPv6.Configuration`. The prefix length
    /// travels as a decimal string.
    pub(crate) fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![(ip_key::METHOD.to_owned(), self.method.as_str().to_owned())];
        if let Some(address) = &self.address {
            pairs.push((ip_key::ADDRESS.to_owned(), address.clone()));
        }
        pairs.push((ip_key::PREFIX_LENGTH.to_owned(), self.prefix_length.to_string()));
        if let Some(gateway) = &self.gateway {
            pairs.push((ip_key::GATEWAY.to_owned(), gateway.clone()));
        }
        pairs
    }
}
