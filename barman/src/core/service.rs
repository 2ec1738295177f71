//! Cached state of one `net.barman.Service` object.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::api::models::{
    BarmanError, ServiceMode, ServiceSecurity, ServiceState, ServiceType,
};
use crate::core::directory::EntryToken;
use crate::core::ip_config::{Ipv4Config, Ipv6Config};
use crate::core::value::{PropertyValue, ServiceProperty};
use crate::types::constants::ip_key;

/// Name reported for services that have not sent one.
pub const UNNAMED_SERVICE: &str = "<unnamed>";

/// Local mirror of one remote service.
///
/// Entries are owned by the [`ManagerDirectory`](crate::ManagerDirectory);
/// callers get clones through snapshots. Two clones with the same
/// [`token`](Self::token) describe the same lifetime of the remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    path: String,
    token: EntryToken,
    ready: bool,
    state: ServiceState,
    error: Option<String>,
    name: Option<String>,
    service_type: ServiceType,
    mode: ServiceMode,
    security: ServiceSecurity,
    login_required: bool,
    passphrase: Option<String>,
    passphrase_required: bool,
    strength: u8,
    favorite: bool,
    immutable: bool,
    autoconnect: bool,
    setup_required: bool,
    apn: Option<String>,
    mcc: Option<String>,
    mnc: Option<String>,
    roaming: bool,
    nameservers: Vec<String>,
    nameservers_configuration: Option<Vec<String>>,
    domains: Vec<String>,
    domains_configuration: Option<Vec<String>>,
    ipv4: Option<Ipv4Config>,
    ipv4_configuration: Option<Ipv4Config>,
    ipv6: Option<Ipv6Config>,
    ipv6_configuration: Option<Ipv6Config>,
}

/// A user-initiated change to a writable service property.
///
/// Clearing a list or an IP configuration with `None` only affects the local
/// cache; nothing is sent to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceChange {
    Passphrase(String),
    AutoConnect(bool),
    Apn(String),
    NameserversConfiguration(Option<Vec<String>>),
    DomainsConfiguration(Option<Vec<String>>),
    Ipv4Configuration(Option<Ipv4Config>),
    Ipv6Configuration(Option<Ipv6Config>),
}

impl ServiceChange {
    /// The property this change writes.
    pub fn property(&self) -> ServiceProperty {
        match self {
            Self::Passphrase(_) => ServiceProperty::Passphrase,
            Self::AutoConnect(_) => ServiceProperty::AutoConnect,
            Self::Apn(_) => ServiceProperty::Apn,
            Self::NameserversConfiguration(_) => ServiceProperty::NameserversConfiguration,
            Self::DomainsConfiguration(_) => ServiceProperty::DomainsConfiguration,
            Self::Ipv4Configuration(_) => ServiceProperty::Ipv4Configuration,
            Self::Ipv6Configuration(_) => ServiceProperty::Ipv6Configuration,
        }
    }
}

impl ServiceEntry {
    pub(crate) fn new(path: impl Into<String>, token: EntryToken) -> Self {
        Self {
            path: path.into(),
            token,
            ready: false,
            state: ServiceState::Idle,
            error: None,
            name: None,
            service_type: ServiceType::Ethernet,
            mode: ServiceMode::Managed,
            security: ServiceSecurity::Unknown,
            login_required: false,
            passphrase: None,
            passphrase_required: false,
            strength: 0,
            favorite: false,
            immutable: false,
            autoconnect: false,
            setup_required: false,
            apn: None,
            mcc: None,
            mnc: None,
            roaming: false,
            nameservers: Vec::new(),
            nameservers_configuration: None,
            domains: Vec::new(),
            domains_configuration: None,
            ipv4: None,
            ipv4_configuration: None,
            ipv6: None,
            ipv6_configuration: None,
        }
    }

    /// Applies one remote property value to the cache.
    ///
    /// Fails with [`BarmanError::UnexpectedType`] if the value does not have
    /// the shape the property uses on the bus; the cache is left untouched in
    /// that case. Unknown enum strings are not errors, they fall back to the
    /// enum's default member.
    pub(crate) fn apply(&mut self, property: ServiceProperty, value: &PropertyValue) -> Result<()> {
        match property {
            ServiceProperty::State => {
                self.state = ServiceState::from_remote(expect_str(property, value)?);
            }
            ServiceProperty::Error => {
                self.error = Some(expect_str(property, value)?.to_owned());
            }
            ServiceProperty::Name => {
                self.name = Some(expect_str(property, value)?.to_owned());
            }
            ServiceProperty::Type => {
                self.service_type = ServiceType::from_remote(expect_str(property, value)?);
            }
            ServiceProperty::Mode => {
                self.mode = ServiceMode::from_remote(expect_str(property, value)?);
            }
            ServiceProperty::Security => {
                self.security = match value {
                    PropertyValue::Str(s) => ServiceSecurity::from_remote(s),
                    other => ServiceSecurity::from_list(expect_list(property, other)?),
                };
            }
            ServiceProperty::LoginRequired => self.login_required = expect_bool(property, value)?,
            ServiceProperty::Passphrase => {
                self.passphrase = Some(expect_str(property, value)?.to_owned());
            }
            ServiceProperty::PassphraseRequired => {
                self.passphrase_required = expect_bool(property, value)?;
            }
            ServiceProperty::Strength => {
                self.strength = value.as_byte().ok_or(BarmanError::UnexpectedType {
                    property: property.as_str(),
                    expected: "byte",
                })?;
            }
            ServiceProperty::Favorite => self.favorite = expect_bool(property, value)?,
            ServiceProperty::Immutable => self.immutable = expect_bool(property, value)?,
            ServiceProperty::AutoConnect => self.autoconnect = expect_bool(property, value)?,
            ServiceProperty::SetupRequired => self.setup_required = expect_bool(property, value)?,
            ServiceProperty::Apn => self.apn = Some(expect_str(property, value)?.to_owned()),
            ServiceProperty::Mcc => self.mcc = Some(expect_str(property, value)?.to_owned()),
            ServiceProperty::Mnc => self.mnc = Some(expect_str(property, value)?.to_owned()),
            ServiceProperty::Roaming => self.roaming = expect_bool(property, value)?,
            ServiceProperty::Nameservers => {
                self.nameservers = expect_list(property, value)?.to_vec();
            }
            ServiceProperty::NameserversConfiguration => {
                self.nameservers_configuration = Some(expect_list(property, value)?.to_vec());
            }
            ServiceProperty::Domains => {
                self.domains = expect_list(property, value)?.to_vec();
            }
            ServiceProperty::DomainsConfiguration => {
                self.domains_configuration = Some(expect_list(property, value)?.to_vec());
            }
            ServiceProperty::Ipv4 => {
                self.ipv4 = self.parse_ipv4(property, value)?;
            }
            ServiceProperty::Ipv4Configuration => {
                self.ipv4_configuration = self.parse_ipv4(property, value)?;
            }
            ServiceProperty::Ipv6 => {
                self.ipv6 = self.parse_ipv6(property, value)?;
            }
            ServiceProperty::Ipv6Configuration => {
                self.ipv6_configuration = self.parse_ipv6(property, value)?;
            }
        }
        Ok(())
    }

    /// Flips the entry to ready. Returns `false` if it already was.
    pub(crate) fn mark_ready(&mut self) -> bool {
        !std::mem::replace(&mut self.ready, true)
    }

    /// Applies a user change to the cache.
    pub(crate) fn update(&mut self, change: ServiceChange) {
        match change {
            ServiceChange::Passphrase(p) => self.passphrase = Some(p),
            ServiceChange::AutoConnect(a) => self.autoconnect = a,
            ServiceChange::Apn(a) => self.apn = Some(a),
            ServiceChange::NameserversConfiguration(n) => self.nameservers_configuration = n,
            ServiceChange::DomainsConfiguration(d) => self.domains_configuration = d,
            ServiceChange::Ipv4Configuration(c) => self.ipv4_configuration = c,
            ServiceChange::Ipv6Configuration(c) => self.ipv6_configuration = c,
        }
    }

    /// The value to send with `SetProperty` for a writable property, built
    /// from the current cache. `None` means there is nothing to send.
    pub(crate) fn outgoing_value(&self, property: ServiceProperty) -> Option<PropertyValue> {
        match property {
            ServiceProperty::Passphrase => self.passphrase.clone().map(PropertyValue::Str),
            ServiceProperty::AutoConnect => Some(PropertyValue::Bool(self.autoconnect)),
            ServiceProperty::Apn => self.apn.clone().map(PropertyValue::Str),
            ServiceProperty::NameserversConfiguration => self
                .nameservers_configuration
                .clone()
                .map(PropertyValue::StrList),
            ServiceProperty::DomainsConfiguration => {
                self.domains_configuration.clone().map(PropertyValue::StrList)
            }
            ServiceProperty::Ipv4Configuration => self
                .ipv4_configuration
                .as_ref()
                .map(|c| PropertyValue::string_dict(c.to_pairs())),
            ServiceProperty::Ipv6Configuration => self
                .ipv6_configuration
                .as_ref()
                .map(|c| PropertyValue::string_dict(c.to_pairs())),
            _ => None,
        }
    }

    fn parse_ipv4(
        &self,
        property: ServiceProperty,
        value: &PropertyValue,
    ) -> Result<Option<Ipv4Config>> {
        let dict = expect_dict(property, value)?;
        let (mut method, mut address, mut netmask, mut gateway) = (None, None, None, None);

        for (key, value) in dict {
            let slot = match key.as_str() {
                ip_key::METHOD => &mut method,
                ip_key::ADDRESS => &mut address,
                ip_key::NETMASK => &mut netmask,
                ip_key::GATEWAY => &mut gateway,
                other => {
                    warn!("{}: unknown ipv4 key {other}", self.path);
                    continue;
                }
            };
            *slot = value.as_str();
            if slot.is_none() {
                warn!("{}: ipv4 {key} is a {}, ignoring", self.path, value.kind());
            }
        }

        // an empty dict means no configuration, e.g. for bluetooth
        if method.is_none() && address.is_none() && netmask.is_none() && gateway.is_none() {
            return Ok(None);
        }

        match Ipv4Config::from_strings(method, address, netmask, gateway) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!("{}: received invalid {property}: {e}", self.path);
                Ok(None)
            }
        }
    }

    fn parse_ipv6(
        &self,
        property: ServiceProperty,
        value: &PropertyValue,
    ) -> Result<Option<Ipv6Config>> {
        let dict = expect_dict(property, value)?;
        let (mut method, mut address, mut gateway) = (None, None, None);
        let mut prefix_length = None;

        for (key, value) in dict {
            match key.as_str() {
                ip_key::METHOD => method = value.as_str(),
                ip_key::ADDRESS => address = value.as_str(),
                ip_key::GATEWAY => gateway = value.as_str(),
                ip_key::PREFIX_LENGTH => prefix_length = value.as_byte(),
                other => warn!("{}: unknown ipv6 key {other}", self.path),
            }
        }

        if method.is_none() && address.is_none() && gateway.is_none() && prefix_length.is_none() {
            return Ok(None);
        }

        match Ipv6Config::from_strings(method, address, prefix_length.unwrap_or(0), gateway) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!("{}: received invalid {property}: {e}", self.path);
                Ok(None)
            }
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Identity of this entry's lifetime. A path that disappears and comes
    /// back gets a new token.
    pub fn token(&self) -> EntryToken {
        self.token
    }

    /// Whether the first full property fetch has completed.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Display name, `<unnamed>` until the manager reports one.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNNAMED_SERVICE)
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn mode(&self) -> ServiceMode {
        self.mode
    }

    pub fn security(&self) -> ServiceSecurity {
        self.security
    }

    pub fn login_required(&self) -> bool {
        self.login_required
    }

    /// Stored passphrase, or an empty string when there is none.
    pub fn passphrase(&self) -> &str {
        self.passphrase.as_deref().unwrap_or("")
    }

    pub fn passphrase_required(&self) -> bool {
        self.passphrase_required
    }

    /// Signal strength, 0 to 255.
    pub fn strength(&self) -> u8 {
        self.strength
    }

    pub fn favorite(&self) -> bool {
        self.favorite
    }

    pub fn immutable(&self) -> bool {
        self.immutable
    }

    pub fn autoconnect(&self) -> bool {
        self.autoconnect
    }

    pub fn setup_required(&self) -> bool {
        self.setup_required
    }

    pub fn apn(&self) -> Option<&str> {
        self.apn.as_deref()
    }

    pub fn mcc(&self) -> Option<&str> {
        self.mcc.as_deref()
    }

    pub fn mnc(&self) -> Option<&str> {
        self.mnc.as_deref()
    }

    pub fn roaming(&self) -> bool {
        self.roaming
    }

    /// Nameservers in use, as reported by the manager.
    pub fn nameservers(&self) -> &[String] {
        &self.nameservers
    }

    /// Nameservers configured by the user, if any.
    pub fn nameservers_configuration(&self) -> Option<&[String]> {
        self.nameservers_configuration.as_deref()
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn domains_configuration(&self) -> Option<&[String]> {
        self.domains_configuration.as_deref()
    }

    pub fn ipv4(&self) -> Option<&Ipv4Config> {
        self.ipv4.as_ref()
    }

    pub fn ipv4_configuration(&self) -> Option<&Ipv4Config> {
        self.ipv4_configuration.as_ref()
    }

    pub fn ipv6(&self) -> Option<&Ipv6Config> {
        self.ipv6.as_ref()
    }

    pub fn ipv6_configuration(&self) -> Option<&Ipv6Config> {
        self.ipv6_configuration.as_ref()
    }
}

fn expect_str(property: ServiceProperty, value: &PropertyValue) -> Result<&str> {
    value.as_str().ok_or(BarmanError::UnexpectedType {
        property: property.as_str(),
        expected: "string",
    })
}

fn expect_bool(property: ServiceProperty, value: &PropertyValue) -> Result<bool> {
    value.as_bool().ok_or(BarmanError::UnexpectedType {
        property: property.as_str(),
        expected: "bool",
    })
}

fn expect_list(property: ServiceProperty, value: &PropertyValue) -> Result<&[String]> {
    value.as_list().ok_or(BarmanError::UnexpectedType {
        property: property.as_str(),
        expected: "string list",
    })
}

fn expect_dict(
    property: ServiceProperty,
    value: &PropertyValue,
) -> Result<&std::collections::HashMap<String, PropertyValue>> {
    value.as_dict().ok_or(BarmanError::UnexpectedType {
        property: property.as_str(),
        expected: "dict",
    })
}
