//! The manager directory: a local mirror of the manager's services and
//! technologies.
//!
//! [`ManagerDirectory`] is a synchronous state machine. It never performs
//! I/O itself. Remote calls it needs are queued as [`Request`]s, and
//! notifications for consumers are queued as [`DirectoryEvent`]s. The owner
//! (normally the driver task behind [`Barman`](crate::Barman)) drains both
//! queues after every input and feeds call results back in.
//!
//! # Default service election
//!
//! The first path of every `Services` update becomes the pending default.
//! It is promoted once it is ready and in a qualifying state
//! (`ready`, `login` or `online`), and the default is dropped as soon as its
//! own state stops qualifying.
//!
//! # Stale replies
//!
//! Every fetch carries the [`EntryToken`] of the entry that asked for it. A
//! reply is applied only if an entry with that token still exists, so a
//! reply for a removed entry (or for an earlier lifetime of the same path)
//! is dropped.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::Result;
use crate::api::models::{BarmanError, TechnologyState, TechnologyType};
use crate::core::service::{ServiceChange, ServiceEntry};
use crate::core::technology::TechnologyEntry;
use crate::core::value::{
    ManagerProperty, PropertyValue, ServiceProperty, TechnologyProperty,
};

/// All properties of one object, as returned by `GetProperties`.
pub type PropertyMap = HashMap<String, PropertyValue>;

/// Identifies one lifetime of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryToken(u64);

impl EntryToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for EntryToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A remote object the directory talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectRef {
    Manager,
    Service(String),
    Technology(String),
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manager => write!(f, "manager"),
            Self::Service(path) => write!(f, "service {path}"),
            Self::Technology(path) => write!(f, "technology {path}"),
        }
    }
}

/// A remote call the directory wants performed.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Fetch every property of `target`. Report the result with
    /// [`ManagerDirectory::properties_fetched`] and the same token.
    GetProperties { target: ObjectRef, token: EntryToken },
    /// Write one property. Report the result with
    /// [`ManagerDirectory::property_set`].
    SetProperty {
        target: ObjectRef,
        name: &'static str,
        value: PropertyValue,
    },
}

/// Notifications for directory consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryEvent {
    /// The directory became synchronised with the manager, or lost it.
    ConnectedChanged(bool),
    /// The default service changed. Only sent while connected.
    DefaultServiceChanged(Option<String>),
    /// A service became ready. Only sent while connected; before that,
    /// consumers read the full list once `ConnectedChanged(true)` arrives.
    ServiceAdded(String),
    /// A service disappeared. Only sent while connected.
    ServiceRemoved(String),
    /// A property of a ready service changed.
    ServiceChanged {
        path: String,
        property: ServiceProperty,
    },
    /// The state of a technology kind changed.
    TechnologyStateChanged {
        kind: TechnologyType,
        state: TechnologyState,
    },
    OfflineModeChanged(bool),
}

/// Local mirror of the remote manager.
///
/// # Example
///
/// ```rust
/// use barman::{DirectoryEvent, ManagerDirectory, ObjectRef, PropertyValue, Request};
/// use std::collections::HashMap;
///
/// let mut dir = ManagerDirectory::new();
/// dir.manager_appeared();
///
/// let Some(Request::GetProperties { token, .. }) = dir.take_requests().pop() else {
///     unreachable!()
/// };
///
/// let mut props = HashMap::new();
/// props.insert("Services".to_owned(), PropertyValue::PathList(vec![]));
/// dir.properties_fetched(&ObjectRef::Manager, token, Ok(props));
///
/// assert!(dir.is_connected());
/// assert_eq!(dir.take_events(), vec![DirectoryEvent::ConnectedChanged(true)]);
/// ```
#[derive(Debug, Default)]
pub struct ManagerDirectory {
    services: HashMap<String, ServiceEntry>,
    service_order: Vec<String>,
    technologies: HashMap<String, TechnologyEntry>,
    technology_states: HashMap<TechnologyType, TechnologyState>,
    default_service: Option<String>,
    pending_default_service: Option<String>,
    connected: bool,
    initialised: bool,
    /// Set once the current manager instance's properties are applied.
    manager_fetched: bool,
    offline_mode: bool,
    manager_token: Option<EntryToken>,
    last_token: u64,
    requests: Vec<Request>,
    events: Vec<DirectoryEvent>,
}

impl ManagerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the queued remote calls.
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    /// Takes the queued notifications.
    pub fn take_events(&mut self) -> Vec<DirectoryEvent> {
        std::mem::take(&mut self.events)
    }

    /// The manager's bus name gained an owner.
    pub fn manager_appeared(&mut self) {
        info!("barman appeared");
        let token = self.next_token();
        self.manager_token = Some(token);
        self.manager_fetched = false;
        self.requests.push(Request::GetProperties {
            target: ObjectRef::Manager,
            token,
        });
    }

    /// The manager's bus name lost its owner.
    ///
    /// Every service is dropped, each with one `ServiceRemoved` if the
    /// directory was connected, followed by `ConnectedChanged(false)`.
    pub fn manager_vanished(&mut self) {
        info!("barman vanished");
        self.manager_token = None;
        self.manager_fetched = false;

        let report = self.connected || !self.initialised;

        let order = std::mem::take(&mut self.service_order);
        let mut services = std::mem::take(&mut self.services);
        self.pending_default_service = None;
        for path in order {
            if let Some(entry) = services.remove(&path) {
                self.remove_service(entry);
            }
        }

        self.drop_technologies();
        self.connected = false;
        self.initialised = true;
        if report {
            self.emit(DirectoryEvent::ConnectedChanged(false));
        }
    }

    /// Result of a [`Request::GetProperties`].
    pub fn properties_fetched(
        &mut self,
        target: &ObjectRef,
        token: EntryToken,
        result: Result<PropertyMap>,
    ) {
        match target {
            ObjectRef::Manager => self.manager_fetched(token, result),
            ObjectRef::Service(path) => self.service_fetched(path, token, result),
            ObjectRef::Technology(path) => self.technology_fetched(path, token, result),
        }
    }

    /// Result of a [`Request::SetProperty`]. Only logged: the cache keeps
    /// the value that was written.
    pub fn property_set(&mut self, target: &ObjectRef, name: &str, result: Result<()>) {
        match result {
            Ok(()) => debug!("{target}: {name} set"),
            Err(e) => warn!("{target}: failed to set {name}: {e}"),
        }
    }

    /// A `PropertyChanged` push from the manager or one of its objects.
    pub fn property_changed(&mut self, target: &ObjectRef, name: &str, value: PropertyValue) {
        match target {
            ObjectRef::Manager if !self.manager_ready() => {
                debug!("ignoring manager property {name} until properties are fetched");
            }
            ObjectRef::Manager => match name.parse::<ManagerProperty>() {
                Ok(property) => self.manager_property(property, &value),
                Err(_) => debug!("ignoring manager property {name}"),
            },
            ObjectRef::Service(path) => match name.parse::<ServiceProperty>() {
                Ok(property) => self.service_property_changed(path, property, &value),
                Err(e) => warn!("{path}: {e}"),
            },
            ObjectRef::Technology(path) => match name.parse::<TechnologyProperty>() {
                Ok(property) => self.technology_property_changed(path, property, &value),
                Err(_) => debug!("{path}: ignoring technology property {name}"),
            },
        }
    }

    fn manager_fetched(&mut self, token: EntryToken, result: Result<PropertyMap>) {
        if self.manager_token != Some(token) {
            debug!("dropping stale manager properties {token}");
            return;
        }

        let props = match result {
            Ok(props) => props,
            Err(e) => {
                warn!("failed to get barman properties: {e}");
                return;
            }
        };

        for (name, value) in &props {
            match name.parse::<ManagerProperty>() {
                Ok(property) => self.manager_property(property, value),
                Err(_) => debug!("ignoring manager property {name}"),
            }
        }

        self.initialised = true;
        self.manager_fetched = true;
        self.check_connected();
    }

    /// The manager is present and its bulk fetch has been applied.
    fn manager_ready(&self) -> bool {
        self.manager_token.is_some() && self.manager_fetched
    }

    fn manager_property(&mut self, property: ManagerProperty, value: &PropertyValue) {
        match (property, value) {
            (ManagerProperty::Services, PropertyValue::PathList(paths) | PropertyValue::StrList(paths)) => {
                self.update_services(paths);
            }
            (ManagerProperty::Technologies, PropertyValue::PathList(paths) | PropertyValue::StrList(paths)) => {
                self.update_technologies(paths);
            }
            (ManagerProperty::OfflineMode, PropertyValue::Bool(mode)) => {
                if self.offline_mode != *mode {
                    self.offline_mode = *mode;
                    self.emit(DirectoryEvent::OfflineModeChanged(*mode));
                }
            }
            (property, value) => warn!(
                "unexpected {} for manager property {}",
                value.kind(),
                property.as_str()
            ),
        }
    }

    /// Reconciles the service collection with a new `Services` list.
    ///
    /// Paths already known keep their entry. New paths get a fresh entry and
    /// a property fetch. Entries whose path is gone are removed. The first
    /// path becomes the pending default.
    pub fn update_services(&mut self, paths: &[String]) {
        let mut old = std::mem::take(&mut self.services);
        let old_order = std::mem::take(&mut self.service_order);

        for path in paths {
            if self.services.contains_key(path) {
                warn!("duplicate service path {path}");
                continue;
            }

            let entry = match old.remove(path) {
                Some(entry) => entry,
                None => self.create_service(path),
            };
            self.services.insert(path.clone(), entry);
            self.service_order.push(path.clone());
        }

        self.pending_default_service = paths.first().cloned();
        self.update_default_service();

        for path in old_order {
            if let Some(entry) = old.remove(&path) {
                self.remove_service(entry);
            }
        }

        if self.manager_ready() {
            self.check_connected();
        }
    }

    /// Re-runs the default service election.
    pub fn update_default_service(&mut self) {
        let mut changed = false;

        match self.pending_default_service.clone() {
            None => {
                if self.default_service.take().is_some() {
                    changed = true;
                }
            }
            Some(pending) if self.default_service.as_ref() != Some(&pending) => {
                let promotable = self
                    .services
                    .get(&pending)
                    .is_some_and(|s| s.is_ready() && s.state().is_qualifying());
                if promotable {
                    debug!("promoting {pending} to default service");
                    self.default_service = Some(pending);
                    self.pending_default_service = None;
                    changed = true;
                }
            }
            Some(_) => {}
        }

        if let Some(default) = &self.default_service {
            let qualifying = self
                .services
                .get(default)
                .is_some_and(|s| s.state().is_qualifying());
            if !qualifying {
                debug!("dropping {default} as default service");
                self.default_service = None;
                changed = true;
            }
        }

        if changed && self.connected {
            self.emit(DirectoryEvent::DefaultServiceChanged(
                self.default_service.clone(),
            ));
        }
    }

    /// Reconciles the technology collection with a new `Technologies` list.
    pub fn update_technologies(&mut self, paths: &[String]) {
        let mut old = std::mem::take(&mut self.technologies);

        for path in paths {
            if self.technologies.contains_key(path) {
                continue;
            }

            let entry = match old.remove(path) {
                Some(entry) => entry,
                None => self.create_technology(path),
            };
            self.technologies.insert(path.clone(), entry);
        }

        let mut removed: Vec<_> = old.into_values().collect();
        removed.sort_by(|a, b| a.path().cmp(b.path()));
        for entry in removed {
            self.remove_technology(entry);
        }
    }

    fn create_service(&mut self, path: &str) -> ServiceEntry {
        let token = self.next_token();
        debug!("new service {path} {token}");
        self.requests.push(Request::GetProperties {
            target: ObjectRef::Service(path.to_owned()),
            token,
        });
        ServiceEntry::new(path, token)
    }

    fn remove_service(&mut self, entry: ServiceEntry) {
        let path = entry.path();
        debug!("removing service {path}");

        if self.pending_default_service.as_deref() == Some(path) {
            self.pending_default_service = None;
        }

        if self.default_service.as_deref() == Some(path) {
            self.default_service = None;
            if self.connected {
                self.emit(DirectoryEvent::DefaultServiceChanged(None));
            }
        }

        if self.connected {
            self.emit(DirectoryEvent::ServiceRemoved(path.to_owned()));
        }
    }

    fn create_technology(&mut self, path: &str) -> TechnologyEntry {
        let token = self.next_token();
        debug!("new technology {path} {token}");
        self.requests.push(Request::GetProperties {
            target: ObjectRef::Technology(path.to_owned()),
            token,
        });
        TechnologyEntry::new(path, token)
    }

    fn remove_technology(&mut self, mut entry: TechnologyEntry) {
        debug!("removing technology {}", entry.path());
        entry.make_unavailable();
        self.report_technology(&entry);
    }

    fn drop_technologies(&mut self) {
        let mut removed: Vec<_> = self.technologies.drain().map(|(_, t)| t).collect();
        removed.sort_by(|a, b| a.path().cmp(b.path()));
        for entry in removed {
            self.remove_technology(entry);
        }
    }

    fn service_fetched(&mut self, path: &str, token: EntryToken, result: Result<PropertyMap>) {
        let Some(entry) = self.services.get_mut(path).filter(|e| e.token() == token) else {
            debug!("dropping stale properties for service {path} {token}");
            return;
        };

        let props = match result {
            Ok(props) => props,
            Err(e) => {
                warn!("{path}: failed to get service properties: {e}");
                return;
            }
        };

        for (name, value) in &props {
            match name.parse::<ServiceProperty>() {
                Ok(property) => {
                    if let Err(e) = entry.apply(property, value) {
                        warn!("{path}: {e}");
                    }
                }
                Err(e) => debug!("{path}: {e}"),
            }
        }

        if entry.mark_ready() {
            debug!("service {path} ready");
            self.service_ready(path);
        }
    }

    fn service_ready(&mut self, path: &str) {
        if self.pending_default_service.as_deref() == Some(path) {
            self.update_default_service();
        }

        if !self.connected {
            if self.manager_ready() {
                self.check_connected();
            }
            return;
        }

        self.emit(DirectoryEvent::ServiceAdded(path.to_owned()));
    }

    fn service_property_changed(
        &mut self,
        path: &str,
        property: ServiceProperty,
        value: &PropertyValue,
    ) {
        let Some(entry) = self.services.get_mut(path) else {
            debug!("{property} changed for unknown service {path}");
            return;
        };

        if let Err(e) = entry.apply(property, value) {
            warn!("{path}: {e}");
            return;
        }

        if entry.is_ready() {
            self.emit(DirectoryEvent::ServiceChanged {
                path: path.to_owned(),
                property,
            });
        }

        if property == ServiceProperty::State && self.is_default_candidate(path) {
            self.update_default_service();
        }
    }

    fn is_default_candidate(&self, path: &str) -> bool {
        self.pending_default_service.as_deref() == Some(path)
            || self.default_service.as_deref() == Some(path)
    }

    fn technology_fetched(&mut self, path: &str, token: EntryToken, result: Result<PropertyMap>) {
        let Some(entry) = self.technologies.get_mut(path).filter(|e| e.token() == token) else {
            debug!("dropping stale properties for technology {path} {token}");
            return;
        };

        let props = match result {
            Ok(props) => props,
            Err(e) => {
                warn!("{path}: failed to get technology properties: {e}");
                return;
            }
        };

        for (name, value) in &props {
            let Ok(property) = name.parse::<TechnologyProperty>() else {
                continue;
            };
            if let Err(e) = entry.apply(property, value) {
                warn!("{path}: {e}");
            }
        }
        entry.mark_ready();

        // both properties are known now, whatever order they came in
        let entry = entry.clone();
        self.report_technology(&entry);
    }

    fn technology_property_changed(
        &mut self,
        path: &str,
        property: TechnologyProperty,
        value: &PropertyValue,
    ) {
        let Some(entry) = self.technologies.get_mut(path) else {
            warn!("did not find technology {path} for {} update", property.as_str());
            return;
        };

        if let Err(e) = entry.apply(property, value) {
            warn!("{path}: {e}");
            return;
        }

        let entry = entry.clone();
        self.report_technology(&entry);
    }

    fn report_technology(&mut self, entry: &TechnologyEntry) {
        let Some((kind, state)) = entry.reportable() else {
            return;
        };

        let current = self.technology_states.entry(kind).or_default();
        if *current == state {
            return;
        }

        *current = state;
        debug!("{kind} technology is now {state}");
        self.emit(DirectoryEvent::TechnologyStateChanged { kind, state });
    }

    fn check_connected(&mut self) {
        if self.connected {
            return;
        }

        if self.services.values().all(ServiceEntry::is_ready) {
            self.connected = true;
            info!("synchronised with barman, {} services", self.services.len());
            self.emit(DirectoryEvent::ConnectedChanged(true));
        }
    }

    /// Applies a user change to a service and writes it through to the
    /// manager.
    ///
    /// The cache is updated at once; the remote result is only logged.
    pub fn update_service(&mut self, path: &str, change: ServiceChange) -> Result<()> {
        let entry = self
            .services
            .get_mut(path)
            .ok_or_else(|| BarmanError::ServiceNotFound(path.to_owned()))?;

        let property = change.property();
        entry.update(change);
        let ready = entry.is_ready();
        let outgoing = entry.outgoing_value(property);

        if ready {
            self.emit(DirectoryEvent::ServiceChanged {
                path: path.to_owned(),
                property,
            });
        }

        match outgoing {
            Some(value) => self.requests.push(Request::SetProperty {
                target: ObjectRef::Service(path.to_owned()),
                name: property.as_str(),
                value,
            }),
            None => debug!("{path}: {property} cleared locally, nothing to send"),
        }
        Ok(())
    }

    pub fn set_passphrase(&mut self, path: &str, passphrase: impl Into<String>) -> Result<()> {
        self.update_service(path, ServiceChange::Passphrase(passphrase.into()))
    }

    pub fn set_autoconnect(&mut self, path: &str, autoconnect: bool) -> Result<()> {
        self.update_service(path, ServiceChange::AutoConnect(autoconnect))
    }

    pub fn set_apn(&mut self, path: &str, apn: impl Into<String>) -> Result<()> {
        self.update_service(path, ServiceChange::Apn(apn.into()))
    }

    pub fn set_nameservers_configuration(
        &mut self,
        path: &str,
        nameservers: Option<Vec<String>>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::NameserversConfiguration(nameservers))
    }

    pub fn set_domains_configuration(
        &mut self,
        path: &str,
        domains: Option<Vec<String>>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::DomainsConfiguration(domains))
    }

    pub fn set_ipv4_configuration(
        &mut self,
        path: &str,
        config: Option<crate::Ipv4Config>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::Ipv4Configuration(config))
    }

    pub fn set_ipv6_configuration(
        &mut self,
        path: &str,
        config: Option<crate::Ipv6Config>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::Ipv6Configuration(config))
    }

    /// Sets offline mode locally and writes it through to the manager.
    pub fn set_offline_mode(&mut self, mode: bool) {
        if self.offline_mode != mode {
            self.offline_mode = mode;
            self.emit(DirectoryEvent::OfflineModeChanged(mode));
        }
        self.requests.push(Request::SetProperty {
            target: ObjectRef::Manager,
            name: ManagerProperty::OfflineMode.as_str(),
            value: PropertyValue::Bool(mode),
        });
    }

    /// Ready services in the manager's order. Empty while not connected.
    pub fn services(&self) -> Vec<&ServiceEntry> {
        if !self.connected {
            return Vec::new();
        }

        self.service_order
            .iter()
            .filter_map(|path| self.services.get(path))
            .filter(|s| s.is_ready())
            .collect()
    }

    /// Looks up a service by path, ready or not.
    pub fn service(&self, path: &str) -> Option<&ServiceEntry> {
        self.services.get(path)
    }

    pub fn default_service(&self) -> Option<&ServiceEntry> {
        self.default_service
            .as_deref()
            .and_then(|path| self.services.get(path))
    }

    /// Path of the service waiting to become the default, if any.
    pub fn pending_default_service(&self) -> Option<&str> {
        self.pending_default_service.as_deref()
    }

    pub fn technologies(&self) -> impl Iterator<Item = &TechnologyEntry> {
        self.technologies.values()
    }

    /// Last reported state for a technology kind.
    pub fn technology_state(&self, kind: TechnologyType) -> TechnologyState {
        self.technology_states
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn offline_mode(&self) -> bool {
        self.offline_mode
    }

    /// A read-only copy of the directory for sharing across tasks.
    pub fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            connected: self.connected,
            offline_mode: self.offline_mode,
            services: self
                .service_order
                .iter()
                .filter_map(|path| self.services.get(path))
                .cloned()
                .collect(),
            default_service: self.default_service.clone(),
            technologies: {
                let mut technologies: Vec<_> = self.technologies.values().cloned().collect();
                technologies.sort_by(|a, b| a.path().cmp(b.path()));
                technologies
            },
            technology_states: self.technology_states.clone(),
        }
    }

    fn next_token(&mut self) -> EntryToken {
        self.last_token += 1;
        EntryToken::new(self.last_token)
    }

    fn emit(&mut self, event: DirectoryEvent) {
        debug!("event: {event:?}");
        self.events.push(event);
    }
}

/// A point-in-time copy of a [`ManagerDirectory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    connected: bool,
    offline_mode: bool,
    services: Vec<ServiceEntry>,
    default_service: Option<String>,
    technologies: Vec<TechnologyEntry>,
    technology_states: HashMap<TechnologyType, TechnologyState>,
}

impl DirectorySnapshot {
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn offline_mode(&self) -> bool {
        self.offline_mode
    }

    /// Ready services in the manager's order. Empty while not connected.
    pub fn services(&self) -> Vec<&ServiceEntry> {
        if !self.connected {
            return Vec::new();
        }
        self.services.iter().filter(|s| s.is_ready()).collect()
    }

    pub fn service(&self, path: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.path() == path)
    }

    pub fn default_service(&self) -> Option<&ServiceEntry> {
        self.default_service
            .as_deref()
            .and_then(|path| self.service(path))
    }

    /// Known technologies, sorted by path.
    pub fn technologies(&self) -> &[TechnologyEntry] {
        &self.technologies
    }

    pub fn technology_state(&self, kind: TechnologyType) -> TechnologyState {
        self.technology_states
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ServiceState;

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| (*p).to_owned()).collect()
    }

    fn props(pairs: &[(&str, PropertyValue)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn fetch_token(requests: &[Request], wanted: &ObjectRef) -> EntryToken {
        requests
            .iter()
            .find_map(|r| match r {
                Request::GetProperties { target, token } if target == wanted => Some(*token),
                _ => None,
            })
            .expect("no fetch queued")
    }

    /// Brings up a manager that lists `services`, without answering the
    /// service fetches. Returns the queued requests.
    fn appear_with(dir: &mut ManagerDirectory, services: &[&str]) -> Vec<Request> {
        dir.manager_appeared();
        let token = fetch_token(&dir.take_requests(), &ObjectRef::Manager);
        dir.properties_fetched(
            &ObjectRef::Manager,
            token,
            Ok(props(&[("Services", PropertyValue::PathList(paths(services)))])),
        );
        dir.take_requests()
    }

    fn finish_service(
        dir: &mut ManagerDirectory,
        requests: &[Request],
        path: &str,
        state: &str,
    ) {
        let target = ObjectRef::Service(path.to_owned());
        let token = fetch_token(requests, &target);
        dir.properties_fetched(
            &target,
            token,
            Ok(props(&[("State", state.into()), ("Name", path.into())])),
        );
    }

    fn push_state(dir: &mut ManagerDirectory, path: &str, state: &str) {
        dir.property_changed(&ObjectRef::Service(path.to_owned()), "State", state.into());
    }

    fn assert_default_invariant(dir: &ManagerDirectory) {
        if let Some(default) = dir.default_service() {
            assert!(default.is_ready());
            assert!(default.state().is_qualifying());
        }
    }

    #[test]
    fn zero_services_connects_immediately() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &[]);
        assert!(requests.is_empty());
        assert!(dir.is_connected());
        assert_eq!(dir.take_events(), vec![DirectoryEvent::ConnectedChanged(true)]);
    }

    #[test]
    fn connected_only_after_last_service_ready() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a", "/b"]);
        assert!(!dir.is_connected());

        finish_service(&mut dir, &requests, "/a", "idle");
        assert!(!dir.is_connected());

        finish_service(&mut dir, &requests, "/b", "idle");
        assert!(dir.is_connected());
        let events = dir.take_events();
        assert_eq!(events, vec![DirectoryEvent::ConnectedChanged(true)]);
    }

    #[test]
    fn readiness_gate() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &[]);
        assert!(requests.is_empty());
        dir.take_events();

        dir.update_services(&paths(&["/a", "/b"]));
        let requests = dir.take_requests();
        assert!(dir.services().is_empty());

        finish_service(&mut dir, &requests, "/b", "idle");
        let visible: Vec<_> = dir.services().iter().map(|s| s.path()).collect();
        assert_eq!(visible, vec!["/b"]);
        assert_eq!(dir.take_events(), vec![DirectoryEvent::ServiceAdded("/b".into())]);

        // not ready services are still reachable by path
        assert!(!dir.service("/a").unwrap().is_ready());
    }

    #[test]
    fn identity_preserved_across_updates() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a", "/b"]);
        finish_service(&mut dir, &requests, "/a", "online");

        let token_a = dir.service("/a").unwrap().token();
        let token_b = dir.service("/b").unwrap().token();

        dir.update_services(&paths(&["/b", "/c", "/a"]));
        let requests = dir.take_requests();

        assert_eq!(dir.service("/a").unwrap().token(), token_a);
        assert_eq!(dir.service("/b").unwrap().token(), token_b);
        // cached values survive the update
        assert_eq!(dir.service("/a").unwrap().state(), ServiceState::Online);
        assert!(dir.service("/a").unwrap().is_ready());
        // only the new path is fetched
        assert_eq!(requests.len(), 1);
        fetch_token(&requests, &ObjectRef::Service("/c".into()));
    }

    #[test]
    fn election_scenario() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a", "/b"]);
        finish_service(&mut dir, &requests, "/b", "idle");

        finish_service(&mut dir, &requests, "/a", "association");
        assert!(dir.is_connected());
        assert!(dir.default_service().is_none());
        assert_default_invariant(&dir);
        dir.take_events();

        push_state(&mut dir, "/a", "online");
        assert_eq!(dir.default_service().unwrap().path(), "/a");
        assert_default_invariant(&dir);
        let events = dir.take_events();
        assert!(events.contains(&DirectoryEvent::DefaultServiceChanged(Some("/a".into()))));

        dir.update_services(&paths(&["/a"]));
        let events = dir.take_events();
        assert_eq!(events, vec![DirectoryEvent::ServiceRemoved("/b".into())]);
        assert_eq!(dir.default_service().unwrap().path(), "/a");
    }

    #[test]
    fn default_dropped_when_state_stops_qualifying() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "ready");
        assert_eq!(dir.default_service().unwrap().path(), "/a");
        dir.take_events();

        push_state(&mut dir, "/a", "disconnect");
        assert!(dir.default_service().is_none());
        assert_default_invariant(&dir);
        let events = dir.take_events();
        assert!(events.contains(&DirectoryEvent::DefaultServiceChanged(None)));

        // promotion consumed the candidate, so only a new list brings it back
        push_state(&mut dir, "/a", "online");
        assert!(dir.default_service().is_none());
        dir.update_services(&paths(&["/a"]));
        assert_eq!(dir.default_service().unwrap().path(), "/a");
    }

    #[test]
    fn promotion_consumes_candidate() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "ready");
        assert_eq!(dir.pending_default_service(), None);
        dir.take_events();

        // with no candidate left, the next state change of the default
        // releases it until the manager pushes a new list
        push_state(&mut dir, "/a", "online");
        assert!(dir.default_service().is_none());
        assert!(
            dir.take_events()
                .contains(&DirectoryEvent::DefaultServiceChanged(None))
        );

        dir.update_services(&paths(&["/a"]));
        assert_eq!(dir.default_service().unwrap().path(), "/a");
        assert_eq!(
            dir.take_events(),
            vec![DirectoryEvent::DefaultServiceChanged(Some("/a".into()))]
        );
    }

    #[test]
    fn default_events_suppressed_until_connected() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a", "/b"]);
        finish_service(&mut dir, &requests, "/a", "online");

        // /a is already default, but nothing is announced yet
        assert_eq!(dir.default_service().unwrap().path(), "/a");
        assert!(dir.take_events().is_empty());

        finish_service(&mut dir, &requests, "/b", "idle");
        assert_eq!(dir.take_events(), vec![DirectoryEvent::ConnectedChanged(true)]);
    }

    #[test]
    fn new_first_path_replaces_default() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "online");
        dir.take_events();

        dir.update_services(&paths(&["/b", "/a"]));
        let requests = dir.take_requests();
        // /b is pending but not ready, /a stays default
        assert_eq!(dir.default_service().unwrap().path(), "/a");
        assert_eq!(dir.pending_default_service(), Some("/b"));

        finish_service(&mut dir, &requests, "/b", "ready");
        assert_eq!(dir.default_service().unwrap().path(), "/b");
        assert_eq!(
            dir.take_events(),
            vec![
                DirectoryEvent::DefaultServiceChanged(Some("/b".into())),
                DirectoryEvent::ServiceAdded("/b".into()),
            ]
        );
    }

    #[test]
    fn removing_default_clears_it() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "online");
        dir.take_events();

        dir.update_services(&[]);
        assert!(dir.default_service().is_none());
        assert_eq!(dir.pending_default_service(), None);
        assert_eq!(
            dir.take_events(),
            vec![
                DirectoryEvent::DefaultServiceChanged(None),
                DirectoryEvent::ServiceRemoved("/a".into()),
            ]
        );
    }

    #[test]
    fn connected_round_trip() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a", "/b", "/c"]);
        for path in ["/a", "/b", "/c"] {
            finish_service(&mut dir, &requests, path, "idle");
        }
        assert!(dir.is_connected());
        let tokens: Vec<_> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| dir.service(p).unwrap().token())
            .collect();
        dir.take_events();

        dir.manager_vanished();
        assert!(!dir.is_connected());
        assert!(dir.service("/a").is_none());
        let events = dir.take_events();
        for path in ["/a", "/b", "/c"] {
            let removals = events
                .iter()
                .filter(|e| **e == DirectoryEvent::ServiceRemoved(path.into()))
                .count();
            assert_eq!(removals, 1, "{path}");
        }
        assert_eq!(events.last(), Some(&DirectoryEvent::ConnectedChanged(false)));

        let requests = appear_with(&mut dir, &["/a", "/b", "/c"]);
        for path in ["/a", "/b", "/c"] {
            finish_service(&mut dir, &requests, path, "idle");
        }
        assert!(dir.is_connected());
        for (path, old) in ["/a", "/b", "/c"].iter().zip(tokens) {
            assert_ne!(dir.service(path).unwrap().token(), old);
        }
    }

    #[test]
    fn vanish_during_init_reports_disconnected_once() {
        let mut dir = ManagerDirectory::new();
        dir.manager_vanished();
        assert_eq!(dir.take_events(), vec![DirectoryEvent::ConnectedChanged(false)]);

        dir.manager_vanished();
        assert!(dir.take_events().is_empty());
    }

    #[test]
    fn manager_push_after_vanish_is_ignored() {
        let mut dir = ManagerDirectory::new();
        appear_with(&mut dir, &[]);
        assert!(dir.is_connected());
        dir.manager_vanished();
        dir.take_events();

        dir.property_changed(
            &ObjectRef::Manager,
            "Services",
            PropertyValue::PathList(paths(&["/a"])),
        );
        assert!(!dir.is_connected());
        assert!(dir.service("/a").is_none());
        assert!(dir.take_requests().is_empty());
        assert!(dir.take_events().is_empty());

        // the next instance starts from scratch
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "online");
        assert!(dir.is_connected());
    }

    #[test]
    fn manager_push_before_fetch_is_ignored() {
        let mut dir = ManagerDirectory::new();
        dir.manager_vanished();
        dir.take_events();

        dir.manager_appeared();
        let token = fetch_token(&dir.take_requests(), &ObjectRef::Manager);
        dir.property_changed(&ObjectRef::Manager, "Services", PropertyValue::PathList(vec![]));
        dir.property_changed(&ObjectRef::Manager, "OfflineMode", true.into());
        assert!(!dir.is_connected());
        assert!(!dir.offline_mode());
        assert!(dir.take_events().is_empty());

        dir.properties_fetched(
            &ObjectRef::Manager,
            token,
            Ok(props(&[("Services", PropertyValue::PathList(vec![]))])),
        );
        assert!(dir.is_connected());
        assert_eq!(dir.take_events(), vec![DirectoryEvent::ConnectedChanged(true)]);
    }

    #[test]
    fn failed_manager_fetch_keeps_pushes_out() {
        let mut dir = ManagerDirectory::new();
        dir.manager_appeared();
        let token = fetch_token(&dir.take_requests(), &ObjectRef::Manager);
        dir.properties_fetched(&ObjectRef::Manager, token, Err(BarmanError::Remote("gone".into())));

        dir.property_changed(&ObjectRef::Manager, "Services", PropertyValue::PathList(vec![]));
        assert!(!dir.is_connected());
    }

    #[test]
    fn stale_service_reply_ignored() {
        let mut dir = ManagerDirectory::new();
        let first = appear_with(&mut dir, &["/a"]);

        dir.update_services(&[]);
        dir.update_services(&paths(&["/a"]));
        let second = dir.take_requests();

        // reply for the removed lifetime of /a
        finish_service(&mut dir, &first, "/a", "online");
        assert!(!dir.service("/a").unwrap().is_ready());

        finish_service(&mut dir, &second, "/a", "online");
        assert!(dir.service("/a").unwrap().is_ready());
    }

    #[test]
    fn stale_manager_reply_ignored() {
        let mut dir = ManagerDirectory::new();
        dir.manager_appeared();
        let token = fetch_token(&dir.take_requests(), &ObjectRef::Manager);
        dir.manager_vanished();
        dir.take_events();

        dir.properties_fetched(
            &ObjectRef::Manager,
            token,
            Ok(props(&[("Services", PropertyValue::PathList(vec![]))])),
        );
        assert!(!dir.is_connected());
        assert!(dir.take_events().is_empty());
    }

    #[test]
    fn failed_fetch_leaves_service_not_ready() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        let target = ObjectRef::Service("/a".into());
        let token = fetch_token(&requests, &target);
        dir.properties_fetched(&target, token, Err(BarmanError::Remote("denied".into())));
        assert!(!dir.service("/a").unwrap().is_ready());
        assert!(!dir.is_connected());
    }

    #[test]
    fn unknown_service_property_is_dropped() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "idle");
        dir.take_events();

        dir.property_changed(&ObjectRef::Service("/a".into()), "Provider", "x".into());
        assert!(dir.take_events().is_empty());
    }

    #[test]
    fn write_through_then_push_overwrites() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "idle");
        dir.take_events();

        dir.set_passphrase("/a", "first-secret").unwrap();
        assert_eq!(dir.service("/a").unwrap().passphrase(), "first-secret");
        assert_eq!(
            dir.take_requests(),
            vec![Request::SetProperty {
                target: ObjectRef::Service("/a".into()),
                name: "Passphrase",
                value: "first-secret".into(),
            }]
        );

        // the write failing does not roll the cache back
        dir.property_set(
            &ObjectRef::Service("/a".into()),
            "Passphrase",
            Err(BarmanError::Remote("rejected".into())),
        );
        assert_eq!(dir.service("/a").unwrap().passphrase(), "first-secret");

        dir.property_changed(
            &ObjectRef::Service("/a".into()),
            "Passphrase",
            "from-remote".into(),
        );
        assert_eq!(dir.service("/a").unwrap().passphrase(), "from-remote");
        let events = dir.take_events();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn clearing_configuration_sends_nothing() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a"]);
        finish_service(&mut dir, &requests, "/a", "idle");

        dir.set_nameservers_configuration("/a", None).unwrap();
        assert!(dir.take_requests().is_empty());

        dir.set_domains_configuration("/a", Some(paths(&["example.org"])))
            .unwrap();
        assert_eq!(
            dir.take_requests(),
            vec![Request::SetProperty {
                target: ObjectRef::Service("/a".into()),
                name: "Domains.Configuration",
                value: PropertyValue::StrList(paths(&["example.org"])),
            }]
        );
    }

    #[test]
    fn mutating_unknown_service_fails() {
        let mut dir = ManagerDirectory::new();
        let err = dir.set_autoconnect("/nope", true).unwrap_err();
        assert!(matches!(err, BarmanError::ServiceNotFound(ref p) if p == "/nope"));
        assert!(dir.take_requests().is_empty());
    }

    #[test]
    fn offline_mode_write_through_and_push() {
        let mut dir = ManagerDirectory::new();
        appear_with(&mut dir, &[]);
        dir.take_events();

        dir.set_offline_mode(true);
        assert!(dir.offline_mode());
        assert_eq!(dir.take_events(), vec![DirectoryEvent::OfflineModeChanged(true)]);
        assert_eq!(
            dir.take_requests(),
            vec![Request::SetProperty {
                target: ObjectRef::Manager,
                name: "OfflineMode",
                value: PropertyValue::Bool(true),
            }]
        );

        // echo of the same value is not a change
        dir.property_changed(&ObjectRef::Manager, "OfflineMode", true.into());
        assert!(dir.take_events().is_empty());

        dir.property_changed(&ObjectRef::Manager, "OfflineMode", false.into());
        assert_eq!(dir.take_events(), vec![DirectoryEvent::OfflineModeChanged(false)]);
    }

    #[test]
    fn technology_state_waits_for_type() {
        let mut dir = ManagerDirectory::new();
        appear_with(&mut dir, &[]);
        dir.take_events();

        dir.update_technologies(&paths(&["/tech/wifi"]));
        dir.take_requests();
        let target = ObjectRef::Technology("/tech/wifi".into());

        dir.property_changed(&target, "State", "enabled".into());
        assert!(dir.take_events().is_empty());
        assert_eq!(dir.technology_state(TechnologyType::Wifi), TechnologyState::Unknown);

        dir.property_changed(&target, "Type", "wifi".into());
        assert_eq!(
            dir.take_events(),
            vec![DirectoryEvent::TechnologyStateChanged {
                kind: TechnologyType::Wifi,
                state: TechnologyState::Enabled,
            }]
        );
        assert_eq!(dir.technology_state(TechnologyType::Wifi), TechnologyState::Enabled);
    }

    #[test]
    fn technology_fetch_reports_once() {
        let mut dir = ManagerDirectory::new();
        dir.update_technologies(&paths(&["/tech/eth"]));
        let target = ObjectRef::Technology("/tech/eth".into());
        let token = fetch_token(&dir.take_requests(), &target);

        dir.properties_fetched(
            &target,
            token,
            Ok(props(&[("State", "connected".into()), ("Type", "ethernet".into())])),
        );
        assert_eq!(
            dir.take_events(),
            vec![DirectoryEvent::TechnologyStateChanged {
                kind: TechnologyType::Ethernet,
                state: TechnologyState::Connected,
            }]
        );

        // same state again is not a change
        dir.property_changed(&target, "State", "connected".into());
        assert!(dir.take_events().is_empty());
    }

    #[test]
    fn technology_removal_reports_unavailable() {
        let mut dir = ManagerDirectory::new();
        dir.update_technologies(&paths(&["/tech/bt"]));
        let target = ObjectRef::Technology("/tech/bt".into());
        let token = fetch_token(&dir.take_requests(), &target);
        dir.properties_fetched(
            &target,
            token,
            Ok(props(&[("Type", "bluetooth".into()), ("State", "enabled".into())])),
        );
        dir.take_events();

        dir.update_technologies(&[]);
        assert_eq!(
            dir.take_events(),
            vec![DirectoryEvent::TechnologyStateChanged {
                kind: TechnologyType::Bluetooth,
                state: TechnologyState::Unavailable,
            }]
        );
        assert_eq!(dir.technologies().count(), 0);
    }

    #[test]
    fn snapshot_matches_directory() {
        let mut dir = ManagerDirectory::new();
        let requests = appear_with(&mut dir, &["/a", "/b"]);
        finish_service(&mut dir, &requests, "/a", "online");
        finish_service(&mut dir, &requests, "/b", "idle");

        let snap = dir.snapshot();
        assert!(snap.is_connected());
        assert_eq!(snap.services().len(), 2);
        assert_eq!(snap.default_service().unwrap().path(), "/a");
        assert_eq!(snap.service("/b").unwrap().name(), "/b");
    }
}
