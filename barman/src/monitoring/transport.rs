//! The seam between the directory driver and the bus.
//!
//! [`Transport`] is everything the driver needs from the outside world:
//! property fetches and writes, the remote actions, and one merged stream of
//! [`BusEvent`]s. [`BusTransport`] implements it on a zbus connection;
//! tests implement it in memory.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use zbus::fdo::DBusProxy;
use zbus::message::Type as MessageType;
use zbus::names::BusName;
use zbus::{Connection, MatchRule, Message, MessageStream};
use zvariant::{OwnedValue, Value};

use crate::Result;
use crate::api::config::BarmanConfig;
use crate::api::models::{ServiceParams, TechnologyType};
use crate::core::directory::{ObjectRef, PropertyMap};
use crate::core::value::PropertyValue;
use crate::dbus::{BarmanManagerProxy, BarmanServiceProxy, BarmanTechnologyProxy};
use crate::types::constants::{PROPERTY_CHANGED, connect_service_key, interface};
use crate::util::utils::{property_map, property_value, to_variant};

/// Something that happened on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// The daemon's bus name gained an owner.
    Appeared,
    /// The daemon's bus name lost its owner.
    Vanished,
    /// A `PropertyChanged` signal.
    PropertyChanged {
        target: ObjectRef,
        name: String,
        value: PropertyValue,
    },
}

/// A remote call made on behalf of the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connect(String),
    Disconnect(String),
    EnableTechnology(TechnologyType),
    DisableTechnology(TechnologyType),
}

/// Access to a barman daemon.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Subscribes to bus events.
    ///
    /// Implementations subscribe before checking whether the daemon is
    /// present, and start the stream with [`BusEvent::Appeared`] if it is.
    async fn events(&self) -> Result<BoxStream<'static, BusEvent>>;

    /// Fetches all properties of one object.
    async fn get_properties(&self, target: &ObjectRef) -> Result<PropertyMap>;

    /// Writes one property of one object.
    async fn set_property(&self, target: &ObjectRef, name: &str, value: &PropertyValue)
    -> Result<()>;

    /// Runs a connect, disconnect or technology call.
    async fn call(&self, action: &Action) -> Result<()>;

    /// Asks the manager to connect to a service described by `params`.
    /// Returns the path of the resulting service.
    async fn connect_service(&self, params: &ServiceParams) -> Result<String>;
}

/// [`Transport`] over a zbus connection.
#[derive(Debug, Clone)]
pub struct BusTransport {
    conn: Connection,
    bus_name: String,
    manager_path: String,
}

impl BusTransport {
    pub fn new(conn: Connection, config: &BarmanConfig) -> Self {
        Self {
            conn,
            bus_name: config.bus_name.clone(),
            manager_path: config.manager_path.clone(),
        }
    }

    async fn manager(&self) -> Result<BarmanManagerProxy<'_>> {
        Ok(BarmanManagerProxy::builder(&self.conn)
            .destination(self.bus_name.as_str())?
            .path(self.manager_path.as_str())?
            .build()
            .await?)
    }

    async fn service(&self, path: &str) -> Result<BarmanServiceProxy<'_>> {
        Ok(BarmanServiceProxy::builder(&self.conn)
            .destination(self.bus_name.as_str())?
            .path(path.to_owned())?
            .build()
            .await?)
    }

    async fn technology(&self, path: &str) -> Result<BarmanTechnologyProxy<'_>> {
        Ok(BarmanTechnologyProxy::builder(&self.conn)
            .destination(self.bus_name.as_str())?
            .path(path.to_owned())?
            .build()
            .await?)
    }

    async fn owner_events(&self) -> Result<BoxStream<'static, BusEvent>> {
        let dbus = DBusProxy::new(&self.conn).await?;
        let stream = dbus
            .receive_name_owner_changed_with_args(&[(0, self.bus_name.as_str())])
            .await?;

        Ok(stream
            .filter_map(|signal| async move {
                match signal.args() {
                    Ok(args) => Some(owner_change(
                        args.old_owner().is_some(),
                        args.new_owner().is_some(),
                    )),
                    Err(e) => {
                        warn!("Failed to parse NameOwnerChanged signal args: {e}");
                        None
                    }
                }
            })
            .flat_map(stream::iter)
            .boxed())
    }

    async fn property_events(&self) -> Result<BoxStream<'static, BusEvent>> {
        let rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(self.bus_name.as_str())?
            .member(PROPERTY_CHANGED)?
            .build();
        let stream = MessageStream::for_match_rule(rule, &self.conn, None).await?;

        Ok(stream
            .filter_map(|msg| async move {
                match msg {
                    Ok(msg) => property_event(&msg),
                    Err(e) => {
                        warn!("Error on PropertyChanged stream: {e}");
                        None
                    }
                }
            })
            .boxed())
    }

    async fn has_owner(&self) -> Result<bool> {
        let dbus = DBusProxy::new(&self.conn).await?;
        let name = BusName::try_from(self.bus_name.as_str()).map_err(zbus::Error::from)?;
        Ok(dbus
            .name_has_owner(name)
            .await
            .map_err(zbus::Error::from)?)
    }
}

/// Events for one `NameOwnerChanged`. A handover from one owner to another
/// is the old daemon vanishing and the new one appearing.
fn owner_change(had_owner: bool, has_owner: bool) -> Vec<BusEvent> {
    let mut events = Vec::with_capacity(2);
    if had_owner {
        events.push(BusEvent::Vanished);
    }
    if has_owner {
        events.push(BusEvent::Appeared);
    }
    events
}

/// Turns a `PropertyChanged` signal into a [`BusEvent`], using the sender's
/// interface to tell managers, services and technologies apart.
fn property_event(msg: &Message) -> Option<BusEvent> {
    let header = msg.header();
    let path = header.path()?.as_str().to_owned();
    let target = match header.interface()?.as_str() {
        interface::MANAGER => ObjectRef::Manager,
        interface::SERVICE => ObjectRef::Service(path),
        interface::TECHNOLOGY => ObjectRef::Technology(path),
        other => {
            debug!("Ignoring PropertyChanged from {other}");
            return None;
        }
    };

    let body = msg.body();
    let (name, value): (String, OwnedValue) = match body.deserialize() {
        Ok(args) => args,
        Err(e) => {
            warn!("Failed to parse PropertyChanged signal args: {e}");
            return None;
        }
    };

    match property_value(&value) {
        Some(value) => Some(BusEvent::PropertyChanged {
            target,
            name,
            value,
        }),
        None => {
            warn!("{target}: ignoring {name} with unsupported signature");
            None
        }
    }
}

#[async_trait]
impl Transport for BusTransport {
    async fn events(&self) -> Result<BoxStream<'static, BusEvent>> {
        // Subscribe to signals FIRST to avoid race condition
        let owners = self.owner_events().await?;
        let properties = self.property_events().await?;
        debug!("Subscribed to NameOwnerChanged and PropertyChanged for {}", self.bus_name);

        let initial = if self.has_owner().await? {
            vec![BusEvent::Appeared]
        } else {
            debug!("{} is not running yet", self.bus_name);
            vec![BusEvent::Vanished]
        };

        Ok(stream::iter(initial)
            .chain(stream::select(owners, properties))
            .boxed())
    }

    async fn get_properties(&self, target: &ObjectRef) -> Result<PropertyMap> {
        let raw = match target {
            ObjectRef::Manager => self.manager().await?.get_properties().await?,
            ObjectRef::Service(path) => self.service(path).await?.get_properties().await?,
            ObjectRef::Technology(path) => self.technology(path).await?.get_properties().await?,
        };
        Ok(property_map(raw))
    }

    async fn set_property(
        &self,
        target: &ObjectRef,
        name: &str,
        value: &PropertyValue,
    ) -> Result<()> {
        let value = to_variant(value)?;
        match target {
            ObjectRef::Manager => self.manager().await?.set_property(name, &value).await?,
            ObjectRef::Service(path) => self.service(path).await?.set_property(name, &value).await?,
            ObjectRef::Technology(path) => {
                warn!("Technology {path} has no writable properties");
            }
        }
        Ok(())
    }

    async fn call(&self, action: &Action) -> Result<()> {
        match action {
            Action::Connect(path) => self.service(path).await?.connect().await?,
            Action::Disconnect(path) => self.service(path).await?.disconnect().await?,
            Action::EnableTechnology(kind) => {
                self.manager().await?.enable_technology(kind.as_str()).await?
            }
            Action::DisableTechnology(kind) => {
                self.manager().await?.disable_technology(kind.as_str()).await?
            }
        }
        Ok(())
    }

    async fn connect_service(&self, params: &ServiceParams) -> Result<String> {
        let mut properties = HashMap::new();
        properties.insert(
            connect_service_key::TYPE,
            Value::from(params.service_type.as_str()),
        );
        properties.insert(connect_service_key::MODE, Value::from(params.mode.as_str()));
        properties.insert(
            connect_service_key::SECURITY,
            Value::from(params.security.as_str()),
        );
        properties.insert(connect_service_key::SSID, Value::from(params.ssid.as_str()));

        let path = self.manager().await?.connect_service(properties).await?;
        Ok(path.as_str().to_owned())
    }
}
