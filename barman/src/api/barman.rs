use log::debug;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use zbus::Connection;

use crate::Result;
use crate::api::config::BarmanConfig;
use crate::api::models::{BarmanError, ServiceParams, TechnologyState, TechnologyType};
use crate::core::directory::{DirectoryEvent, DirectorySnapshot};
use crate::core::ip_config::{Ipv4Config, Ipv6Config};
use crate::core::service::{ServiceChange, ServiceEntry};
use crate::monitoring::driver::{Command, Driver};
use crate::monitoring::transport::{Action, BusTransport, Transport};
use crate::util::utils::with_timeout;

/// Commands queued to the driver before callers start waiting.
const COMMAND_CAPACITY: usize = 32;

/// High-level interface to the barman daemon over D-Bus.
///
/// A `Barman` keeps a local mirror of the daemon's services and technologies
/// up to date in a background task. Reads are served from that mirror
/// without touching the bus; writes update the mirror at once and are sent
/// to the daemon in the background.
///
/// # Creating an Instance
///
/// ```no_run
/// use barman::Barman;
///
/// # async fn example() -> barman::Result<()> {
/// let barman = Barman::new().await?;
/// barman.wait_until_connected().await?;
///
/// for service in barman.services() {
///     println!("{} ({})", service.name(), service.state());
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Watching for changes
///
/// ```no_run
/// use barman::{Barman, DirectoryEvent};
///
/// # async fn example() -> barman::Result<()> {
/// let barman = Barman::new().await?;
/// let mut events = barman.subscribe();
///
/// while let Ok(event) = events.recv().await {
///     if let DirectoryEvent::DefaultServiceChanged(path) = event {
///         println!("default service is now {path:?}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// `Barman` is `Clone` and can be shared across async tasks. Every clone
/// talks to the same background task, which stops once the last clone is
/// dropped.
#[derive(Clone)]
pub struct Barman {
    transport: Arc<dyn Transport>,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<DirectorySnapshot>,
    events: broadcast::Sender<DirectoryEvent>,
    config: BarmanConfig,
}

impl Debug for Barman {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Barman")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Barman {
    /// Creates a client for `net.barman` on the system bus.
    pub async fn new() -> Result<Self> {
        Self::with_config(BarmanConfig::default()).await
    }

    /// Creates a client on the system bus with custom settings.
    pub async fn with_config(config: BarmanConfig) -> Result<Self> {
        let conn = Connection::system().await?;
        let transport = BusTransport::new(conn, &config);
        Self::with_transport(Arc::new(transport), config).await
    }

    /// Creates a client on top of any [`Transport`].
    ///
    /// Must be called from within a tokio runtime; the background task is
    /// spawned onto it.
    pub async fn with_transport(transport: Arc<dyn Transport>, config: BarmanConfig) -> Result<Self> {
        let bus = transport.events().await?;

        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(config.event_capacity);
        let (snapshot_tx, snapshot) = watch::channel(DirectorySnapshot::default());

        let driver = Driver::new(
            Arc::clone(&transport),
            config.property_timeout,
            events.clone(),
            snapshot_tx,
        );
        tokio::spawn(driver.run(bus, command_rx));
        debug!("Started barman driver for {}", config.bus_name);

        Ok(Self {
            transport,
            commands,
            snapshot,
            events,
            config,
        })
    }

    /// The settings this client was created with.
    pub fn config(&self) -> &BarmanConfig {
        &self.config
    }

    /// Subscribes to directory events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    /// A copy of the current directory state.
    pub fn snapshot(&self) -> DirectorySnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that sees every new directory state.
    pub fn watch(&self) -> watch::Receiver<DirectorySnapshot> {
        self.snapshot.clone()
    }

    /// Waits until the mirror is synchronised with a running daemon.
    pub async fn wait_until_connected(&self) -> Result<()> {
        let mut rx = self.snapshot.clone();
        rx.wait_for(DirectorySnapshot::is_connected)
            .await
            .map_err(|_| BarmanError::Closed)?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.borrow().is_connected()
    }

    pub fn offline_mode(&self) -> bool {
        self.snapshot.borrow().offline_mode()
    }

    /// Ready services in the daemon's order. Empty while not connected.
    pub fn services(&self) -> Vec<ServiceEntry> {
        self.snapshot
            .borrow()
            .services()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Looks up a service by path, ready or not.
    pub fn service(&self, path: &str) -> Option<ServiceEntry> {
        self.snapshot.borrow().service(path).cloned()
    }

    pub fn default_service(&self) -> Option<ServiceEntry> {
        self.snapshot.borrow().default_service().cloned()
    }

    pub fn technology_state(&self, kind: TechnologyType) -> TechnologyState {
        self.snapshot.borrow().technology_state(kind)
    }

    /// Sends a command and waits until the driver has applied it.
    async fn send(&self, command: impl FnOnce(oneshot::Sender<Result<()>>) -> Command) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| BarmanError::Closed)?;
        rx.await.map_err(|_| BarmanError::Closed)?
    }

    async fn update_service(&self, path: &str, change: ServiceChange) -> Result<()> {
        let path = path.to_owned();
        self.send(|reply| Command::UpdateService {
            path,
            change,
            reply,
        })
        .await
    }

    /// Sets the passphrase of a service.
    ///
    /// The local value changes at once. The write to the daemon happens in
    /// the background and its failure is only logged.
    pub async fn set_passphrase(&self, path: &str, passphrase: &str) -> Result<()> {
        self.update_service(path, ServiceChange::Passphrase(passphrase.to_owned()))
            .await
    }

    pub async fn set_autoconnect(&self, path: &str, autoconnect: bool) -> Result<()> {
        self.update_service(path, ServiceChange::AutoConnect(autoconnect))
            .await
    }

    pub async fn set_apn(&self, path: &str, apn: &str) -> Result<()> {
        self.update_service(path, ServiceChange::Apn(apn.to_owned()))
            .await
    }

    /// Sets the user-configured nameservers. `None` clears the local value
    /// without telling the daemon.
    pub async fn set_nameservers_configuration(
        &self,
        path: &str,
        nameservers: Option<Vec<String>>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::NameserversConfiguration(nameservers))
            .await
    }

    pub async fn set_domains_configuration(
        &self,
        path: &str,
        domains: Option<Vec<String>>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::DomainsConfiguration(domains))
            .await
    }

    pub async fn set_ipv4_configuration(
        &self,
        path: &str,
        config: Option<Ipv4Config>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::Ipv4Configuration(config))
            .await
    }

    pub async fn set_ipv6_configuration(
        &self,
        path: &str,
        config: Option<Ipv6Config>,
    ) -> Result<()> {
        self.update_service(path, ServiceChange::Ipv6Configuration(config))
            .await
    }

    /// Turns offline mode on or off, writing it through to the daemon.
    pub async fn set_offline_mode(&self, offline: bool) -> Result<()> {
        self.send(|reply| Command::SetOfflineMode { offline, reply })
            .await
    }

    /// Asks the daemon to connect a service.
    ///
    /// Returns once the daemon answers. The service's state changes arrive
    /// later as ordinary events.
    pub async fn connect(&self, path: &str) -> Result<()> {
        self.require_service(path)?;
        self.act(Action::Connect(path.to_owned())).await
    }

    pub async fn disconnect(&self, path: &str) -> Result<()> {
        self.require_service(path)?;
        self.act(Action::Disconnect(path.to_owned())).await
    }

    /// Powers on every device of a technology kind.
    pub async fn enable_technology(&self, kind: TechnologyType) -> Result<()> {
        self.require_technology(kind)?;
        self.act(Action::EnableTechnology(kind)).await
    }

    pub async fn disable_technology(&self, kind: TechnologyType) -> Result<()> {
        self.require_technology(kind)?;
        self.act(Action::DisableTechnology(kind)).await
    }

    /// Connects to a service the daemon does not list yet, such as a hidden
    /// Wi-Fi network. Returns the service path.
    pub async fn connect_service(&self, params: &ServiceParams) -> Result<String> {
        self.require_connected()?;
        with_timeout(
            Some(self.config.action_timeout),
            self.transport.connect_service(params),
        )
        .await
    }

    async fn act(&self, action: Action) -> Result<()> {
        debug!("Running {action:?}");
        with_timeout(Some(self.config.action_timeout), self.transport.call(&action)).await
    }

    fn require_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BarmanError::NotConnected)
        }
    }

    fn require_service(&self, path: &str) -> Result<()> {
        self.require_connected()?;
        if self.snapshot.borrow().service(path).is_none() {
            return Err(BarmanError::ServiceNotFound(path.to_owned()));
        }
        Ok(())
    }

    fn require_technology(&self, kind: TechnologyType) -> Result<()> {
        self.require_connected()?;
        let known = self
            .snapshot
            .borrow()
            .technologies()
            .iter()
            .any(|t| t.technology_type() == kind);
        if !known {
            return Err(BarmanError::TechnologyNotFound(kind));
        }
        Ok(())
    }
}
