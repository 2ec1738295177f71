//! End-to-end tests for the `Barman` handle.
//!
//! These drive a real background driver over an in-memory daemon, so they
//! cover the path from bus events to snapshots and events without needing
//! a system bus.

use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use barman::{
    Action, Barman, BarmanConfig, BarmanError, BusEvent, DirectoryEvent, DirectorySnapshot,
    Ipv4Config, Ipv4Method, ObjectRef, PropertyMap, PropertyValue, ServiceParams,
    ServiceSecurity, ServiceState, TechnologyState, TechnologyType, Transport,
};

const WAIT: Duration = Duration::from_secs(5);

/// An in-memory barman daemon.
#[derive(Default)]
struct FakeDaemon {
    running: Mutex<bool>,
    objects: Mutex<HashMap<ObjectRef, PropertyMap>>,
    bus: Mutex<Option<UnboundedSender<BusEvent>>>,
    writes: Mutex<Vec<(ObjectRef, String, PropertyValue)>>,
    calls: Mutex<Vec<Action>>,
    stall_actions: bool,
}

impl FakeDaemon {
    fn running() -> Self {
        Self {
            running: Mutex::new(true),
            ..Self::default()
        }
    }

    fn with_object(self, target: ObjectRef, props: &[(&str, PropertyValue)]) -> Self {
        let props = props
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        self.objects.lock().unwrap().insert(target, props);
        self
    }

    fn with_services(self, services: &[(&str, &str)]) -> Self {
        let paths = services.iter().map(|(p, _)| (*p).to_owned()).collect();
        let mut daemon = self.with_manager("Services", PropertyValue::PathList(paths));
        for (path, state) in services {
            daemon = daemon.with_object(
                ObjectRef::Service((*path).to_owned()),
                &[
                    ("State", (*state).into()),
                    ("Name", path.trim_start_matches("/service/").into()),
                    ("Type", "wifi".into()),
                    ("Strength", 60u8.into()),
                ],
            );
        }
        daemon
    }

    fn with_manager(self, name: &str, value: PropertyValue) -> Self {
        self.objects
            .lock()
            .unwrap()
            .entry(ObjectRef::Manager)
            .or_default()
            .insert(name.to_owned(), value);
        self
    }

    fn emit(&self, event: BusEvent) {
        if let Some(bus) = self.bus.lock().unwrap().as_ref() {
            bus.unbounded_send(event).unwrap();
        }
    }

    fn push(&self, target: ObjectRef, name: &str, value: PropertyValue) {
        self.objects
            .lock()
            .unwrap()
            .entry(target.clone())
            .or_default()
            .insert(name.to_owned(), value.clone());
        self.emit(BusEvent::PropertyChanged {
            target,
            name: name.to_owned(),
            value,
        });
    }

    fn appear(&self) {
        *self.running.lock().unwrap() = true;
        self.emit(BusEvent::Appeared);
    }

    fn vanish(&self) {
        *self.running.lock().unwrap() = false;
        self.emit(BusEvent::Vanished);
    }

    /// Another process takes over the bus name, now serving `services`.
    fn replace(&self, services: &[(&str, &str)]) {
        let fresh = FakeDaemon::running().with_services(services);
        let objects = std::mem::take(&mut *fresh.objects.lock().unwrap());
        *self.objects.lock().unwrap() = objects;
        self.emit(BusEvent::Vanished);
        self.emit(BusEvent::Appeared);
    }

    fn writes(&self) -> Vec<(ObjectRef, String, PropertyValue)> {
        self.writes.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<Action> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeDaemon {
    async fn events(&self) -> barman::Result<BoxStream<'static, BusEvent>> {
        let (tx, rx) = unbounded();
        let initial = if *self.running.lock().unwrap() {
            BusEvent::Appeared
        } else {
            BusEvent::Vanished
        };
        tx.unbounded_send(initial).unwrap();
        *self.bus.lock().unwrap() = Some(tx);
        Ok(rx.boxed())
    }

    async fn get_properties(&self, target: &ObjectRef) -> barman::Result<PropertyMap> {
        if !*self.running.lock().unwrap() {
            return Err(BarmanError::Remote("daemon not running".into()));
        }
        self.objects
            .lock()
            .unwrap()
            .get(target)
            .cloned()
            .ok_or_else(|| BarmanError::Remote(format!("no object {target}")))
    }

    async fn set_property(
        &self,
        target: &ObjectRef,
        name: &str,
        value: &PropertyValue,
    ) -> barman::Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push((target.clone(), name.to_owned(), value.clone()));
        Ok(())
    }

    async fn call(&self, action: &Action) -> barman::Result<()> {
        if self.stall_actions {
            futures::future::pending::<()>().await;
        }
        self.calls.lock().unwrap().push(action.clone());
        Ok(())
    }

    async fn connect_service(&self, params: &ServiceParams) -> barman::Result<String> {
        Ok(format!("/service/wifi_{}", params.ssid))
    }
}

async fn start(daemon: &Arc<FakeDaemon>) -> Barman {
    start_with(daemon, BarmanConfig::default()).await
}

async fn start_with(daemon: &Arc<FakeDaemon>, config: BarmanConfig) -> Barman {
    let transport: Arc<dyn Transport> = daemon.clone();
    Barman::with_transport(transport, config).await.unwrap()
}

async fn until(barman: &Barman, f: impl FnMut(&DirectorySnapshot) -> bool) {
    let mut rx = barman.watch();
    tokio::time::timeout(WAIT, rx.wait_for(f))
        .await
        .expect("timed out waiting for snapshot")
        .expect("driver stopped");
}

async fn next_event(rx: &mut broadcast::Receiver<DirectoryEvent>) -> DirectoryEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn until_written(daemon: &FakeDaemon, name: &str) -> PropertyValue {
    for _ in 0..500 {
        if let Some((_, _, value)) = daemon.writes().into_iter().find(|(_, n, _)| n == name) {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{name} was never written");
}

#[tokio::test]
async fn lists_ready_services_in_order() {
    let daemon = Arc::new(
        FakeDaemon::running().with_services(&[("/service/home", "online"), ("/service/cafe", "idle")]),
    );
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    let services = barman.services();
    let paths: Vec<_> = services.iter().map(|s| s.path()).collect();
    assert_eq!(paths, vec!["/service/home", "/service/cafe"]);
    assert_eq!(services[0].name(), "home");
    assert_eq!(services[0].strength(), 60);

    let default = barman.default_service().unwrap();
    assert_eq!(default.path(), "/service/home");
    assert_eq!(default.state(), ServiceState::Online);
}

#[tokio::test]
async fn empty_daemon_connects_without_services() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();
    assert!(barman.services().is_empty());
    assert!(barman.default_service().is_none());
}

#[tokio::test]
async fn waits_for_daemon_to_appear() {
    let daemon = Arc::new(FakeDaemon::default().with_services(&[("/service/eth", "ready")]));
    let barman = start(&daemon).await;

    until(&barman, |s| !s.is_connected()).await;
    assert!(barman.services().is_empty());

    daemon.appear();
    barman.wait_until_connected().await.unwrap();
    assert_eq!(barman.services().len(), 1);
}

#[tokio::test]
async fn vanish_removes_each_service_once() {
    let daemon = Arc::new(
        FakeDaemon::running().with_services(&[("/service/a", "online"), ("/service/b", "idle")]),
    );
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    let mut events = barman.subscribe();
    daemon.vanish();

    let mut removed = Vec::new();
    loop {
        match next_event(&mut events).await {
            DirectoryEvent::ServiceRemoved(path) => removed.push(path),
            DirectoryEvent::ConnectedChanged(false) => break,
            _ => {}
        }
    }
    removed.sort();
    assert_eq!(removed, vec!["/service/a", "/service/b"]);
    assert!(!barman.is_connected());
    assert!(barman.services().is_empty());
    assert!(barman.service("/service/a").is_none());

    daemon.appear();
    barman.wait_until_connected().await.unwrap();
    assert_eq!(barman.services().len(), 2);
}

#[tokio::test]
async fn pushed_state_moves_default() {
    let daemon = Arc::new(
        FakeDaemon::running()
            .with_services(&[("/service/a", "association"), ("/service/b", "idle")]),
    );
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();
    assert!(barman.default_service().is_none());

    let mut events = barman.subscribe();
    daemon.push(ObjectRef::Service("/service/a".into()), "State", "online".into());

    loop {
        if let DirectoryEvent::DefaultServiceChanged(path) = next_event(&mut events).await {
            assert_eq!(path.as_deref(), Some("/service/a"));
            break;
        }
    }
    assert_eq!(barman.default_service().unwrap().path(), "/service/a");

    daemon.push(
        ObjectRef::Manager,
        "Services",
        PropertyValue::PathList(vec!["/service/a".into()]),
    );
    assert_eq!(
        next_event(&mut events).await,
        DirectoryEvent::ServiceRemoved("/service/b".into())
    );
    assert_eq!(barman.default_service().unwrap().path(), "/service/a");
}

#[tokio::test]
async fn passphrase_is_written_through() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[("/service/a", "idle")]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    barman.set_passphrase("/service/a", "hunter22").await.unwrap();
    assert_eq!(barman.service("/service/a").unwrap().passphrase(), "hunter22");
    assert_eq!(
        until_written(&daemon, "Passphrase").await,
        PropertyValue::Str("hunter22".into())
    );

    // the daemon's own value wins afterwards
    daemon.push(ObjectRef::Service("/service/a".into()), "Passphrase", "other".into());
    until(&barman, |s| {
        s.service("/service/a")
            .is_some_and(|svc| svc.passphrase() == "other")
    })
    .await;
}

#[tokio::test]
async fn ipv4_configuration_goes_out_as_string_dict() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[("/service/a", "ready")]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    let config = Ipv4Config::new(Ipv4Method::Manual)
        .with_address("192.168.1.20")
        .with_netmask("255.255.255.0");
    barman
        .set_ipv4_configuration("/service/a", Some(config.clone()))
        .await
        .unwrap();

    assert_eq!(
        barman.service("/service/a").unwrap().ipv4_configuration(),
        Some(&config)
    );
    assert_eq!(
        until_written(&daemon, "IPv4.Configuration").await,
        PropertyValue::string_dict([
            ("Method", "manual"),
            ("Address", "192.168.1.20"),
            ("Netmask", "255.255.255.0"),
        ])
    );
}

#[tokio::test]
async fn unknown_service_is_rejected() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    let err = barman.set_autoconnect("/service/nope", true).await.unwrap_err();
    assert!(matches!(err, BarmanError::ServiceNotFound(ref p) if p == "/service/nope"));

    let err = barman.connect("/service/nope").await.unwrap_err();
    assert!(matches!(err, BarmanError::ServiceNotFound(_)));
    assert!(daemon.calls().is_empty());
}

#[tokio::test]
async fn actions_need_a_connected_directory() {
    let daemon = Arc::new(FakeDaemon::default());
    let barman = start(&daemon).await;
    until(&barman, |s| !s.is_connected()).await;

    let err = barman.connect("/service/a").await.unwrap_err();
    assert!(matches!(err, BarmanError::NotConnected));
}

#[tokio::test]
async fn connect_and_disconnect_reach_daemon() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[("/service/a", "idle")]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    barman.connect("/service/a").await.unwrap();
    barman.disconnect("/service/a").await.unwrap();
    assert_eq!(
        daemon.calls(),
        vec![
            Action::Connect("/service/a".into()),
            Action::Disconnect("/service/a".into()),
        ]
    );
    // state only changes through pushes
    assert_eq!(barman.service("/service/a").unwrap().state(), ServiceState::Idle);
}

#[tokio::test]
async fn actions_time_out() {
    let daemon = Arc::new(FakeDaemon {
        stall_actions: true,
        ..FakeDaemon::running().with_services(&[("/service/a", "idle")])
    });
    let config = BarmanConfig::new().with_action_timeout(Duration::from_millis(50));
    let barman = start_with(&daemon, config).await;
    barman.wait_until_connected().await.unwrap();

    let err = barman.connect("/service/a").await.unwrap_err();
    assert!(matches!(err, BarmanError::Timeout(d) if d == Duration::from_millis(50)));
}

#[tokio::test]
async fn technologies_report_state_and_toggle() {
    let daemon = Arc::new(
        FakeDaemon::running()
            .with_services(&[])
            .with_manager(
                "Technologies",
                PropertyValue::PathList(vec!["/technology/wifi".into()]),
            )
            .with_object(
                ObjectRef::Technology("/technology/wifi".into()),
                &[("Type", "wifi".into()), ("State", "enabled".into())],
            ),
    );
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();
    until(&barman, |s| {
        s.technology_state(TechnologyType::Wifi) == TechnologyState::Enabled
    })
    .await;

    barman.disable_technology(TechnologyType::Wifi).await.unwrap();
    assert_eq!(
        daemon.calls(),
        vec![Action::DisableTechnology(TechnologyType::Wifi)]
    );

    let err = barman
        .enable_technology(TechnologyType::Bluetooth)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BarmanError::TechnologyNotFound(TechnologyType::Bluetooth)
    ));

    let mut events = barman.subscribe();
    daemon.push(
        ObjectRef::Technology("/technology/wifi".into()),
        "State",
        "offline".into(),
    );
    assert_eq!(
        next_event(&mut events).await,
        DirectoryEvent::TechnologyStateChanged {
            kind: TechnologyType::Wifi,
            state: TechnologyState::Offline,
        }
    );
}

#[tokio::test]
async fn offline_mode_round_trip() {
    let daemon = Arc::new(
        FakeDaemon::running()
            .with_services(&[])
            .with_manager("OfflineMode", false.into()),
    );
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();
    assert!(!barman.offline_mode());

    barman.set_offline_mode(true).await.unwrap();
    assert!(barman.offline_mode());
    assert_eq!(
        until_written(&daemon, "OfflineMode").await,
        PropertyValue::Bool(true)
    );

    let mut events = barman.subscribe();
    daemon.push(ObjectRef::Manager, "OfflineMode", false.into());
    assert_eq!(
        next_event(&mut events).await,
        DirectoryEvent::OfflineModeChanged(false)
    );
}

#[tokio::test]
async fn connect_service_returns_path() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    let params = ServiceParams::wifi("hidden", ServiceSecurity::Psk);
    let path = barman.connect_service(&params).await.unwrap();
    assert_eq!(path, "/service/wifi_hidden");
}

#[tokio::test]
async fn replaced_daemon_starts_from_scratch() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[("/service/a", "online")]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    let mut events = barman.subscribe();
    daemon.replace(&[("/service/b", "ready")]);

    let mut seen = Vec::new();
    loop {
        let event = next_event(&mut events).await;
        let done = event == DirectoryEvent::ConnectedChanged(true);
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(seen.contains(&DirectoryEvent::ServiceRemoved("/service/a".into())));
    assert!(seen.contains(&DirectoryEvent::ConnectedChanged(false)));

    let paths: Vec<_> = barman.services().iter().map(|s| s.path().to_owned()).collect();
    assert_eq!(paths, vec!["/service/b"]);
}

#[tokio::test]
async fn late_manager_push_after_vanish_is_dropped() {
    let daemon = Arc::new(FakeDaemon::running().with_services(&[]));
    let barman = start(&daemon).await;
    barman.wait_until_connected().await.unwrap();

    daemon.vanish();
    until(&barman, |s| !s.is_connected()).await;

    // last words of the old instance, delivered after the owner change
    daemon.push(
        ObjectRef::Manager,
        "Services",
        PropertyValue::PathList(vec!["/service/ghost".into()]),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!barman.is_connected());
    assert!(barman.service("/service/ghost").is_none());

    daemon.push(ObjectRef::Manager, "Services", PropertyValue::PathList(vec![]));
    daemon.appear();
    barman.wait_until_connected().await.unwrap();
    assert!(barman.services().is_empty());
}
