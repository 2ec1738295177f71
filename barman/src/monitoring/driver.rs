//! The task that owns the directory.
//!
//! Bus events, finished remote calls and user commands are applied to the
//! [`ManagerDirectory`] one at a time. After each step the directory's
//! outbox is drained: requests are spawned onto the transport, the snapshot
//! is republished and events are broadcast.

use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::Result;
use crate::core::directory::{
    DirectoryEvent, DirectorySnapshot, EntryToken, ManagerDirectory, ObjectRef, PropertyMap,
    Request,
};
use crate::core::service::ServiceChange;
use crate::monitoring::transport::{BusEvent, Transport};
use crate::util::utils::with_timeout;

/// A request from a [`Barman`](crate::Barman) handle.
#[derive(Debug)]
pub(crate) enum Command {
    UpdateService {
        path: String,
        change: ServiceChange,
        reply: oneshot::Sender<Result<()>>,
    },
    SetOfflineMode {
        offline: bool,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// A remote call spawned by the driver that has finished.
#[derive(Debug)]
enum Completion {
    Fetched {
        target: ObjectRef,
        token: EntryToken,
        result: Result<PropertyMap>,
    },
    Set {
        target: ObjectRef,
        name: &'static str,
        result: Result<()>,
    },
}

pub(crate) struct Driver {
    directory: ManagerDirectory,
    transport: Arc<dyn Transport>,
    property_timeout: Option<Duration>,
    events: broadcast::Sender<DirectoryEvent>,
    snapshot: watch::Sender<DirectorySnapshot>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    /// Command results, answered once the new snapshot is published.
    replies: Vec<(oneshot::Sender<Result<()>>, Result<()>)>,
}

impl Driver {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        property_timeout: Option<Duration>,
        events: broadcast::Sender<DirectoryEvent>,
        snapshot: watch::Sender<DirectorySnapshot>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            directory: ManagerDirectory::new(),
            transport,
            property_timeout,
            events,
            snapshot,
            done_tx,
            done_rx,
            replies: Vec::new(),
        }
    }

    /// Runs until the bus stream ends or every handle is dropped.
    pub(crate) async fn run(
        mut self,
        mut bus: BoxStream<'static, BusEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        loop {
            tokio::select! {
                event = bus.next() => match event {
                    Some(event) => self.on_bus_event(event),
                    None => {
                        warn!("Bus event stream ended, stopping barman driver");
                        break;
                    }
                },
                Some(done) = self.done_rx.recv() => self.on_completion(done),
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("All barman handles dropped, stopping driver");
                        break;
                    }
                },
            }

            self.flush();
        }
    }

    fn on_bus_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::Appeared => self.directory.manager_appeared(),
            BusEvent::Vanished => self.directory.manager_vanished(),
            BusEvent::PropertyChanged {
                target,
                name,
                value,
            } => self.directory.property_changed(&target, &name, value),
        }
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Fetched {
                target,
                token,
                result,
            } => self.directory.properties_fetched(&target, token, result),
            Completion::Set {
                target,
                name,
                result,
            } => self.directory.property_set(&target, name, result),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::UpdateService {
                path,
                change,
                reply,
            } => {
                let result = self.directory.update_service(&path, change);
                self.replies.push((reply, result));
            }
            Command::SetOfflineMode { offline, reply } => {
                self.directory.set_offline_mode(offline);
                self.replies.push((reply, Ok(())));
            }
        }
    }

    fn flush(&mut self) {
        for request in self.directory.take_requests() {
            self.spawn_request(request);
        }

        let snapshot = self.directory.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        for (reply, result) in self.replies.drain(..) {
            // the caller may have given up waiting
            let _ = reply.send(result);
        }

        for event in self.directory.take_events() {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
    }

    fn spawn_request(&self, request: Request) {
        let transport = Arc::clone(&self.transport);
        let done = self.done_tx.clone();
        let limit = self.property_timeout;

        match request {
            Request::GetProperties { target, token } => {
                debug!("Fetching properties of {target}");
                tokio::spawn(async move {
                    let result = with_timeout(limit, transport.get_properties(&target)).await;
                    let _ = done.send(Completion::Fetched {
                        target,
                        token,
                        result,
                    });
                });
            }
            Request::SetProperty {
                target,
                name,
                value,
            } => {
                debug!("Setting {name} on {target}");
                tokio::spawn(async move {
                    let result =
                        with_timeout(limit, transport.set_property(&target, name, &value)).await;
                    let _ = done.send(Completion::Set {
                        target,
                        name,
                        result,
                    });
                });
            }
        }
    }
}
