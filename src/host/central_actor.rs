use std::sync::Arc;
use std::time::Duration;

use log::{Level, LevelFilter, debug, trace};
use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::api::central::{AttributeRequest, PeripheralId, PeripheralInfo, ScanSettings};
use crate::api::central_event::{CentralEvent, CentralState, ConnectionState};
use crate::api::characteristic::CharacteristicWriteType;
use crate::api::service::Service;
use crate::config::ManagerConfig;
use crate::host::advertiser::Advertiser;
use crate::host::event_bus::EventBus;
use crate::host::scanner::ScanPipeline;
use crate::host::session::SessionRegistry;
use crate::host::{connection, correlator};
use crate::platform::{AdapterCallback, BluetoothAdapter, CallbackSink};
use crate::{Error, Result};

type Responder<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
pub(crate) enum ManagerCommand {
    IsAvailable {
        responder: Responder<bool>,
    },
    AdapterState {
        responder: Responder<CentralState>,
    },
    IsOn {
        responder: Responder<bool>,
    },
    EnableAdapter {
        responder: Responder<bool>,
    },
    DisableAdapter {
        responder: Responder<bool>,
    },
    SetLogLevel {
        level: LevelFilter,
        responder: Responder<()>,
    },
    StartScan {
        settings: ScanSettings,
        responder: Responder<()>,
    },
    StopScan {
        responder: Responder<()>,
    },
    Peripheral {
        id: PeripheralId,
        responder: Responder<PeripheralInfo>,
    },
    ConnectedPeripherals {
        responder: Responder<Vec<PeripheralInfo>>,
    },
    PeripheralState {
        id: PeripheralId,
        responder: Responder<ConnectionState>,
    },
    Connect {
        id: PeripheralId,
        auto_reconnect: bool,
        responder: Responder<()>,
    },
    Disconnect {
        id: PeripheralId,
        responder: Responder<bool>,
    },
    DisconnectAll {
        responder: Responder<bool>,
    },
    DiscoverServices {
        id: PeripheralId,
        responder: Responder<()>,
    },
    Services {
        id: PeripheralId,
        responder: Responder<Vec<Service>>,
    },
    ReadCharacteristic {
        request: AttributeRequest,
        responder: Responder<()>,
    },
    WriteCharacteristic {
        request: AttributeRequest,
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
        responder: Responder<()>,
    },
    ReadDescriptor {
        request: AttributeRequest,
        responder: Responder<()>,
    },
    WriteDescriptor {
        request: AttributeRequest,
        value: Vec<u8>,
        responder: Responder<()>,
    },
    SetNotification {
        request: AttributeRequest,
        enable: bool,
        responder: Responder<()>,
    },
    Mtu {
        id: PeripheralId,
        responder: Responder<u16>,
    },
    RequestMtu {
        id: PeripheralId,
        mtu: u16,
        responder: Responder<()>,
    },
    IsAdvertising {
        responder: Responder<bool>,
    },
    StartAdvertising {
        payload: Vec<u8>,
        responder: Responder<bool>,
    },
    StopAdvertising {
        responder: Responder<bool>,
    },
}

/// Owns every piece of mutable state. Application commands and adapter callbacks are handled
/// one at a time on a single task, so a callback can never interleave with a request.
pub(crate) struct CentralActor {
    adapter: Arc<dyn BluetoothAdapter>,
    registry: SessionRegistry,
    scanner: ScanPipeline,
    advertiser: Advertiser,
    bus: EventBus,
    sink: CallbackSink,
    request_timeout: Option<Duration>,
    watchdog_interval: Duration,
    command_rx: Receiver<ManagerCommand>,
    callback_rx: UnboundedReceiver<AdapterCallback>,
}

impl CentralActor {
    pub(crate) fn new(
        adapter: Arc<dyn BluetoothAdapter>,
        event_tx: Sender<CentralEvent>,
        config: &ManagerConfig,
        command_rx: Receiver<ManagerCommand>,
        callback_rx: UnboundedReceiver<AdapterCallback>,
        sink: CallbackSink,
    ) -> Self {
        Self {
            adapter,
            registry: SessionRegistry::new(config.default_mtu),
            scanner: ScanPipeline::default(),
            advertiser: Advertiser::default(),
            bus: EventBus::new(event_tx, config.log_level),
            sink,
            request_timeout: config.request_timeout(),
            watchdog_interval: config.watchdog_interval(),
            command_rx,
            callback_rx,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut watchdog = time::interval(self.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                Some(callback) = self.callback_rx.recv() => self.handle_callback(callback),
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = watchdog.tick(), if self.request_timeout.is_some() => self.sweep(),
            }
            self.bus.flush().await;
        }

        debug!(
            "all central handles dropped, shutting down with {} sessions",
            self.registry.len()
        );
        self.scanner.stop(self.adapter.as_ref());
        self.registry
            .disconnect_all(self.adapter.as_ref(), &mut self.bus);
        self.bus.flush().await;
    }

    /// Radio present and access granted.
    fn available(&self) -> Result<()> {
        if !self.adapter.is_present() || self.adapter.state() == CentralState::Unauthorized {
            return Err(Error::AdapterUnavailable);
        }
        Ok(())
    }

    fn handle_command(&mut self, command: ManagerCommand) {
        trace!("central command {:?}", command);
        match command {
            ManagerCommand::IsAvailable { responder } => {
                let _ = responder.send(Ok(self.adapter.is_present()));
            }
            ManagerCommand::AdapterState { responder } => {
                let _ = responder.send(self.available().map(|()| self.adapter.state()));
            }
            ManagerCommand::IsOn { responder } => {
                let _ = responder.send(self.available().map(|()| self.adapter.is_enabled()));
            }
            ManagerCommand::EnableAdapter { responder } => {
                let _ = responder.send(self.available().map(|()| self.enable_adapter()));
            }
            ManagerCommand::DisableAdapter { responder } => {
                let _ = responder.send(self.available().map(|()| self.disable_adapter()));
            }
            ManagerCommand::SetLogLevel { level, responder } => {
                let _ = responder.send(self.available().map(|()| self.bus.set_level(level)));
            }
            ManagerCommand::StartScan {
                settings,
                responder,
            } => {
                let _ = responder.send(self.available().and_then(|()| {
                    self.scanner
                        .start(self.adapter.as_ref(), &settings, &self.sink)
                }));
            }
            ManagerCommand::StopScan { responder } => {
                let _ = responder.send(
                    self.available()
                        .map(|()| self.scanner.stop(self.adapter.as_ref())),
                );
            }
            ManagerCommand::Peripheral { id, responder } => {
                let _ = responder.send(self.available().map(|()| self.adapter.remote_device(&id)));
            }
            ManagerCommand::ConnectedPeripherals { responder } => {
                let _ =
                    responder.send(self.available().map(|()| self.adapter.connected_devices()));
            }
            ManagerCommand::PeripheralState { id, responder } => {
                let _ = responder
                    .send(self.available().map(|()| self.adapter.connection_state(&id)));
            }
            ManagerCommand::Connect {
                id,
                auto_reconnect,
                responder,
            } => {
                let _ = responder.send(self.available().and_then(|()| {
                    self.registry
                        .connect(self.adapter.as_ref(), &id, auto_reconnect, &self.sink)
                }));
            }
            ManagerCommand::Disconnect { id, responder } => {
                let _ = responder.send(
                    self.available()
                        .map(|()| self.registry.disconnect(self.adapter.as_ref(), &id)),
                );
            }
            ManagerCommand::DisconnectAll { responder } => {
                let _ = responder.send(self.available().map(|()| {
                    self.registry
                        .disconnect_all(self.adapter.as_ref(), &mut self.bus)
                }));
            }
            ManagerCommand::DiscoverServices { id, responder } => {
                let _ = responder.send(self.available().and_then(|()| {
                    correlator::discover_services(self.registry.lookup_mut(&id)?)
                }));
            }
            ManagerCommand::Services { id, responder } => {
                let _ = responder.send(self.available().and_then(|()| {
                    Ok(self.registry.lookup(&id)?.tree.services().to_vec())
                }));
            }
            ManagerCommand::ReadCharacteristic { request, responder } => {
                let _ = responder.send(self.available().and_then(|()| {
                    let session = self.registry.lookup_mut(&request.peripheral)?;
                    correlator::read_characteristic(session, &request)
                }));
            }
            ManagerCommand::WriteCharacteristic {
                request,
                value,
                write_type,
                responder,
            } => {
                let _ = responder.send(self.available().and_then(|()| {
                    let session = self.registry.lookup_mut(&request.peripheral)?;
                    correlator::write_characteristic(
                        session,
                        &mut self.bus,
                        &request,
                        &value,
                        write_type,
                    )
                }));
            }
            ManagerCommand::ReadDescriptor { request, responder } => {
                let _ = responder.send(self.available().and_then(|()| {
                    let session = self.registry.lookup_mut(&request.peripheral)?;
                    correlator::read_descriptor(session, &request)
                }));
            }
            ManagerCommand::WriteDescriptor {
                request,
                value,
                responder,
            } => {
                let _ = responder.send(self.available().and_then(|()| {
                    let session = self.registry.lookup_mut(&request.peripheral)?;
                    correlator::write_descriptor(session, &request, &value)
                }));
            }
            ManagerCommand::SetNotification {
                request,
                enable,
                responder,
            } => {
                let _ = responder.send(self.available().and_then(|()| {
                    let session = self.registry.lookup_mut(&request.peripheral)?;
                    correlator::set_notification(session, &request, enable)
                }));
            }
            ManagerCommand::Mtu { id, responder } => {
                let _ = responder.send(
                    self.available()
                        .and_then(|()| Ok(self.registry.lookup(&id)?.mtu)),
                );
            }
            ManagerCommand::RequestMtu { id, mtu, responder } => {
                let _ = responder.send(self.available().and_then(|()| {
                    correlator::request_mtu(self.registry.lookup_mut(&id)?, mtu)
                }));
            }
            ManagerCommand::IsAdvertising { responder } => {
                let _ = responder.send(self.available().map(|()| self.advertiser.is_requested()));
            }
            ManagerCommand::StartAdvertising { payload, responder } => {
                let _ = responder.send(self.available().map(|()| {
                    self.advertiser
                        .start(self.adapter.as_ref(), &mut self.bus, &payload, &self.sink)
                }));
            }
            ManagerCommand::StopAdvertising { responder } => {
                let _ = responder.send(
                    self.available()
                        .map(|()| self.advertiser.stop(self.adapter.as_ref(), &mut self.bus)),
                );
            }
        }
    }

    fn enable_adapter(&mut self) -> bool {
        if self.adapter.is_enabled() {
            return true;
        }
        let accepted = self.adapter.enable();
        self.bus.log(
            Level::Info,
            format!("enabling bluetooth adapter, accepted: {}", accepted),
        );
        accepted
    }

    fn disable_adapter(&mut self) -> bool {
        if !self.adapter.is_enabled() {
            return true;
        }
        self.registry
            .disconnect_all(self.adapter.as_ref(), &mut self.bus);
        let accepted = self.adapter.disable();
        self.scanner.clear();
        self.bus.log(
            Level::Info,
            format!("disabling bluetooth adapter, accepted: {}", accepted),
        );
        accepted
    }

    fn handle_callback(&mut self, callback: AdapterCallback) {
        match callback {
            AdapterCallback::AdapterStateChanged { state } => {
                debug!("adapter state changed to {:?}", state);
                if state == CentralState::PoweredOff {
                    self.advertiser.reset();
                    self.scanner.clear();
                }
                self.bus.emit(CentralEvent::StateChanged { state });
            }
            AdapterCallback::ScanResult {
                peripheral,
                advertisement,
                rssi,
            } => {
                if self.scanner.is_scanning() {
                    self.scanner
                        .on_advertisement(&mut self.bus, peripheral, advertisement, rssi);
                }
            }
            AdapterCallback::ScanFailed { code } => {
                self.scanner.on_scan_failed(&mut self.bus, code);
            }
            AdapterCallback::AdvertisingStarted => self.advertiser.on_started(&mut self.bus),
            AdapterCallback::AdvertisingFailed { code } => {
                self.advertiser.on_failed(&mut self.bus, code)
            }
            AdapterCallback::ConnectionStateChanged {
                peripheral,
                status,
                state,
            } => connection::on_connection_state_changed(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                status,
                state,
            ),
            AdapterCallback::ServicesDiscovered {
                peripheral,
                services,
                status,
            } => correlator::on_services_discovered(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                services,
                status,
            ),
            AdapterCallback::CharacteristicRead {
                peripheral,
                address,
                value,
                status,
            } => correlator::on_characteristic_read(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                address,
                value,
                status,
            ),
            AdapterCallback::CharacteristicWritten {
                peripheral,
                address,
                status,
            } => correlator::on_characteristic_written(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                address,
                status,
            ),
            AdapterCallback::CharacteristicChanged {
                peripheral,
                address,
                value,
            } => correlator::on_characteristic_changed(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                address,
                value,
            ),
            AdapterCallback::DescriptorRead {
                peripheral,
                address,
                value,
                status,
            } => correlator::on_descriptor_read(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                address,
                value,
                status,
            ),
            AdapterCallback::DescriptorWritten {
                peripheral,
                address,
                status,
            } => correlator::on_descriptor_written(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                address,
                status,
            ),
            AdapterCallback::MtuChanged {
                peripheral,
                mtu,
                status,
            } => correlator::on_mtu_changed(
                &mut self.registry,
                &mut self.bus,
                peripheral,
                mtu,
                status,
            ),
        }
    }

    fn sweep(&mut self) {
        if let Some(timeout) = self.request_timeout {
            correlator::sweep_expired(&mut self.registry, &mut self.bus, Instant::now(), timeout);
        }
    }
}
