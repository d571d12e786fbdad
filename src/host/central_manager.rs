use std::sync::Arc;

use async_trait::async_trait;
use log::LevelFilter;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::oneshot;

use crate::api::central::{
    AttributeRequest, CentralManager, PeripheralId, PeripheralInfo, ScanSettings,
};
use crate::api::central_event::{CentralEvent, CentralState, ConnectionState};
use crate::api::characteristic::CharacteristicWriteType;
use crate::api::service::Service;
use crate::config::ManagerConfig;
use crate::host::central_actor::{CentralActor, ManagerCommand};
use crate::platform::{BluetoothAdapter, CallbackSink};
use crate::{Error, Result};

/// Application handle. Cheap to clone; the manager task stops once every clone is dropped.
#[derive(Debug, Clone)]
pub struct Central {
    manager_tx: Sender<ManagerCommand>,
}

impl Central {
    /// Spawns the manager task on the current tokio runtime. Events are delivered on
    /// `sender_tx` in the order their causes were observed.
    pub fn new(
        adapter: Arc<dyn BluetoothAdapter>,
        sender_tx: Sender<CentralEvent>,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let (manager_tx, manager_rx) = mpsc::channel(config.command_buffer);
        let (callback_tx, callback_rx) = mpsc::unbounded_channel();
        let sink = CallbackSink::new(callback_tx);
        adapter.register_state_callback(sink.clone());
        let actor = CentralActor::new(adapter, sender_tx, &config, manager_rx, callback_rx, sink);
        runtime.spawn(actor.run());

        Ok(Self { manager_tx })
    }

    pub(crate) async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> ManagerCommand + Send,
    ) -> Result<T>
    where
        T: Send,
    {
        let (responder, response) = oneshot::channel();
        self.manager_tx
            .send(command(responder))
            .await
            .map_err(|_| Error::ManagerStopped)?;
        response.await.map_err(|_| Error::ManagerStopped)?
    }
}

#[async_trait]
impl CentralManager for Central {
    async fn is_available(&self) -> Result<bool> {
        self.request(|responder| ManagerCommand::IsAvailable { responder })
            .await
    }

    async fn adapter_state(&self) -> Result<CentralState> {
        self.request(|responder| ManagerCommand::AdapterState { responder })
            .await
    }

    async fn is_on(&self) -> Result<bool> {
        self.request(|responder| ManagerCommand::IsOn { responder })
            .await
    }

    async fn enable_adapter(&self) -> Result<bool> {
        self.request(|responder| ManagerCommand::EnableAdapter { responder })
            .await
    }

    async fn disable_adapter(&self) -> Result<bool> {
        self.request(|responder| ManagerCommand::DisableAdapter { responder })
            .await
    }

    async fn set_log_level(&self, level: LevelFilter) -> Result<()> {
        self.request(|responder| ManagerCommand::SetLogLevel { level, responder })
            .await
    }

    async fn start_scan(&self, settings: ScanSettings) -> Result<()> {
        self.request(|responder| ManagerCommand::StartScan {
            settings,
            responder,
        })
        .await
    }

    async fn stop_scan(&self) -> Result<()> {
        self.request(|responder| ManagerCommand::StopScan { responder })
            .await
    }

    async fn peripheral(&self, id: &PeripheralId) -> Result<PeripheralInfo> {
        self.request(|responder| ManagerCommand::Peripheral {
            id: id.clone(),
            responder,
        })
        .await
    }

    async fn connected_peripherals(&self) -> Result<Vec<PeripheralInfo>> {
        self.request(|responder| ManagerCommand::ConnectedPeripherals { responder })
            .await
    }

    async fn peripheral_state(&self, id: &PeripheralId) -> Result<ConnectionState> {
        self.request(|responder| ManagerCommand::PeripheralState {
            id: id.clone(),
            responder,
        })
        .await
    }

    async fn connect(&self, id: &PeripheralId, auto_reconnect: bool) -> Result<()> {
        self.request(|responder| ManagerCommand::Connect {
            id: id.clone(),
            auto_reconnect,
            responder,
        })
        .await
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<bool> {
        self.request(|responder| ManagerCommand::Disconnect {
            id: id.clone(),
            responder,
        })
        .await
    }

    async fn disconnect_all(&self) -> Result<bool> {
        self.request(|responder| ManagerCommand::DisconnectAll { responder })
            .await
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<()> {
        self.request(|responder| ManagerCommand::DiscoverServices {
            id: id.clone(),
            responder,
        })
        .await
    }

    async fn services(&self, id: &PeripheralId) -> Result<Vec<Service>> {
        self.request(|responder| ManagerCommand::Services {
            id: id.clone(),
            responder,
        })
        .await
    }

    async fn read_characteristic(&self, request: &AttributeRequest) -> Result<()> {
        self.request(|responder| ManagerCommand::ReadCharacteristic {
            request: request.clone(),
            responder,
        })
        .await
    }

    async fn write_characteristic(
        &self,
        request: &AttributeRequest,
        value: &[u8],
        write_type: CharacteristicWriteType,
    ) -> Result<()> {
        self.request(|responder| ManagerCommand::WriteCharacteristic {
            request: request.clone(),
            value: value.to_vec(),
            write_type,
            responder,
        })
        .await
    }

    async fn read_descriptor(&self, request: &AttributeRequest) -> Result<()> {
        self.request(|responder| ManagerCommand::ReadDescriptor {
            request: request.clone(),
            responder,
        })
        .await
    }

    async fn write_descriptor(&self, request: &AttributeRequest, value: &[u8]) -> Result<()> {
        self.request(|responder| ManagerCommand::WriteDescriptor {
            request: request.clone(),
            value: value.to_vec(),
            responder,
        })
        .await
    }

    async fn set_notification(&self, request: &AttributeRequest, enable: bool) -> Result<()> {
        self.request(|responder| ManagerCommand::SetNotification {
            request: request.clone(),
            enable,
            responder,
        })
        .await
    }

    async fn mtu(&self, id: &PeripheralId) -> Result<u16> {
        self.request(|responder| ManagerCommand::Mtu {
            id: id.clone(),
            responder,
        })
        .await
    }

    async fn request_mtu(&self, id: &PeripheralId, mtu: u16) -> Result<()> {
        self.request(|responder| ManagerCommand::RequestMtu {
            id: id.clone(),
            mtu,
            responder,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockBluetoothAdapter;

    fn unavailable_adapter() -> Arc<dyn BluetoothAdapter> {
        let mut adapter = MockBluetoothAdapter::new();
        adapter.expect_is_present().return_const(false);
        adapter
            .expect_state()
            .return_const(CentralState::Unknown);
        adapter.expect_connect().never();
        adapter.expect_scanner().returning(|| None);
        adapter.expect_connected_devices().return_const(Vec::new());
        adapter.expect_register_state_callback().return_const(());
        Arc::new(adapter)
    }

    #[tokio::test]
    async fn every_entry_point_but_availability_needs_an_adapter() {
        let (tx, _rx) = mpsc::channel(16);
        let central = Central::new(unavailable_adapter(), tx, ManagerConfig::default()).unwrap();
        let id = PeripheralId::from("AA:BB:CC:DD:EE:FF");

        assert_eq!(central.is_available().await, Ok(false));
        assert_eq!(central.is_on().await, Err(Error::AdapterUnavailable));
        assert_eq!(
            central.connect(&id, false).await,
            Err(Error::AdapterUnavailable)
        );
        assert_eq!(
            central.start_scan(ScanSettings::default()).await,
            Err(Error::AdapterUnavailable)
        );
        assert_eq!(central.disconnect(&id).await, Err(Error::AdapterUnavailable));
        assert_eq!(central.mtu(&id).await, Err(Error::AdapterUnavailable));
    }

    #[tokio::test]
    async fn unauthorized_reads_as_unavailable() {
        let mut adapter = MockBluetoothAdapter::new();
        adapter.expect_is_present().return_const(true);
        adapter
            .expect_state()
            .return_const(CentralState::Unauthorized);
        adapter.expect_scanner().returning(|| None);
        adapter.expect_connected_devices().return_const(Vec::new());
        adapter.expect_register_state_callback().return_const(());
        let (tx, _rx) = mpsc::channel(16);
        let central = Central::new(Arc::new(adapter), tx, ManagerConfig::default()).unwrap();

        assert_eq!(central.is_available().await, Ok(true));
        assert_eq!(central.adapter_state().await, Err(Error::AdapterUnavailable));
    }

    #[test]
    fn new_outside_runtime_fails() {
        let (tx, _rx) = mpsc::channel(16);
        let result = Central::new(
            Arc::new(MockBluetoothAdapter::new()),
            tx,
            ManagerConfig::default(),
        );
        assert_eq!(result.err(), Some(Error::NoRuntime));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let (tx, _rx) = mpsc::channel(16);
        let config = ManagerConfig {
            command_buffer: 0,
            ..ManagerConfig::default()
        };
        let result = Central::new(Arc::new(MockBluetoothAdapter::new()), tx, config);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
