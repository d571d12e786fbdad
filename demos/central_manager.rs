use std::sync::Arc;

use futures::StreamExt;
use gattbridge::api::{
    central::{AttributeRequest, CentralManager, ScanSettings},
    central_event::{CentralEvent, ConnectionState},
    characteristic::{Characteristic, CharacteristicProperty},
    descriptor::Descriptor,
    service::Service,
};
use gattbridge::platform::AttributeAddress;
use gattbridge::sim::{SimulatedAdapter, VirtualPeripheral};
use gattbridge::{Central, ManagerConfig, event_stream};
use log::LevelFilter;
use tokio::sync::mpsc;
use uuid::Uuid;

const HEART_RATE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
const MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);

#[tokio::main]
async fn main() {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .init();

    let adapter = SimulatedAdapter::new();
    adapter.add_peripheral(
        VirtualPeripheral::new("C4:7C:8D:6A:3F:01")
            .with_name("Heart Rate Sensor")
            .with_service(
                Service::new(HEART_RATE, true).with_characteristic(
                    Characteristic::new(MEASUREMENT, vec![CharacteristicProperty::Notify])
                        .with_descriptor(Descriptor::client_configuration()),
                ),
            ),
    );

    if let Err(e) = setup_central_manager(adapter).await {
        log::error!("central manager stopped: {}", e);
    }
}

async fn setup_central_manager(adapter: SimulatedAdapter) -> gattbridge::Result<()> {
    let (sender_tx, receiver_rx) = mpsc::channel::<CentralEvent>(256);
    let central = Central::new(
        Arc::new(adapter.clone()),
        sender_tx,
        ManagerConfig::default(),
    )?;

    // start scanning for devices
    central.start_scan(ScanSettings::default()).await?;

    let mut events = event_stream(receiver_rx);
    let mut beats: u8 = 60;
    while let Some(event) = events.next().await {
        match event {
            CentralEvent::ScanResult { peripheral, rssi, .. } => {
                log::info!("found {:?} ({}) at {} dBm", peripheral.name, peripheral.id, rssi);
                central.stop_scan().await?;
                central.connect(&peripheral.id, false).await?;
            }
            CentralEvent::ConnectionStateChanged {
                peripheral,
                state: ConnectionState::Connected,
            } => {
                central.discover_services(&peripheral).await?;
            }
            CentralEvent::ServicesDiscovered { peripheral, .. } => {
                let request = AttributeRequest::new(peripheral, HEART_RATE, MEASUREMENT);
                central.set_notification(&request, true).await?;
            }
            CentralEvent::NotificationStateChanged { request, .. } => {
                // let the virtual sensor produce a few readings
                for _ in 0..3 {
                    beats += 1;
                    adapter.notify(
                        &request.peripheral,
                        AttributeAddress::characteristic(HEART_RATE, MEASUREMENT),
                        &[0x00, beats],
                    );
                }
            }
            CentralEvent::CharacteristicChanged { request, value } => {
                log::info!("heart rate from {}: {:?}", request.peripheral, value);
                if value.get(1) == Some(&beats) {
                    central.disconnect(&request.peripheral).await?;
                }
            }
            CentralEvent::ConnectionStateChanged {
                peripheral,
                state: ConnectionState::Disconnected,
            } => {
                log::info!("{} disconnected", peripheral);
                break;
            }
            other => log::debug!("{:?}", other),
        }
    }
    Ok(())
}
