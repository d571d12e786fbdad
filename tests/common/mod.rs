#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gattbridge::api::central::PeripheralId;
use gattbridge::api::central_event::CentralEvent;
use gattbridge::api::characteristic::{Characteristic, CharacteristicProperty};
use gattbridge::api::descriptor::Descriptor;
use gattbridge::api::service::Service;
use gattbridge::platform::AttributeAddress;
use gattbridge::sim::{SimulatedAdapter, VirtualPeripheral};
use gattbridge::{Central, ManagerConfig};
use tokio::sync::mpsc::{self, Receiver};
use uuid::Uuid;

pub const HEART_RATE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);
pub const BODY_LOCATION: Uuid = Uuid::from_u128(0x00002a38_0000_1000_8000_00805f9b34fb);
pub const CONTROL_POINT: Uuid = Uuid::from_u128(0x00002a39_0000_1000_8000_00805f9b34fb);
pub const BATTERY: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
pub const BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
pub const DEVICE_INFO: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);
pub const MODEL_NUMBER: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);

pub const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

pub fn id() -> PeripheralId {
    PeripheralId::from(ADDRESS)
}

pub fn heart_rate_monitor() -> VirtualPeripheral {
    let heart_rate = Service::new(HEART_RATE, true)
        .with_characteristic(
            Characteristic::new(
                MEASUREMENT,
                vec![CharacteristicProperty::Notify, CharacteristicProperty::Indicate],
            )
            .with_descriptor(Descriptor::client_configuration()),
        )
        .with_characteristic(Characteristic::new(
            BODY_LOCATION,
            vec![CharacteristicProperty::Read],
        ))
        .with_characteristic(Characteristic::new(
            CONTROL_POINT,
            vec![
                CharacteristicProperty::Write,
                CharacteristicProperty::WriteWithoutResponse,
            ],
        ))
        .with_included_service(
            Service::new(BATTERY, false).with_characteristic(
                Characteristic::new(
                    BATTERY_LEVEL,
                    vec![CharacteristicProperty::Read, CharacteristicProperty::Notify],
                )
                .with_descriptor(Descriptor::client_configuration()),
            ),
        );
    let device_info = Service::new(DEVICE_INFO, true).with_characteristic(Characteristic::new(
        MODEL_NUMBER,
        vec![CharacteristicProperty::Read],
    ));

    VirtualPeripheral::new(ADDRESS)
        .with_name("Polar H10")
        .with_service(heart_rate)
        .with_service(device_info)
        .with_value(
            AttributeAddress::characteristic(HEART_RATE, BODY_LOCATION),
            &[0x01],
        )
        .with_value(
            AttributeAddress::characteristic(BATTERY, BATTERY_LEVEL),
            &[0x64],
        )
        .with_value(
            AttributeAddress::characteristic(DEVICE_INFO, MODEL_NUMBER),
            b"H10",
        )
}

pub fn setup_with(config: ManagerConfig) -> (Central, SimulatedAdapter, Receiver<CentralEvent>) {
    let _ = pretty_env_logger::try_init();
    let adapter = SimulatedAdapter::new();
    adapter.add_peripheral(heart_rate_monitor());
    let (tx, rx) = mpsc::channel(256);
    let central = Central::new(Arc::new(adapter.clone()), tx, config).unwrap();
    (central, adapter, rx)
}

pub fn setup() -> (Central, SimulatedAdapter, Receiver<CentralEvent>) {
    setup_with(ManagerConfig::default())
}

/// Waits for the first event matching `predicate`, skipping everything before it.
pub async fn expect_event(
    rx: &mut Receiver<CentralEvent>,
    predicate: impl Fn(&CentralEvent) -> bool,
) -> CentralEvent {
    let wait = async {
        loop {
            match rx.recv().await {
                Some(event) if predicate(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(30), wait)
        .await
        .expect("timed out waiting for event")
}

/// Everything already delivered, diagnostics left out.
pub fn drain(rx: &mut Receiver<CentralEvent>) -> Vec<CentralEvent> {
    std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|event| !matches!(event, CentralEvent::Log { .. }))
        .collect()
}

/// Connects to the heart rate monitor and discovers its services.
pub async fn connect_and_discover(central: &Central, rx: &mut Receiver<CentralEvent>) {
    use gattbridge::api::central::CentralManager;
    use gattbridge::api::central_event::ConnectionState;

    central.connect(&id(), false).await.unwrap();
    expect_event(rx, |event| {
        matches!(
            event,
            CentralEvent::ConnectionStateChanged {
                state: ConnectionState::Connected,
                ..
            }
        )
    })
    .await;
    central.discover_services(&id()).await.unwrap();
    expect_event(rx, |event| {
        matches!(event, CentralEvent::ServicesDiscovered { .. })
    })
    .await;
}
