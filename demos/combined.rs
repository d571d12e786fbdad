use std::sync::Arc;
use std::time::Duration;

use gattbridge::api::{
    central::{CentralManager, ScanFilter, ScanSettings},
    central_event::CentralEvent,
    peripheral::PeripheralManager,
};
use gattbridge::sim::{SimulatedAdapter, VirtualPeripheral};
use gattbridge::{Central, ManagerConfig};
use log::LevelFilter;
use tokio::sync::mpsc::{self, Sender};

#[tokio::main]
async fn main() {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .init();

    let adapter = SimulatedAdapter::new();
    adapter.add_peripheral(VirtualPeripheral::new("5E:11:0A:22:9B:10").with_name("Beacon"));

    let (sender_tx, mut receiver_rx) = mpsc::channel::<AppEvent>(256);
    let central = match setup_central_manager(adapter, sender_tx.clone()).await {
        Ok(central) => central,
        Err(e) => {
            log::error!("could not start central manager: {}", e);
            return;
        }
    };
    tokio::spawn(advertise_periodically(central.clone(), sender_tx));

    while let Some(event) = receiver_rx.recv().await {
        match event {
            AppEvent::Central(CentralEvent::ScanResult { peripheral, .. }) => {
                log::info!("seen {}", peripheral.id);
            }
            AppEvent::Central(CentralEvent::Log { level, message }) => {
                log::log!(level, "bridge: {}", message)
            }
            AppEvent::Central(other) => log::debug!("{:?}", other),
            AppEvent::Advertised(round) => {
                log::info!("advertising round {} done", round);
                if round == 3 {
                    break;
                }
            }
        }
    }
}

async fn setup_central_manager(
    adapter: SimulatedAdapter,
    api_event_tx: Sender<AppEvent>,
) -> gattbridge::Result<Central> {
    let (sender_tx, mut receiver_rx) = mpsc::channel::<CentralEvent>(256);
    let central = Central::new(Arc::new(adapter), sender_tx, ManagerConfig::default())?;

    let mut filter = ScanFilter::default();
    filter.names.push("Beacon".to_string());
    central
        .start_scan(ScanSettings {
            filter,
            allow_duplicates: true,
            scan_mode: 0,
        })
        .await?;

    // Handle Updates
    tokio::spawn(async move {
        while let Some(event) = receiver_rx.recv().await {
            if api_event_tx.send(AppEvent::Central(event)).await.is_err() {
                break;
            }
        }
    });
    Ok(central)
}

async fn advertise_periodically(central: Central, api_event_tx: Sender<AppEvent>) {
    for round in 1..=3u8 {
        match central.start_advertising(&[0x42, round]).await {
            Ok(true) => {}
            Ok(false) => log::warn!("no advertiser available"),
            Err(e) => {
                log::error!("advertising failed: {}", e);
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = central.stop_advertising().await;
        if api_event_tx.send(AppEvent::Advertised(round)).await.is_err() {
            return;
        }
    }
}

enum AppEvent {
    Central(CentralEvent),
    Advertised(u8),
}
