use std::time::Duration;

use log::Level;

use crate::host::event_bus::EventBus;
use crate::platform::{
    AdvertiseData, AdvertiseMode, AdvertiseSettings, BluetoothAdapter, CallbackSink, TxPowerLevel,
};

/// Company id reserved for testing; the payload travels as its manufacturer data.
pub const ADVERTISING_MANUFACTURER_ID: u16 = 0xFFFF;

pub(crate) fn envelope(payload: &[u8]) -> (AdvertiseSettings, AdvertiseData) {
    (
        AdvertiseSettings {
            connectable: false,
            timeout: Duration::ZERO,
            mode: AdvertiseMode::LowLatency,
            tx_power: TxPowerLevel::High,
        },
        AdvertiseData {
            include_device_name: false,
            manufacturer_id: ADVERTISING_MANUFACTURER_ID,
            manufacturer_data: payload.to_vec(),
        },
    )
}

#[derive(Debug, Default)]
pub(crate) struct Advertiser {
    requested: bool,
}

impl Advertiser {
    /// `false` only when the adapter has no advertiser right now.
    pub(crate) fn start(
        &mut self,
        adapter: &dyn BluetoothAdapter,
        bus: &mut EventBus,
        payload: &[u8],
        sink: &CallbackSink,
    ) -> bool {
        let Some(advertiser) = adapter.advertiser() else {
            bus.log(Level::Error, "cannot advertise: no advertiser available");
            return false;
        };
        let (settings, data) = envelope(payload);
        advertiser.start_advertising(&settings, &data, sink.clone());
        self.requested = true;
        bus.log(
            Level::Debug,
            format!("advertising requested with {} byte payload", payload.len()),
        );
        true
    }

    pub(crate) fn stop(&mut self, adapter: &dyn BluetoothAdapter, bus: &mut EventBus) -> bool {
        let Some(advertiser) = adapter.advertiser() else {
            bus.log(Level::Error, "cannot stop advertising: no advertiser available");
            return false;
        };
        advertiser.stop_advertising();
        self.requested = false;
        bus.log(Level::Debug, "advertising stopped");
        true
    }

    pub(crate) fn on_started(&self, bus: &mut EventBus) {
        bus.log(Level::Info, "advertising started");
    }

    pub(crate) fn on_failed(&mut self, bus: &mut EventBus, code: i32) {
        self.requested = false;
        bus.log(Level::Error, format!("advertising failed with code {}", code));
    }

    /// The adapter went away; a restart is the caller's job.
    pub(crate) fn reset(&mut self) {
        self.requested = false;
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use log::LevelFilter;
    use tokio::sync::mpsc;

    use super::*;
    use crate::api::central_event::CentralEvent;
    use crate::platform::{LeAdvertiser, MockBluetoothAdapter, MockLeAdvertiser};

    fn sink() -> CallbackSink {
        let (tx, _rx) = mpsc::unbounded_channel();
        CallbackSink::new(tx)
    }

    fn bus() -> EventBus {
        let (tx, _rx) = mpsc::channel(8);
        EventBus::new(tx, LevelFilter::Debug)
    }

    #[test]
    fn envelope_is_fixed() {
        let (settings, data) = envelope(&[0xCA, 0xFE]);
        assert!(!settings.connectable);
        assert_eq!(settings.timeout, Duration::ZERO);
        assert_eq!(settings.mode, AdvertiseMode::LowLatency);
        assert_eq!(settings.tx_power, TxPowerLevel::High);
        assert!(!data.include_device_name);
        assert_eq!(data.manufacturer_id, 0xFFFF);
        assert_eq!(data.manufacturer_data, vec![0xCA, 0xFE]);
    }

    #[test]
    fn start_and_stop_through_advertiser() {
        let mut mock = MockLeAdvertiser::new();
        mock.expect_start_advertising()
            .withf(|_, data, _| data.manufacturer_data == [0x01])
            .times(1)
            .return_const(());
        mock.expect_stop_advertising().times(1).return_const(());
        let mock: Arc<dyn LeAdvertiser> = Arc::new(mock);
        let mut adapter = MockBluetoothAdapter::new();
        adapter
            .expect_advertiser()
            .returning(move || Some(mock.clone()));
        let mut bus = bus();
        let mut advertiser = Advertiser::default();

        assert!(advertiser.start(&adapter, &mut bus, &[0x01], &sink()));
        assert!(advertiser.is_requested());
        assert!(advertiser.stop(&adapter, &mut bus));
        assert!(!advertiser.is_requested());
        assert_eq!(bus.drain().len(), 2);
    }

    #[test]
    fn unavailable_advertiser_returns_false() {
        let mut adapter = MockBluetoothAdapter::new();
        adapter.expect_advertiser().returning(|| None);
        let mut bus = bus();
        let mut advertiser = Advertiser::default();

        assert!(!advertiser.start(&adapter, &mut bus, &[0x01], &sink()));
        assert!(!advertiser.stop(&adapter, &mut bus));
        assert!(!advertiser.is_requested());
        assert!(bus.drain().iter().all(|event| matches!(
            event,
            CentralEvent::Log {
                level: Level::Error,
                ..
            }
        )));
    }
}
