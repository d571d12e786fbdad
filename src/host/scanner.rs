use std::collections::HashSet;

use log::{Level, debug};

use crate::api::central::{PeripheralId, PeripheralInfo, ScanFilter, ScanSettings};
use crate::api::central_event::{AdvertisementData, CentralEvent};
use crate::host::event_bus::EventBus;
use crate::platform::{BluetoothAdapter, CallbackSink, NativeScanFilter};
use crate::{Error, Result};

/// One native filter per criterion value; the platform reports a device matching any of them.
pub(crate) fn build_filters(filter: &ScanFilter) -> Vec<NativeScanFilter> {
    filter
        .services
        .iter()
        .copied()
        .map(NativeScanFilter::ServiceUuid)
        .chain(filter.names.iter().cloned().map(NativeScanFilter::DeviceName))
        .chain(
            filter
                .addresses
                .iter()
                .cloned()
                .map(NativeScanFilter::DeviceAddress),
        )
        .collect()
}

#[derive(Debug, Default)]
pub(crate) struct ScanPipeline {
    seen: HashSet<PeripheralId>,
    allow_duplicates: bool,
    scanning: bool,
}

impl ScanPipeline {
    pub(crate) fn start(
        &mut self,
        adapter: &dyn BluetoothAdapter,
        settings: &ScanSettings,
        sink: &CallbackSink,
    ) -> Result<()> {
        let scanner = adapter.scanner().ok_or(Error::AdapterUnavailable)?;

        self.seen.clear();
        self.allow_duplicates = settings.allow_duplicates;

        let filters = build_filters(&settings.filter);
        debug!(
            "starting scan with {} filters, mode {}",
            filters.len(),
            settings.scan_mode
        );
        if !scanner.start_scan(&filters, settings.scan_mode, sink.clone()) {
            return Err(Error::HardwareRejected("start_scan"));
        }
        self.scanning = true;
        Ok(())
    }

    /// Safe to call repeatedly, and while the adapter is off.
    pub(crate) fn stop(&mut self, adapter: &dyn BluetoothAdapter) {
        if let Some(scanner) = adapter.scanner() {
            scanner.stop_scan();
        }
        self.scanning = false;
    }

    pub(crate) fn on_advertisement(
        &mut self,
        bus: &mut EventBus,
        peripheral: PeripheralInfo,
        advertisement: AdvertisementData,
        rssi: i16,
    ) {
        if !self.allow_duplicates && !self.seen.insert(peripheral.id.clone()) {
            return;
        }
        bus.emit(CentralEvent::ScanResult {
            peripheral,
            advertisement,
            rssi,
        });
    }

    pub(crate) fn on_scan_failed(&mut self, bus: &mut EventBus, code: i32) {
        self.scanning = false;
        bus.log(Level::Error, format!("scan failed with code {}", code));
        bus.emit(CentralEvent::ScanError { code });
    }

    pub(crate) fn clear(&mut self) {
        self.seen.clear();
        self.scanning = false;
    }

    pub(crate) fn is_scanning(&self) -> bool {
        self.scanning
    }
}
