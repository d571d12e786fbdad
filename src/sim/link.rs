use crate::api::central::PeripheralId;
use crate::api::central_event::ConnectionState;
use crate::api::characteristic::CharacteristicWriteType;
use crate::platform::{
    AdapterCallback, AdvertiseData, AdvertiseSettings, AttributeAddress, CallbackSink, GattLink,
    GattStatus, LeAdvertiser, LeScanner, NativeScanFilter,
};
use crate::sim::{SimCall, SimulatedAdapter};

fn status(found: bool) -> GattStatus {
    if found {
        GattStatus::SUCCESS
    } else {
        GattStatus::FAILURE
    }
}

pub(crate) struct SimLink {
    id: PeripheralId,
    adapter: SimulatedAdapter,
}

impl SimLink {
    pub(crate) fn new(id: PeripheralId, adapter: SimulatedAdapter) -> Self {
        Self { id, adapter }
    }
}

impl GattLink for SimLink {
    fn reconnect(&self) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::Reconnect(self.id.clone()));
        if state.peripheral(&self.id).is_none() {
            return false;
        }
        state.establish(&self.id);
        true
    }

    fn disconnect(&self) {
        let mut state = self.adapter.lock();
        state.record(SimCall::Disconnect(self.id.clone()));
        // the platform stays silent for a link that is already down
        if state.is_connected(&self.id) {
            state.set_link_state(&self.id, GattStatus::SUCCESS, ConnectionState::Disconnected);
        }
    }

    fn close(&self) {
        let mut state = self.adapter.lock();
        state.record(SimCall::Close(self.id.clone()));
        state.close_link(&self.id);
    }

    fn discover_services(&self) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::DiscoverServices(self.id.clone()));
        if !state.is_connected(&self.id) {
            return false;
        }
        let services = state
            .peripheral(&self.id)
            .map(|peripheral| peripheral.services.clone())
            .unwrap_or_default();
        state.respond(
            &self.id,
            AdapterCallback::ServicesDiscovered {
                peripheral: self.id.clone(),
                services,
                status: GattStatus::SUCCESS,
            },
        );
        true
    }

    fn read_characteristic(&self, address: &AttributeAddress) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::ReadCharacteristic(self.id.clone(), *address));
        if !state.is_connected(&self.id) {
            return false;
        }
        let (found, value) = match state.peripheral(&self.id) {
            Some(peripheral) => (
                peripheral.has_attribute(address),
                peripheral.value(address).unwrap_or_default().to_vec(),
            ),
            None => (false, Vec::new()),
        };
        state.respond(
            &self.id,
            AdapterCallback::CharacteristicRead {
                peripheral: self.id.clone(),
                address: *address,
                value,
                status: status(found),
            },
        );
        true
    }

    fn write_characteristic(
        &self,
        address: &AttributeAddress,
        value: &[u8],
        write_type: CharacteristicWriteType,
    ) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::WriteCharacteristic(
            self.id.clone(),
            *address,
            value.to_vec(),
            write_type,
        ));
        if !state.is_connected(&self.id) {
            return false;
        }
        let found = match state.peripheral_mut(&self.id) {
            Some(peripheral) if peripheral.has_attribute(address) => {
                peripheral.values.insert(*address, value.to_vec());
                true
            }
            _ => false,
        };
        if write_type == CharacteristicWriteType::WriteWithResponse {
            state.respond(
                &self.id,
                AdapterCallback::CharacteristicWritten {
                    peripheral: self.id.clone(),
                    address: *address,
                    status: status(found),
                },
            );
        }
        true
    }

    fn read_descriptor(&self, address: &AttributeAddress) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::ReadDescriptor(self.id.clone(), *address));
        if !state.is_connected(&self.id) {
            return false;
        }
        let (found, value) = match state.peripheral(&self.id) {
            Some(peripheral) => (
                peripheral.has_attribute(address),
                peripheral.value(address).unwrap_or_default().to_vec(),
            ),
            None => (false, Vec::new()),
        };
        state.respond(
            &self.id,
            AdapterCallback::DescriptorRead {
                peripheral: self.id.clone(),
                address: *address,
                value,
                status: status(found),
            },
        );
        true
    }

    fn write_descriptor(&self, address: &AttributeAddress, value: &[u8]) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::WriteDescriptor(
            self.id.clone(),
            *address,
            value.to_vec(),
        ));
        if !state.is_connected(&self.id) {
            return false;
        }
        let found = match state.peripheral_mut(&self.id) {
            Some(peripheral) if peripheral.has_attribute(address) => {
                peripheral.values.insert(*address, value.to_vec());
                true
            }
            _ => false,
        };
        state.respond(
            &self.id,
            AdapterCallback::DescriptorWritten {
                peripheral: self.id.clone(),
                address: *address,
                status: status(found),
            },
        );
        true
    }

    fn set_characteristic_notification(&self, address: &AttributeAddress, enable: bool) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::SetNotification(self.id.clone(), *address, enable));
        state.is_connected(&self.id)
    }

    fn request_mtu(&self, mtu: u16) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::RequestMtu(self.id.clone(), mtu));
        if !state.is_connected(&self.id) {
            return false;
        }
        let negotiated = mtu.min(state.max_mtu());
        state.respond(
            &self.id,
            AdapterCallback::MtuChanged {
                peripheral: self.id.clone(),
                mtu: negotiated,
                status: GattStatus::SUCCESS,
            },
        );
        true
    }
}

pub(crate) struct SimScanner {
    adapter: SimulatedAdapter,
}

impl SimScanner {
    pub(crate) fn new(adapter: SimulatedAdapter) -> Self {
        Self { adapter }
    }
}

impl LeScanner for SimScanner {
    fn start_scan(&self, filters: &[NativeScanFilter], _scan_mode: i32, sink: CallbackSink) -> bool {
        let mut state = self.adapter.lock();
        state.record(SimCall::StartScan(filters.to_vec()));
        state.start_scan(filters.to_vec(), sink);
        true
    }

    fn stop_scan(&self) {
        let mut state = self.adapter.lock();
        state.record(SimCall::StopScan);
        state.stop_scan();
    }
}

pub(crate) struct SimAdvertiser {
    adapter: SimulatedAdapter,
}

impl SimAdvertiser {
    pub(crate) fn new(adapter: SimulatedAdapter) -> Self {
        Self { adapter }
    }
}

impl LeAdvertiser for SimAdvertiser {
    fn start_advertising(
        &self,
        _settings: &AdvertiseSettings,
        data: &AdvertiseData,
        sink: CallbackSink,
    ) {
        let mut state = self.adapter.lock();
        state.record(SimCall::StartAdvertising(data.manufacturer_data.clone()));
        state.start_advertising(data.manufacturer_data.clone(), sink);
    }

    fn stop_advertising(&self) {
        let mut state = self.adapter.lock();
        state.record(SimCall::StopAdvertising);
        state.stop_advertising();
    }
}
