//! In-memory radio. Virtual peripherals answer GATT operations through the same callback path a
//! real stack would use, optionally holding responses back so races can be staged.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::api::central::{PeripheralId, PeripheralInfo};
use crate::api::central_event::{CentralState, ConnectionState};
use crate::api::characteristic::CharacteristicWriteType;
use crate::platform::{
    AdapterCallback, AttributeAddress, BluetoothAdapter, CallbackSink, GattLink, GattStatus,
    LeAdvertiser, LeScanner, NativeScanFilter,
};

mod link;
mod peripheral;

use link::{SimAdvertiser, SimLink, SimScanner};
pub use peripheral::VirtualPeripheral;

/// Status reported when connecting to a device nobody is simulating.
pub const GATT_ERROR: GattStatus = GattStatus(133);

/// Every platform call the simulated adapter received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Enable,
    Disable,
    Connect(PeripheralId),
    Reconnect(PeripheralId),
    Disconnect(PeripheralId),
    Close(PeripheralId),
    DiscoverServices(PeripheralId),
    ReadCharacteristic(PeripheralId, AttributeAddress),
    WriteCharacteristic(PeripheralId, AttributeAddress, Vec<u8>, CharacteristicWriteType),
    ReadDescriptor(PeripheralId, AttributeAddress),
    WriteDescriptor(PeripheralId, AttributeAddress, Vec<u8>),
    SetNotification(PeripheralId, AttributeAddress, bool),
    RequestMtu(PeripheralId, u16),
    StartScan(Vec<NativeScanFilter>),
    StopScan,
    StartAdvertising(Vec<u8>),
    StopAdvertising,
}

struct LinkState {
    sink: CallbackSink,
    state: ConnectionState,
}

struct ScanSession {
    filters: Vec<NativeScanFilter>,
    sink: CallbackSink,
}

pub(crate) struct SimState {
    present: bool,
    authorized: bool,
    enabled: bool,
    auto_respond: bool,
    max_mtu: u16,
    peripherals: HashMap<PeripheralId, VirtualPeripheral>,
    links: HashMap<PeripheralId, LinkState>,
    scan: Option<ScanSession>,
    advertising: Option<(Vec<u8>, CallbackSink)>,
    state_sink: Option<CallbackSink>,
    held: VecDeque<(CallbackSink, AdapterCallback)>,
    calls: Vec<SimCall>,
}

impl SimState {
    fn central_state(&self) -> CentralState {
        if !self.authorized {
            CentralState::Unauthorized
        } else if self.enabled {
            CentralState::PoweredOn
        } else {
            CentralState::PoweredOff
        }
    }

    fn link_state(&self, id: &PeripheralId) -> ConnectionState {
        self.links
            .get(id)
            .map(|link| link.state)
            .unwrap_or_default()
    }

    /// GATT responses go through here so they can be held back.
    pub(crate) fn respond(&mut self, id: &PeripheralId, callback: AdapterCallback) {
        let Some(link) = self.links.get(id) else {
            return;
        };
        if self.auto_respond {
            link.sink.send(callback);
        } else {
            self.held.push_back((link.sink.clone(), callback));
        }
    }

    pub(crate) fn set_link_state(
        &mut self,
        id: &PeripheralId,
        status: GattStatus,
        state: ConnectionState,
    ) {
        if let Some(link) = self.links.get_mut(id) {
            link.state = state;
            link.sink.send(AdapterCallback::ConnectionStateChanged {
                peripheral: id.clone(),
                status,
                state,
            });
        }
    }

    /// Brings a link up the way a platform does: `Connecting` then `Connected`, or a generic
    /// error when nothing answers at that address.
    pub(crate) fn establish(&mut self, id: &PeripheralId) {
        if self.peripherals.contains_key(id) && self.enabled {
            self.set_link_state(id, GattStatus::SUCCESS, ConnectionState::Connecting);
            self.set_link_state(id, GattStatus::SUCCESS, ConnectionState::Connected);
        } else {
            self.set_link_state(id, GATT_ERROR, ConnectionState::Disconnected);
        }
    }

    pub(crate) fn peripheral(&self, id: &PeripheralId) -> Option<&VirtualPeripheral> {
        self.peripherals.get(id)
    }

    pub(crate) fn peripheral_mut(&mut self, id: &PeripheralId) -> Option<&mut VirtualPeripheral> {
        self.peripherals.get_mut(id)
    }

    pub(crate) fn is_connected(&self, id: &PeripheralId) -> bool {
        self.link_state(id) == ConnectionState::Connected
    }

    pub(crate) fn record(&mut self, call: SimCall) {
        debug!("sim call {:?}", call);
        self.calls.push(call);
    }

    pub(crate) fn max_mtu(&self) -> u16 {
        self.max_mtu
    }

    pub(crate) fn close_link(&mut self, id: &PeripheralId) {
        self.links.remove(id);
    }

    pub(crate) fn start_scan(&mut self, filters: Vec<NativeScanFilter>, sink: CallbackSink) {
        self.scan = Some(ScanSession { filters, sink });
        let ids: Vec<PeripheralId> = self.peripherals.keys().cloned().collect();
        for id in ids {
            self.advertise(&id);
        }
    }

    pub(crate) fn stop_scan(&mut self) {
        self.scan = None;
    }

    pub(crate) fn start_advertising(&mut self, payload: Vec<u8>, sink: CallbackSink) {
        sink.send(AdapterCallback::AdvertisingStarted);
        self.advertising = Some((payload, sink));
    }

    pub(crate) fn stop_advertising(&mut self) {
        self.advertising = None;
    }

    fn advertise(&self, id: &PeripheralId) -> bool {
        let (Some(scan), Some(peripheral)) = (&self.scan, self.peripherals.get(id)) else {
            return false;
        };
        let matches = scan.filters.is_empty()
            || scan.filters.iter().any(|filter| match filter {
                NativeScanFilter::ServiceUuid(uuid) => peripheral.advertises_service(*uuid),
                NativeScanFilter::DeviceName(name) => {
                    peripheral.info.name.as_deref() == Some(name.as_str())
                }
                NativeScanFilter::DeviceAddress(address) => peripheral.id() == address,
            });
        if matches {
            scan.sink.send(AdapterCallback::ScanResult {
                peripheral: peripheral.info.clone(),
                advertisement: peripheral.advertisement.clone(),
                rssi: peripheral.rssi,
            });
        }
        matches
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            let connected: Vec<PeripheralId> = self
                .links
                .iter()
                .filter(|(_, link)| link.state != ConnectionState::Disconnected)
                .map(|(id, _)| id.clone())
                .collect();
            for id in connected {
                self.set_link_state(&id, GattStatus::SUCCESS, ConnectionState::Disconnected);
            }
            self.scan = None;
            self.advertising = None;
        }
        self.notify_state();
    }

    fn notify_state(&self) {
        if let Some(sink) = &self.state_sink {
            sink.send(AdapterCallback::AdapterStateChanged {
                state: self.central_state(),
            });
        }
    }
}

/// Cloneable handle to one simulated radio.
#[derive(Clone)]
pub struct SimulatedAdapter {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAdapter {
    /// Present, authorized, powered on and answering every request.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                present: true,
                authorized: true,
                enabled: true,
                auto_respond: true,
                max_mtu: 517,
                peripherals: HashMap::new(),
                links: HashMap::new(),
                scan: None,
                advertising: None,
                state_sink: None,
                held: VecDeque::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_peripheral(&self, peripheral: VirtualPeripheral) {
        let mut state = self.lock();
        state
            .peripherals
            .insert(peripheral.id().clone(), peripheral);
    }

    /// With `false`, GATT responses are queued until [`release_held`](Self::release_held).
    /// Connection callbacks are never held.
    pub fn set_auto_respond(&self, auto_respond: bool) {
        self.lock().auto_respond = auto_respond;
    }

    /// Delivers queued responses in order and returns how many there were.
    pub fn release_held(&self) -> usize {
        let mut state = self.lock();
        let held: Vec<_> = state.held.drain(..).collect();
        let count = held.len();
        for (sink, callback) in held {
            sink.send(callback);
        }
        count
    }

    /// Drops queued responses, as a radio that lost them would.
    pub fn discard_held(&self) -> usize {
        let mut state = self.lock();
        let count = state.held.len();
        state.held.clear();
        count
    }

    pub fn set_max_mtu(&self, mtu: u16) {
        self.lock().max_mtu = mtu;
    }

    pub fn set_present(&self, present: bool) {
        self.lock().present = present;
    }

    pub fn set_authorized(&self, authorized: bool) {
        let mut state = self.lock();
        state.authorized = authorized;
        state.notify_state();
    }

    /// Powers the radio on or off; turning it off drops every link.
    pub fn set_enabled(&self, enabled: bool) {
        self.lock().set_enabled(enabled);
    }

    /// Sends one more advertisement for `id` to the running scan. `false` when not scanning or
    /// the device does not pass the scan filters.
    pub fn advertise(&self, id: &PeripheralId) -> bool {
        self.lock().advertise(id)
    }

    pub fn fail_scan(&self, code: i32) {
        let mut state = self.lock();
        if let Some(scan) = state.scan.take() {
            scan.sink.send(AdapterCallback::ScanFailed { code });
        }
    }

    pub fn fail_advertising(&self, code: i32) {
        if let Some((_, sink)) = self.lock().advertising.take() {
            sink.send(AdapterCallback::AdvertisingFailed { code });
        }
    }

    /// Pushes a notification from the device. `false` when the link is not up.
    pub fn notify(&self, id: &PeripheralId, address: AttributeAddress, value: &[u8]) -> bool {
        let state = self.lock();
        match state.links.get(id) {
            Some(link) if link.state == ConnectionState::Connected => {
                link.sink.send(AdapterCallback::CharacteristicChanged {
                    peripheral: id.clone(),
                    address,
                    value: value.to_vec(),
                });
                true
            }
            _ => false,
        }
    }

    /// The device went out of range.
    pub fn drop_link(&self, id: &PeripheralId, status: GattStatus) {
        self.lock()
            .set_link_state(id, status, ConnectionState::Disconnected);
    }

    /// Payload currently on air.
    pub fn advertised_payload(&self) -> Option<Vec<u8>> {
        self.lock()
            .advertising
            .as_ref()
            .map(|(payload, _)| payload.clone())
    }

    pub fn is_scanning(&self) -> bool {
        self.lock().scan.is_some()
    }

    pub fn open_links(&self) -> usize {
        self.lock().links.len()
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&SimCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| matches(call)).count()
    }
}

impl BluetoothAdapter for SimulatedAdapter {
    fn is_present(&self) -> bool {
        self.lock().present
    }

    fn state(&self) -> CentralState {
        self.lock().central_state()
    }

    fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    fn enable(&self) -> bool {
        let mut state = self.lock();
        state.record(SimCall::Enable);
        state.set_enabled(true);
        true
    }

    fn disable(&self) -> bool {
        let mut state = self.lock();
        state.record(SimCall::Disable);
        state.set_enabled(false);
        true
    }

    fn register_state_callback(&self, sink: CallbackSink) {
        self.lock().state_sink = Some(sink);
    }

    fn remote_device(&self, id: &PeripheralId) -> PeripheralInfo {
        match self.lock().peripherals.get(id) {
            Some(peripheral) => peripheral.info.clone(),
            None => PeripheralInfo {
                id: id.clone(),
                name: None,
                kind: Default::default(),
            },
        }
    }

    fn connected_devices(&self) -> Vec<PeripheralInfo> {
        let state = self.lock();
        state
            .links
            .iter()
            .filter(|(_, link)| link.state == ConnectionState::Connected)
            .map(|(id, _)| match state.peripherals.get(id) {
                Some(peripheral) => peripheral.info.clone(),
                None => PeripheralInfo::new(id.clone()),
            })
            .collect()
    }

    fn connection_state(&self, id: &PeripheralId) -> ConnectionState {
        self.lock().link_state(id)
    }

    fn connect(
        &self,
        id: &PeripheralId,
        _auto_reconnect: bool,
        sink: CallbackSink,
    ) -> Option<Box<dyn GattLink>> {
        let mut state = self.lock();
        if !state.enabled {
            return None;
        }
        state.record(SimCall::Connect(id.clone()));
        state.links.insert(
            id.clone(),
            LinkState {
                sink,
                state: ConnectionState::Disconnected,
            },
        );
        state.establish(id);
        Some(Box::new(SimLink::new(id.clone(), self.clone())))
    }

    fn scanner(&self) -> Option<Arc<dyn LeScanner>> {
        if !self.lock().enabled {
            return None;
        }
        Some(Arc::new(SimScanner::new(self.clone())))
    }

    fn advertiser(&self) -> Option<Arc<dyn LeAdvertiser>> {
        if !self.lock().enabled {
            return None;
        }
        Some(Arc::new(SimAdvertiser::new(self.clone())))
    }
}
