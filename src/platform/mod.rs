//! Capability surface of the platform radio. Implementations wrap a real stack (or the
//! [`sim`](crate::sim) adapter); the core only ever talks to these traits.
//!
//! All operations are fire-and-forget: a `bool` return only says whether the platform accepted
//! the call. Results are pushed later through the [`CallbackSink`] handed over at connect, scan
//! or advertise time.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::central::{PeripheralId, PeripheralInfo};
use crate::api::central_event::{CentralState, ConnectionState};
use crate::api::characteristic::CharacteristicWriteType;

mod callback;

pub use callback::{AdapterCallback, CallbackSink, GattStatus};

#[cfg_attr(test, mockall::automock)]
pub trait BluetoothAdapter: Send + Sync {
    fn is_present(&self) -> bool;

    /// `Unauthorized` when the host denied access to the radio.
    fn state(&self) -> CentralState;

    fn is_enabled(&self) -> bool;

    fn enable(&self) -> bool;

    fn disable(&self) -> bool;

    /// Where adapter power and authorization changes are reported.
    fn register_state_callback(&self, sink: CallbackSink);

    fn remote_device(&self, id: &PeripheralId) -> PeripheralInfo;

    fn connected_devices(&self) -> Vec<PeripheralInfo>;

    fn connection_state(&self, id: &PeripheralId) -> ConnectionState;

    /// Allocates a connection handle and starts connecting. `None` when the platform refuses.
    fn connect(
        &self,
        id: &PeripheralId,
        auto_reconnect: bool,
        sink: CallbackSink,
    ) -> Option<Box<dyn GattLink>>;

    /// `None` while the adapter is off.
    fn scanner(&self) -> Option<Arc<dyn LeScanner>>;

    /// `None` while the adapter is off or broadcasting is unsupported.
    fn advertiser(&self) -> Option<Arc<dyn LeAdvertiser>>;
}

/// A connection handle. Scarce: reused for reconnects and closed exactly once.
#[cfg_attr(test, mockall::automock)]
pub trait GattLink: Send + Sync {
    fn reconnect(&self) -> bool;

    fn disconnect(&self);

    fn close(&self);

    fn discover_services(&self) -> bool;

    fn read_characteristic(&self, address: &AttributeAddress) -> bool;

    fn write_characteristic(
        &self,
        address: &AttributeAddress,
        value: &[u8],
        write_type: CharacteristicWriteType,
    ) -> bool;

    fn read_descriptor(&self, address: &AttributeAddress) -> bool;

    fn write_descriptor(&self, address: &AttributeAddress, value: &[u8]) -> bool;

    fn set_characteristic_notification(&self, address: &AttributeAddress, enable: bool) -> bool;

    fn request_mtu(&self, mtu: u16) -> bool;
}

#[cfg_attr(test, mockall::automock)]
pub trait LeScanner: Send + Sync {
    fn start_scan(&self, filters: &[NativeScanFilter], scan_mode: i32, sink: CallbackSink) -> bool;

    fn stop_scan(&self);
}

#[cfg_attr(test, mockall::automock)]
pub trait LeAdvertiser: Send + Sync {
    fn start_advertising(
        &self,
        settings: &AdvertiseSettings,
        data: &AdvertiseData,
        sink: CallbackSink,
    );

    fn stop_advertising(&self);
}

/// How the platform addresses an attribute: the service that directly contains the
/// characteristic (which may be an included service), the characteristic and optionally a
/// descriptor on it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AttributeAddress {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Option<Uuid>,
}

impl AttributeAddress {
    pub fn characteristic(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
            descriptor: None,
        }
    }

    pub fn descriptor(service: Uuid, characteristic: Uuid, descriptor: Uuid) -> Self {
        Self {
            service,
            characteristic,
            descriptor: Some(descriptor),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NativeScanFilter {
    ServiceUuid(Uuid),
    DeviceName(String),
    DeviceAddress(PeripheralId),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdvertiseSettings {
    pub connectable: bool,
    /// Zero advertises until stopped.
    pub timeout: Duration,
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdvertiseData {
    pub include_device_name: bool,
    pub manufacturer_id: u16,
    pub manufacturer_data: Vec<u8>,
}
