use log::{error, trace};
use tokio::sync::mpsc::UnboundedSender;

use crate::api::central::{PeripheralId, PeripheralInfo};
use crate::api::central_event::{AdvertisementData, CentralState, ConnectionState};
use crate::api::service::Service;
use crate::platform::AttributeAddress;

/// Status code reported alongside a callback. Zero is success; anything else is a
/// platform-specific failure (e.g. 8 link supervision timeout, 133 generic error).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GattStatus(pub i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    pub const FAILURE: GattStatus = GattStatus(0x101);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

/// Everything the platform reports back. Produced on whatever thread the radio stack uses.
#[derive(Debug, Clone)]
pub enum AdapterCallback {
    AdapterStateChanged {
        state: CentralState,
    },
    ScanResult {
        peripheral: PeripheralInfo,
        advertisement: AdvertisementData,
        rssi: i16,
    },
    ScanFailed {
        code: i32,
    },
    AdvertisingStarted,
    AdvertisingFailed {
        code: i32,
    },
    ConnectionStateChanged {
        peripheral: PeripheralId,
        status: GattStatus,
        state: ConnectionState,
    },
    ServicesDiscovered {
        peripheral: PeripheralId,
        services: Vec<Service>,
        status: GattStatus,
    },
    CharacteristicRead {
        peripheral: PeripheralId,
        address: AttributeAddress,
        value: Vec<u8>,
        status: GattStatus,
    },
    CharacteristicWritten {
        peripheral: PeripheralId,
        address: AttributeAddress,
        status: GattStatus,
    },
    CharacteristicChanged {
        peripheral: PeripheralId,
        address: AttributeAddress,
        value: Vec<u8>,
    },
    DescriptorRead {
        peripheral: PeripheralId,
        address: AttributeAddress,
        value: Vec<u8>,
        status: GattStatus,
    },
    DescriptorWritten {
        peripheral: PeripheralId,
        address: AttributeAddress,
        status: GattStatus,
    },
    MtuChanged {
        peripheral: PeripheralId,
        mtu: u16,
        status: GattStatus,
    },
}

/// Where the platform pushes callbacks. Cheap to clone, never blocks, safe to call from any
/// thread.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    sender: UnboundedSender<AdapterCallback>,
}

impl CallbackSink {
    pub fn new(sender: UnboundedSender<AdapterCallback>) -> Self {
        Self { sender }
    }

    pub fn send(&self, callback: AdapterCallback) {
        trace!("adapter callback {:?}", callback);
        if let Err(e) = self.sender.send(callback) {
            error!("Error sending adapter callback: {}", e);
        }
    }
}
