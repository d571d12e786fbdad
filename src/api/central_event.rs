use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::central::{AttributeRequest, PeripheralId, PeripheralInfo};
use crate::api::descriptor::SubscriptionState;
use crate::api::service::Service;

/// Everything the bridge reports asynchronously, in the order the causing callbacks were
/// observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CentralEvent {
    ScanResult {
        peripheral: PeripheralInfo,
        advertisement: AdvertisementData,
        rssi: i16,
    },
    /// Terminal: the platform stopped scanning.
    ScanError {
        code: i32,
    },
    ConnectionStateChanged {
        peripheral: PeripheralId,
        state: ConnectionState,
    },
    ServicesDiscovered {
        peripheral: PeripheralId,
        services: Vec<Service>,
        success: bool,
    },
    CharacteristicRead {
        request: AttributeRequest,
        value: Vec<u8>,
        success: bool,
    },
    CharacteristicWritten {
        request: AttributeRequest,
        success: bool,
    },
    /// Unsolicited notification or indication.
    CharacteristicChanged {
        request: AttributeRequest,
        value: Vec<u8>,
    },
    DescriptorRead {
        request: AttributeRequest,
        value: Vec<u8>,
        success: bool,
    },
    DescriptorWritten {
        request: AttributeRequest,
        success: bool,
    },
    NotificationStateChanged {
        request: AttributeRequest,
        subscription: SubscriptionState,
        success: bool,
    },
    MtuChanged {
        peripheral: PeripheralId,
        mtu: u16,
        success: bool,
    },
    StateChanged {
        state: CentralState,
    },
    RequestTimedOut {
        peripheral: PeripheralId,
        operation: GattOperation,
        request: Option<AttributeRequest>,
    },
    Log {
        level: log::Level,
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    pub tx_power_level: Option<i32>,
    pub connectable: bool,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub service_uuids: Vec<Uuid>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CentralState {
    Unknown = 0,
    PoweredOn = 1,
    PoweredOff = 2,
    TurningOn = 3,
    TurningOff = 4,
    Unauthorized = 5,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

/// Hardware operations that occupy a session's single request slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum GattOperation {
    ReadCharacteristic,
    ReadDescriptor,
    WriteCharacteristic,
    WriteDescriptor,
    SetNotification,
    RequestMtu,
}
