use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client Characteristic Configuration Descriptor.
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

#[derive(Debug, Ord, Clone, PartialOrd, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub value: Option<Vec<u8>>,
}

impl Descriptor {
    pub fn new(uuid: Uuid) -> Self {
        Descriptor { uuid, value: None }
    }

    pub fn client_configuration() -> Self {
        Descriptor {
            uuid: CLIENT_CHARACTERISTIC_CONFIGURATION,
            value: Some(DISABLE_NOTIFICATION_VALUE.to_vec()),
        }
    }

    pub fn is_client_configuration(&self) -> bool {
        self.uuid == CLIENT_CHARACTERISTIC_CONFIGURATION
    }
}

/// Subscription mirrored in a characteristic's CCCD.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    #[default]
    None,
    Notify,
    Indicate,
}

impl SubscriptionState {
    pub fn from_cccd_value(value: &[u8]) -> Self {
        match value.first() {
            Some(bits) if bits & 0x02 != 0 => SubscriptionState::Indicate,
            Some(bits) if bits & 0x01 != 0 => SubscriptionState::Notify,
            _ => SubscriptionState::None,
        }
    }

    pub fn cccd_value(self) -> [u8; 2] {
        match self {
            SubscriptionState::None => DISABLE_NOTIFICATION_VALUE,
            SubscriptionState::Notify => ENABLE_NOTIFICATION_VALUE,
            SubscriptionState::Indicate => ENABLE_INDICATION_VALUE,
        }
    }
}
