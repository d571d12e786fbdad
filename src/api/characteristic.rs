use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::descriptor::Descriptor;

#[derive(Debug, Ord, Eq, PartialEq, PartialOrd, Clone, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: Vec<CharacteristicProperty>,
    pub value: Option<Vec<u8>>,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn new(uuid: Uuid, properties: Vec<CharacteristicProperty>) -> Self {
        Characteristic {
            uuid,
            properties,
            value: None,
            descriptors: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn has_property(&self, property: CharacteristicProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn descriptor(&self, uuid: Uuid) -> Option<&Descriptor> {
        self.descriptors.iter().find(|descriptor| descriptor.uuid == uuid)
    }
}

#[derive(Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq, Serialize, Deserialize)]
pub enum CharacteristicProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    AuthenticatedSignedWrites,
    Notify,
    Indicate,
    ExtendedProperties,
}

#[derive(Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq, Serialize, Deserialize)]
pub enum CharacteristicWriteType {
    WriteWithoutResponse,
    WriteWithResponse,
}
